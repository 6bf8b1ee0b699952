//! Routine → day → exercise execution table with per-set trend markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::filters::SetFilter;
use crate::model::{Exercise, ExerciseSet, Session, SetNote, execution_order};

/// How sessions are partitioned before ordering executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum GroupBy {
    /// One group per day index across every routine.
    Day,
    /// Routine first, then day index.
    #[default]
    RoutineDay,
}

/// Where the logged reps fall against the target range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SetStatus {
    /// No reps logged.
    #[serde(rename = "none")]
    NotLogged,
    Below,
    Above,
    InRange,
}

impl SetStatus {
    pub fn of(set: &ExerciseSet) -> Self {
        let Some(reps) = set.actual_reps else {
            return SetStatus::NotLogged;
        };
        if set.target_reps_min.is_some_and(|min| reps < min) {
            SetStatus::Below
        } else if set.target_reps_max.is_some_and(|max| reps > max) {
            SetStatus::Above
        } else {
            SetStatus::InRange
        }
    }
}

/// Improvement against the previous execution. Only progress is flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
}

fn trend<T: PartialOrd>(previous: Option<T>, current: Option<T>) -> Option<Trend> {
    match (previous, current) {
        (Some(p), Some(c)) if p < c => Some(Trend::Up),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCell {
    pub set_number: u32,
    pub actual_reps: Option<u32>,
    pub weight: Option<f64>,
    pub target_reps_min: Option<u32>,
    pub target_reps_max: Option<u32>,
    pub status: SetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rep_trend: Option<Trend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_trend: Option<Trend>,
    pub note: Option<SetNote>,
}

/// One exercise as performed in one execution of a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRow {
    /// 1 = earliest execution of the day.
    pub execution_index: u32,
    pub session_id: String,
    pub date: DateTime<Utc>,
    pub week: u32,
    pub sets: Vec<SetCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseHistory {
    pub exercise_name: String,
    pub muscle_group: String,
    /// Only executions that included the exercise, in execution order.
    pub rows: Vec<ExecutionRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub execution_index: u32,
    pub session_id: String,
    pub date: DateTime<Utc>,
    pub week: u32,
    pub session_rpe: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayGroup {
    pub day_index: u32,
    /// Label of the most recent execution.
    pub day_label: String,
    pub executions: Vec<Execution>,
    /// Exercises in the order they were first performed.
    pub exercises: Vec<ExerciseHistory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineGroup {
    pub routine_key: String,
    pub routine_name: String,
    pub latest_date: DateTime<Utc>,
    pub days: Vec<DayGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutineHierarchy {
    /// Routine with the most recent session.
    pub current: Option<RoutineGroup>,
    /// Remaining routines, most recently used first.
    pub old: Vec<RoutineGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Hierarchy {
    ByDay(Vec<DayGroup>),
    ByRoutine(RoutineHierarchy),
}

/// Build the execution table for `sessions`.
pub fn build_hierarchy(sessions: &[Session], group_by: GroupBy, filter: &SetFilter) -> Hierarchy {
    log::debug!(
        "Building {:?} hierarchy for {} sessions",
        group_by,
        sessions.len()
    );
    let refs: Vec<&Session> = sessions.iter().collect();
    match group_by {
        GroupBy::Day => Hierarchy::ByDay(build_day_groups(&refs, filter)),
        GroupBy::RoutineDay => Hierarchy::ByRoutine(build_routine_groups(sessions, filter)),
    }
}

/// Group by routine, then by day; the most recently used routine is current.
///
/// The current routine is chosen before the filter applies and is kept even
/// when the filter leaves it without days. Old routines left empty are
/// dropped.
pub fn build_routine_groups(sessions: &[Session], filter: &SetFilter) -> RoutineHierarchy {
    let Some(current_key) = sessions
        .iter()
        .max_by(|a, b| execution_order(a, b))
        .map(|s| s.routine_key.as_str())
    else {
        return RoutineHierarchy::default();
    };

    let mut by_routine: BTreeMap<&str, Vec<&Session>> = BTreeMap::new();
    for session in sessions {
        by_routine
            .entry(session.routine_key.as_str())
            .or_default()
            .push(session);
    }

    let mut current = None;
    let mut old: Vec<RoutineGroup> = Vec::new();
    for (key, members) in by_routine {
        let Some(latest) = members.iter().copied().max_by(|a, b| execution_order(a, b)) else {
            continue;
        };
        let routine_name = latest
            .routine_name
            .clone()
            .or_else(|| members.iter().find_map(|s| s.routine_name.clone()))
            .unwrap_or_else(|| key.to_owned());
        let group = RoutineGroup {
            routine_key: key.to_owned(),
            routine_name,
            latest_date: latest.date,
            days: build_day_groups(&members, filter),
        };
        if key == current_key {
            current = Some(group);
        } else if !group.days.is_empty() {
            old.push(group);
        }
    }

    // Stable sort keeps routine keys ascending on equal dates.
    old.sort_by(|a, b| b.latest_date.cmp(&a.latest_date));
    RoutineHierarchy { current, old }
}

/// Group by day index and order repeated executions of each day.
///
/// When a filter is active, days left without exercises are omitted.
pub fn build_day_groups(sessions: &[&Session], filter: &SetFilter) -> Vec<DayGroup> {
    let mut by_day: BTreeMap<u32, Vec<&Session>> = BTreeMap::new();
    for &session in sessions {
        by_day.entry(session.day_index).or_default().push(session);
    }
    let filtered = filter.muscle.is_some() || filter.exercise.is_some();
    by_day
        .into_iter()
        .map(|(day_index, mut executions)| {
            executions.sort_by(|a, b| execution_order(a, b));
            build_day(day_index, &executions, filter)
        })
        .filter(|day| !filtered || !day.exercises.is_empty())
        .collect()
}

fn find_exercise<'a>(session: &'a Session, name: &str) -> Option<&'a Exercise> {
    session.exercises.iter().find(|ex| ex.exercise_name == name)
}

/// `executions` must already be in execution order.
fn build_day(day_index: u32, executions: &[&Session], filter: &SetFilter) -> DayGroup {
    // Union of exercise names in first-seen order.
    let mut union: Vec<&Exercise> = Vec::new();
    for ex in executions.iter().flat_map(|s| &s.exercises) {
        if !union.iter().any(|seen| seen.exercise_name == ex.exercise_name) {
            union.push(ex);
        }
    }

    let exercises = union
        .into_iter()
        .filter(|ex| filter.matches(ex))
        .map(|ex| ExerciseHistory {
            exercise_name: ex.exercise_name.clone(),
            muscle_group: ex.muscle_group.clone(),
            rows: exercise_rows(&ex.exercise_name, executions),
        })
        .collect();

    DayGroup {
        day_index,
        day_label: executions
            .last()
            .map(|s| s.day_label.clone())
            .unwrap_or_default(),
        executions: executions
            .iter()
            .enumerate()
            .map(|(pos, s)| Execution {
                execution_index: pos as u32 + 1,
                session_id: s.id.clone(),
                date: s.date,
                week: s.week,
                session_rpe: s.session_rpe,
            })
            .collect(),
        exercises,
    }
}

fn exercise_rows(name: &str, executions: &[&Session]) -> Vec<ExecutionRow> {
    let mut rows = Vec::new();
    for (pos, session) in executions.iter().enumerate() {
        let Some(current) = find_exercise(session, name) else {
            continue;
        };
        let previous = pos
            .checked_sub(1)
            .and_then(|p| find_exercise(executions[p], name));
        let sets = current
            .sets
            .iter()
            .enumerate()
            .map(|(i, set)| {
                let prev_set = previous.and_then(|p| p.sets.get(i));
                SetCell {
                    set_number: set.set_number,
                    actual_reps: set.actual_reps,
                    weight: set.weight,
                    target_reps_min: set.target_reps_min,
                    target_reps_max: set.target_reps_max,
                    status: SetStatus::of(set),
                    rep_trend: trend(prev_set.and_then(|p| p.actual_reps), set.actual_reps),
                    weight_trend: trend(prev_set.and_then(|p| p.weight), set.weight),
                    note: set.notes.clone(),
                }
            })
            .collect();
        rows.push(ExecutionRow {
            execution_index: pos as u32 + 1,
            session_id: session.id.clone(),
            date: session.date,
            week: session.week,
            sets,
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawExercise, RawSession, RawSet};
    use chrono::TimeZone;

    fn set(reps: Option<u32>, weight: Option<f64>) -> RawSet {
        RawSet {
            actual_reps: reps,
            weight,
            target_reps_min: Some(8),
            target_reps_max: Some(12),
            ..RawSet::default()
        }
    }

    fn exercise(name: &str, muscle: &str, sets: Vec<RawSet>) -> RawExercise {
        RawExercise {
            exercise_name: Some(name.into()),
            muscle_group: Some(muscle.into()),
            sets: Some(sets),
        }
    }

    fn session(
        id: &str,
        routine: &str,
        day_index: u32,
        date: (u32, u32),
        week: u32,
        exercises: Vec<RawExercise>,
    ) -> Session {
        Session::from(RawSession {
            id: Some(id.into()),
            date: Some(Utc.with_ymd_and_hms(2024, date.0, date.1, 18, 0, 0).unwrap()),
            week: Some(week),
            day_index: Some(day_index),
            routine_id: Some(routine.into()),
            exercises: Some(exercises),
            ..RawSession::default()
        })
    }

    fn by_day(h: Hierarchy) -> Vec<DayGroup> {
        match h {
            Hierarchy::ByDay(days) => days,
            Hierarchy::ByRoutine(_) => panic!("expected day groups"),
        }
    }

    #[test]
    fn status_classification() {
        let mk = |reps| ExerciseSet {
            set_number: 1,
            actual_reps: reps,
            weight: None,
            target_reps_min: Some(8),
            target_reps_max: Some(12),
            notes: None,
        };
        assert_eq!(SetStatus::of(&mk(None)), SetStatus::NotLogged);
        assert_eq!(SetStatus::of(&mk(Some(6))), SetStatus::Below);
        assert_eq!(SetStatus::of(&mk(Some(13))), SetStatus::Above);
        assert_eq!(SetStatus::of(&mk(Some(8))), SetStatus::InRange);
        assert_eq!(SetStatus::of(&mk(Some(12))), SetStatus::InRange);
    }

    #[test]
    fn execution_index_follows_date_then_week() {
        let sessions = vec![
            session("c", "r", 0, (3, 10), 2, vec![]),
            session("a", "r", 0, (3, 3), 1, vec![]),
            session("b2", "r", 0, (3, 10), 1, vec![]),
        ];
        let days = by_day(build_hierarchy(&sessions, GroupBy::Day, &SetFilter::default()));
        assert_eq!(days.len(), 1);
        let order: Vec<(&str, u32)> = days[0]
            .executions
            .iter()
            .map(|e| (e.session_id.as_str(), e.execution_index))
            .collect();
        assert_eq!(order, vec![("a", 1), ("b2", 2), ("c", 3)]);
    }

    #[test]
    fn exercise_union_keeps_first_seen_order() {
        let sessions = vec![
            session(
                "1",
                "r",
                0,
                (3, 1),
                1,
                vec![
                    exercise("Sentadilla", "PIERNA", vec![]),
                    exercise("Prensa", "PIERNA", vec![]),
                ],
            ),
            session(
                "2",
                "r",
                0,
                (3, 8),
                2,
                vec![
                    exercise("Zancadas", "PIERNA", vec![]),
                    exercise("Sentadilla", "PIERNA", vec![]),
                    exercise("Abductores", "GLUTEO", vec![]),
                ],
            ),
        ];
        let days = by_day(build_hierarchy(&sessions, GroupBy::Day, &SetFilter::default()));
        let names: Vec<&str> = days[0]
            .exercises
            .iter()
            .map(|e| e.exercise_name.as_str())
            .collect();
        assert_eq!(names, vec!["Sentadilla", "Prensa", "Zancadas", "Abductores"]);

        let prensa = &days[0].exercises[1];
        assert_eq!(prensa.rows.len(), 1);
        assert_eq!(prensa.rows[0].execution_index, 1);

        let filtered = by_day(build_hierarchy(
            &sessions,
            GroupBy::Day,
            &SetFilter::from_selection("GLUTEO", ""),
        ));
        assert_eq!(filtered[0].exercises.len(), 1);
        assert_eq!(filtered[0].exercises[0].rows[0].execution_index, 2);
    }

    #[test]
    fn trends_only_mark_improvement() {
        let sessions = vec![
            session(
                "1",
                "r",
                0,
                (3, 1),
                1,
                vec![exercise(
                    "Press banca",
                    "PECHO",
                    vec![set(Some(8), Some(60.0)), set(Some(10), Some(60.0))],
                )],
            ),
            session(
                "2",
                "r",
                0,
                (3, 8),
                2,
                vec![exercise(
                    "Press banca",
                    "PECHO",
                    vec![
                        set(Some(10), Some(60.0)),
                        set(Some(8), Some(62.5)),
                        set(Some(6), Some(62.5)),
                    ],
                )],
            ),
        ];
        let days = by_day(build_hierarchy(&sessions, GroupBy::Day, &SetFilter::default()));
        let rows = &days[0].exercises[0].rows;

        assert!(rows[0].sets.iter().all(|s| s.rep_trend.is_none() && s.weight_trend.is_none()));

        let second = &rows[1].sets;
        assert_eq!(second[0].rep_trend, Some(Trend::Up));
        assert_eq!(second[0].weight_trend, None);
        assert_eq!(second[1].rep_trend, None);
        assert_eq!(second[1].weight_trend, Some(Trend::Up));
        // No predecessor at the third position.
        assert_eq!(second[2].rep_trend, None);
        assert_eq!(second[2].status, SetStatus::Below);
    }

    #[test]
    fn trend_compares_with_immediately_preceding_execution() {
        let press = |reps| exercise("Press banca", "PECHO", vec![set(Some(reps), Some(60.0))]);
        let sessions = vec![
            session("1", "r", 0, (3, 1), 1, vec![press(8)]),
            session("2", "r", 0, (3, 8), 2, vec![exercise("Fondos", "PECHO", vec![])]),
            session("3", "r", 0, (3, 15), 3, vec![press(10)]),
        ];
        let days = by_day(build_hierarchy(&sessions, GroupBy::Day, &SetFilter::default()));
        let rows = &days[0].exercises[0].rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].execution_index, 3);
        assert_eq!(rows[1].sets[0].rep_trend, None);
    }

    #[test]
    fn single_execution_has_no_trends() {
        let sessions = vec![session(
            "1",
            "r",
            2,
            (3, 1),
            1,
            vec![exercise("Remo", "ESPALDA", vec![set(Some(10), Some(50.0))])],
        )];
        let days = by_day(build_hierarchy(&sessions, GroupBy::Day, &SetFilter::default()));
        assert_eq!(days[0].day_index, 2);
        assert_eq!(days[0].day_label, "Día 3");
        let cell = &days[0].exercises[0].rows[0].sets[0];
        assert!(cell.rep_trend.is_none() && cell.weight_trend.is_none());
    }

    #[test]
    fn routines_split_into_current_and_old() {
        let sessions = vec![
            session("1", "fuerza", 0, (1, 10), 1, vec![]),
            session("2", "hipertrofia", 0, (3, 1), 1, vec![]),
            session("3", "hipertrofia", 1, (3, 3), 1, vec![]),
            session("4", "base", 0, (2, 1), 1, vec![]),
        ];
        let Hierarchy::ByRoutine(h) =
            build_hierarchy(&sessions, GroupBy::RoutineDay, &SetFilter::default())
        else {
            panic!("expected routine hierarchy");
        };
        let current = h.current.unwrap();
        assert_eq!(current.routine_key, "hipertrofia");
        assert_eq!(current.days.len(), 2);
        let old: Vec<&str> = h.old.iter().map(|r| r.routine_key.as_str()).collect();
        assert_eq!(old, vec!["base", "fuerza"]);
    }

    #[test]
    fn current_routine_survives_filter() {
        let sessions = vec![
            session("1", "vieja", 0, (3, 1), 1, vec![exercise("Press banca", "PECHO", vec![set(Some(10), Some(60.0))])]),
            session("2", "nueva", 0, (3, 20), 1, vec![exercise("Sentadilla", "PIERNA", vec![set(Some(8), Some(100.0))])]),
        ];
        let filter = SetFilter::from_selection("PECHO", "");
        let Hierarchy::ByRoutine(h) = build_hierarchy(&sessions, GroupBy::RoutineDay, &filter) else {
            panic!("expected routine hierarchy");
        };
        let current = h.current.unwrap();
        assert_eq!(current.routine_key, "nueva");
        assert!(current.days.is_empty());
        let old: Vec<&str> = h.old.iter().map(|r| r.routine_key.as_str()).collect();
        assert_eq!(old, vec!["vieja"]);

        let filter = SetFilter::from_selection("ESPALDA", "");
        let Hierarchy::ByRoutine(h) = build_hierarchy(&sessions, GroupBy::RoutineDay, &filter) else {
            panic!("expected routine hierarchy");
        };
        assert_eq!(h.current.map(|r| r.routine_key), Some("nueva".to_owned()));
        assert!(h.old.is_empty());
    }

    #[test]
    fn empty_input() {
        assert!(by_day(build_hierarchy(&[], GroupBy::Day, &SetFilter::default())).is_empty());
        assert_eq!(
            build_hierarchy(&[], GroupBy::RoutineDay, &SetFilter::default()),
            Hierarchy::ByRoutine(RoutineHierarchy::default())
        );
    }
}
