//! Trend metrics shown next to the progress tables.
//!
//! [`KpiLibrary`] is the seam the panel talks to; [`StandardKpis`] is the
//! stock implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::analysis::round1;
use crate::filters::{Period, SetFilter, filter_by_period};
use crate::model::{ExerciseSet, Session, execution_order};

/// Share of the all-time best weight that makes a set heavy.
pub const HEAVY_SET_RATIO: f64 = 0.85;
/// Minimum relative e1RM improvement counted as a record.
pub const PR_MARGIN: f64 = 1.005;
/// Session RPE at or above which a session counts toward a hard streak.
pub const HARD_SESSION_RPE: u8 = 4;
/// Session RPE reported as "modo bestia".
pub const BEAST_MODE_RPE: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiPoint {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuscleShare {
    pub muscle: String,
    pub volume: f64,
    /// Percent of total volume, one decimal.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpePoint {
    pub date: DateTime<Utc>,
    pub label: String,
    pub rpe: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpeSummary {
    pub data: Vec<RpePoint>,
    pub average: f64,
    pub max_streak: usize,
    pub total_sessions: usize,
    pub modo_besta_count: usize,
}

/// Supplier of every KPI series the panel shows.
pub trait KpiLibrary {
    fn filter_by_period(&self, sessions: &[Session], period: Period, now: DateTime<Utc>) -> Vec<Session> {
        filter_by_period(sessions, period, now)
    }
    fn volume_by_week(&self, sessions: &[Session], filter: &SetFilter) -> Vec<KpiPoint>;
    fn intensity_by_week(&self, sessions: &[Session], filter: &SetFilter) -> Vec<KpiPoint>;
    fn heavy_sets_by_week(&self, sessions: &[Session], filter: &SetFilter) -> Vec<KpiPoint>;
    fn plan_compliance_by_week(&self, sessions: &[Session]) -> Vec<KpiPoint>;
    fn plan_compliance_total(&self, sessions: &[Session]) -> f64;
    fn muscle_balance(&self, sessions: &[Session]) -> Vec<MuscleShare>;
    fn pr_count_by_week(&self, sessions: &[Session]) -> Vec<KpiPoint>;
    fn session_rpe_by_day(&self, sessions: &[Session]) -> RpeSummary;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiPanel {
    pub period: Period,
    pub session_count: usize,
    pub volume: Vec<KpiPoint>,
    pub intensity: Vec<KpiPoint>,
    pub heavy_sets: Vec<KpiPoint>,
    pub compliance: Vec<KpiPoint>,
    pub compliance_total: f64,
    pub muscle_balance: Vec<MuscleShare>,
    pub pr_count: Vec<KpiPoint>,
    pub session_rpe: RpeSummary,
}

/// Apply the period window, then collect every series from `lib`.
///
/// Only the volume, intensity, heavy-set series honour the muscle and
/// exercise filter.
pub fn kpi_panel<L: KpiLibrary + ?Sized>(
    lib: &L,
    sessions: &[Session],
    period: Period,
    filter: &SetFilter,
    now: DateTime<Utc>,
) -> KpiPanel {
    let windowed = lib.filter_by_period(sessions, period, now);
    log::debug!(
        "KPI panel over {} of {} sessions ({period:?})",
        windowed.len(),
        sessions.len()
    );
    KpiPanel {
        period,
        session_count: windowed.len(),
        volume: lib.volume_by_week(&windowed, filter),
        intensity: lib.intensity_by_week(&windowed, filter),
        heavy_sets: lib.heavy_sets_by_week(&windowed, filter),
        compliance: lib.plan_compliance_by_week(&windowed),
        compliance_total: lib.plan_compliance_total(&windowed),
        muscle_balance: lib.muscle_balance(&windowed),
        pr_count: lib.pr_count_by_week(&windowed),
        session_rpe: lib.session_rpe_by_day(&windowed),
    }
}

/// Weekly KPI formulas used by the coach progress screen.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardKpis;

fn by_week(sessions: &[Session]) -> BTreeMap<u32, Vec<&Session>> {
    let mut weeks: BTreeMap<u32, Vec<&Session>> = BTreeMap::new();
    for session in sessions {
        weeks.entry(session.week).or_default().push(session);
    }
    weeks
}

fn week_label(week: u32) -> String {
    format!("S{week}")
}

fn in_plan(set: &ExerciseSet) -> bool {
    let reps = set.reps();
    set.target_reps_min.is_none_or(|min| min == 0 || reps >= min)
        && set.target_reps_max.is_none_or(|max| max == 0 || reps <= max)
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round1(part as f64 / whole as f64 * 100.0)
    }
}

/// `((current / baseline) - 1) * 100`, with the first non-zero value as
/// baseline.
fn relative_to_first(values: impl IntoIterator<Item = (u32, f64)>) -> Vec<KpiPoint> {
    let mut baseline: Option<f64> = None;
    values
        .into_iter()
        .map(|(week, value)| {
            if baseline.is_none() && value > 0.0 {
                baseline = Some(value);
            }
            let change = match baseline {
                Some(base) => (value / base - 1.0) * 100.0,
                None => 0.0,
            };
            KpiPoint {
                label: week_label(week),
                value: round1(change),
            }
        })
        .collect()
}

/// Epley estimate.
fn estimated_one_rep_max(set: &ExerciseSet) -> f64 {
    let reps = set.reps();
    let weight = set.load();
    if reps > 0 && weight > 0.0 {
        weight * (1.0 + reps as f64 / 30.0)
    } else {
        0.0
    }
}

impl KpiLibrary for StandardKpis {
    fn volume_by_week(&self, sessions: &[Session], filter: &SetFilter) -> Vec<KpiPoint> {
        relative_to_first(by_week(sessions).into_iter().map(|(week, members)| {
            let volume: f64 = members
                .iter()
                .flat_map(|s| filter.exercises(s))
                .flat_map(|ex| &ex.sets)
                .map(ExerciseSet::volume)
                .sum();
            (week, volume)
        }))
    }

    fn intensity_by_week(&self, sessions: &[Session], filter: &SetFilter) -> Vec<KpiPoint> {
        relative_to_first(by_week(sessions).into_iter().map(|(week, members)| {
            let (volume, reps) = members
                .iter()
                .flat_map(|s| filter.exercises(s))
                .flat_map(|ex| &ex.sets)
                .fold((0.0, 0u64), |(v, r), set| {
                    (v + set.volume(), r + u64::from(set.reps()))
                });
            let avg_load = if reps > 0 { volume / reps as f64 } else { 0.0 };
            (week, avg_load)
        }))
    }

    fn heavy_sets_by_week(&self, sessions: &[Session], filter: &SetFilter) -> Vec<KpiPoint> {
        let mut best: HashMap<&str, f64> = HashMap::new();
        for session in sessions {
            for ex in filter.exercises(session) {
                let entry = best.entry(ex.exercise_name.as_str()).or_insert(0.0);
                for set in &ex.sets {
                    *entry = entry.max(set.load());
                }
            }
        }
        by_week(sessions)
            .into_iter()
            .map(|(week, members)| {
                let mut heavy = 0;
                let mut total = 0;
                for ex in members.iter().flat_map(|s| filter.exercises(s)) {
                    let threshold =
                        best.get(ex.exercise_name.as_str()).copied().unwrap_or(0.0) * HEAVY_SET_RATIO;
                    for set in ex.sets.iter().filter(|s| s.load() > 0.0) {
                        total += 1;
                        if threshold > 0.0 && set.load() >= threshold {
                            heavy += 1;
                        }
                    }
                }
                let value = if total > 0 {
                    (heavy as f64 / total as f64 * 100.0 + 0.5).floor()
                } else {
                    0.0
                };
                KpiPoint {
                    label: week_label(week),
                    value,
                }
            })
            .collect()
    }

    fn plan_compliance_by_week(&self, sessions: &[Session]) -> Vec<KpiPoint> {
        by_week(sessions)
            .into_iter()
            .map(|(week, members)| {
                let sets: Vec<&ExerciseSet> = members
                    .iter()
                    .flat_map(|s| &s.exercises)
                    .flat_map(|ex| &ex.sets)
                    .collect();
                let in_range = sets.iter().filter(|s| in_plan(s)).count();
                KpiPoint {
                    label: week_label(week),
                    value: percent(in_range, sets.len()),
                }
            })
            .collect()
    }

    fn plan_compliance_total(&self, sessions: &[Session]) -> f64 {
        let sets: Vec<&ExerciseSet> = sessions
            .iter()
            .flat_map(|s| &s.exercises)
            .flat_map(|ex| &ex.sets)
            .collect();
        percent(sets.iter().filter(|s| in_plan(s)).count(), sets.len())
    }

    fn muscle_balance(&self, sessions: &[Session]) -> Vec<MuscleShare> {
        let mut volumes: BTreeMap<&str, f64> = BTreeMap::new();
        let mut total = 0.0;
        for ex in sessions.iter().flat_map(|s| &s.exercises) {
            let volume: f64 = ex.sets.iter().map(ExerciseSet::volume).sum();
            *volumes.entry(ex.muscle_group.as_str()).or_insert(0.0) += volume;
            total += volume;
        }
        let mut shares: Vec<MuscleShare> = volumes
            .into_iter()
            .map(|(muscle, volume)| MuscleShare {
                muscle: muscle.to_owned(),
                volume: volume.round(),
                share: if total > 0.0 {
                    round1(volume / total * 100.0)
                } else {
                    0.0
                },
            })
            .collect();
        shares.sort_by(|a, b| b.share.total_cmp(&a.share));
        shares
    }

    fn pr_count_by_week(&self, sessions: &[Session]) -> Vec<KpiPoint> {
        let mut history: HashMap<&str, f64> = HashMap::new();
        by_week(sessions)
            .into_iter()
            .map(|(week, mut members)| {
                members.sort_by(|a, b| execution_order(a, b));
                let mut count = 0;
                for ex in members.iter().flat_map(|s| &s.exercises) {
                    let best = ex
                        .sets
                        .iter()
                        .map(estimated_one_rep_max)
                        .fold(0.0, f64::max);
                    let previous = history.get(ex.exercise_name.as_str()).copied().unwrap_or(0.0);
                    if best > 0.0 && best > previous * PR_MARGIN {
                        count += 1;
                    }
                    if best > previous {
                        history.insert(ex.exercise_name.as_str(), best);
                    }
                }
                KpiPoint {
                    label: week_label(week),
                    value: count as f64,
                }
            })
            .collect()
    }

    fn session_rpe_by_day(&self, sessions: &[Session]) -> RpeSummary {
        let mut rated: Vec<&Session> = sessions.iter().filter(|s| s.session_rpe.is_some()).collect();
        rated.sort_by(|a, b| execution_order(a, b));
        let data: Vec<RpePoint> = rated
            .iter()
            .filter_map(|s| {
                s.session_rpe.map(|rpe| RpePoint {
                    date: s.date,
                    label: s.date.format("%d/%m").to_string(),
                    rpe,
                })
            })
            .collect();
        if data.is_empty() {
            return RpeSummary::default();
        }
        let sum: u32 = data.iter().map(|p| p.rpe as u32).sum();
        let mut max_streak = 0;
        let mut streak = 0;
        for point in &data {
            if point.rpe >= HARD_SESSION_RPE {
                streak += 1;
                max_streak = max_streak.max(streak);
            } else {
                streak = 0;
            }
        }
        RpeSummary {
            average: round1(sum as f64 / data.len() as f64),
            max_streak,
            total_sessions: data.len(),
            modo_besta_count: data.iter().filter(|p| p.rpe >= BEAST_MODE_RPE).count(),
            data,
        }
    }
}
