//! Rolling period window and muscle/exercise filters.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Exercise, Session};

/// Sentinel muscle filter meaning "every muscle group".
pub const ALL_MUSCLES: &str = "TOTAL";

/// Rolling time window applied before KPI computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum Period {
    #[serde(rename = "7d")]
    #[value(name = "7d")]
    Days7,
    #[serde(rename = "30d")]
    #[value(name = "30d")]
    Days30,
    #[default]
    #[serde(rename = "90d")]
    #[value(name = "90d")]
    Days90,
    #[serde(rename = "all")]
    #[value(name = "all")]
    All,
}

impl Period {
    pub fn days(self) -> Option<i64> {
        match self {
            Period::Days7 => Some(7),
            Period::Days30 => Some(30),
            Period::Days90 => Some(90),
            Period::All => None,
        }
    }
}

/// Keep the sessions dated at or after `now - N days`.
///
/// [`Period::All`] returns every session unchanged.
pub fn filter_by_period(sessions: &[Session], period: Period, now: DateTime<Utc>) -> Vec<Session> {
    match period.days() {
        None => sessions.to_vec(),
        Some(days) => {
            let cutoff = now - Duration::days(days);
            sessions
                .iter()
                .filter(|s| s.date >= cutoff)
                .cloned()
                .collect()
        }
    }
}

/// Narrows sets to one muscle group and/or one exact exercise name.
///
/// `None` on either side means no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetFilter {
    pub muscle: Option<String>,
    pub exercise: Option<String>,
}

impl SetFilter {
    /// Build a filter from picker values, where `"TOTAL"` selects every
    /// muscle and an empty exercise selects every exercise.
    pub fn from_selection(muscle: &str, exercise: &str) -> Self {
        let muscle = Some(muscle.trim())
            .filter(|m| !m.is_empty() && *m != ALL_MUSCLES)
            .map(str::to_owned);
        let exercise = Some(exercise.trim())
            .filter(|e| !e.is_empty())
            .map(str::to_owned);
        SetFilter { muscle, exercise }
    }

    pub fn is_all_muscles(&self) -> bool {
        self.muscle.is_none()
    }

    pub fn matches(&self, exercise: &Exercise) -> bool {
        self.matches_parts(&exercise.muscle_group, &exercise.exercise_name)
    }

    pub fn matches_parts(&self, muscle_group: &str, exercise_name: &str) -> bool {
        self.muscle.as_deref().is_none_or(|m| m == muscle_group)
            && self.exercise.as_deref().is_none_or(|e| e == exercise_name)
    }

    /// Exercises of `session` that pass the filter, in session order.
    pub fn exercises<'a>(&'a self, session: &'a Session) -> impl Iterator<Item = &'a Exercise> {
        session.exercises.iter().filter(move |ex| self.matches(ex))
    }
}

/// Values a picker can offer for [`SetFilter`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    /// `"TOTAL"` followed by the sorted distinct muscle groups.
    pub muscles: Vec<String>,
    /// Sorted distinct exercise names per muscle group.
    pub exercises_by_muscle: BTreeMap<String, Vec<String>>,
}

impl FilterOptions {
    pub fn exercises_for(&self, muscle: &str) -> &[String] {
        if muscle == ALL_MUSCLES {
            return &[];
        }
        self.exercises_by_muscle
            .get(muscle)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Collect the muscle groups and exercise names present in `sessions`.
pub fn filter_options(sessions: &[Session]) -> FilterOptions {
    let mut by_muscle: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for ex in sessions.iter().flat_map(|s| &s.exercises) {
        let name = if ex.exercise_name.is_empty() {
            "Sin nombre".to_owned()
        } else {
            ex.exercise_name.clone()
        };
        by_muscle
            .entry(ex.muscle_group.clone())
            .or_default()
            .insert(name);
    }
    let mut muscles = vec![ALL_MUSCLES.to_owned()];
    muscles.extend(by_muscle.keys().cloned());
    FilterOptions {
        muscles,
        exercises_by_muscle: by_muscle
            .into_iter()
            .map(|(m, names)| (m, names.into_iter().collect()))
            .collect(),
    }
}
