//! Programme-week and per-day chart series of training volume.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analysis::SPANISH_MONTHS;
use crate::filters::SetFilter;
use crate::model::Session;

/// Labels and values ready for a line chart, oldest point first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    /// Set when a single real point was duplicated into a flat two-point
    /// segment. Line renderers need at least two points; the copy carries no
    /// extra data and consumers computing statistics must ignore it.
    pub duplicated_single_point: bool,
}

impl ChartSeries {
    /// Build a series, returning `None` for no points or all-zero values.
    fn from_points(points: Vec<(String, f64)>) -> Option<Self> {
        if points.is_empty() || points.iter().all(|(_, v)| *v == 0.0) {
            return None;
        }
        let (mut labels, mut values): (Vec<String>, Vec<f64>) = points.into_iter().unzip();
        let duplicated_single_point = labels.len() == 1;
        if duplicated_single_point {
            labels.push(labels[0].clone());
            values.push(values[0]);
        }
        Some(ChartSeries {
            labels,
            values,
            duplicated_single_point,
        })
    }

    /// Number of real data points, ignoring the duplicated copy.
    pub fn real_len(&self) -> usize {
        if self.duplicated_single_point {
            1
        } else {
            self.values.len()
        }
    }
}

/// Volume of one programme week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgrammeWeekPoint {
    pub week: u32,
    pub label: String,
    pub volume: f64,
    /// Latest session date in the week; informational, never used to order.
    pub latest_date: DateTime<Utc>,
}

fn filtered_volume(session: &Session, filter: &SetFilter) -> f64 {
    filter
        .exercises(session)
        .flat_map(|ex| &ex.sets)
        .map(|s| s.volume())
        .sum()
}

/// Per programme week volume, ordered by week ascending.
pub fn programme_week_points(sessions: &[Session], filter: &SetFilter) -> Vec<ProgrammeWeekPoint> {
    let mut weeks: BTreeMap<u32, (f64, DateTime<Utc>)> = BTreeMap::new();
    for session in sessions {
        let entry = weeks.entry(session.week).or_insert((0.0, session.date));
        entry.0 += filtered_volume(session, filter);
        if session.date > entry.1 {
            entry.1 = session.date;
        }
    }
    weeks
        .into_iter()
        .map(|(week, (volume, latest_date))| ProgrammeWeekPoint {
            week,
            label: format!("S{week}"),
            volume,
            latest_date,
        })
        .collect()
}

/// Volume per programme week as a chart series.
///
/// Groups by the session's programme week rather than the calendar week and
/// orders left to right by week. Returns `None` when nothing remains or all
/// volumes are zero. A single week is duplicated into a flat two-point
/// series, flagged by [`ChartSeries::duplicated_single_point`].
pub fn aggregate_by_programme_week(sessions: &[Session], filter: &SetFilter) -> Option<ChartSeries> {
    let points = programme_week_points(sessions, filter);
    log::debug!("Programme week chart with {} weeks", points.len());
    ChartSeries::from_points(points.into_iter().map(|p| (p.label, p.volume)).collect())
}

/// Short `dd mmm` label of a calendar day.
fn day_label(date: NaiveDate) -> String {
    let month = SPANISH_MONTHS[date.month0() as usize];
    let short: String = month.chars().take(3).collect();
    format!("{:02} {short}", date.day())
}

/// Volume per calendar day as a chart series, oldest day first.
///
/// Follows the same empty-state and single-point rules as
/// [`aggregate_by_programme_week`].
pub fn aggregate_by_day(sessions: &[Session], filter: &SetFilter) -> Option<ChartSeries> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for session in sessions {
        *days.entry(session.date.date_naive()).or_insert(0.0) += filtered_volume(session, filter);
    }
    ChartSeries::from_points(days.into_iter().map(|(d, v)| (day_label(d), v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawExercise, RawSession, RawSet};
    use chrono::TimeZone;

    fn session(week: u32, day: u32, muscle: &str, reps: u32, weight: f64) -> Session {
        Session::from(RawSession {
            date: Some(Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()),
            week: Some(week),
            exercises: Some(vec![RawExercise {
                exercise_name: Some("Sentadilla".into()),
                muscle_group: Some(muscle.into()),
                sets: Some(vec![RawSet {
                    actual_reps: Some(reps),
                    weight: Some(weight),
                    ..RawSet::default()
                }]),
            }]),
            ..RawSession::default()
        })
    }

    #[test]
    fn test_single_week_is_duplicated() {
        let sessions = vec![session(3, 4, "PIERNA", 5, 150.0)];
        let series = aggregate_by_programme_week(&sessions, &SetFilter::default()).unwrap();
        assert_eq!(series.labels, vec!["S3", "S3"]);
        assert_eq!(series.values, vec![750.0, 750.0]);
        assert!(series.duplicated_single_point);
        assert_eq!(series.real_len(), 1);
    }

    #[test]
    fn test_weeks_ascending_regardless_of_dates() {
        let sessions = vec![
            session(2, 20, "PIERNA", 5, 100.0),
            session(1, 25, "PIERNA", 5, 80.0),
            session(2, 10, "PIERNA", 5, 100.0),
        ];
        let series = aggregate_by_programme_week(&sessions, &SetFilter::default()).unwrap();
        assert_eq!(series.labels, vec!["S1", "S2"]);
        assert_eq!(series.values, vec![400.0, 1000.0]);
        assert!(!series.duplicated_single_point);

        let points = programme_week_points(&sessions, &SetFilter::default());
        assert_eq!(points[1].latest_date, Utc.with_ymd_and_hms(2024, 3, 20, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_all_zero_volume_is_none() {
        let sessions = vec![session(1, 4, "PIERNA", 5, 100.0)];
        let filter = SetFilter::from_selection("PECHO", "");
        assert!(aggregate_by_programme_week(&sessions, &filter).is_none());
        assert!(aggregate_by_programme_week(&[], &SetFilter::default()).is_none());
    }

    #[test]
    fn test_zero_weeks_stay_in_series() {
        let sessions = vec![
            session(1, 4, "PIERNA", 5, 100.0),
            session(2, 11, "PECHO", 5, 100.0),
            session(3, 18, "PIERNA", 5, 120.0),
        ];
        let filter = SetFilter::from_selection("PIERNA", "");
        let series = aggregate_by_programme_week(&sessions, &filter).unwrap();
        assert_eq!(series.labels, vec!["S1", "S2", "S3"]);
        assert_eq!(series.values, vec![500.0, 0.0, 600.0]);
    }

    #[test]
    fn test_daily_series() {
        let sessions = vec![
            session(1, 11, "PIERNA", 5, 100.0),
            session(1, 4, "PIERNA", 2, 100.0),
            session(1, 4, "PIERNA", 3, 100.0),
        ];
        let series = aggregate_by_day(&sessions, &SetFilter::default()).unwrap();
        assert_eq!(series.labels, vec!["04 mar", "11 mar"]);
        assert_eq!(series.values, vec![500.0, 500.0]);
    }
}
