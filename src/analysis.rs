//! Calendar roll-ups of workout sessions.
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::filters::SetFilter;
use crate::model::Session;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Spanish month names used for monthly bucket labels.
pub const SPANISH_MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// Label of the single bucket produced by [`TemporalMode::Total`].
pub const TOTAL_LABEL: &str = "Total acumulado";

/// How sessions are bucketed on the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TemporalMode {
    /// Week of the year.
    #[default]
    Semanas,
    /// Calendar month.
    Meses,
    /// One bucket for everything.
    Total,
}

/// Period-over-period change against the next older bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDelta {
    pub volume_pct: i64,
    pub reps_pct: i64,
    pub avg_load_pct: i64,
    /// Raw difference in session count, not a percentage.
    pub sessions: i64,
}

/// Aggregated totals for one calendar bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodBucket {
    pub period: String,
    pub volume: f64,
    pub reps: u64,
    /// Sum of set weights.
    pub total_load: f64,
    pub sessions: u32,
    /// Most recent session date in the bucket.
    pub latest_date: DateTime<Utc>,
    /// `volume / reps` rounded to one decimal, 0 without reps.
    pub avg_load: f64,
    /// `None` for the oldest bucket.
    pub delta: Option<BucketDelta>,
}

/// Produces bucket labels; month names are configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodLabeler {
    month_names: Vec<String>,
}

impl Default for PeriodLabeler {
    fn default() -> Self {
        Self::new(&SPANISH_MONTHS)
    }
}

impl PeriodLabeler {
    /// Use `month_names` (January first). Missing entries fall back to the
    /// month number.
    pub fn new<S: AsRef<str>>(month_names: &[S]) -> Self {
        PeriodLabeler {
            month_names: month_names.iter().map(|m| m.as_ref().to_owned()).collect(),
        }
    }

    pub fn label(&self, date: DateTime<Utc>, mode: TemporalMode) -> String {
        match mode {
            TemporalMode::Total => TOTAL_LABEL.to_owned(),
            TemporalMode::Semanas => format!("Semana {}", week_of_year(date)),
            TemporalMode::Meses => {
                let idx = date.month0() as usize;
                let month = self
                    .month_names
                    .get(idx)
                    .map(|m| capitalize(m))
                    .unwrap_or_else(|| format!("{:02}", idx + 1));
                format!("{month} de {}", date.year())
            }
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Week of the year counted from January 1st, where the first partial week
/// is week 1 and weeks start on Sunday.
///
/// `ceil(((date - startOfYear) / day + startOfYear.weekday + 1) / 7)` with
/// Sunday as weekday 0.
pub fn week_of_year(date: DateTime<Utc>) -> u32 {
    let naive = date.naive_utc();
    let Some(start) = NaiveDate::from_ymd_opt(naive.year(), 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return 1;
    };
    let elapsed_days = (naive - start).num_milliseconds() as f64 / MS_PER_DAY;
    let offset = start.weekday().num_days_from_sunday() as f64;
    ((elapsed_days + offset + 1.0) / 7.0).ceil() as u32
}

/// Round half up, the way the dashboard percentages are displayed.
fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    round_half_up(value * 10.0) / 10.0
}

/// Percentage change from `previous` to `actual`.
///
/// A zero `previous` yields 100 when `actual` is positive, otherwise 0.
pub fn pct_change(actual: f64, previous: f64) -> i64 {
    if previous == 0.0 {
        return if actual > 0.0 { 100 } else { 0 };
    }
    round_half_up((actual - previous) / previous * 100.0) as i64
}

#[derive(Debug)]
struct Accumulator {
    volume: f64,
    reps: u64,
    total_load: f64,
    sessions: u32,
    latest_date: DateTime<Utc>,
}

/// Bucket sessions by calendar period.
///
/// Every session counts once towards its bucket even when the filter leaves
/// none of its sets. Buckets with zero volume are dropped only when a muscle
/// filter is active. The result is ordered most recent first and each bucket
/// carries its change against the next (older) one.
pub fn aggregate_by_period_with(
    sessions: &[Session],
    mode: TemporalMode,
    filter: &SetFilter,
    labeler: &PeriodLabeler,
) -> Vec<PeriodBucket> {
    log::debug!(
        "Aggregating {} sessions by {:?} with filter {:?}",
        sessions.len(),
        mode,
        filter
    );

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Accumulator> = HashMap::new();

    for session in sessions {
        let key = labeler.label(session.date, mode);
        let acc = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Accumulator {
                volume: 0.0,
                reps: 0,
                total_load: 0.0,
                sessions: 0,
                latest_date: session.date,
            }
        });

        for set in filter.exercises(session).flat_map(|ex| &ex.sets) {
            acc.reps += u64::from(set.reps());
            acc.volume += set.volume();
            acc.total_load += set.load();
        }
        acc.sessions += 1;
        if session.date > acc.latest_date {
            acc.latest_date = session.date;
        }
    }

    let mut buckets: Vec<PeriodBucket> = order
        .into_iter()
        .filter_map(|key| groups.remove(&key).map(|acc| (key, acc)))
        .filter(|(_, acc)| acc.volume > 0.0 || filter.is_all_muscles())
        .map(|(period, acc)| PeriodBucket {
            period,
            avg_load: if acc.reps > 0 {
                round1(acc.volume / acc.reps as f64)
            } else {
                0.0
            },
            volume: acc.volume,
            reps: acc.reps,
            total_load: acc.total_load,
            sessions: acc.sessions,
            latest_date: acc.latest_date,
            delta: None,
        })
        .collect();

    buckets.sort_by(|a, b| b.latest_date.cmp(&a.latest_date));

    for i in 0..buckets.len().saturating_sub(1) {
        let prev = &buckets[i + 1];
        let delta = BucketDelta {
            volume_pct: pct_change(buckets[i].volume, prev.volume),
            reps_pct: pct_change(buckets[i].reps as f64, prev.reps as f64),
            avg_load_pct: pct_change(buckets[i].avg_load, prev.avg_load),
            sessions: buckets[i].sessions as i64 - prev.sessions as i64,
        };
        buckets[i].delta = Some(delta);
    }

    log::debug!("Produced {} buckets", buckets.len());
    buckets
}

/// Column totals of the comparison table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TableTotals {
    pub volume: f64,
    pub reps: u64,
    pub sessions: u32,
}

pub fn table_totals(buckets: &[PeriodBucket]) -> TableTotals {
    buckets.iter().fold(TableTotals::default(), |acc, b| TableTotals {
        volume: acc.volume + b.volume,
        reps: acc.reps.saturating_add(b.reps),
        sessions: acc.sessions.saturating_add(b.sessions),
    })
}

/// Direction of a percentage change, for badge colouring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

impl TrendDirection {
    pub fn of(change: i64) -> Self {
        match change {
            c if c > 0 => TrendDirection::Up,
            c if c < 0 => TrendDirection::Down,
            _ => TrendDirection::Flat,
        }
    }
}

/// Volume change of the latest bucket against the one before it.
///
/// Returns 0 with fewer than two buckets.
pub fn overall_trend(buckets: &[PeriodBucket]) -> i64 {
    match buckets {
        [latest, previous, ..] => pct_change(latest.volume, previous.volume),
        _ => 0,
    }
}
