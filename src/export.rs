use crate::{
    analysis::{PeriodBucket, TableTotals},
    feed::CommentFeed,
    hierarchy::Hierarchy,
    kpi::KpiPanel,
    plotting::ChartSeries,
};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

pub fn write_json<T: Serialize + ?Sized, P: AsRef<Path>>(
    value: &T,
    path: P,
) -> std::io::Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, value).map_err(std::io::Error::other)
}

pub fn write_csv<T: Serialize>(writer: impl Write, records: &[T]) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for r in records {
        wtr.serialize(r)?;
    }
    wtr.flush().map_err(Into::into)
}

/// One table row per bucket; deltas are blank for the oldest bucket.
#[derive(Serialize)]
struct BucketRow<'a> {
    period: &'a str,
    volume: f64,
    reps: u64,
    sessions: u32,
    avg_load: f64,
    latest_date: String,
    volume_pct: Option<i64>,
    reps_pct: Option<i64>,
    avg_load_pct: Option<i64>,
    sessions_diff: Option<i64>,
}

impl<'a> From<&'a PeriodBucket> for BucketRow<'a> {
    fn from(b: &'a PeriodBucket) -> Self {
        BucketRow {
            period: &b.period,
            volume: b.volume,
            reps: b.reps,
            sessions: b.sessions,
            avg_load: b.avg_load,
            latest_date: b.latest_date.format("%Y-%m-%d").to_string(),
            volume_pct: b.delta.map(|d| d.volume_pct),
            reps_pct: b.delta.map(|d| d.reps_pct),
            avg_load_pct: b.delta.map(|d| d.avg_load_pct),
            sessions_diff: b.delta.map(|d| d.sessions),
        }
    }
}

pub fn write_buckets_csv(writer: impl Write, buckets: &[PeriodBucket]) -> csv::Result<()> {
    let rows: Vec<BucketRow> = buckets.iter().map(BucketRow::from).collect();
    write_csv(writer, &rows)
}

pub fn save_buckets_csv<P: AsRef<Path>>(path: P, buckets: &[PeriodBucket]) -> csv::Result<()> {
    write_buckets_csv(std::fs::File::create(path)?, buckets)
}

#[derive(Serialize)]
pub struct TableExport<'a> {
    pub buckets: &'a [PeriodBucket],
    pub totals: &'a TableTotals,
    pub trend: i64,
}

pub fn save_buckets_json<P: AsRef<Path>>(
    path: P,
    buckets: &[PeriodBucket],
    totals: &TableTotals,
    trend: i64,
) -> std::io::Result<()> {
    let export = TableExport {
        buckets,
        totals,
        trend,
    };
    write_json(&export, path)
}

pub fn save_series_csv<P: AsRef<Path>>(path: P, series: &ChartSeries) -> csv::Result<()> {
    #[derive(Serialize)]
    struct Row<'a> {
        label: &'a str,
        value: f64,
    }
    let rows: Vec<Row> = series
        .labels
        .iter()
        .zip(&series.values)
        .take(series.real_len())
        .map(|(label, value)| Row {
            label,
            value: *value,
        })
        .collect();
    write_csv(std::fs::File::create(path)?, &rows)
}

pub fn save_series_json<P: AsRef<Path>>(path: P, series: &ChartSeries) -> std::io::Result<()> {
    write_json(series, path)
}

pub fn save_hierarchy_json<P: AsRef<Path>>(path: P, hierarchy: &Hierarchy) -> std::io::Result<()> {
    write_json(hierarchy, path)
}

pub fn save_feed_json<P: AsRef<Path>>(path: P, feed: &CommentFeed) -> std::io::Result<()> {
    write_json(feed, path)
}

pub fn save_kpis_json<P: AsRef<Path>>(path: P, panel: &KpiPanel) -> std::io::Result<()> {
    write_json(panel, path)
}
