use anyhow::{Context, Result, bail};
use chrono::{DateTime, Months, Utc};
use clap::{Args, Parser, Subcommand};
use dirs_next as dirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod analysis;
use analysis::{
    PeriodBucket, PeriodLabeler, SPANISH_MONTHS, TemporalMode, TrendDirection,
    aggregate_by_period_with, overall_trend, table_totals,
};
mod export;
mod feed;
use feed::{CommentFeed, DEFAULT_PAIN_KEYWORDS, FeedConfig, RoutineFeed, build_comment_feed_with};
mod filters;
use filters::{ALL_MUSCLES, Period, SetFilter, filter_options};
mod hierarchy;
use hierarchy::{DayGroup, GroupBy, Hierarchy, SetCell, SetStatus, build_hierarchy};
mod kpi;
use kpi::{KpiPanel, KpiPoint, StandardKpis, kpi_panel};
mod media;
use media::FeedbackIndex;
mod model;
use model::{
    FeedbackInbox, MediaFeedback, RawMediaFeedback, RawSession, Session, WorkoutsResponse,
    normalize_feedback, normalize_sessions,
};
mod normalize;
use normalize::{DEFAULT_STOPWORDS, Normalizer};
mod plotting;
use plotting::{ChartSeries, aggregate_by_day, aggregate_by_programme_week};
mod sync;

/// Persistent user preferences.
///
/// Stored as JSON in the platform config directory. Every field falls back
/// to its default when missing so older files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
struct Settings {
    api_url: String,
    /// Overridden by the `COACH_API_TOKEN` environment variable.
    api_token: Option<String>,
    period: Period,
    temporal_mode: TemporalMode,
    muscle_filter: Option<String>,
    exercise_filter: Option<String>,
    group_by: GroupBy,
    stopwords: Vec<String>,
    pain_keywords: Vec<String>,
    month_names: Vec<String>,
}

impl Settings {
    const FILE: &'static str = "coach_progress_settings.json";

    fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(Self::FILE))
    }

    /// Load settings, falling back to defaults when the file is missing or
    /// unreadable.
    fn load() -> Self {
        if let Some(path) = Self::path() {
            if let Ok(data) = std::fs::read_to_string(&path) {
                match serde_json::from_str(&data) {
                    Ok(cfg) => return cfg,
                    Err(e) => log::warn!("Ignoring invalid settings file {}: {e}", path.display()),
                }
            }
        }
        Self::default()
    }

    fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::other("no config directory"));
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, data)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: sync::DEFAULT_API_URL.to_owned(),
            api_token: None,
            period: Period::default(),
            temporal_mode: TemporalMode::default(),
            muscle_filter: None,
            exercise_filter: None,
            group_by: GroupBy::default(),
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            pain_keywords: DEFAULT_PAIN_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            month_names: SPANISH_MONTHS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "coach-progress",
    version,
    about = "Progress views of an athlete's training log for their coach"
)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,
    #[command(flatten)]
    view: ViewArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// Workouts JSON: `{success, workouts}` or a plain array of sessions.
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,
    /// Feedback JSON: `{feedbacks}` or a plain array.
    #[arg(long, global = true)]
    feedback: Option<PathBuf>,
    /// Fetch the last three months for this client instead of reading files.
    #[arg(long, global = true)]
    client: Option<String>,
    #[arg(long, global = true)]
    api_url: Option<String>,
}

#[derive(Debug, Args)]
struct ViewArgs {
    #[arg(long, global = true, value_enum)]
    period: Option<Period>,
    #[arg(long, global = true, value_enum)]
    mode: Option<TemporalMode>,
    #[arg(long, global = true, value_enum)]
    group_by: Option<GroupBy>,
    /// Muscle group, or TOTAL for all.
    #[arg(long, global = true)]
    muscle: Option<String>,
    #[arg(long, global = true)]
    exercise: Option<String>,
    /// Reference time for the period window (RFC 3339). Defaults to now.
    #[arg(long, global = true)]
    now: Option<DateTime<Utc>>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Period-over-period comparison table.
    Table {
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Volume chart series by programme week.
    Chart {
        /// Group by calendar day instead.
        #[arg(long)]
        daily: bool,
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Routine, day and exercise execution history.
    Hierarchy {
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Athlete comments grouped by routine and week.
    Feed {
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// KPI panel for the selected period.
    Kpi {
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Muscle groups and exercises available for filtering.
    Options,
    /// Mark unviewed comments and media of the current routine as viewed.
    MarkViewed {
        /// Include older routines too.
        #[arg(long)]
        all_routines: bool,
        /// Only list what would be marked.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show or update stored settings.
    Config {
        #[arg(long)]
        token: Option<String>,
        /// Also store the view flags given on this invocation.
        #[arg(long)]
        save: bool,
    },
}

/// Settings with per-invocation flags applied.
#[derive(Debug, Clone, PartialEq)]
struct View {
    period: Period,
    mode: TemporalMode,
    group_by: GroupBy,
    filter: SetFilter,
    now: DateTime<Utc>,
}

impl ViewArgs {
    fn resolve(&self, settings: &Settings) -> View {
        let muscle = self
            .muscle
            .as_deref()
            .or(settings.muscle_filter.as_deref())
            .unwrap_or(ALL_MUSCLES);
        let exercise = self
            .exercise
            .as_deref()
            .or(settings.exercise_filter.as_deref())
            .unwrap_or("");
        View {
            period: self.period.unwrap_or(settings.period),
            mode: self.mode.unwrap_or(settings.temporal_mode),
            group_by: self.group_by.unwrap_or(settings.group_by),
            filter: SetFilter::from_selection(muscle, exercise),
            now: self.now.unwrap_or_else(Utc::now),
        }
    }

    fn store(&self, settings: &mut Settings) {
        if let Some(period) = self.period {
            settings.period = period;
        }
        if let Some(mode) = self.mode {
            settings.temporal_mode = mode;
        }
        if let Some(group_by) = self.group_by {
            settings.group_by = group_by;
        }
        if let Some(muscle) = &self.muscle {
            settings.muscle_filter = Some(muscle.clone()).filter(|m| m != ALL_MUSCLES && !m.is_empty());
        }
        if let Some(exercise) = &self.exercise {
            settings.exercise_filter = Some(exercise.clone()).filter(|e| !e.is_empty());
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WorkoutsFile {
    Response(WorkoutsResponse),
    Sessions(Vec<RawSession>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeedbackFile {
    Inbox(FeedbackInbox),
    Records(Vec<RawMediaFeedback>),
}

fn read_workouts(path: &Path) -> Result<Vec<Session>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let file: WorkoutsFile = serde_json::from_str(&data)
        .with_context(|| format!("parsing snapshot {}", path.display()))?;
    Ok(match file {
        WorkoutsFile::Response(r) if !r.success => {
            log::warn!("Snapshot {} is marked unsuccessful; treating it as empty", path.display());
            Vec::new()
        }
        WorkoutsFile::Response(r) => normalize_sessions(r.workouts),
        WorkoutsFile::Sessions(raw) => normalize_sessions(raw),
    })
}

fn read_feedback(path: &Path) -> Result<Vec<MediaFeedback>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading feedback {}", path.display()))?;
    let file: FeedbackFile = serde_json::from_str(&data)
        .with_context(|| format!("parsing feedback {}", path.display()))?;
    Ok(match file {
        FeedbackFile::Inbox(inbox) => normalize_feedback(inbox.feedbacks),
        FeedbackFile::Records(raw) => normalize_feedback(raw),
    })
}

struct Api {
    base_url: String,
    token: String,
}

impl Api {
    fn connect(source: &SourceArgs, settings: &Settings) -> Result<Self> {
        let token = sync::resolve_api_token(settings.api_token.as_deref()).with_context(|| {
            format!("no API token; set {} or run `config --token`", sync::TOKEN_ENV)
        })?;
        let base_url = source.api_url.clone().unwrap_or_else(|| settings.api_url.clone());
        Ok(Api { base_url, token })
    }
}

struct Snapshot {
    sessions: Vec<Session>,
    feedback: Vec<MediaFeedback>,
}

fn load_snapshot(source: &SourceArgs, settings: &Settings, now: DateTime<Utc>) -> Result<Snapshot> {
    if let Some(client) = &source.client {
        let api = Api::connect(source, settings)?;
        let since = now.checked_sub_months(Months::new(3)).unwrap_or(now);
        let sessions = sync::fetch_workouts(&api.base_url, &api.token, client, since)
            .with_context(|| format!("fetching workouts for {client}"))?;
        // Missing media only hides links, so the views still render.
        let feedback = sync::fetch_feedback(&api.base_url, &api.token, client).unwrap_or_else(|e| {
            log::warn!("Feedback unavailable: {e}");
            Vec::new()
        });
        return Ok(Snapshot { sessions, feedback });
    }
    let Some(path) = &source.snapshot else {
        bail!("no data source: pass --snapshot FILE or --client ID");
    };
    let sessions = read_workouts(path)?;
    let feedback = match &source.feedback {
        Some(path) => read_feedback(path)?,
        None => Vec::new(),
    };
    log::info!(
        "Loaded {} sessions and {} feedback records",
        sessions.len(),
        feedback.len()
    );
    Ok(Snapshot { sessions, feedback })
}

fn comment_feed(snapshot: &Snapshot, settings: &Settings) -> CommentFeed {
    let index = FeedbackIndex::with_normalizer(&snapshot.feedback, Normalizer::new(&settings.stopwords));
    build_comment_feed_with(
        &snapshot.sessions,
        &index,
        &FeedConfig::new(&settings.pain_keywords),
    )
}

fn print_table(buckets: &[PeriodBucket]) {
    if buckets.is_empty() {
        println!("No data for this selection.");
        return;
    }
    println!(
        "{:<22} {:>10} {:>6} {:>8} {:>9} {:>7}",
        "Period", "Volume", "Reps", "Sessions", "Avg load", "Δ vol"
    );
    for b in buckets {
        let delta = b
            .delta
            .map(|d| format!("{:+}%", d.volume_pct))
            .unwrap_or_default();
        println!(
            "{:<22} {:>10.0} {:>6} {:>8} {:>9.1} {:>7}",
            b.period, b.volume, b.reps, b.sessions, b.avg_load, delta
        );
    }
    let totals = table_totals(buckets);
    let trend = overall_trend(buckets);
    println!(
        "{:<22} {:>10.0} {:>6} {:>8}",
        "Total", totals.volume, totals.reps, totals.sessions
    );
    println!("Trend: {trend:+}% ({:?})", TrendDirection::of(trend));
}

fn print_series(series: &ChartSeries) {
    for (label, value) in series.labels.iter().zip(&series.values).take(series.real_len()) {
        println!("{label:>8} {value:>10.0}");
    }
}

fn format_set(cell: &SetCell) -> String {
    let reps = cell.actual_reps.map_or_else(|| "-".to_owned(), |r| r.to_string());
    let weight = cell.weight.map_or_else(|| "-".to_owned(), |w| w.to_string());
    let status = match cell.status {
        SetStatus::InRange => "",
        SetStatus::Below => "<",
        SetStatus::Above => ">",
        SetStatus::NotLogged => "?",
    };
    let up = if cell.rep_trend.is_some() || cell.weight_trend.is_some() {
        "↑"
    } else {
        ""
    };
    let note = if cell.note.is_some() { "*" } else { "" };
    format!("{reps}x{weight}{status}{up}{note}")
}

fn print_days(days: &[DayGroup], indent: &str) {
    for day in days {
        println!("{indent}{} ({} executions)", day.day_label, day.executions.len());
        for exercise in &day.exercises {
            println!("{indent}  {} [{}]", exercise.exercise_name, exercise.muscle_group);
            for row in &exercise.rows {
                let sets: Vec<String> = row.sets.iter().map(format_set).collect();
                println!(
                    "{indent}    #{} {} S{}: {}",
                    row.execution_index,
                    row.date.format("%Y-%m-%d"),
                    row.week,
                    sets.join("  ")
                );
            }
        }
    }
}

fn print_hierarchy(hierarchy: &Hierarchy) {
    match hierarchy {
        Hierarchy::ByDay(days) => print_days(days, ""),
        Hierarchy::ByRoutine(routines) => {
            if let Some(current) = &routines.current {
                println!("Current routine: {}", current.routine_name);
                print_days(&current.days, "  ");
            }
            for old in &routines.old {
                println!(
                    "Previous routine: {} (last {})",
                    old.routine_name,
                    old.latest_date.format("%Y-%m-%d")
                );
                print_days(&old.days, "  ");
            }
        }
    }
}

fn print_routine_feed(routine: &RoutineFeed) {
    println!(
        "{} ({} comments, {} unviewed)",
        routine.routine_name, routine.total_comments, routine.unviewed_count
    );
    for week in &routine.weeks {
        println!("  Semana {}", week.week);
        for day in &week.days {
            let rpe = day
                .session_rpe
                .map(|r| format!(" · RPE {r}"))
                .unwrap_or_default();
            println!("    {} · {}{rpe}", day.day_label, day.date.format("%Y-%m-%d"));
            if let Some(note) = &day.session_note {
                println!("      \"{note}\"");
            }
            for c in &day.comments {
                let text = c.note.as_deref().unwrap_or("");
                let pain = if c.has_pain { " [pain]" } else { "" };
                let new = if c.viewed_by_coach { "" } else { " [new]" };
                let media: Vec<String> = c
                    .media
                    .iter()
                    .map(|m| format!("{:?}", m.media_type).to_lowercase())
                    .collect();
                let media = if media.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", media.join(", "))
                };
                println!(
                    "      {} set {} [{}] {text}{pain}{media}{new}",
                    c.exercise_name, c.set_number, c.note_value
                );
            }
        }
    }
}

fn print_points(name: &str, points: &[KpiPoint]) {
    let values: Vec<String> = points
        .iter()
        .map(|p| format!("{} {}", p.label, p.value))
        .collect();
    println!("{name:<12} {}", values.join(" | "));
}

fn print_kpis(panel: &KpiPanel) {
    println!("Sessions in window: {}", panel.session_count);
    print_points("Volume %", &panel.volume);
    print_points("Intensity %", &panel.intensity);
    print_points("Heavy sets %", &panel.heavy_sets);
    print_points("Compliance %", &panel.compliance);
    println!("{:<12} {}", "Compliance", panel.compliance_total);
    print_points("PRs", &panel.pr_count);
    for share in &panel.muscle_balance {
        println!("{:<12} {} {}%", "Balance", share.muscle, share.share);
    }
    let rpe = &panel.session_rpe;
    println!(
        "Session RPE  avg {} over {} sessions, longest hard streak {}, modo bestia {}",
        rpe.average, rpe.total_sessions, rpe.max_streak, rpe.modo_besta_count
    );
}

fn mark_viewed(api: &Api, feed: &CommentFeed, all_routines: bool, dry_run: bool) {
    let routines = feed
        .current
        .iter()
        .chain(feed.old.iter().filter(|_| all_routines));
    let mut feedback_ids = Vec::new();
    let mut session_ids = Vec::new();
    for routine in routines {
        feedback_ids.extend(routine.unviewed_feedback_ids());
        session_ids.extend(routine.unviewed_note_session_ids());
    }
    feedback_ids.sort();
    feedback_ids.dedup();
    session_ids.sort();
    session_ids.dedup();
    log::info!(
        "Marking {} media and notes of {} sessions viewed",
        feedback_ids.len(),
        session_ids.len()
    );
    for id in &feedback_ids {
        if dry_run {
            println!("media {id}");
        } else if let Err(e) = sync::mark_feedback_viewed(&api.base_url, &api.token, id) {
            log::warn!("Could not mark feedback {id} viewed: {e}");
        }
    }
    for id in &session_ids {
        if dry_run {
            println!("session {id}");
        } else if let Err(e) = sync::mark_session_notes_viewed(&api.base_url, &api.token, id) {
            log::warn!("Could not mark notes of session {id} viewed: {e}");
        }
    }
}

fn configure(cli: &Cli, settings: &mut Settings, token: Option<&str>, save: bool) -> Result<()> {
    if let Some(token) = token {
        settings.api_token = Some(token.to_owned()).filter(|t| !t.is_empty());
    }
    if let Some(url) = &cli.source.api_url {
        settings.api_url = url.clone();
    }
    if save {
        cli.view.store(settings);
    }
    if token.is_some() || cli.source.api_url.is_some() || save {
        settings.save().context("saving settings")?;
    }
    let mut shown = settings.clone();
    shown.api_token = shown.api_token.map(|_| "********".to_owned());
    println!("{}", serde_json::to_string_pretty(&shown)?);
    if let Some(path) = Settings::path() {
        println!("({})", path.display());
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load();
    if let Command::Config { token, save } = &cli.command {
        return configure(&cli, &mut settings, token.as_deref(), *save);
    }

    let view = cli.view.resolve(&settings);
    let snapshot = load_snapshot(&cli.source, &settings, view.now)?;

    match &cli.command {
        Command::Table { csv, json } => {
            let labeler = PeriodLabeler::new(&settings.month_names);
            let buckets =
                aggregate_by_period_with(&snapshot.sessions, view.mode, &view.filter, &labeler);
            print_table(&buckets);
            if let Some(path) = csv {
                export::save_buckets_csv(path, &buckets)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            if let Some(path) = json {
                let totals = table_totals(&buckets);
                export::save_buckets_json(path, &buckets, &totals, overall_trend(&buckets))
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
        Command::Chart { daily, csv, json } => {
            let series = if *daily {
                aggregate_by_day(&snapshot.sessions, &view.filter)
            } else {
                aggregate_by_programme_week(&snapshot.sessions, &view.filter)
            };
            let Some(series) = series else {
                println!("No volume to chart for this selection.");
                return Ok(());
            };
            print_series(&series);
            if let Some(path) = csv {
                export::save_series_csv(path, &series)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            if let Some(path) = json {
                export::save_series_json(path, &series)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
        Command::Hierarchy { json } => {
            let hierarchy = build_hierarchy(&snapshot.sessions, view.group_by, &view.filter);
            print_hierarchy(&hierarchy);
            if let Some(path) = json {
                export::save_hierarchy_json(path, &hierarchy)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
        Command::Feed { json } => {
            let feed = comment_feed(&snapshot, &settings);
            match &feed.current {
                Some(current) => print_routine_feed(current),
                None => println!("No sessions."),
            }
            for old in &feed.old {
                print_routine_feed(old);
            }
            println!("{} comments in total", feed.total_comments());
            if let Some(path) = json {
                export::save_feed_json(path, &feed)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
        Command::Kpi { json } => {
            let panel = kpi_panel(&StandardKpis, &snapshot.sessions, view.period, &view.filter, view.now);
            print_kpis(&panel);
            if let Some(path) = json {
                export::save_kpis_json(path, &panel)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
        Command::Options => {
            let options = filter_options(&snapshot.sessions);
            for muscle in &options.muscles {
                println!("{muscle}");
                for exercise in options.exercises_for(muscle) {
                    println!("  {exercise}");
                }
            }
        }
        Command::MarkViewed {
            all_routines,
            dry_run,
        } => {
            let api = Api::connect(&cli.source, &settings)?;
            let feed = comment_feed(&snapshot, &settings);
            mark_viewed(&api, &feed, *all_routines, *dry_run);
        }
        Command::Config { .. } => {}
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    run(Cli::parse())
}
