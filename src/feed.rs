//! Reverse-chronological feed of athlete comments, grouped by routine and
//! programme week.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::media::FeedbackIndex;
use crate::model::{MediaFeedback, Session, execution_order, newest_first};

/// Words that flag a note as reporting pain or discomfort.
pub const DEFAULT_PAIN_KEYWORDS: [&str; 10] = [
    "dolor", "molestia", "pinchazo", "lesión", "daño", "mal", "pincha", "duele", "molesta",
    "lesion",
];

/// Note value shown for sets that only carry media.
pub const MEDIA_NOTE_VALUE: &str = "media";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pain_keywords: Vec<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::new(&DEFAULT_PAIN_KEYWORDS)
    }
}

impl FeedConfig {
    pub fn new<S: AsRef<str>>(pain_keywords: &[S]) -> Self {
        FeedConfig {
            pain_keywords: pain_keywords
                .iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Case-insensitive substring search for any pain keyword.
    pub fn has_pain(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.pain_keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

/// A set the athlete annotated with text and/or media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetComment {
    pub exercise_name: String,
    pub exercise_index: usize,
    pub set_number: u32,
    /// Value of the text note, or `"media"` when only media exists.
    pub note_value: String,
    pub note: Option<String>,
    pub has_pain: bool,
    pub has_media_only: bool,
    /// Text note and every linked media item were seen by the coach.
    pub viewed_by_coach: bool,
    /// Linked media, newest first.
    pub media: Vec<MediaFeedback>,
    pub audio: Option<MediaFeedback>,
    pub visual: Option<MediaFeedback>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayFeed {
    pub session_id: String,
    pub date: DateTime<Utc>,
    pub day_index: u32,
    pub day_label: String,
    pub session_rpe: Option<u8>,
    pub session_note: Option<String>,
    pub comments: Vec<SetComment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekFeed {
    pub week: u32,
    /// Newest first.
    pub days: Vec<DayFeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineFeed {
    pub routine_key: String,
    pub routine_name: String,
    pub latest_date: DateTime<Utc>,
    /// Highest programme week first.
    pub weeks: Vec<WeekFeed>,
    /// Annotated sets across every included day, for badge display.
    pub total_comments: usize,
    pub unviewed_count: usize,
}

impl RoutineFeed {
    fn comments(&self) -> impl Iterator<Item = (&DayFeed, &SetComment)> {
        self.weeks
            .iter()
            .flat_map(|w| &w.days)
            .flat_map(|d| d.comments.iter().map(move |c| (d, c)))
    }

    /// Ids of linked media the coach has not opened yet.
    pub fn unviewed_feedback_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .comments()
            .flat_map(|(_, c)| &c.media)
            .filter(|m| !m.viewed_by_coach)
            .map(|m| m.id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Sessions holding text notes the coach has not read yet.
    pub fn unviewed_note_session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .comments()
            .filter(|(_, c)| c.note.is_some() && !c.has_media_only && !c.viewed_by_coach)
            .map(|(d, _)| d.session_id.clone())
            .collect();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentFeed {
    /// Routine of the most recent session, shown even without comments.
    pub current: Option<RoutineFeed>,
    /// Other routines with at least one comment, most recent first.
    pub old: Vec<RoutineFeed>,
}

impl CommentFeed {
    pub fn total_comments(&self) -> usize {
        self.current.iter().chain(&self.old).map(|r| r.total_comments).sum()
    }
}

pub fn build_comment_feed_with(
    sessions: &[Session],
    index: &FeedbackIndex<'_>,
    config: &FeedConfig,
) -> CommentFeed {
    log::debug!("Building comment feed for {} sessions", sessions.len());
    let Some(current_key) = sessions
        .iter()
        .max_by(|a, b| execution_order(a, b))
        .map(|s| s.routine_key.as_str())
    else {
        return CommentFeed::default();
    };

    let mut by_routine: BTreeMap<&str, Vec<&Session>> = BTreeMap::new();
    for session in sessions {
        by_routine
            .entry(session.routine_key.as_str())
            .or_default()
            .push(session);
    }

    let mut current = None;
    let mut old = Vec::new();
    for (key, mut members) in by_routine {
        members.sort_by(|a, b| newest_first(a, b));
        let feed = routine_feed(key, &members, index, config);
        if key == current_key {
            current = Some(feed);
        } else if feed.total_comments > 0 {
            old.push(feed);
        }
    }
    old.sort_by(|a, b| b.latest_date.cmp(&a.latest_date));

    CommentFeed { current, old }
}

/// `sessions` must be newest first and non-empty.
fn routine_feed(
    key: &str,
    sessions: &[&Session],
    index: &FeedbackIndex<'_>,
    config: &FeedConfig,
) -> RoutineFeed {
    let routine_name = sessions
        .iter()
        .find_map(|s| s.routine_name.clone())
        .unwrap_or_else(|| key.to_owned());
    let latest_date = sessions
        .first()
        .map(|s| s.date)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let mut by_week: BTreeMap<u32, Vec<DayFeed>> = BTreeMap::new();
    for &session in sessions {
        let comments = session_comments(session, index, config);
        if comments.is_empty() && session.session_rpe.is_none() {
            continue;
        }
        by_week.entry(session.week).or_default().push(DayFeed {
            session_id: session.id.clone(),
            date: session.date,
            day_index: session.day_index,
            day_label: session.day_label.clone(),
            session_rpe: session.session_rpe,
            session_note: session.session_note.clone(),
            comments,
        });
    }

    let weeks: Vec<WeekFeed> = by_week
        .into_iter()
        .rev()
        .map(|(week, days)| WeekFeed { week, days })
        .collect();
    let all = weeks.iter().flat_map(|w| &w.days).flat_map(|d| &d.comments);
    let total_comments = all.clone().count();
    let unviewed_count = all.filter(|c| !c.viewed_by_coach).count();

    RoutineFeed {
        routine_key: key.to_owned(),
        routine_name,
        latest_date,
        weeks,
        total_comments,
        unviewed_count,
    }
}

fn session_comments(
    session: &Session,
    index: &FeedbackIndex<'_>,
    config: &FeedConfig,
) -> Vec<SetComment> {
    let mut comments = Vec::new();
    for (exercise_index, exercise) in session.exercises.iter().enumerate() {
        for set in &exercise.sets {
            let links = index.links(&exercise.exercise_name, set.set_number, session.week);
            if set.notes.is_none() && links.is_empty() {
                continue;
            }
            let media_viewed = links.all.iter().all(|m| m.viewed_by_coach);
            let comment = match &set.notes {
                Some(note) => SetComment {
                    exercise_name: exercise.exercise_name.clone(),
                    exercise_index,
                    set_number: set.set_number,
                    note_value: note.value.clone(),
                    note: Some(note.note.clone()),
                    has_pain: config.has_pain(&note.note),
                    has_media_only: false,
                    viewed_by_coach: note.viewed_by_coach && media_viewed,
                    media: links.all.iter().map(|m| (*m).clone()).collect(),
                    audio: links.audio.cloned(),
                    visual: links.visual.cloned(),
                },
                None => SetComment {
                    exercise_name: exercise.exercise_name.clone(),
                    exercise_index,
                    set_number: set.set_number,
                    note_value: MEDIA_NOTE_VALUE.to_owned(),
                    note: None,
                    has_pain: false,
                    has_media_only: true,
                    viewed_by_coach: media_viewed,
                    media: links.all.iter().map(|m| (*m).clone()).collect(),
                    audio: links.audio.cloned(),
                    visual: links.visual.cloned(),
                },
            };
            comments.push(comment);
        }
    }
    comments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawExercise, RawMediaFeedback, RawSession, RawSet, RawSetNote};
    use crate::model::UNKNOWN_ROUTINE;
    use crate::normalize::Normalizer;
    use chrono::TimeZone;

    fn build_comment_feed(sessions: &[Session], feedback: &[MediaFeedback]) -> CommentFeed {
        build_comment_feed_with(sessions, &FeedbackIndex::with_normalizer(feedback, Normalizer::default()), &FeedConfig::default())
    }

    fn noted_set(note: Option<&str>, viewed: bool) -> RawSet {
        RawSet {
            actual_reps: Some(8),
            weight: Some(50.0),
            notes: note.map(|n| RawSetNote {
                value: Some("warning".into()),
                note: Some(n.into()),
                viewed_by_coach: Some(viewed),
            }),
            ..RawSet::default()
        }
    }

    fn session(
        id: &str,
        routine: &str,
        week: u32,
        day: u32,
        rpe: Option<u8>,
        sets: Vec<RawSet>,
    ) -> Session {
        Session::from(RawSession {
            id: Some(id.into()),
            date: Some(Utc.with_ymd_and_hms(2024, 5, day, 18, 0, 0).unwrap()),
            week: Some(week),
            routine_id: Some(routine.into()),
            session_rpe: rpe,
            exercises: Some(vec![RawExercise {
                exercise_name: Some("Sentadilla".into()),
                muscle_group: Some("PIERNA".into()),
                sets: Some(sets),
            }]),
            ..RawSession::default()
        })
    }

    fn video(id: &str, serie_key: &str, viewed: bool) -> MediaFeedback {
        MediaFeedback::from(RawMediaFeedback {
            id: Some(id.into()),
            exercise_name: Some("sentadilla".into()),
            media_type: Some("video".into()),
            serie_key: Some(serie_key.into()),
            created_at: Some(Utc.with_ymd_and_hms(2024, 5, 20, 8, 0, 0).unwrap()),
            viewed_by_coach: Some(viewed),
            ..RawMediaFeedback::default()
        })
    }

    #[test]
    fn pain_keywords() {
        let config = FeedConfig::default();
        assert!(config.has_pain("Me duele el hombro"));
        assert!(config.has_pain("LESIÓN en la rodilla"));
        assert!(!config.has_pain("Todo perfecto"));
        assert!(FeedConfig::new(&["knee"]).has_pain("Knee hurts"));
    }

    #[test]
    fn empty_input_has_no_current_routine() {
        let feed = build_comment_feed(&[], &[]);
        assert!(feed.current.is_none());
        assert!(feed.old.is_empty());
        assert_eq!(feed.total_comments(), 0);
    }

    #[test]
    fn weeks_and_days_are_newest_first() {
        let sessions = vec![
            session("w1", "r", 1, 1, None, vec![noted_set(Some("bien"), false)]),
            session("w2a", "r", 2, 8, None, vec![noted_set(Some("ok"), true)]),
            session("w2b", "r", 2, 10, Some(4), vec![noted_set(None, false)]),
            session("w3", "r", 3, 15, None, vec![noted_set(None, false)]),
        ];
        let feed = build_comment_feed(&sessions, &[]);
        let current = feed.current.unwrap();
        let weeks: Vec<u32> = current.weeks.iter().map(|w| w.week).collect();
        assert_eq!(weeks, vec![2, 1]);
        let days: Vec<&str> = current.weeks[0]
            .days
            .iter()
            .map(|d| d.session_id.as_str())
            .collect();
        assert_eq!(days, vec!["w2b", "w2a"]);
        // The RPE-only day is listed without comments.
        assert!(current.weeks[0].days[0].comments.is_empty());
        assert_eq!(current.total_comments, 2);
        assert_eq!(current.unviewed_count, 1);
        assert_eq!(current.unviewed_note_session_ids(), vec!["w1"]);
    }

    #[test]
    fn media_only_sets_qualify() {
        let sessions = vec![session(
            "s",
            "r",
            4,
            12,
            None,
            vec![noted_set(None, false), noted_set(Some("Me duele"), true)],
        )];
        let feedback = vec![video("v1", "4|0|0|0", false), video("v2", "4|0|0|1", true)];
        let feed = build_comment_feed(&sessions, &feedback);
        let current = feed.current.unwrap();
        let comments = &current.weeks[0].days[0].comments;
        assert_eq!(comments.len(), 2);

        assert_eq!(comments[0].note_value, MEDIA_NOTE_VALUE);
        assert!(comments[0].has_media_only);
        assert!(!comments[0].has_pain);
        assert_eq!(comments[0].visual.as_ref().map(|v| v.id.as_str()), Some("v1"));
        assert!(comments[0].audio.is_none());

        assert_eq!(comments[1].note_value, "warning");
        assert!(comments[1].has_pain);
        assert!(!comments[1].has_media_only);
        assert!(comments[1].viewed_by_coach);

        assert_eq!(current.unviewed_feedback_ids(), vec!["v1"]);
        assert_eq!(current.unviewed_count, 1);
    }

    #[test]
    fn old_routines_need_comments() {
        let sessions = vec![
            session("a", "antigua", 1, 1, None, vec![noted_set(Some("nota"), false)]),
            session("b", "sin-notas", 1, 5, Some(3), vec![noted_set(None, false)]),
            session("c", "actual", 1, 20, None, vec![noted_set(None, false)]),
        ];
        let feed = build_comment_feed(&sessions, &[]);
        let current = feed.current.as_ref().unwrap();
        assert_eq!(current.routine_key, "actual");
        assert!(current.weeks.is_empty());
        let old: Vec<&str> = feed.old.iter().map(|r| r.routine_key.as_str()).collect();
        assert_eq!(old, vec!["antigua"]);
        assert_eq!(feed.total_comments(), 1);
    }

    #[test]
    fn sessions_without_routine_id_group_by_name_then_unknown() {
        let unassigned = |id: &str, name: Option<&str>, day: u32| {
            Session::from(RawSession {
                id: Some(id.into()),
                date: Some(Utc.with_ymd_and_hms(2024, 5, day, 18, 0, 0).unwrap()),
                week: Some(1),
                routine_name_snapshot: name.map(Into::into),
                exercises: Some(vec![RawExercise {
                    exercise_name: Some("Sentadilla".into()),
                    muscle_group: Some("PIERNA".into()),
                    sets: Some(vec![noted_set(Some("nota"), false)]),
                }]),
                ..RawSession::default()
            })
        };
        let sessions = vec![
            unassigned("a", None, 1),
            unassigned("b", Some("Fuerza"), 3),
            unassigned("c", None, 4),
            unassigned("d", Some("Fuerza"), 9),
        ];
        let feed = build_comment_feed(&sessions, &[]);
        let current = feed.current.as_ref().unwrap();
        assert_eq!(current.routine_key, "Fuerza");
        assert_eq!(current.routine_name, "Fuerza");
        assert_eq!(current.total_comments, 2);
        assert_eq!(feed.old.len(), 1);
        assert_eq!(feed.old[0].routine_key, UNKNOWN_ROUTINE);
        assert_eq!(feed.old[0].total_comments, 2);
        assert_eq!(feed.total_comments(), 4);
    }
}
