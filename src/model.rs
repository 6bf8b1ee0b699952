//! Workout session records and the strict schema the engine runs on.
//!
//! Records arrive from the backend with most fields optional. They are
//! converted once, at the boundary, into [`Session`] and [`MediaFeedback`]
//! with every default applied, so the aggregators never re-check optionality.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Muscle group assigned to exercises that carry none.
pub const DEFAULT_MUSCLE_GROUP: &str = "SIN GRUPO";
/// Routine key used when a session references neither an id nor a name.
pub const UNKNOWN_ROUTINE: &str = "unknown";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSession {
    #[serde(alias = "_id")]
    pub id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub week: Option<u32>,
    pub day_index: Option<u32>,
    pub day_label: Option<String>,
    pub routine_id: Option<String>,
    pub routine_name_snapshot: Option<String>,
    #[serde(rename = "sessionRPE")]
    pub session_rpe: Option<u8>,
    pub session_note: Option<String>,
    pub exercises: Option<Vec<RawExercise>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawExercise {
    pub exercise_name: Option<String>,
    pub muscle_group: Option<String>,
    pub sets: Option<Vec<RawSet>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSet {
    pub set_number: Option<u32>,
    pub actual_reps: Option<u32>,
    pub weight: Option<f64>,
    pub target_reps_min: Option<u32>,
    pub target_reps_max: Option<u32>,
    pub notes: Option<RawSetNote>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSetNote {
    pub value: Option<String>,
    pub note: Option<String>,
    pub viewed_by_coach: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMediaFeedback {
    #[serde(alias = "_id")]
    pub id: Option<String>,
    pub exercise_name: Option<String>,
    pub media_type: Option<String>,
    pub serie_key: Option<String>,
    pub set_number: Option<u32>,
    pub created_at: Option<DateTime<Utc>>,
    pub viewed_by_coach: Option<bool>,
    pub coach_response: Option<RawCoachResponse>,
    pub athlete_note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCoachResponse {
    pub responded_at: Option<DateTime<Utc>>,
    pub text: Option<String>,
}

/// Payload of the workouts endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkoutsResponse {
    pub success: bool,
    pub workouts: Vec<RawSession>,
}

/// Payload of the feedback inbox endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackInbox {
    pub feedbacks: Vec<RawMediaFeedback>,
}

/// One logged workout with every default applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub date: DateTime<Utc>,
    /// Programme week, independent of the calendar week.
    pub week: u32,
    pub day_index: u32,
    pub day_label: String,
    /// `routineId`, else the name snapshot, else [`UNKNOWN_ROUTINE`].
    pub routine_key: String,
    pub routine_name: Option<String>,
    pub session_rpe: Option<u8>,
    pub session_note: Option<String>,
    pub exercises: Vec<Exercise>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub exercise_name: String,
    pub muscle_group: String,
    pub sets: Vec<ExerciseSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSet {
    /// 1-based.
    pub set_number: u32,
    pub actual_reps: Option<u32>,
    pub weight: Option<f64>,
    pub target_reps_min: Option<u32>,
    pub target_reps_max: Option<u32>,
    /// Present only when both the value and the text were filled in.
    pub notes: Option<SetNote>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetNote {
    pub value: String,
    pub note: String,
    pub viewed_by_coach: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Photo,
    Audio,
    Other,
}

impl MediaType {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("video") => MediaType::Video,
            Some("photo") | Some("image") => MediaType::Photo,
            Some("audio") => MediaType::Audio,
            _ => MediaType::Other,
        }
    }

    pub fn is_visual(self) -> bool {
        matches!(self, MediaType::Video | MediaType::Photo)
    }

    pub fn is_audio(self) -> bool {
        self == MediaType::Audio
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachResponse {
    pub responded_at: Option<DateTime<Utc>>,
    pub text: Option<String>,
}

/// A media or text annotation the athlete attached to a set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFeedback {
    pub id: String,
    pub exercise_name: String,
    pub media_type: MediaType,
    /// `week|dayIndex|exerciseIndex|setIndex0`, or a shorter legacy shape.
    pub serie_key: Option<String>,
    pub set_number: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub viewed_by_coach: bool,
    pub coach_response: Option<CoachResponse>,
    pub athlete_note: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl From<RawSession> for Session {
    fn from(raw: RawSession) -> Self {
        let day_index = raw.day_index.unwrap_or(0);
        let routine_name = non_empty(raw.routine_name_snapshot);
        let routine_key = non_empty(raw.routine_id)
            .or_else(|| routine_name.clone())
            .unwrap_or_else(|| UNKNOWN_ROUTINE.to_owned());
        let date = raw.date.unwrap_or_else(|| {
            log::debug!("Session {:?} has no date, using the epoch", raw.id);
            DateTime::<Utc>::UNIX_EPOCH
        });
        let session_rpe = raw.session_rpe.filter(|r| (1..=5).contains(r));

        Session {
            id: raw.id.unwrap_or_default(),
            date,
            week: raw.week.unwrap_or(1),
            day_index,
            day_label: non_empty(raw.day_label).unwrap_or_else(|| default_day_label(day_index)),
            routine_key,
            routine_name,
            session_rpe,
            session_note: non_empty(raw.session_note),
            exercises: raw
                .exercises
                .unwrap_or_default()
                .into_iter()
                .map(Exercise::from)
                .collect(),
        }
    }
}

impl From<RawExercise> for Exercise {
    fn from(raw: RawExercise) -> Self {
        Exercise {
            exercise_name: raw.exercise_name.unwrap_or_default(),
            muscle_group: non_empty(raw.muscle_group)
                .unwrap_or_else(|| DEFAULT_MUSCLE_GROUP.to_owned()),
            sets: raw
                .sets
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .map(|(idx, s)| ExerciseSet::from_raw(s, idx))
                .collect(),
        }
    }
}

impl ExerciseSet {
    fn from_raw(raw: RawSet, position: usize) -> Self {
        let notes = raw.notes.and_then(|n| {
            let viewed_by_coach = n.viewed_by_coach.unwrap_or(false);
            match (non_empty(n.value), non_empty(n.note)) {
                (Some(value), Some(note)) => Some(SetNote {
                    value,
                    note,
                    viewed_by_coach,
                }),
                _ => None,
            }
        });
        ExerciseSet {
            set_number: raw.set_number.unwrap_or(position as u32 + 1),
            actual_reps: raw.actual_reps,
            weight: raw.weight,
            target_reps_min: raw.target_reps_min,
            target_reps_max: raw.target_reps_max,
            notes,
        }
    }

    pub fn reps(&self) -> u32 {
        self.actual_reps.unwrap_or(0)
    }

    pub fn load(&self) -> f64 {
        self.weight.unwrap_or(0.0)
    }

    /// Training volume of the set (`reps * weight`).
    pub fn volume(&self) -> f64 {
        self.reps() as f64 * self.load()
    }
}

impl From<RawMediaFeedback> for MediaFeedback {
    fn from(raw: RawMediaFeedback) -> Self {
        MediaFeedback {
            id: raw.id.unwrap_or_default(),
            exercise_name: raw.exercise_name.unwrap_or_default(),
            media_type: MediaType::parse(raw.media_type.as_deref()),
            serie_key: non_empty(raw.serie_key),
            set_number: raw.set_number,
            created_at: raw.created_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            viewed_by_coach: raw.viewed_by_coach.unwrap_or(false),
            coach_response: raw.coach_response.map(|r| CoachResponse {
                responded_at: r.responded_at,
                text: non_empty(r.text),
            }),
            athlete_note: non_empty(raw.athlete_note),
        }
    }
}

pub fn default_day_label(day_index: u32) -> String {
    format!("Día {}", day_index + 1)
}

/// Convert raw workout records into the strict schema.
pub fn normalize_sessions(raw: Vec<RawSession>) -> Vec<Session> {
    raw.into_iter().map(Session::from).collect()
}

/// Convert raw feedback records into the strict schema.
pub fn normalize_feedback(raw: Vec<RawMediaFeedback>) -> Vec<MediaFeedback> {
    raw.into_iter().map(MediaFeedback::from).collect()
}

/// Chronological order of repeated executions: date first, programme week
/// breaks ties.
///
/// Every view that needs "previous execution" semantics sorts with this
/// function so tie-breaks never diverge between views.
pub fn execution_order(a: &Session, b: &Session) -> Ordering {
    a.date.cmp(&b.date).then(a.week.cmp(&b.week))
}

/// Newest-first counterpart of [`execution_order`].
pub fn newest_first(a: &Session, b: &Session) -> Ordering {
    execution_order(b, a)
}
