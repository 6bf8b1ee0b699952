use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;

use crate::model::{
    FeedbackInbox, MediaFeedback, Session, WorkoutsResponse, normalize_feedback, normalize_sessions,
};

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const TOKEN_ENV: &str = "COACH_API_TOKEN";
/// Page size requested from the workouts endpoint.
pub const WORKOUT_LIMIT: u32 = 200;

/// Determine the bearer token to use for API requests.
///
/// If the `COACH_API_TOKEN` environment variable is set, its value takes
/// precedence over any token stored in the settings.
pub fn resolve_api_token(settings_token: Option<&str>) -> Option<String> {
    std::env::var(TOKEN_ENV)
        .ok()
        .filter(|t| !t.is_empty())
        .or_else(|| settings_token.filter(|t| !t.is_empty()).map(str::to_owned))
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("server reported an unsuccessful response")]
    Rejected,
    #[error(transparent)]
    Http(#[from] ureq::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}

fn send(req: ureq::Request, token: &str) -> Result<String, SyncError> {
    let response = req
        .set("Authorization", &format!("Bearer {token}"))
        .set("Accept", "application/json")
        .call();
    match response {
        Ok(r) => Ok(r.into_string()?),
        Err(ureq::Error::Status(401, r)) => {
            let body = r.into_string().unwrap_or_default();
            Err(SyncError::Unauthorized(body))
        }
        Err(ureq::Error::Status(403, r)) => {
            let body = r.into_string().unwrap_or_default();
            Err(SyncError::Forbidden(body))
        }
        Err(e) => Err(e.into()),
    }
}

fn get_json<T: DeserializeOwned>(req: ureq::Request, token: &str) -> Result<T, SyncError> {
    let body = send(req, token)?;
    Ok(serde_json::from_str(&body)?)
}

/// Fetch a client's sessions dated on or after `start_date`.
///
/// Records are normalized on arrival; a payload with `success == false` is
/// reported as [`SyncError::Rejected`].
pub fn fetch_workouts(
    base_url: &str,
    token: &str,
    client_id: &str,
    start_date: DateTime<Utc>,
) -> Result<Vec<Session>, SyncError> {
    log::info!("Fetching workouts for client {client_id} since {start_date}");
    let url = endpoint(base_url, &format!("/api/workouts/by-user/{client_id}"));
    let req = ureq::get(&url)
        .query("limit", &WORKOUT_LIMIT.to_string())
        .query(
            "startDate",
            &start_date.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    let payload: WorkoutsResponse = get_json(req, token)?;
    if !payload.success {
        log::warn!("Workouts request for client {client_id} was rejected");
        return Err(SyncError::Rejected);
    }
    let sessions = normalize_sessions(payload.workouts);
    log::info!("Fetched {} sessions", sessions.len());
    Ok(sessions)
}

/// Fetch the media feedback inbox for a client.
pub fn fetch_feedback(
    base_url: &str,
    token: &str,
    client_id: &str,
) -> Result<Vec<MediaFeedback>, SyncError> {
    log::info!("Fetching media feedback for client {client_id}");
    let url = endpoint(base_url, "/api/video-feedback/inbox");
    let req = ureq::get(&url).query("clientId", client_id);
    let inbox: FeedbackInbox = get_json(req, token)?;
    let feedback = normalize_feedback(inbox.feedbacks);
    log::info!("Fetched {} feedback records", feedback.len());
    Ok(feedback)
}

/// Flag a media feedback record as seen by the coach. Idempotent.
pub fn mark_feedback_viewed(base_url: &str, token: &str, feedback_id: &str) -> Result<(), SyncError> {
    log::debug!("Marking feedback {feedback_id} viewed");
    let url = endpoint(base_url, &format!("/api/video-feedback/{feedback_id}/viewed"));
    send(ureq::request("PATCH", &url), token).map(|_| ())
}

/// Flag every set note of a session as read by the coach. Idempotent.
pub fn mark_session_notes_viewed(
    base_url: &str,
    token: &str,
    session_id: &str,
) -> Result<(), SyncError> {
    log::debug!("Marking notes of session {session_id} viewed");
    let url = endpoint(base_url, &format!("/api/workouts/{session_id}/notes-viewed"));
    send(ureq::request("PATCH", &url), token).map(|_| ())
}
