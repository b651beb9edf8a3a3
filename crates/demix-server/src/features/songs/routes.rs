use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::api::response::ErrorResponse;
use crate::features::FeatureState;
use crate::queue::QueueError;

use super::{
    commands::{RemoveTrackCommand, RemoveTrackError, SubmitSongCommand, SubmitSongError},
    queries::{GetTrackError, GetTrackQuery, ListSongsError},
    types::{parse_track, TrackParams, INVALID_TRACK_MESSAGE},
};

/// Content type the track download is served with.
pub const TRACK_MIME: &str = "audio/mp3";

pub fn songs_routes() -> Router<FeatureState> {
    Router::new()
        .route("/separate", post(submit_song))
        .route("/fetch_songs", get(list_songs))
        .route("/queue", get(queue_snapshot))
        .route("/track/:job_id/track", get(get_track))
        .route("/remove/:job_id/track", get(remove_track))
}

/// POST /separate
async fn submit_song(
    State(state): State<FeatureState>,
    body: Result<Json<SubmitSongCommand>, JsonRejection>,
) -> Result<Response, SongApiError> {
    let Json(command) = body.map_err(SongApiError::BadRequest)?;

    let response =
        super::commands::submit::handle(state.queue.as_ref(), state.store.as_ref(), command)
            .await?;

    tracing::info!(job_id = %response.hash, "Song enqueued via API");

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// GET /fetch_songs
async fn list_songs(State(state): State<FeatureState>) -> Result<Response, SongApiError> {
    let response = super::queries::list_songs::handle(state.store.as_ref()).await?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// GET /queue
async fn queue_snapshot(State(state): State<FeatureState>) -> Result<Response, SongApiError> {
    let response = super::queries::queue_snapshot::handle(state.queue.as_ref())
        .await
        .map_err(SongApiError::Queue)?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// GET /track/:job_id/track?track=bass
async fn get_track(
    State(state): State<FeatureState>,
    Path(job_id): Path<String>,
    Query(params): Query<TrackParams>,
) -> Result<Response, SongApiError> {
    let part = parse_track(params.track.as_deref()).ok_or(SongApiError::InvalidTrack)?;

    let file =
        super::queries::get_track::handle(state.store.as_ref(), GetTrackQuery { job_id, part })
            .await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, TRACK_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.file_name),
            ),
        ],
        Body::from_stream(file.body),
    )
        .into_response())
}

/// GET /remove/:job_id/track?track=bass
async fn remove_track(
    State(state): State<FeatureState>,
    Path(job_id): Path<String>,
    Query(params): Query<TrackParams>,
) -> Result<Response, SongApiError> {
    let part = parse_track(params.track.as_deref()).ok_or(SongApiError::InvalidTrack)?;

    let response = super::commands::remove_track::handle(
        state.store.as_ref(),
        RemoveTrackCommand { job_id, part },
    )
    .await?;

    Ok((StatusCode::OK, Json(response)).into_response())
}

#[derive(Debug)]
enum SongApiError {
    BadRequest(JsonRejection),
    InvalidTrack,
    Submit(SubmitSongError),
    List(ListSongsError),
    Queue(QueueError),
    GetTrack(GetTrackError),
    RemoveTrack(RemoveTrackError),
}

impl From<SubmitSongError> for SongApiError {
    fn from(err: SubmitSongError) -> Self {
        Self::Submit(err)
    }
}

impl From<ListSongsError> for SongApiError {
    fn from(err: ListSongsError) -> Self {
        Self::List(err)
    }
}

impl From<GetTrackError> for SongApiError {
    fn from(err: GetTrackError) -> Self {
        Self::GetTrack(err)
    }
}

impl From<RemoveTrackError> for SongApiError {
    fn from(err: RemoveTrackError) -> Self {
        Self::RemoveTrack(err)
    }
}

impl IntoResponse for SongApiError {
    fn into_response(self) -> Response {
        match self {
            SongApiError::BadRequest(rejection) => {
                let status = match rejection.status() {
                    StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
                    _ => StatusCode::BAD_REQUEST,
                };
                ErrorResponse::with_details("Invalid request body", rejection.body_text())
                    .into_response_with(status)
            },
            SongApiError::InvalidTrack => {
                ErrorResponse::new(INVALID_TRACK_MESSAGE).into_response_with(StatusCode::BAD_REQUEST)
            },
            SongApiError::Submit(err) => {
                let status = match &err {
                    SubmitSongError::MissingPayload
                    | SubmitSongError::InvalidPayload(_)
                    | SubmitSongError::InvalidWebhook(_) => StatusCode::BAD_REQUEST,
                    SubmitSongError::Storage(_) | SubmitSongError::Queue(_) => {
                        tracing::error!(error = ?err, "Failed to submit song");
                        StatusCode::INTERNAL_SERVER_ERROR
                    },
                };
                let body = match err.details() {
                    Some(details) => ErrorResponse::with_details(err.to_string(), details),
                    None => ErrorResponse::new(err.to_string()),
                };
                body.into_response_with(status)
            },
            SongApiError::List(err) => {
                tracing::error!(error = %err, "Failed to list songs");
                ErrorResponse::new(err.to_string())
                    .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
            },
            SongApiError::Queue(err) => {
                tracing::error!(error = %err, "Failed to read queue");
                ErrorResponse::with_details("Failed to read queue", err.to_string())
                    .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
            },
            SongApiError::GetTrack(err @ GetTrackError::NotFound { .. }) => {
                ErrorResponse::new(err.to_string()).into_response_with(StatusCode::NOT_FOUND)
            },
            SongApiError::GetTrack(err) => {
                tracing::error!(error = %err, "Failed to fetch track");
                ErrorResponse::new(err.to_string())
                    .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
            },
            SongApiError::RemoveTrack(err) => {
                tracing::warn!(error = %err, "Failed to remove track");
                ErrorResponse::new(err.to_string())
                    .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
            },
        }
    }
}
