//! HLS delivery: starting a stream and serving session playlists and
//! segments.
//!
//! `GET /stream/{options}/{share}/{*path}/index.m3u8` creates (or reuses) the
//! session for a file and returns its master playlist. Every URL in that
//! playlist points at `/session/{key}/...`, which is served from the session
//! registry only.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use stm_stream::SegmentOutcome;

use crate::context::{reject_parent_components, AppContext};
use crate::error::AppError;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/MP2T";

/// A request for one file of a session.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionFile {
    Playlist { rate: String },
    Segment { rate: String, index: u32 },
}

impl SessionFile {
    /// Parse `<rate>.m3u8` or `<rate>-<index>.ts`.
    pub fn parse(file: &str) -> Option<Self> {
        if let Some(rate) = file.strip_suffix(".m3u8") {
            return (!rate.is_empty()).then(|| SessionFile::Playlist {
                rate: rate.to_string(),
            });
        }
        let (rate, index) = file.strip_suffix(".ts")?.rsplit_once('-')?;
        if rate.is_empty() {
            return None;
        }
        Some(SessionFile::Segment {
            rate: rate.to_string(),
            index: index.parse().ok()?,
        })
    }
}

/// Comma-separated `key=value` client options, e.g.
/// `device=Mac,rate=local,ss=0`. Options without `=` map to an empty value.
pub fn parse_options(options: &str) -> BTreeMap<String, String> {
    options
        .split(',')
        .filter(|o| !o.is_empty())
        .map(|o| match o.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (o.to_string(), String::new()),
        })
        .collect()
}

/// GET /stream/{options}/{share}/{*path}
pub async fn start_stream(
    State(ctx): State<AppContext>,
    Path((options, share, path)): Path<(String, String, String)>,
) -> Result<Response, AppError> {
    reject_parent_components(&path)?;
    let relative = path
        .strip_suffix("/index.m3u8")
        .ok_or_else(|| stm_core::Error::not_found("stream", &path))?;

    let file = ctx.resolve(&share, relative)?;
    if !tokio::fs::metadata(&file).await.is_ok_and(|m| m.is_file()) {
        return Err(stm_core::Error::not_found("file", file.display()).into());
    }

    let key = format!("{share}/{relative}");
    tracing::info!(
        session = %key,
        options = ?parse_options(&options),
        "Stream requested"
    );

    let session = ctx
        .sessions
        .session(&key, Some(&file))
        .ok_or_else(|| stm_core::Error::Internal(format!("session {key} was not created")))?;

    // Probe now so the first playlist request does not wait for it.
    let warm = session.clone();
    tokio::spawn(async move {
        if let Err(e) = warm.metadata().await {
            tracing::warn!(session = %warm.key(), "Probe failed: {e}");
        }
    });

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)],
        session.master_playlist(),
    )
        .into_response())
}

/// GET /session/{key}/{file}
pub async fn session_file(
    State(ctx): State<AppContext>,
    Path((key, file)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let session = ctx.sessions.get(&key)?;
    let request = SessionFile::parse(&file)
        .ok_or_else(|| stm_core::Error::not_found("session file", &file))?;

    match request {
        SessionFile::Playlist { rate } => {
            tracing::debug!(session = %session.key(), rate = %rate, "Rate playlist");
            let playlist = session.rate_playlist(&rate).await?;
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)],
                playlist,
            )
                .into_response())
        }
        SessionFile::Segment { rate, index } => {
            tracing::debug!(session = %session.key(), rate = %rate, segment = index, "Segment requested");
            match session.segment_bytes(&rate, index).await? {
                SegmentOutcome::Ready(bytes) => {
                    tracing::debug!(
                        session = %session.key(),
                        "Delivering {rate}[{index}] ({} bytes)",
                        bytes.len()
                    );
                    Ok((
                        StatusCode::OK,
                        [(header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE)],
                        bytes,
                    )
                        .into_response())
                }
                SegmentOutcome::EndOfStream => {
                    Err(stm_core::Error::not_found("segment", format!("{rate}-{index}")).into())
                }
                SegmentOutcome::Superseded => Ok((
                    StatusCode::SERVICE_UNAVAILABLE,
                    [(header::RETRY_AFTER, "1")],
                    "segment encode was superseded by a newer request",
                )
                    .into_response()),
            }
        }
    }
}
