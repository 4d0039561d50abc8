//! Library browsing: shares, folder listings and per-file metadata.

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::context::AppContext;
use crate::error::AppError;

#[derive(Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Folder,
    File,
}

#[derive(Debug, Serialize)]
pub struct Entry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// Description of a media file, as shown next to its thumbnail.
#[derive(Debug, Serialize)]
pub struct MediaDescription {
    pub artist: Option<String>,
    pub title: Option<String>,
    /// Duration in seconds.
    pub length: f64,
    pub description: Option<String>,
}

/// GET /folders
pub async fn folders(State(ctx): State<AppContext>) -> Json<Vec<Entry>> {
    Json(
        ctx.config
            .library
            .shares
            .iter()
            .map(|share| Entry {
                name: share.name.clone(),
                kind: EntryKind::Folder,
            })
            .collect(),
    )
}

/// GET /contents/{share}
pub async fn share_contents(
    State(ctx): State<AppContext>,
    Path(share): Path<String>,
) -> Result<Json<Vec<Entry>>, AppError> {
    list(&ctx, &share, "").await
}

/// GET /contents/{share}/{*path}
pub async fn contents(
    State(ctx): State<AppContext>,
    Path((share, path)): Path<(String, String)>,
) -> Result<Json<Vec<Entry>>, AppError> {
    list(&ctx, &share, &path).await
}

/// Sub-folders and playable files of a directory, hidden entries skipped.
async fn list(ctx: &AppContext, share: &str, path: &str) -> Result<Json<Vec<Entry>>, AppError> {
    let dir = ctx.resolve(share, path)?;
    let mut read_dir = tokio::fs::read_dir(&dir).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            stm_core::Error::not_found("folder", dir.display())
        } else {
            e.into()
        }
    })?;

    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        // Follow symlinks so linked folders and files are listed too.
        let Ok(meta) = tokio::fs::metadata(entry.path()).await else {
            continue;
        };
        if meta.is_dir() {
            entries.push(Entry {
                name,
                kind: EntryKind::Folder,
            });
        } else if ctx.config.library.is_media_file(&name) {
            entries.push(Entry {
                name,
                kind: EntryKind::File,
            });
        }
    }
    entries.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));

    tracing::debug!(dir = %dir.display(), entries = entries.len(), "Listed folder");
    Ok(Json(entries))
}

/// GET /metadata/{share}/{*path}
///
/// The body is the JSON description immediately followed by the JPEG
/// thumbnail; `Json-Length` gives the size of the JSON prefix. A file
/// without a usable thumbnail gets the JSON alone.
pub async fn metadata(
    State(ctx): State<AppContext>,
    Path((share, path)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let file = ctx.resolve(&share, &path)?;
    let ffmpeg = ctx.tools.require("ffmpeg")?.to_path_buf();

    let (meta, thumbnail) = tokio::join!(
        ctx.probe.probe(&file),
        stm_av::extract_thumbnail(&ffmpeg, &file)
    );
    let meta = meta?;
    let thumbnail = thumbnail.unwrap_or_else(|e| {
        tracing::warn!(file = %file.display(), "No thumbnail: {e}");
        Vec::new()
    });

    let json = serde_json::to_vec(&MediaDescription {
        artist: meta.show_or_artist,
        title: meta.title,
        length: meta.duration,
        description: meta.description,
    })
    .map_err(|e| stm_core::Error::Internal(format!("serializing metadata: {e}")))?;

    let json_length = json.len();
    let mut body = json;
    body.extend_from_slice(&thumbnail);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (
                header::HeaderName::from_static("json-length"),
                HeaderValue::from(json_length),
            ),
        ],
        body,
    )
        .into_response())
}
