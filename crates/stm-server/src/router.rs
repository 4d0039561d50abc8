//! Axum router construction.

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        // Library browsing
        .route("/folders", get(routes::library::folders))
        .route("/contents/{share}", get(routes::library::share_contents))
        .route("/contents/{share}/{*path}", get(routes::library::contents))
        .route("/metadata/{share}/{*path}", get(routes::library::metadata))
        // Streaming
        .route(
            "/stream/{options}/{share}/{*path}",
            get(routes::stream::start_stream),
        )
        .route("/session/{key}/{file}", get(routes::stream::session_file))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use stm_av::{MetadataProbe, ToolRegistry};
    use stm_core::config::{Config, ShareConfig};
    use stm_core::SourceMetadata;
    use tower::ServiceExt;

    struct StaticProbe;

    #[async_trait]
    impl MetadataProbe for StaticProbe {
        async fn probe(&self, path: &Path) -> stm_core::Result<SourceMetadata> {
            if !path.exists() {
                return Err(stm_core::Error::Probe(format!("{} unreadable", path.display())));
            }
            Ok(SourceMetadata {
                duration: 23.0,
                width: 640,
                height: 360,
                title: Some("When She Was Bad".into()),
                show_or_artist: Some("Buffy The Vampire Slayer".into()),
                description: None,
            })
        }
    }

    fn app(dir: &Path) -> Router {
        let media = dir.join("media");
        std::fs::create_dir_all(media.join("Season 1")).unwrap();
        std::fs::create_dir_all(media.join(".hidden")).unwrap();
        std::fs::write(media.join("a.mkv"), b"").unwrap();
        std::fs::write(media.join("notes.txt"), b"").unwrap();

        let ffmpeg = dir.join("ffmpeg");
        std::fs::write(
            &ffmpeg,
            "#!/bin/sh\n\
             for last; do :; done\n\
             if [ \"$last\" = - ]; then printf 'JPEG'; exit 0; fi\n\
             printf 'segment' > \"$last\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = Config::default();
        config.library.shares.push(ShareConfig {
            name: "Movies".into(),
            path: media,
        });
        config.transcode.root_dir = dir.join("transcode");
        config.transcode.readahead_segments = 0;

        let tools = ToolRegistry::with_paths([("ffmpeg", ffmpeg)]);
        let ctx = AppContext::new(config, tools, Arc::new(StaticProbe)).unwrap();
        build_router(ctx)
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }

    fn json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn health_and_folders() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (status, _, body) = get(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");

        let (status, _, body) = get(&app, "/folders").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json(&body),
            serde_json::json!([{ "name": "Movies", "type": "folder" }])
        );
    }

    #[tokio::test]
    async fn contents_lists_folders_and_media_only() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (status, _, body) = get(&app, "/contents/Movies").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json(&body),
            serde_json::json!([
                { "name": "Season 1", "type": "folder" },
                { "name": "a.mkv", "type": "file" },
            ])
        );

        let (status, _, body) = get(&app, "/contents/0/Season%201").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body), serde_json::json!([]));

        let (status, _, _) = get(&app, "/contents/Movies/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = get(&app, "/contents/Music").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn parent_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (status, _, _) = get(&app, "/contents/Movies/Season%201/../../etc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _, _) = get(&app, "/stream/x=1/Movies/../a.mkv/index.m3u8").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn metadata_is_json_then_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (status, headers, body) = get(&app, "/metadata/Movies/a.mkv").await;
        assert_eq!(status, StatusCode::OK);
        let json_length: usize = headers["json-length"].to_str().unwrap().parse().unwrap();
        assert_eq!(&body[json_length..], b"JPEG");

        let meta = json(&body[..json_length]);
        assert_eq!(meta["artist"], "Buffy The Vampire Slayer");
        assert_eq!(meta["title"], "When She Was Bad");
        assert_eq!(meta["length"], 23.0);
    }

    #[tokio::test]
    async fn unknown_session_is_distinct_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (status, _, body) = get(&app, "/session/Movies_b.mkv/mid.m3u8").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body = json(&body);
        assert_eq!(body["error"], "Session not found");
        assert_eq!(body["session"], "Movies_b.mkv");
    }

    #[tokio::test]
    async fn stream_then_playlists_then_segments() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (status, headers, body) =
            get(&app, "/stream/device=Mac,rate=local/Movies/a.mkv/index.m3u8").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "application/vnd.apple.mpegurl");
        let master = String::from_utf8(body).unwrap();
        assert!(master.contains("/session/Movies_a.mkv/veryhigh.m3u8"));

        let (status, _, body) = get(&app, "/session/Movies_a.mkv/mid.m3u8").await;
        assert_eq!(status, StatusCode::OK);
        let playlist = String::from_utf8(body).unwrap();
        assert_eq!(playlist.matches("#EXTINF:5,").count(), 5);

        let (status, headers, body) = get(&app, "/session/Movies_a.mkv/mid-0.ts").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "video/MP2T");
        assert_eq!(body, b"segment");
        assert!(PathBuf::from(dir.path())
            .join("transcode/Movies_a.mkv/mid-0.ts")
            .exists());

        let (status, _, _) = get(&app, "/session/Movies_a.mkv/mid-5.ts").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = get(&app, "/session/Movies_a.mkv/ultra.m3u8").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stream_of_missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (status, _, _) = get(&app, "/stream/x=1/Movies/missing.mkv/index.m3u8").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = get(&app, "/stream/x=1/Movies/a.mkv/playlist.m3u8").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
