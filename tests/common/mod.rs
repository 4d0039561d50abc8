//! Shared test harness for integration tests.
//!
//! [`TestHarness`] lays out a media share in a temp directory, installs fake
//! `ffmpeg`/`ffprobe` scripts, builds a full [`AppContext`] and serves the
//! router on a random port for HTTP-level testing.

#![cfg(unix)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stm_av::{FfprobeProbe, MetadataProbe, ToolRegistry};
use stm_core::config::{Config, ShareConfig};
use stm_server::context::AppContext;
use stm_server::router::build_router;

/// ffprobe output for a 23 second 1280x720 episode.
const FFPROBE_JSON: &str = r#"{
  "streams": [
    { "codec_type": "video", "width": 1280, "height": 720 },
    { "codec_type": "audio", "channels": 2 }
  ],
  "format": {
    "duration": "23.000000",
    "tags": { "title": "When She Was Bad", "show": "Buffy The Vampire Slayer" }
  }
}"#;

/// Running server over a temp media share.
pub struct TestHarness {
    pub dir: tempfile::TempDir,
    pub ctx: AppContext,
    pub addr: SocketAddr,
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).expect("failed to write script");
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .expect("failed to chmod script");
}

impl TestHarness {
    /// Start with the given readahead window.
    pub async fn with_server(readahead_segments: u32) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let base = dir.path();

        let media = base.join("media");
        std::fs::create_dir_all(media.join("Season 1")).unwrap();
        std::fs::write(media.join("Season 1").join("ep1.mkv"), b"").unwrap();
        std::fs::write(media.join("movie.mkv"), b"").unwrap();

        // The encoder logs every output path, sleeps for however many seconds
        // the `delay` file says, then writes the segment. A trailing `-`
        // means a thumbnail to stdout.
        let ffmpeg = base.join("ffmpeg");
        write_script(
            &ffmpeg,
            &format!(
                "for last; do :; done\n\
                 if [ \"$last\" = - ]; then printf 'JPEG'; exit 0; fi\n\
                 echo \"$last\" >> {log}\n\
                 sleep \"$(cat {delay} 2>/dev/null || echo 0)\"\n\
                 printf 'segment' > \"$last\"",
                log = base.join("invocations").display(),
                delay = base.join("delay").display(),
            ),
        );
        let ffprobe = base.join("ffprobe");
        write_script(&ffprobe, &format!("cat <<'JSON'\n{FFPROBE_JSON}\nJSON"));

        let mut config = Config::default();
        config.library.shares.push(ShareConfig {
            name: "TV".into(),
            path: media,
        });
        config.transcode.root_dir = base.join("transcode");
        config.transcode.readahead_segments = readahead_segments;

        let tools = ToolRegistry::with_paths([("ffmpeg", ffmpeg), ("ffprobe", ffprobe.clone())]);
        let probe: Arc<dyn MetadataProbe> = Arc::new(FfprobeProbe::new(ffprobe));
        let ctx = AppContext::new(config, tools, probe).expect("failed to build context");
        let app = build_router(ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self { dir, ctx, addr }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Make every encode take `secs` seconds.
    pub fn set_encode_delay(&self, secs: f64) {
        std::fs::write(self.dir.path().join("delay"), secs.to_string()).unwrap();
    }

    /// File names of every segment the encoder was asked to produce.
    pub fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("invocations"))
            .unwrap_or_default()
            .lines()
            .filter_map(|l| Path::new(l).file_name())
            .map(|n| {
                let n = n.to_string_lossy();
                match n.find(".ts.") {
                    Some(end) => n[..end + 3].to_string(),
                    None => n.into_owned(),
                }
            })
            .collect()
    }

    pub fn session_dir(&self, key: &str) -> PathBuf {
        self.dir.path().join("transcode").join(key)
    }
}
