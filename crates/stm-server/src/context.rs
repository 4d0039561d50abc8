//! Application context shared by all handlers.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use stm_av::{MetadataProbe, ToolRegistry};
use stm_core::config::{Config, ShareConfig};
use stm_core::{Error, Result};
use stm_stream::{SessionRegistry, SessionSettings};

/// Everything a request handler needs, cheaply cloneable via `Arc`s.
#[derive(Clone)]
pub struct AppContext {
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// External tool registry.
    pub tools: Arc<ToolRegistry>,
    /// Source metadata probe, shared with the sessions.
    pub probe: Arc<dyn MetadataProbe>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppContext {
    /// Build the context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tool`] when ffmpeg is not available, since no segment
    /// could ever be produced.
    pub fn new(config: Config, tools: ToolRegistry, probe: Arc<dyn MetadataProbe>) -> Result<Self> {
        let ffmpeg = tools.require("ffmpeg")?.to_path_buf();
        let settings = SessionSettings::from_config(&config.transcode, ffmpeg, probe.clone());

        Ok(Self {
            config: Arc::new(config),
            tools: Arc::new(tools),
            probe,
            sessions: Arc::new(SessionRegistry::new(settings)),
        })
    }

    /// Look up a share by name, or by its position in the configuration.
    pub fn share(&self, share: &str) -> Result<&ShareConfig> {
        let shares = &self.config.library.shares;
        shares
            .iter()
            .find(|s| s.name == share)
            .or_else(|| share.parse::<usize>().ok().and_then(|i| shares.get(i)))
            .ok_or_else(|| Error::not_found("share", share))
    }

    /// Resolve `relative` inside `share`, refusing to leave it.
    pub fn resolve(&self, share: &str, relative: &str) -> Result<PathBuf> {
        reject_parent_components(relative)?;
        let root = &self.share(share)?.path;
        let relative = relative.trim_start_matches('/');
        Ok(if relative.is_empty() {
            root.clone()
        } else {
            root.join(relative)
        })
    }
}

/// Any `..` component makes the request invalid.
pub fn reject_parent_components(path: &str) -> Result<()> {
    if Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(Error::Validation(format!(".. attempt: {path}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use stm_core::SourceMetadata;

    struct NoProbe;

    #[async_trait]
    impl MetadataProbe for NoProbe {
        async fn probe(&self, _path: &Path) -> Result<SourceMetadata> {
            Err(Error::Probe("unused".into()))
        }
    }

    fn context() -> AppContext {
        let mut config = Config::default();
        config.library.shares = vec![
            ShareConfig {
                name: "Movies".into(),
                path: PathBuf::from("/srv/movies"),
            },
            ShareConfig {
                name: "TV".into(),
                path: PathBuf::from("/srv/tv"),
            },
        ];
        let tools = ToolRegistry::with_paths([("ffmpeg", PathBuf::from("/usr/bin/ffmpeg"))]);
        AppContext::new(config, tools, Arc::new(NoProbe)).unwrap()
    }

    #[test]
    fn share_by_name_or_index() {
        let ctx = context();
        assert_eq!(ctx.share("TV").unwrap().path, PathBuf::from("/srv/tv"));
        assert_eq!(ctx.share("0").unwrap().name, "Movies");
        assert!(matches!(ctx.share("9"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn resolve_joins_relative_path() {
        let ctx = context();
        assert_eq!(
            ctx.resolve("Movies", "Alien (1979)/alien.mkv").unwrap(),
            PathBuf::from("/srv/movies/Alien (1979)/alien.mkv")
        );
        assert_eq!(ctx.resolve("Movies", "").unwrap(), PathBuf::from("/srv/movies"));
    }

    #[test]
    fn parent_components_are_rejected() {
        let ctx = context();
        for bad in ["..", "../etc/passwd", "a/../../b", "a/.."] {
            let err = ctx.resolve("Movies", bad).unwrap_err();
            assert_eq!(err.http_status(), 400, "{bad}");
        }
        assert!(ctx.resolve("Movies", "a..b/c...mkv").is_ok());
    }

    #[test]
    fn missing_ffmpeg_is_tool_error() {
        let err = AppContext::new(Config::default(), ToolRegistry::default(), Arc::new(NoProbe))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Tool { .. }));
    }
}
