//! Process-wide table of sessions.
//!
//! Sessions are created on the first request that names a source file and
//! live until the process exits; the registry never evicts.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use stm_core::{Error, Result};

use crate::session::{Session, SessionSettings};

/// Turn a request-derived key into a single path component.
pub fn cookieify(key: &str) -> String {
    key.replace('/', "_")
}

/// Thread-safe map from session key to [`Session`].
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Look up the session for `key`, creating it when a `source` is given.
    ///
    /// Returns `None` only when the session does not exist and no source was
    /// supplied. An existing session keeps its original source.
    pub fn session(&self, key: &str, source: Option<&Path>) -> Option<Arc<Session>> {
        let key = cookieify(key);
        if let Some(existing) = self.sessions.get(&key) {
            return Some(Arc::clone(existing.value()));
        }

        let source = source?;
        let entry = self.sessions.entry(key.clone()).or_insert_with(|| {
            tracing::info!(
                session = %key,
                source = %source.display(),
                "Starting transcode session"
            );
            Arc::new(Session::new(
                key.clone(),
                source.to_path_buf(),
                self.settings.clone(),
            ))
        });
        Some(Arc::clone(entry.value()))
    }

    /// An existing session, or [`Error::SessionNotFound`].
    pub fn get(&self, key: &str) -> Result<Arc<Session>> {
        let key = cookieify(key);
        self.sessions
            .get(&key)
            .map(|s| Arc::clone(s.value()))
            .ok_or(Error::SessionNotFound(key))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
