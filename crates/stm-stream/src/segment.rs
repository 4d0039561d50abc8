//! On-disk segment layout.
//!
//! Every session owns `<root>/<key>/`; a finished segment lives at
//! `<rate>-<index>.ts` inside it. Encoders write to the same name with a
//! `.partial` suffix and rename on success, so anything found under the final
//! name is complete.

use std::path::{Path, PathBuf};

/// File name of a finished segment.
pub fn segment_file_name(rate: &str, index: u32) -> String {
    format!("{rate}-{index}.ts")
}

/// The segment directory of one session.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    dir: PathBuf,
}

impl SegmentStore {
    pub fn new(root: &Path, key: &str) -> Self {
        Self {
            dir: root.join(key),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn segment_path(&self, rate: &str, index: u32) -> PathBuf {
        self.dir.join(segment_file_name(rate, index))
    }

    /// Path of the finished segment, if it has been published.
    pub async fn find(&self, rate: &str, index: u32) -> Option<PathBuf> {
        let path = self.segment_path(rate, index);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(path),
            _ => None,
        }
    }

    pub async fn create_dir(&self) -> stm_core::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }
}
