//! Per-file transcoding sessions.
//!
//! A [`Session`] turns a stream of segment requests for one source file into
//! at most one running encoder process at a time:
//!
//! - a request for the segment already being encoded joins that job;
//! - a request for anything else kills the running job and starts its own;
//! - a finished segment on disk is served without encoding;
//! - after a segment is produced, the next one is encoded in the background
//!   while the client is less than `readahead_segments` ahead of it.
//!
//! A waiter whose job gets killed by a newer request resolves to
//! [`SegmentOutcome::Superseded`] rather than an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use stm_av::{EncodeError, EncodeJob, EncodeRequest, EncodeResult, Encoder, MetadataProbe};
use stm_core::config::TranscodeConfig;
use stm_core::{Error, RateLadder, RateProfile, Result, SourceMetadata};
use tokio::sync::OnceCell;

use crate::playlist;
use crate::segment::SegmentStore;

/// How a segment request was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentOutcome<T = PathBuf> {
    /// The segment is available.
    Ready(T),
    /// The index lies past the end of the source.
    EndOfStream,
    /// The encode this request was waiting on was killed in favour of a
    /// newer request. Asking again will produce the segment.
    Superseded,
}

impl<T> SegmentOutcome<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            SegmentOutcome::Ready(v) => Some(v),
            _ => None,
        }
    }
}

/// Everything sessions share: where segments go, how to encode them and how
/// to learn about a source.
#[derive(Clone)]
pub struct SessionSettings {
    pub root_dir: PathBuf,
    pub ladder: Arc<RateLadder>,
    pub encoder: Encoder,
    pub probe: Arc<dyn MetadataProbe>,
    pub readahead_segments: u32,
}

impl SessionSettings {
    pub fn from_config(
        config: &TranscodeConfig,
        ffmpeg: PathBuf,
        probe: Arc<dyn MetadataProbe>,
    ) -> Self {
        Self {
            root_dir: config.root_dir.clone(),
            ladder: Arc::new(config.rates.clone()),
            encoder: Encoder::new(ffmpeg, config.baseline.clone(), config.segment_seconds),
            probe,
            readahead_segments: config.readahead_segments,
        }
    }
}

struct ActiveJob {
    id: u64,
    job: EncodeJob,
}

enum Scheduled {
    Existing(PathBuf),
    Job(u64, EncodeJob),
}

#[derive(Default)]
struct SchedulerState {
    active: Option<ActiveJob>,
    last_requested: u32,
    jobs_started: u64,
}

/// One source file being streamed.
pub struct Session {
    key: String,
    source: PathBuf,
    store: SegmentStore,
    settings: SessionSettings,
    // Probe failures are cached as their message.
    metadata: OnceCell<std::result::Result<SourceMetadata, String>>,
    state: Mutex<SchedulerState>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("source", &self.source)
            .field("dir", &self.store.dir())
            .finish()
    }
}

impl Session {
    pub fn new(key: String, source: PathBuf, settings: SessionSettings) -> Self {
        let store = SegmentStore::new(&settings.root_dir, &key);
        Self {
            key,
            source,
            store,
            settings,
            metadata: OnceCell::new(),
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    /// `(rate, index)` of the encode currently running, if any.
    pub fn active_job(&self) -> Option<(String, u32)> {
        self.state
            .lock()
            .active
            .as_ref()
            .map(|a| (a.job.rate().to_string(), a.job.segment_index()))
    }

    /// Index of the most recent segment request, whatever its rate.
    pub fn last_requested(&self) -> u32 {
        self.state.lock().last_requested
    }

    /// Source metadata, probed on first use.
    ///
    /// A failed probe is remembered: every later call returns the same
    /// [`Error::Probe`] without probing again.
    pub async fn metadata(&self) -> Result<&SourceMetadata> {
        let cached = self
            .metadata
            .get_or_init(|| async {
                self.settings
                    .probe
                    .probe(&self.source)
                    .await
                    .map_err(|e| match e {
                        Error::Probe(msg) => msg,
                        other => other.to_string(),
                    })
            })
            .await;

        match cached {
            Ok(meta) => Ok(meta),
            Err(msg) => Err(Error::Probe(msg.clone())),
        }
    }

    pub fn master_playlist(&self) -> String {
        playlist::master_playlist(&self.key, &self.settings.ladder)
    }

    pub async fn rate_playlist(&self, rate: &str) -> Result<String> {
        self.profile(rate)?;
        let meta = self.metadata().await?;
        playlist::rate_playlist(
            &self.key,
            rate,
            meta,
            self.settings.encoder.segment_seconds(),
        )
    }

    fn profile(&self, rate: &str) -> Result<RateProfile> {
        self.settings
            .ladder
            .get(rate)
            .cloned()
            .ok_or_else(|| Error::not_found("rate", rate))
    }

    /// Produce segment `index` of `rate`, encoding it if needed.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown rate, [`Error::Probe`] if the source
    /// cannot be probed and [`Error::EncodeFailed`] if the encoder fails.
    pub async fn request_segment(
        self: &Arc<Self>,
        rate: &str,
        index: u32,
    ) -> Result<SegmentOutcome> {
        let profile = self.profile(rate)?;

        let in_flight = {
            let mut state = self.state.lock();
            state.last_requested = index;
            if let Some(active) = &state.active {
                tracing::debug!(
                    session = %self.key,
                    "current={}[{}], request={rate}[{index}]",
                    active.job.rate(),
                    active.job.segment_index()
                );
            }
            let joinable = state
                .active
                .as_ref()
                .filter(|a| a.job.is_for(rate, index))
                .map(|a| a.job.clone());
            joinable
        };

        if let Some(job) = in_flight {
            tracing::debug!(session = %self.key, rate, segment = index, "Joining running encode");
            return settle_joined(job.wait().await);
        }

        Arc::clone(self).ensure(profile, index).await
    }

    /// [`Session::request_segment`] followed by reading the file.
    pub async fn segment_bytes(
        self: &Arc<Self>,
        rate: &str,
        index: u32,
    ) -> Result<SegmentOutcome<Vec<u8>>> {
        Ok(match self.request_segment(rate, index).await? {
            SegmentOutcome::Ready(path) => SegmentOutcome::Ready(tokio::fs::read(&path).await?),
            SegmentOutcome::EndOfStream => SegmentOutcome::EndOfStream,
            SegmentOutcome::Superseded => SegmentOutcome::Superseded,
        })
    }

    // Boxed so the readahead task can spawn the same future type.
    fn ensure(
        self: Arc<Self>,
        profile: RateProfile,
        index: u32,
    ) -> BoxFuture<'static, Result<SegmentOutcome>> {
        async move {
            let meta = self.metadata().await?;
            let total = meta.segment_count(self.settings.encoder.segment_seconds())?;
            if index >= total {
                tracing::debug!(
                    session = %self.key,
                    rate = %profile.name,
                    segment = index,
                    total,
                    "Past end of stream"
                );
                return Ok(SegmentOutcome::EndOfStream);
            }

            self.store.create_dir().await?;
            let scheduled = match self.store.find(&profile.name, index).await {
                Some(path) => Scheduled::Existing(path),
                None => self.start_or_join(&profile, index, meta)?,
            };
            let path = match scheduled {
                Scheduled::Existing(path) => path,
                Scheduled::Job(id, job) => match job.wait().await {
                    Ok(path) => {
                        self.clear_active(id);
                        path
                    }
                    Err(EncodeError::Cancelled) => return Ok(SegmentOutcome::Superseded),
                    Err(e) => {
                        self.clear_active(id);
                        return Err(e.into());
                    }
                },
            };

            self.read_ahead(&profile, index);
            Ok(SegmentOutcome::Ready(path))
        }
        .boxed()
    }

    /// Join the running job if it is for the same segment, otherwise kill it
    /// and start a new one. Runs entirely under the state lock.
    ///
    /// A job publishes its segment before its waiter clears `active`, so a
    /// segment finished since the caller last looked is seen here and nothing
    /// is killed for it.
    fn start_or_join(
        &self,
        profile: &RateProfile,
        index: u32,
        meta: &SourceMetadata,
    ) -> Result<Scheduled> {
        let output = self.store.segment_path(&profile.name, index);
        let mut state = self.state.lock();
        if let Some(active) = &state.active {
            if active.job.is_for(&profile.name, index) {
                return Ok(Scheduled::Job(active.id, active.job.clone()));
            }
        }
        if output.is_file() {
            return Ok(Scheduled::Existing(output));
        }
        if let Some(active) = state.active.take() {
            active.job.kill();
        }

        let id = state.jobs_started + 1;
        let job = self.settings.encoder.start(EncodeRequest {
            source: self.source.clone(),
            source_resolution: meta.resolution(),
            profile: profile.clone(),
            segment_index: index,
            output,
            job_id: id,
        })?;

        state.jobs_started = id;
        state.active = Some(ActiveJob {
            id,
            job: job.clone(),
        });
        Ok(Scheduled::Job(id, job))
    }

    fn clear_active(&self, id: u64) {
        let mut state = self.state.lock();
        if state.active.as_ref().is_some_and(|a| a.id == id) {
            state.active = None;
        }
    }

    fn read_ahead(self: &Arc<Self>, profile: &RateProfile, index: u32) {
        let last = self.last_requested();
        let window = self.settings.readahead_segments;
        if u64::from(last) + u64::from(window) <= u64::from(index) {
            return;
        }

        let next = index + 1;
        tracing::debug!(
            session = %self.key,
            rate = %profile.name,
            segment = next,
            last_requested = last,
            "Reading ahead"
        );
        let readahead = Arc::clone(self).ensure(profile.clone(), next);
        let key = self.key.clone();
        tokio::spawn(async move {
            if let Err(e) = readahead.await {
                tracing::debug!(session = %key, segment = next, "Readahead failed: {e}");
            }
        });
    }
}

fn settle_joined(result: EncodeResult) -> Result<SegmentOutcome> {
    match result {
        Ok(path) => Ok(SegmentOutcome::Ready(path)),
        Err(EncodeError::Cancelled) => Ok(SegmentOutcome::Superseded),
        Err(e) => Err(e.into()),
    }
}
