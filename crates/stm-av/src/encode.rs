//! Segment encode jobs.
//!
//! An [`EncodeJob`] is one ffmpeg run producing one fixed-length transport
//! stream segment for one rate. The process writes to
//! `<output>.<job id>.partial`; only a zero exit publishes the file under its
//! final name via rename, so a file at the final path is always complete.
//! Each job owns its partial file, so cleaning up after a killed job never
//! touches a later job for the same segment.
//!
//! A job can be killed at any time with [`EncodeJob::kill`]. A killed job
//! resolves to [`EncodeError::Cancelled`], which callers can tell apart from
//! a genuine [`EncodeError::Failed`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures::future::{BoxFuture, FutureExt, Shared};
use stm_core::rates::{fit_resolution, EncoderBaseline, RateProfile};
use stm_core::Resolution;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Bytes of encoder stderr kept for error reports.
const DIAGNOSTIC_TAIL: usize = 4096;

/// Why a job did not produce a segment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The encoder exited unsuccessfully on its own.
    #[error("encoder exited with {}: {diagnostics}", exit_label(*exit_code))]
    Failed {
        exit_code: Option<i32>,
        diagnostics: String,
    },
    /// The job was killed by [`EncodeJob::kill`].
    #[error("encode cancelled")]
    Cancelled,
    /// Waiting for the process or publishing its output failed.
    #[error("encode I/O error: {0}")]
    Io(String),
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}

impl From<EncodeError> for stm_core::Error {
    fn from(e: EncodeError) -> Self {
        match e {
            EncodeError::Failed {
                exit_code,
                diagnostics,
            } => stm_core::Error::EncodeFailed {
                exit_code,
                diagnostics,
            },
            EncodeError::Cancelled => stm_core::Error::Internal("encode cancelled".into()),
            EncodeError::Io(msg) => stm_core::Error::Internal(msg),
        }
    }
}

/// Settled value of a job: the final segment path or why there is none.
pub type EncodeResult = std::result::Result<PathBuf, EncodeError>;

/// Everything needed to encode one segment.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub source: PathBuf,
    pub source_resolution: Resolution,
    pub profile: RateProfile,
    pub segment_index: u32,
    /// Final path of the segment. Its directory must already exist.
    pub output: PathBuf,
    /// Distinguishes successive encodes of the same output.
    pub job_id: u64,
}

impl EncodeRequest {
    /// Path the encoder writes to before the segment is published.
    pub fn partial_path(&self) -> PathBuf {
        partial_path(&self.output, self.job_id)
    }
}

/// `<output>.<job_id>.partial`
pub fn partial_path(output: &Path, job_id: u64) -> PathBuf {
    let mut s = OsString::from(output.as_os_str());
    s.push(format!(".{job_id}.partial"));
    PathBuf::from(s)
}

/// Builds and starts encoder processes.
#[derive(Debug, Clone)]
pub struct Encoder {
    ffmpeg: PathBuf,
    baseline: EncoderBaseline,
    segment_seconds: u32,
}

impl Encoder {
    pub fn new(ffmpeg: PathBuf, baseline: EncoderBaseline, segment_seconds: u32) -> Self {
        Self {
            ffmpeg,
            baseline,
            segment_seconds,
        }
    }

    pub fn segment_seconds(&self) -> u32 {
        self.segment_seconds
    }

    /// The full ffmpeg argument list for `request`.
    pub fn build_args(&self, request: &EncodeRequest) -> Vec<String> {
        let start = u64::from(request.segment_index) * u64::from(self.segment_seconds);
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-accurate_seek".into(),
            "-ss".into(),
            start.to_string(),
            "-i".into(),
            request.source.to_string_lossy().into_owned(),
            "-t".into(),
            self.segment_seconds.to_string(),
            "-f".into(),
            self.baseline.container.clone(),
            "-codec:a".into(),
            self.baseline.audio_codec.clone(),
            "-codec:v".into(),
            self.baseline.video_codec.clone(),
        ];
        args.extend(request.profile.encoder_args());
        args.extend(self.baseline.encoder_args());

        if let Some(fit) = fit_resolution(request.source_resolution, &request.profile) {
            args.push("-filter:v".into());
            args.push(format!("scale=width={}:height={}", fit.width, fit.height));
        }

        args.push(request.partial_path().to_string_lossy().into_owned());
        args
    }

    /// Spawn the encoder for `request`.
    ///
    /// The process is supervised by a background task, so it is reaped and
    /// its output published or cleaned up even if nobody awaits the job.
    ///
    /// # Errors
    ///
    /// Returns [`stm_core::Error::Tool`] if the process cannot be spawned.
    pub fn start(&self, request: EncodeRequest) -> stm_core::Result<EncodeJob> {
        let args = self.build_args(&request);

        let child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| stm_core::Error::tool("ffmpeg", format!("failed to spawn: {e}")))?;

        let pid = child.id();
        tracing::debug!(
            pid = ?pid,
            rate = %request.profile.name,
            segment = request.segment_index,
            job = request.job_id,
            "ffmpeg started: {} {}",
            self.ffmpeg.display(),
            shell_words(&args)
        );

        let cancel = CancellationToken::new();
        let supervisor = tokio::spawn(supervise(
            child,
            cancel.clone(),
            request.partial_path(),
            request.output.clone(),
        ));
        let result = async move {
            supervisor
                .await
                .unwrap_or_else(|e| Err(EncodeError::Io(format!("encode supervisor failed: {e}"))))
        }
        .boxed()
        .shared();

        Ok(EncodeJob {
            rate: request.profile.name,
            segment_index: request.segment_index,
            pid,
            cancel,
            result,
        })
    }
}

/// Handle to a running (or settled) encoder process.
///
/// Cloning is cheap; all clones observe the same result.
#[derive(Clone)]
pub struct EncodeJob {
    rate: String,
    segment_index: u32,
    pid: Option<u32>,
    cancel: CancellationToken,
    result: Shared<BoxFuture<'static, EncodeResult>>,
}

impl std::fmt::Debug for EncodeJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeJob")
            .field("rate", &self.rate)
            .field("segment_index", &self.segment_index)
            .field("pid", &self.pid)
            .field("killed", &self.cancel.is_cancelled())
            .finish()
    }
}

impl EncodeJob {
    pub fn rate(&self) -> &str {
        &self.rate
    }

    pub fn segment_index(&self) -> u32 {
        self.segment_index
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether this job encodes `(rate, index)`.
    pub fn is_for(&self, rate: &str, index: u32) -> bool {
        self.rate == rate && self.segment_index == index
    }

    /// Kill the process immediately (SIGKILL). A no-op once it has exited.
    pub fn kill(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(
                pid = ?self.pid,
                rate = %self.rate,
                segment = self.segment_index,
                "Killing ffmpeg"
            );
        }
        self.cancel.cancel();
    }

    /// Wait for the job to settle. Any number of callers may wait.
    pub fn wait(&self) -> Shared<BoxFuture<'static, EncodeResult>> {
        self.result.clone()
    }
}

async fn supervise(
    mut child: Child,
    cancel: CancellationToken,
    partial: PathBuf,
    output: PathBuf,
) -> EncodeResult {
    let pid = child.id();
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        })
    });

    let exited = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        status = child.wait() => Some(status),
    };

    let status = match exited {
        Some(status) => status,
        None => {
            if let Err(e) = child.start_kill() {
                tracing::trace!(pid = ?pid, "start_kill after exit: {e}");
            }
            let _ = child.wait().await;
            remove_partial(&partial).await;
            tracing::debug!(pid = ?pid, "ffmpeg killed");
            return Err(EncodeError::Cancelled);
        }
    };

    let diagnostics = match stderr_reader {
        Some(handle) => tail(&handle.await.unwrap_or_default()),
        None => String::new(),
    };

    let status = match status {
        Ok(status) => status,
        Err(e) => {
            remove_partial(&partial).await;
            return Err(EncodeError::Io(format!("waiting for ffmpeg: {e}")));
        }
    };

    tracing::debug!(pid = ?pid, exit_code = ?status.code(), "ffmpeg exited");

    if status.success() {
        return match tokio::fs::rename(&partial, &output).await {
            Ok(()) => Ok(output),
            Err(e) => {
                remove_partial(&partial).await;
                Err(EncodeError::Io(format!(
                    "publishing {}: {e}",
                    output.display()
                )))
            }
        };
    }

    remove_partial(&partial).await;
    if cancel.is_cancelled() {
        return Err(EncodeError::Cancelled);
    }

    tracing::warn!(
        pid = ?pid,
        exit_code = ?status.code(),
        "ffmpeg failed:\n{diagnostics}"
    );
    Err(EncodeError::Failed {
        exit_code: status.code(),
        diagnostics,
    })
}

async fn remove_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {e}", partial.display()),
    }
}

fn tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(DIAGNOSTIC_TAIL);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

/// Render an argument list the way it would be typed into a shell.
fn shell_words(args: &[String]) -> String {
    args.iter()
        .map(|a| {
            if a.contains(' ') {
                format!("\"{a}\"")
            } else {
                a.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
