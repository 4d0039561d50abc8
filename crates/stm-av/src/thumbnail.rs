//! Preview frame extraction.

use std::path::Path;
use std::time::Duration;

use crate::command::ToolCommand;

/// Seek position of the preview frame, in seconds.
const THUMBNAIL_OFFSET_SECS: u32 = 15;
const THUMBNAIL_WIDTH: u32 = 108;

/// Grab a single small JPEG frame from `file`.
///
/// # Errors
///
/// Returns [`stm_core::Error::Tool`] if ffmpeg cannot be spawned, exits
/// unsuccessfully or produces no image.
pub async fn extract_thumbnail(ffmpeg: &Path, file: &Path) -> stm_core::Result<Vec<u8>> {
    let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
    cmd.args(["-y", "-noaccurate_seek", "-ss"]);
    cmd.arg(THUMBNAIL_OFFSET_SECS.to_string());
    cmd.arg("-i");
    cmd.arg(file.to_string_lossy().as_ref());
    cmd.args(["-frames:v", "1", "-r", "1", "-filter"]);
    cmd.arg(format!("scale=width={THUMBNAIL_WIDTH}:height=-1"));
    cmd.args(["-f", "image2", "-"]);
    cmd.timeout(Duration::from_secs(30));

    let output = cmd.execute().await?;
    if output.stdout.is_empty() {
        return Err(stm_core::Error::tool(
            "ffmpeg",
            format!("no thumbnail produced for {}", file.display()),
        ));
    }

    tracing::debug!(
        file = %file.display(),
        bytes = output.stdout.len(),
        "Extracted thumbnail"
    );
    Ok(output.stdout)
}
