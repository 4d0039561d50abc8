//! # stm-av
//!
//! External tool management, probing and segment encoding for servetome.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for short-lived external processes.
//! - **Metadata probing** ([`MetadataProbe`], [`FfprobeProbe`]) -- duration,
//!   frame size and descriptive tags of a source file.
//! - **Segment encoding** ([`Encoder`], [`EncodeJob`]) -- one killable ffmpeg
//!   run per (rate, segment) with atomic publication of the output.
//! - **Thumbnails** ([`extract_thumbnail`]) -- a small JPEG preview frame.

pub mod command;
pub mod encode;
pub mod probe;
pub mod thumbnail;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use encode::{EncodeError, EncodeJob, EncodeRequest, EncodeResult, Encoder};
pub use probe::{FfprobeProbe, MetadataProbe};
pub use thumbnail::extract_thumbnail;
pub use tools::{ToolInfo, ToolRegistry};
