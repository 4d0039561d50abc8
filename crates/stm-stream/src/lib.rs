//! stm-stream: on-demand HLS sessions for servetome.
//!
//! - [`hls`] -- playlist data types and M3U8 rendering.
//! - [`playlist`] -- master and per-rate playlists of a session.
//! - [`segment`] -- where segment files live on disk.
//! - [`session`] -- the per-file scheduler that runs, joins, kills and
//!   prefetches encode jobs.
//! - [`registry`] -- the process-wide key to session table.

pub mod hls;
pub mod playlist;
pub mod registry;
pub mod segment;
pub mod session;

pub use registry::{cookieify, SessionRegistry};
pub use segment::SegmentStore;
pub use session::{SegmentOutcome, Session, SessionSettings};
