//! stm-core: shared error type, configuration, rate ladder and media types.
//!
//! This crate is the foundational dependency for all other stm-* crates.
//! It holds the pieces that every layer agrees on: the unified [`Error`],
//! the JSON [`config::Config`], the adaptive-bitrate [`rates::RateLadder`]
//! and the probed [`media::SourceMetadata`] of a source file.

pub mod config;
pub mod error;
pub mod media;
pub mod rates;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use media::{Resolution, SourceMetadata};
pub use rates::{RateLadder, RateProfile};
