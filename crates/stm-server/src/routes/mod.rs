//! Route handlers.

pub mod library;
pub mod stream;

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}
