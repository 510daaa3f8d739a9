//! HTTP surface: JSON endpoints plus NDJSON progress streams.

pub mod api;
pub mod server;

pub use api::{ApiError, AppState, SharedState, api_router};
pub use server::{build_router, start_server};
