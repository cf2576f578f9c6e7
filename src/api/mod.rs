//! HTTP surface: enqueue, status, and output delivery.

pub mod error;
pub mod fingerprint;
pub mod models;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{build_router, serve, AppState};
