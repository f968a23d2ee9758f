//! HTTP API module.
//!
//! Exposes the terminal WebSocket, the one-shot evaluation endpoint and a
//! health check.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
