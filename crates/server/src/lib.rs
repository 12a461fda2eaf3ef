//! HTTP surface for the ferry upload session service.

pub mod error;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod wire;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
