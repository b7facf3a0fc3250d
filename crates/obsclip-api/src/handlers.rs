//! Request handlers.

pub mod health;
pub mod marker;
pub mod status;

pub use health::*;
pub use marker::*;
pub use status::*;

use crate::error::ApiError;

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
