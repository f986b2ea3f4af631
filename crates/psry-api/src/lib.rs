//! psry API Library
//!
//! HTTP handlers and application setup for uploading images and reading their processing
//! records.

pub mod error;
mod handlers;
pub mod setup;
pub mod state;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
