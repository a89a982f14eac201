//! Core utilities, errors, logging, and input validation

pub mod error;
pub mod logging;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use error::{AppError, AppResult};
pub use logging::{init_logger, log_extractor_configuration};
