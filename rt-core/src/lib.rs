//! Realtime link core - foundation types shared by the socket client and the CLI.
//!
//! This crate provides:
//! - Application configuration (server address, credential, realtime tuning)
//! - The unified error type
//! - Structured logging with tracing
//! - Platform data/config directories
//! - Wire protocol constants

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod platform;

// Re-export commonly used items at the crate root
pub use config::AppConfig;
pub use error::{RtError, RtResult};
pub use logging::init_logging;
pub use platform::Platform;
