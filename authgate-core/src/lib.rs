//! Authgate Core - shared foundation for the authgate identity system
//!
//! Defines the error model, event model, configuration, and logging setup
//! used by the higher-level crates.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use logging::*;

// Re-export commonly used external types
pub use tokio;
pub use tracing;
