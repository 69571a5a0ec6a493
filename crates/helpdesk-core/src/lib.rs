//! Shared data model, error type, and configuration for the support
//! dialogue system.

pub mod config;
pub mod error;
pub mod types;

pub use config::HelpdeskConfig;
pub use error::{HelpdeskError, Result};
pub use types::*;
