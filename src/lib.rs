//! genie-stream: streaming chat client for the Genie business advisor
//!
//! Decodes the chat functions' line-delimited event streams into incremental
//! assistant turns with trust metadata, and drives whole prompt/response
//! exchanges against the backend.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::too_many_lines)]

pub mod cli;
pub mod config;
pub mod error;
pub mod messages;
pub mod services;
pub mod streaming;
pub mod trust;

// Re-exports for convenience
pub use error::{GenieError, Result};
