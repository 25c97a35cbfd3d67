//! Shared error definitions and utilities used across all mcp-probe crates.

pub mod error;

pub use error::{Error, FromMessage, ProbeError, Result};
