//! Command implementations for the CLI
//!
//! - start: Run the sample server with capture installed
//! - config: Configuration display and validation
//! - entries: List, show and clear captured requests

pub mod config;
pub mod entries;
pub mod start;
