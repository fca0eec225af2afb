//! # rankpool Common Library
//!
//! Shared code for the rankpool survey services including:
//! - Error taxonomy (allocation, store contention, configuration)
//! - Configuration loading and validation
//! - Database initialization (claims ledger and assignment tables)
//! - Session token type

pub mod config;
pub mod db;
pub mod error;
pub mod session;

pub use error::{Error, Result};
pub use session::SessionId;
