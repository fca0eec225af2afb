//! Utility modules for rankpool-alloc

pub mod db_retry;
pub mod transaction;

pub use db_retry::retry_on_lock;
pub use transaction::{begin_immediate, ImmediateTransaction};
