//! CLI command implementations.

pub mod backup;
pub mod break_lock;
pub mod create;
pub mod info;
pub mod list;
pub mod open;
pub mod remove;
pub mod rename;
