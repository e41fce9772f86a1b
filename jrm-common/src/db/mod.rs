//! Database access layer
//!
//! Provides connection initialization, schema creation, and settings access.

pub mod init;
pub mod settings;
