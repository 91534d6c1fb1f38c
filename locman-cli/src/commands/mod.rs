//! CLI command implementations.
//!
//! - [`config`] - Show the effective configuration
//! - [`resolve`] - Forward and reverse lookups
//! - [`watch`] - Replay a location track through the manager

pub mod common;
pub mod config;
pub mod resolve;
pub mod watch;
