// ABOUTME: Library root for deckhand - exposes the deployment engine for the CLI and tests.
// ABOUTME: The main binary is in main.rs.

pub mod build;
pub mod compose;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod exec;
pub mod health;
pub mod output;
pub mod patch;
pub mod services;
pub mod ssh;
pub mod sync;
pub mod types;
