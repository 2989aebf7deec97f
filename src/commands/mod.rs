// ABOUTME: Command module aggregator for the deckhand CLI.
// ABOUTME: Re-exports deploy, verify, patch, and status command handlers.

mod deploy;
mod patch;
mod status;
mod target_connection;
mod verify;

pub use deploy::deploy;
pub use patch::patch;
pub use status::status;
pub use target_connection::load_config;
pub use verify::verify;
