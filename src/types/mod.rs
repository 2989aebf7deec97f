// ABOUTME: Validated domain types shared across the sequencer.
// ABOUTME: Service names and git refs are checked once at the config boundary.

mod git_ref;
mod service_name;

pub use git_ref::{GitRef, GitRefError};
pub use service_name::{ServiceName, ServiceNameError};
