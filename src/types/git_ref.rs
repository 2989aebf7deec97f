// ABOUTME: Git reference validation for branch, tag, and commit names.
// ABOUTME: Rejects anything git would refuse or a shell would interpret.

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GitRefError {
    #[error("git ref cannot be empty")]
    Empty,

    #[error("git ref cannot start with '-'")]
    LeadingDash,

    #[error("git ref cannot contain '..'")]
    DoubleDot,

    #[error("git ref cannot end with '/', '.' or '.lock'")]
    BadSuffix,

    #[error("invalid character in git ref: '{0}'")]
    InvalidChar(char),
}

/// A branch, tag, or commit the source tree should be brought to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GitRef(String);

impl GitRef {
    pub fn new(value: &str) -> Result<Self, GitRefError> {
        if value.is_empty() {
            return Err(GitRefError::Empty);
        }
        if value.starts_with('-') {
            return Err(GitRefError::LeadingDash);
        }
        if value.contains("..") {
            return Err(GitRefError::DoubleDot);
        }
        if value.ends_with('/') || value.ends_with('.') || value.ends_with(".lock") {
            return Err(GitRefError::BadSuffix);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')))
        {
            return Err(GitRefError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GitRef {
    fn default() -> Self {
        GitRef("main".to_string())
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for GitRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
