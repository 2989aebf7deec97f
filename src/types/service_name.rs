// ABOUTME: Compose service name validation.
// ABOUTME: Names are interpolated into shell lines, so the character set is restricted.

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceNameError {
    #[error("service name cannot be empty")]
    Empty,

    #[error("service name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("service name must start and end with a letter or digit")]
    BadBoundary,

    #[error("service name must be lowercase")]
    NotLowercase,

    #[error("invalid character in service name: '{0}'")]
    InvalidChar(char),
}

/// A docker-compose service name such as `backend` or `waha`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(value: &str) -> Result<Self, ServiceNameError> {
        if value.is_empty() {
            return Err(ServiceNameError::Empty);
        }

        if value.len() > 63 {
            return Err(ServiceNameError::TooLong);
        }

        let is_separator = |c: char| c == '-' || c == '_';
        if value.starts_with(is_separator) || value.ends_with(is_separator) {
            return Err(ServiceNameError::BadBoundary);
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(ServiceNameError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && !is_separator(c) {
                return Err(ServiceNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `db`, the usual name of the database service.
    pub(crate) fn default_datastore() -> Self {
        Self("db".to_string())
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ServiceName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_compose_style_names() {
        assert!(ServiceName::new("backend").is_ok());
        assert!(ServiceName::new("waha").is_ok());
        assert!(ServiceName::new("bot_router-2").is_ok());
    }

    #[test]
    fn rejects_separators_at_edges() {
        assert_eq!(
            ServiceName::new("-backend"),
            Err(ServiceNameError::BadBoundary)
        );
        assert_eq!(
            ServiceName::new("backend_"),
            Err(ServiceNameError::BadBoundary)
        );
    }

    #[test]
    fn rejects_shell_metacharacters() {
        assert_eq!(
            ServiceName::new("db;rm"),
            Err(ServiceNameError::InvalidChar(';'))
        );
        assert_eq!(
            ServiceName::new("a b"),
            Err(ServiceNameError::InvalidChar(' '))
        );
    }

    #[test]
    fn rejects_uppercase_and_length() {
        assert_eq!(
            ServiceName::new("Backend"),
            Err(ServiceNameError::NotLowercase)
        );
        assert_eq!(
            ServiceName::new(&"a".repeat(64)),
            Err(ServiceNameError::TooLong)
        );
    }
}
