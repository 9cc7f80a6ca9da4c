// Copyright 2025 Cowboy AI, LLC.

//! Identifier types for workflow instances

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Subject - the unique identifier of one workflow instance
///
/// The subject is also the correlation key: every response addressed to a
/// workflow carries its subject, and nested workflows remember their parent's
/// subject to route their terminal event back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Subject(String);

impl Subject {
    /// Create a new random subject
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the subject as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Subject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Subject {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Subject {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<Uuid> for Subject {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
