use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Opaque identifier issued by the remote worker for one scan job.
///
/// The client never interprets the contents; it only compares, persists and
/// echoes the id back in status requests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Build an id, rejecting blank input.
    pub fn new(raw: impl Into<String>) -> Result<Self, ModelError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelError::EmptyJobId);
        }
        if trimmed.len() == raw.len() {
            Ok(JobId(raw))
        } else {
            Ok(JobId(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl FromStr for JobId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobId::new(s)
    }
}

impl TryFrom<String> for JobId {
    type Error = ModelError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        JobId::new(raw)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.into_inner()
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
