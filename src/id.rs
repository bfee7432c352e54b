//! Process Identity
//!
//! Every participant in an election is tagged with a process identity:
//! an opaque token generated once at startup from a random 128-bit UUID.
//! The same token is written into claims this process makes and is used
//! to recognise those claims when they are read back.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique identity of one participating process
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    /// Generate a fresh identity (random v4 UUID)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing token
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the token as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether a claim holder refers to this process
    pub fn matches(&self, holder: &str) -> bool {
        self.0 == holder
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::generate()
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ProcessId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<ProcessId> for String {
    fn from(id: ProcessId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: HashSet<ProcessId> = (0..1000).map(|_| ProcessId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_generated_id_is_uuid_text() {
        let id = ProcessId::generate();
        assert_eq!(id.as_str().len(), 36);
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_matches_holder() {
        let id = ProcessId::from_raw("P1");
        assert!(id.matches("P1"));
        assert!(!id.matches("P2"));
        assert!(!id.matches(""));
    }
}
