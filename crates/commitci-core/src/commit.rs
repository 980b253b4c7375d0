//! The values a push event carries into the orchestrator.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One triggering commit.
///
/// The hash and description may be unknown at trigger time; downstream code
/// must treat their absence as normal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDescriptor {
    pub hash: Option<String>,
    pub branch: String,
    pub description: Option<String>,
}

impl CommitDescriptor {
    pub fn new(
        branch: impl Into<String>,
        hash: Option<String>,
        description: Option<String>,
    ) -> Result<Self> {
        let branch = branch.into();
        if branch.trim().is_empty() {
            return Err(Error::Configuration("commit branch must not be empty".into()));
        }
        Ok(Self {
            hash: hash.filter(|h| !h.trim().is_empty()),
            branch,
            description: description.filter(|d| !d.trim().is_empty()),
        })
    }

    /// Branch only, hash and description unknown.
    pub fn for_branch(branch: impl Into<String>) -> Result<Self> {
        Self::new(branch, None, None)
    }
}

/// Which fork and branch of the support code remote jobs should fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSource {
    pub account: String,
    pub branch: String,
}

impl PlatformSource {
    pub fn new(account: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            branch: branch.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_branch_rejected() {
        let err = CommitDescriptor::for_branch("  ").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_absent_fields_allowed() {
        let commit = CommitDescriptor::for_branch("main").unwrap();
        assert_eq!(commit.branch, "main");
        assert!(commit.hash.is_none());
        assert!(commit.description.is_none());
    }

    #[test]
    fn test_blank_optional_fields_become_absent() {
        let commit =
            CommitDescriptor::new("main", Some(String::new()), Some("  ".to_string())).unwrap();
        assert!(commit.hash.is_none());
        assert!(commit.description.is_none());
    }
}
