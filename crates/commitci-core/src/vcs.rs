//! Version-control trait.

use async_trait::async_trait;
use std::path::Path;

use crate::Result;

#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Bring the repository at `dir` to the latest state of `branch`.
    ///
    /// The local branch is reset to the remote one, so a reused checkout
    /// never builds a previous tip. When `revision` is given the checkout
    /// ends on that commit. Failures are reported as `Error::Checkout`.
    async fn checkout(&self, dir: &Path, branch: &str, revision: Option<&str>) -> Result<()>;

    /// Author email of the commit currently checked out at `dir`.
    async fn current_commit_author_email(&self, dir: &Path) -> Result<String>;

    /// Full hash of the commit currently checked out at `dir`.
    async fn head_revision(&self, dir: &Path) -> Result<String>;
}
