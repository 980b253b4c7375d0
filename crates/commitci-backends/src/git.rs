//! Git version-control backend.

use async_trait::async_trait;
use commitci_core::{Error, Result, VersionControl};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::process::{self, CommandOutput};

/// Service for Git operations on component checkouts.
pub struct GitVersionControl {
    timeout: Duration,
}

impl Default for GitVersionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl GitVersionControl {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(300),
        }
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        process::run("git", &args, Some(dir), self.timeout)
            .await
            .map_err(|e| Error::Internal(e.to_string()))
    }

    async fn git_stdout(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let output = self.git(dir, args).await?;
        if !output.success {
            return Err(Error::Internal(format!(
                "git {} failed: {}",
                args.join(" "),
                output.stderr.trim()
            )));
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Run a git step of a checkout, reporting failure as `Error::Checkout`
    /// with the step's own stderr.
    async fn checkout_step(&self, dir: &Path, args: &[&str], what: &str) -> Result<()> {
        let output = self
            .git(dir, args)
            .await
            .map_err(|e| Error::Checkout(e.to_string()))?;
        if output.success {
            Ok(())
        } else {
            Err(Error::Checkout(format!("{}: {}", what, output.stderr.trim())))
        }
    }
}

#[async_trait]
impl VersionControl for GitVersionControl {
    async fn checkout(&self, dir: &Path, branch: &str, revision: Option<&str>) -> Result<()> {
        if !dir.is_dir() {
            return Err(Error::Checkout(format!(
                "component checkout {} does not exist",
                dir.display()
            )));
        }

        info!(dir = %dir.display(), branch = %branch, revision = ?revision, "Checking out branch");

        self.checkout_step(dir, &["fetch", "origin"], "git fetch origin failed")
            .await?;

        // Reset the local branch to the fetched tip; a reused workspace keeps
        // the branch from an earlier run.
        let remote = format!("origin/{}", branch);
        self.checkout_step(
            dir,
            &["checkout", "-f", "-B", branch, "--track", &remote],
            &format!("cannot check out branch '{}'", branch),
        )
        .await?;

        if let Some(revision) = revision {
            self.checkout_step(
                dir,
                &["reset", "--hard", revision],
                &format!("cannot check out commit {} of '{}'", revision, branch),
            )
            .await?;
        }

        debug!(branch = %branch, "Branch checked out");
        Ok(())
    }

    async fn current_commit_author_email(&self, dir: &Path) -> Result<String> {
        self.git_stdout(dir, &["log", "-1", "--format=%ae"]).await
    }

    async fn head_revision(&self, dir: &Path) -> Result<String> {
        self.git_stdout(dir, &["rev-parse", "HEAD"]).await
    }
}


/// Integration tests that require a `git` binary.
/// Run with: cargo test -- --ignored
#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    fn commit_as(dir: &Path, email: &str, content: &str) -> String {
        std::fs::write(dir.join("demo.spec"), content).unwrap();
        git(dir, &["add", "demo.spec"]);
        git(
            dir,
            &[
                "-c",
                &format!("user.email={}", email),
                "-c",
                "user.name=Packager",
                "commit",
                "-q",
                "-m",
                content,
            ],
        );
        git(dir, &["rev-parse", "HEAD"])
    }

    /// An upstream repository with `main` and `rawhide`, and a clone of it.
    fn upstream_and_clone() -> (tempfile::TempDir, tempfile::TempDir) {
        let upstream = tempfile::tempdir().unwrap();
        git(upstream.path(), &["init", "-q", "-b", "main"]);
        commit_as(upstream.path(), "old@example.org", "Name: demo\n");
        git(upstream.path(), &["branch", "rawhide"]);

        let workspace = tempfile::tempdir().unwrap();
        let source = upstream.path().to_string_lossy().to_string();
        git(workspace.path(), &["clone", "-q", &source, "."]);
        (upstream, workspace)
    }

    #[tokio::test]
    #[ignore]
    async fn test_checkout_follows_later_pushes() {
        let (upstream, workspace) = upstream_and_clone();
        let dir = workspace.path();
        let vcs = GitVersionControl::new();

        vcs.checkout(dir, "main", None).await.unwrap();
        assert_eq!(
            vcs.head_revision(dir).await.unwrap(),
            git(upstream.path(), &["rev-parse", "HEAD"])
        );

        // Second push; the job fetches it and leaves HEAD detached.
        let pushed = commit_as(upstream.path(), "new@example.org", "Version: 2\n");
        git(dir, &["fetch", "-q", "origin"]);
        git(dir, &["checkout", "-q", "--detach", "origin/main"]);

        vcs.checkout(dir, "main", Some(&pushed)).await.unwrap();
        assert_eq!(vcs.head_revision(dir).await.unwrap(), pushed);
        assert_eq!(
            vcs.current_commit_author_email(dir).await.unwrap(),
            "new@example.org"
        );

        let latest = commit_as(upstream.path(), "third@example.org", "Version: 3\n");
        vcs.checkout(dir, "main", None).await.unwrap();
        assert_eq!(vcs.head_revision(dir).await.unwrap(), latest);
    }

    #[tokio::test]
    #[ignore]
    async fn test_checkout_tracks_remote_branch() {
        let (_upstream, workspace) = upstream_and_clone();
        let dir = workspace.path();
        let vcs = GitVersionControl::new();

        vcs.checkout(dir, "rawhide", None).await.unwrap();
        assert_eq!(
            git(dir, &["rev-parse", "--abbrev-ref", "rawhide@{upstream}"]),
            "origin/rawhide"
        );
        assert_eq!(
            vcs.current_commit_author_email(dir).await.unwrap(),
            "old@example.org"
        );
    }

    #[tokio::test]
    #[ignore]
    async fn test_checkout_unknown_branch_fails() {
        let (_upstream, workspace) = upstream_and_clone();
        let vcs = GitVersionControl::new();

        let err = vcs
            .checkout(workspace.path(), "feature-x", None)
            .await
            .unwrap_err();
        match err {
            Error::Checkout(msg) => assert!(msg.contains("origin/feature-x"), "{}", msg),
            other => panic!("expected checkout error, got {:?}", other),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_checkout_unknown_revision_fails() {
        let (_upstream, workspace) = upstream_and_clone();
        let vcs = GitVersionControl::new();

        let err = vcs
            .checkout(workspace.path(), "main", Some("0000000000000000000000000000000000000000"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Checkout(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn test_checkout_without_remote_fails() {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q", "-b", "main"]);
        commit_as(dir.path(), "old@example.org", "Name: demo\n");
        let vcs = GitVersionControl::new();

        let err = vcs.checkout(dir.path(), "main", None).await.unwrap_err();
        assert!(matches!(err, Error::Checkout(_)));
    }
}
