//! Access to the coordinator's working copy.
//!
//! All mutation of the repository goes through [`Repository`], so the state
//! logic can be exercised against an in-memory double. [`GitRepository`] is
//! the production implementation, driving the `git` binary.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::tracing::prelude::*;
use crate::types::ObjectId;

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("failed to run git: {0}")]
    Io(#[from] std::io::Error),

    #[error("`git {args}` exited with {status}: {stderr}")]
    CommandFailed {
        args: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("`git {args}` timed out after {after:?}")]
    Timeout { args: String, after: Duration },

    #[error("`git {args}` printed unexpected output {output:?}")]
    InvalidOutput { args: String, output: String },
}

/// Result of pushing the local head upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// Upstream refused the update, normally because it moved first
    Rejected,
}

/// Operations the coordinator performs on its working copy.
///
/// Implementations are not required to be safe against concurrent callers;
/// the coordinator serializes all calls.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Root of the working tree.
    fn workdir(&self) -> &Path;

    /// Fetch from upstream and return the upstream branch head.
    async fn fetch(&self) -> Result<ObjectId, RepoError>;

    /// Hard-reset the working copy to the last fetched upstream head.
    async fn reset_to_upstream(&self) -> Result<(), RepoError>;

    /// Hard-reset the working copy and branch to `commit`.
    async fn reset_hard(&self, commit: &ObjectId) -> Result<(), RepoError>;

    async fn head(&self) -> Result<ObjectId, RepoError>;

    /// Write the index as a tree object and return its id.
    async fn write_tree(&self) -> Result<ObjectId, RepoError>;

    /// Store a raw commit body in the object database, returning the id the
    /// store computed for it.
    async fn write_commit(&self, body: &[u8]) -> Result<ObjectId, RepoError>;

    /// Push the local head to the upstream branch, fast-forward only.
    async fn push(&self) -> Result<PushOutcome, RepoError>;

    /// Stage `path` (relative to the working tree) for the next tree.
    async fn stage(&self, path: &Path) -> Result<(), RepoError>;
}

/// A working copy driven through the `git` command line.
#[derive(Debug, Clone)]
pub struct GitRepository {
    workdir: PathBuf,
    remote: String,
    branch: String,
    timeout: Duration,
}

impl GitRepository {
    pub fn new(
        workdir: impl Into<PathBuf>,
        remote: impl Into<String>,
        branch: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            workdir: workdir.into(),
            remote: remote.into(),
            branch: branch.into(),
            timeout,
        }
    }

    fn upstream_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    /// Run git with `args`, feeding `stdin` if given, bounded by the timeout.
    async fn output(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<Output, RepoError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.workdir)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = tokio::time::Instant::now();
        let run = async {
            let mut child = cmd.spawn()?;
            if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
                pipe.write_all(input).await?;
                // Dropping the pipe closes it so git sees EOF
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| RepoError::Timeout {
                args: args.join(" "),
                after: self.timeout,
            })??;

        trace!(
            args = %args.join(" "),
            status = %output.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "git"
        );
        Ok(output)
    }

    /// Run git and return trimmed stdout, failing on a non-zero exit.
    async fn run(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<String, RepoError> {
        let output = self.output(args, stdin).await?;
        if !output.status.success() {
            return Err(RepoError::CommandFailed {
                args: args.join(" "),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run_for_id(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<ObjectId, RepoError> {
        let stdout = self.run(args, stdin).await?;
        stdout.parse().map_err(|_| RepoError::InvalidOutput {
            args: args.join(" "),
            output: stdout,
        })
    }
}

#[async_trait]
impl Repository for GitRepository {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    async fn fetch(&self) -> Result<ObjectId, RepoError> {
        let started = tokio::time::Instant::now();
        self.run(&["fetch", "--quiet", &self.remote], None).await?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Fetch done");
        self.run_for_id(&["rev-parse", &self.upstream_ref()], None).await
    }

    async fn reset_to_upstream(&self) -> Result<(), RepoError> {
        self.run(&["reset", "--quiet", "--hard", &self.upstream_ref()], None)
            .await
            .map(drop)
    }

    async fn reset_hard(&self, commit: &ObjectId) -> Result<(), RepoError> {
        let commit = commit.to_string();
        self.run(&["reset", "--quiet", "--hard", &commit], None)
            .await
            .map(drop)
    }

    async fn head(&self) -> Result<ObjectId, RepoError> {
        self.run_for_id(&["rev-parse", "HEAD"], None).await
    }

    async fn write_tree(&self) -> Result<ObjectId, RepoError> {
        self.run_for_id(&["write-tree"], None).await
    }

    async fn write_commit(&self, body: &[u8]) -> Result<ObjectId, RepoError> {
        self.run_for_id(&["hash-object", "-t", "commit", "--stdin", "-w"], Some(body))
            .await
    }

    async fn push(&self) -> Result<PushOutcome, RepoError> {
        let refspec = format!("HEAD:refs/heads/{}", self.branch);
        let output = self
            .output(&["push", "--quiet", &self.remote, &refspec], None)
            .await?;
        if output.status.success() {
            Ok(PushOutcome::Accepted)
        } else {
            debug!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Push refused"
            );
            Ok(PushOutcome::Rejected)
        }
    }

    async fn stage(&self, path: &Path) -> Result<(), RepoError> {
        let path = path.to_string_lossy();
        self.run(&["add", "--", &path], None).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok()
    }

    fn commit_body(tree: &ObjectId, parent: Option<&ObjectId>, message: &str) -> Vec<u8> {
        let mut body = format!("tree {}\n", tree);
        if let Some(parent) = parent {
            body.push_str(&format!("parent {}\n", parent));
        }
        body.push_str("author T <t@example.com> 1700000000 +0000\n");
        body.push_str("committer T <t@example.com> 1700000000 +0000\n\n");
        body.push_str(message);
        body.into_bytes()
    }

    #[tokio::test]
    async fn test_git_repository_push_fast_forward_only() {
        if !git_available() {
            return;
        }

        let upstream = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        git(upstream.path(), &["init", "--quiet", "--bare"]);
        git(work.path(), &["init", "--quiet"]);
        git(
            work.path(),
            &["remote", "add", "origin", &upstream.path().to_string_lossy()],
        );

        let repo = GitRepository::new(work.path(), "origin", "master", Duration::from_secs(30));

        std::fs::write(work.path().join("LEDGER.txt"), "alice: 1\n").unwrap();
        repo.stage(Path::new("LEDGER.txt")).await.unwrap();
        let tree = repo.write_tree().await.unwrap();

        let root_body = commit_body(&tree, None, "root");
        let root = repo.write_commit(&root_body).await.unwrap();
        assert_eq!(root, ObjectId::for_object("commit", &root_body));

        repo.reset_hard(&root).await.unwrap();
        assert_eq!(repo.head().await.unwrap(), root);
        assert_eq!(repo.push().await.unwrap(), PushOutcome::Accepted);
        assert_eq!(repo.fetch().await.unwrap(), root);

        let first = repo
            .write_commit(&commit_body(&tree, Some(&root), "first"))
            .await
            .unwrap();
        repo.reset_hard(&first).await.unwrap();
        assert_eq!(repo.push().await.unwrap(), PushOutcome::Accepted);

        // A sibling of `first` is not a fast-forward
        let sibling = repo
            .write_commit(&commit_body(&tree, Some(&root), "sibling"))
            .await
            .unwrap();
        repo.reset_hard(&sibling).await.unwrap();
        assert_eq!(repo.push().await.unwrap(), PushOutcome::Rejected);

        assert_eq!(repo.fetch().await.unwrap(), first);
        repo.reset_to_upstream().await.unwrap();
        assert_eq!(repo.head().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_git_failure_is_reported() {
        if !git_available() {
            return;
        }

        let not_a_repo = TempDir::new().unwrap();
        let repo = GitRepository::new(not_a_repo.path(), "origin", "master", Duration::from_secs(30));
        assert!(matches!(
            repo.head().await,
            Err(RepoError::CommandFailed { .. })
        ));
    }
}
