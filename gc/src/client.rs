//! Git subcommand client
//!
//! Wraps the `git` binary for one bound repository root. Every call runs a
//! discrete subcommand with `current_dir` set to the root, so the client is
//! reusable across sessions without touching the process working directory.

use std::path::{Path, PathBuf};
use std::process::Output;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Errors surfaced by [`GitClient`] operations
#[derive(Debug, Error)]
pub enum GitError {
    #[error("no repository root bound")]
    NotConnected,

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("{command} produced unexpected output: {output}")]
    UnexpectedOutput { command: String, output: String },

    #[error("failed to run git: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GitError>;

/// Client for issuing git subcommands against one repository root
#[derive(Debug, Default)]
pub struct GitClient {
    root: Option<PathBuf>,
}

impl GitClient {
    /// Create an unbound client; every operation fails until [`connect`](Self::connect)
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Bind the client to a repository root
    pub fn connect(&mut self, root: impl Into<PathBuf>) {
        let root = root.into();
        debug!(?root, "binding git client");
        self.root = Some(root);
    }

    /// Whether a repository root is bound
    pub fn is_connected(&self) -> bool {
        self.root.is_some()
    }

    /// The bound repository root
    pub fn root(&self) -> Result<&Path> {
        self.root.as_deref().ok_or(GitError::NotConnected)
    }

    /// Run a subcommand, returning the raw output without checking the exit status
    async fn output(&self, args: &[&str]) -> Result<Output> {
        let root = self.root()?;
        debug!(?args, "git");
        let output = Command::new("git").args(args).current_dir(root).output().await?;
        Ok(output)
    }

    /// Run a subcommand, failing with the captured stderr on a nonzero exit
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Whether the bound root is inside a git repository
    pub async fn is_repository(&self) -> Result<bool> {
        let output = self.output(&["status", "--porcelain"]).await?;
        Ok(output.status.success())
    }

    /// Porcelain status entries, non-empty lines only
    pub async fn changed_paths(&self) -> Result<Vec<String>> {
        let stdout = self.run(&["status", "--porcelain"]).await?;
        Ok(stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// The checked-out branch name, or `None` when HEAD is unborn or detached
    pub async fn current_branch(&self) -> Result<Option<String>> {
        let output = self.output(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        if !output.status.success() {
            return Ok(None);
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if name.is_empty() || name == "HEAD" {
            return Ok(None);
        }
        Ok(Some(name))
    }

    /// Whether HEAD resolves to a commit
    pub async fn head_is_resolvable(&self) -> Result<bool> {
        let output = self.output(&["rev-parse", "--verify", "-q", "HEAD"]).await?;
        Ok(output.status.success())
    }

    /// Number of commits reachable from HEAD; 0, not an error, when HEAD is unborn
    pub async fn commit_count(&self) -> Result<u64> {
        if !self.head_is_resolvable().await? {
            return Ok(0);
        }
        let stdout = self.run(&["rev-list", "--count", "HEAD"]).await?;
        stdout.trim().parse().map_err(|_| GitError::UnexpectedOutput {
            command: "git rev-list --count HEAD".to_string(),
            output: stdout.trim().to_string(),
        })
    }

    /// The commit hash a ref points at
    pub async fn resolve_ref(&self, reference: &str) -> Result<String> {
        let stdout = self.run(&["rev-parse", "--verify", reference]).await?;
        Ok(stdout.trim().to_string())
    }

    /// Stash all working tree changes except those under `exclude`
    ///
    /// Returns whether anything was actually stashed, judged by the
    /// stash-list depth before and after.
    pub async fn stash_push_excluding(&self, exclude: &Path) -> Result<bool> {
        let rel = self.relative_to_root(exclude)?;
        let exclude_spec = format!(":(exclude){}", rel.display());
        let before = self.stash_depth().await?;
        let output = self
            .output(&[
                "stash",
                "push",
                "--include-untracked",
                "-m",
                "pm auto-stash",
                "--",
                ".",
                &exclude_spec,
            ])
            .await?;
        let after = self.stash_depth().await?;
        if after > before {
            return Ok(true);
        }
        // The exit code is unreliable when the pathspec matches nothing
        if !output.status.success() {
            debug!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "stash push stashed nothing"
            );
        }
        Ok(false)
    }

    /// Pop the most recent stash entry
    pub async fn stash_pop(&self) -> Result<()> {
        self.run(&["stash", "pop"]).await?;
        Ok(())
    }

    async fn stash_depth(&self) -> Result<usize> {
        let stdout = self.run(&["stash", "list"]).await?;
        Ok(stdout.lines().filter(|line| !line.trim().is_empty()).count())
    }

    /// Create a branch at the given start point without checking it out
    pub async fn create_branch(&self, name: &str, start_point: &str) -> Result<()> {
        self.run(&["branch", name, start_point]).await?;
        Ok(())
    }

    /// Delete a branch, merged or not
    pub async fn delete_branch(&self, name: &str) -> Result<()> {
        self.run(&["branch", "-D", name]).await?;
        Ok(())
    }

    /// Check out a branch, tag, or commit
    pub async fn checkout(&self, reference: &str) -> Result<()> {
        self.run(&["checkout", reference]).await?;
        Ok(())
    }

    /// Check out one path from another branch into the working tree and index
    pub async fn checkout_path_from_branch(&self, path: &Path, branch: &str) -> Result<()> {
        let rel = self.relative_to_root(path)?;
        let rel = rel.to_string_lossy();
        self.run(&["checkout", branch, "--", &rel]).await?;
        Ok(())
    }

    /// Create a lightweight tag at HEAD
    pub async fn create_tag(&self, name: &str) -> Result<()> {
        self.run(&["tag", name]).await?;
        Ok(())
    }

    /// Move an existing tag to a new target; atomic from the caller's view
    pub async fn move_tag(&self, name: &str, target: &str) -> Result<()> {
        self.run(&["tag", "-f", name, target]).await?;
        Ok(())
    }

    /// Tags matching the given name exactly (empty when absent)
    pub async fn tags_matching(&self, name: &str) -> Result<Vec<String>> {
        let stdout = self.run(&["tag", "-l", name]).await?;
        Ok(stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Store free-form text as a branch's description
    pub async fn set_branch_description(&self, branch: &str, text: &str) -> Result<()> {
        let key = format!("branch.{branch}.description");
        self.run(&["config", &key, text]).await?;
        Ok(())
    }

    /// A branch's description text; absence yields empty text, not an error
    pub async fn branch_description(&self, branch: &str) -> Result<String> {
        let key = format!("branch.{branch}.description");
        let output = self.output(&["config", "--get", &key]).await?;
        if !output.status.success() {
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    /// Whether a rebase, merge, or cherry-pick is in flight
    ///
    /// Queries the repository's operation metadata directly rather than
    /// probing with a side-effecting merge attempt.
    pub async fn operation_in_progress(&self) -> Result<bool> {
        let root = self.root()?.to_path_buf();
        for marker in ["rebase-merge", "rebase-apply", "MERGE_HEAD", "CHERRY_PICK_HEAD"] {
            let stdout = self.run(&["rev-parse", "--git-path", marker]).await?;
            let path = PathBuf::from(stdout.trim());
            let path = if path.is_absolute() { path } else { root.join(path) };
            if path.exists() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Replay the commit range `(from_point, branch]` onto `onto`
    ///
    /// A conflict leaves the repository mid-rebase; callers re-query the
    /// repository state to tell conflict failures from other failures.
    pub async fn rebase_onto_from_point(&self, branch: &str, from_point: &str, onto: &str) -> Result<()> {
        self.run(&["rebase", "--onto", onto, from_point, branch]).await?;
        Ok(())
    }

    /// Stage the given paths, additions and deletions alike
    pub async fn add(&self, paths: &[&Path]) -> Result<()> {
        let mut args = vec!["add".to_string(), "-A".to_string(), "--".to_string()];
        for path in paths {
            let rel = self.relative_to_root(path)?;
            args.push(rel.to_string_lossy().into_owned());
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args).await?;
        Ok(())
    }

    /// Commit staged changes
    pub async fn commit(&self, message: &str) -> Result<()> {
        self.run(&["commit", "-m", message]).await?;
        Ok(())
    }

    /// Commit even when nothing is staged
    pub async fn commit_allowing_empty(&self, message: &str) -> Result<()> {
        self.run(&["commit", "--allow-empty", "-m", message]).await?;
        Ok(())
    }

    /// Rewrite an absolute path relative to the bound root for use as a pathspec
    fn relative_to_root(&self, path: &Path) -> Result<PathBuf> {
        let root = self.root()?;
        match path.strip_prefix(root) {
            Ok(rel) if rel.as_os_str().is_empty() => Ok(PathBuf::from(".")),
            Ok(rel) => Ok(rel.to_path_buf()),
            Err(_) => Ok(path.to_path_buf()),
        }
    }
}
