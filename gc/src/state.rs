//! Repository state classification
//!
//! Derives a coarse repository state from fresh [`GitClient`] queries.
//! The result is never cached; callers reclassify after every mutating
//! call.

use tracing::debug;

use crate::client::{GitClient, GitError};

/// Coarse repository state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    /// No repository root bound
    Undefined,
    /// The bound root is not inside a git repository
    NonRepo,
    /// HEAD does not resolve to any commit
    NoCommits,
    /// A rebase, merge, or cherry-pick is in flight
    OperationInProgress,
    /// At least one changed path
    Dirty,
    /// None of the above
    Clean,
}

impl std::fmt::Display for RepoState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Undefined => "undefined",
            Self::NonRepo => "not a repository",
            Self::NoCommits => "no commits",
            Self::OperationInProgress => "operation in progress",
            Self::Dirty => "dirty",
            Self::Clean => "clean",
        };
        write!(f, "{}", name)
    }
}

/// Classify the repository behind `client`
///
/// Evaluated in strict priority order; the order is load-bearing, since a
/// mid-rebase repository also reports dirty paths.
pub async fn classify(client: &GitClient) -> Result<RepoState, GitError> {
    if !client.is_connected() {
        return Ok(RepoState::Undefined);
    }
    if !client.is_repository().await? {
        return Ok(RepoState::NonRepo);
    }
    if !client.head_is_resolvable().await? {
        return Ok(RepoState::NoCommits);
    }
    if client.operation_in_progress().await? {
        return Ok(RepoState::OperationInProgress);
    }
    let state = if client.changed_paths().await?.is_empty() {
        RepoState::Clean
    } else {
        RepoState::Dirty
    };
    debug!(%state, "classified repository");
    Ok(state)
}
