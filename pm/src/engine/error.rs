//! Engine error types

use std::path::PathBuf;

use gitclient::{GitError, RepoState};
use thiserror::Error;

use crate::generator::GeneratorError;

/// Errors that can occur during a lifecycle operation
///
/// Everything here is user-actionable; the engine never retries and never
/// swallows a failure. `RebaseConflict` is the one non-fatal case: it
/// leaves a durable suspended state behind for `pm continue`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no generator template named '{name}' under {}", .root.display())]
    NoGenerator { name: String, root: PathBuf },

    #[error("{} is not inside a git repository", .path.display())]
    NotInGitRepo { path: PathBuf },

    #[error("already on projmaker branch '{branch}'; finish or abort the in-flight update first")]
    InPmBranch { branch: String },

    #[error("current branch '{branch}' is not a projmaker work branch")]
    NotInPmBranch { branch: String },

    #[error("creation tag '{tag}' already exists; the unit was created before")]
    TagExists { tag: String },

    #[error("output directory {} is not empty", .path.display())]
    OutputDirNotEmpty { path: PathBuf },

    #[error("unit directory {} does not exist", .path.display())]
    CantFindUnit { path: PathBuf },

    #[error("repository still {state} after stashing; commit or clean up by hand")]
    StashFailed { state: RepoState },

    #[error("{} is not a projmaker unit (missing or malformed {})", .path.display(), crate::metadata::UNIT_INFO_FILE)]
    NotProjmakerUnit { path: PathBuf },

    #[error("creation tag '{tag}' is missing; cannot locate the previous generation")]
    MissingCreationTag { tag: String },

    #[error("repository is {state}; commit your conflict resolution before continuing")]
    WorkdirNotClean { state: RepoState },

    #[error(
        "replaying your edits for unit '{unit}' hit conflicts; resolve them, `git add` the files, \
         run `git rebase --continue`, then run `pm continue` (unrelated changes stay stashed until then)"
    )]
    RebaseConflict { unit: String },

    #[error(
        "a rebase is still in progress; resolve the conflicts, stage the files, and run \
         `git rebase --continue` before rerunning `pm continue`"
    )]
    OperationStillInProgress,

    #[error("branch '{branch}' carries no usable update record")]
    BadUpdateRecord { branch: String },

    #[error("unexpected repository state: {0}")]
    UnexpectedState(String),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
