//! gitclient - typed git subcommand client and repository state classifier
//!
//! A small layer over the `git` binary for tools that drive a repository
//! through discrete subcommands. The client binds to one repository root
//! and passes it explicitly to every invocation; nothing here mutates the
//! process working directory. Failures are typed and propagated, never
//! retried.
//!
//! # Modules
//!
//! - [`client`] - the [`GitClient`] subcommand wrapper
//! - [`state`] - the [`RepoState`] classifier

pub mod client;
pub mod state;

pub use client::{GitClient, GitError};
pub use state::{RepoState, classify};
