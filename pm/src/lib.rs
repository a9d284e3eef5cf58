//! projmaker - re-runnable project scaffolding reconciled through git
//!
//! projmaker (`pm`) generates named units from templates inside a git
//! repository and can regenerate them later, even after a human has
//! hand-edited the generated tree. Reconciliation rides on git itself:
//! the fresh output is committed on an ephemeral base branch and the
//! user's accumulated edits are replayed on top with a rebase. A conflict
//! suspends the update; the ephemeral branches plus a JSON record in the
//! work branch's description are the only durable state, and
//! `pm continue` resumes from them.
//!
//! # Modules
//!
//! - [`engine`] - the unit lifecycle engine (create / update / continue)
//! - [`generator`] - the template generator seam and production renderer
//! - [`metadata`] - unit metadata file and in-flight update record
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod engine;
pub mod generator;
pub mod metadata;

// Re-export commonly used types
pub use config::Config;
pub use engine::{
    BRANCH_PREFIX, CreateOutcome, EngineError, UnitEngine, UpdateOutcome, creation_tag, temp_branch, work_branch,
};
pub use generator::{Generate, GenerateReport, GenerateRequest, GeneratorError, TemplateGenerator};
pub use metadata::{UNIT_INFO_FILE, UnitInfo, UpdateRecord};
