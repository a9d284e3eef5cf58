//! Generator seam

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a generator
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("no template named '{name}' under {}", .root.display())]
    NoTemplate { name: String, root: PathBuf },

    #[error("failed to render {}: {reason}", .path.display())]
    Render { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One generation request
///
/// Carries the full invocation contract: generator kind, optional version,
/// unit name, template root, and output directory.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Generator kind (template name)
    pub kind: String,
    /// Requested generator version, if any
    pub version: Option<String>,
    /// Name of the unit being materialized
    pub unit_name: String,
    /// Directory holding template trees
    pub template_root: PathBuf,
    /// Directory the unit's files are written into
    pub output_dir: PathBuf,
}

impl GenerateRequest {
    /// The version-qualified template name: `<kind>` or `<kind>@<version>`
    pub fn qualified_name(&self) -> String {
        match &self.version {
            Some(version) => format!("{}@{}", self.kind, version),
            None => self.kind.clone(),
        }
    }
}

/// What a generation run produced
///
/// `files_written` of 0 is a legitimate success; failure is signalled
/// through the error channel, never by an empty report.
#[derive(Debug, Clone)]
pub struct GenerateReport {
    /// Number of files materialized into the output directory
    pub files_written: usize,
}

/// A generator the engine can invoke
///
/// Implementations must be idempotent given unchanged inputs.
#[async_trait]
pub trait Generate: Send + Sync {
    /// Whether a template exists for the request's kind and version
    async fn available(&self, request: &GenerateRequest) -> bool;

    /// Materialize the unit's files into the request's output directory
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateReport, GeneratorError>;
}
