//! Handlebars template generator
//!
//! Renders a template tree into a unit directory. Files ending in `.hbs`
//! go through handlebars with the unit name in context and lose the
//! suffix; everything else is copied verbatim. `{{name}}` in file and
//! directory names is substituted as well.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use handlebars::Handlebars;
use serde_json::json;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::traits::{Generate, GenerateReport, GenerateRequest, GeneratorError};

/// Suffix marking files that are rendered rather than copied
const TEMPLATE_SUFFIX: &str = ".hbs";

/// Placeholder substituted inside file and directory names
const NAME_PLACEHOLDER: &str = "{{name}}";

/// Production generator rendering handlebars template trees
#[derive(Debug, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the template directory for a request
    ///
    /// The version-qualified directory wins; the bare kind is the fallback.
    fn resolve(&self, request: &GenerateRequest) -> Option<PathBuf> {
        let qualified = request.template_root.join(request.qualified_name());
        if qualified.is_dir() {
            return Some(qualified);
        }
        let bare = request.template_root.join(&request.kind);
        if bare.is_dir() {
            return Some(bare);
        }
        None
    }

    /// Map a path relative to the template tree onto the output directory
    fn target_path(output_dir: &Path, rel: &Path, unit_name: &str) -> PathBuf {
        let mut target = output_dir.to_path_buf();
        for component in rel.components() {
            let segment = component.as_os_str().to_string_lossy();
            target.push(segment.replace(NAME_PLACEHOLDER, unit_name));
        }
        target
    }
}

#[async_trait]
impl Generate for TemplateGenerator {
    async fn available(&self, request: &GenerateRequest) -> bool {
        self.resolve(request).is_some()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateReport, GeneratorError> {
        let template_dir = self.resolve(request).ok_or_else(|| GeneratorError::NoTemplate {
            name: request.qualified_name(),
            root: request.template_root.clone(),
        })?;

        let mut hbs = Handlebars::new();
        hbs.set_strict_mode(true);
        let context = json!({ "name": request.unit_name });

        info!(
            template = %template_dir.display(),
            output = %request.output_dir.display(),
            "generating unit files"
        );

        let mut files_written = 0;
        for entry in WalkDir::new(&template_dir) {
            let entry = entry.map_err(std::io::Error::from)?;
            let rel = match entry.path().strip_prefix(&template_dir) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel,
                _ => continue,
            };
            let target = Self::target_path(&request.output_dir, rel, &request.unit_name);

            if entry.file_type().is_dir() {
                tokio::fs::create_dir_all(&target).await?;
                continue;
            }
            if !entry.file_type().is_file() {
                debug!(path = %entry.path().display(), "skipping non-regular template entry");
                continue;
            }

            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let target_name = target.to_string_lossy();
            if let Some(stripped) = target_name.strip_suffix(TEMPLATE_SUFFIX) {
                let template = tokio::fs::read_to_string(entry.path()).await?;
                let rendered = hbs
                    .render_template(&template, &context)
                    .map_err(|e| GeneratorError::Render {
                        path: entry.path().to_path_buf(),
                        reason: e.to_string(),
                    })?;
                tokio::fs::write(PathBuf::from(stripped), rendered).await?;
            } else {
                tokio::fs::copy(entry.path(), &target).await?;
            }
            files_written += 1;
        }

        debug!(files_written, "generation finished");
        Ok(GenerateReport { files_written })
    }
}
