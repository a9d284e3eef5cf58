//! Unit lifecycle orchestration
//!
//! Drives create, update, and continue against one repository. The
//! workflow is multi-step and only partially durable: a rebase conflict
//! suspends an update, and the two ephemeral branches plus the update
//! record in the work branch's description are the only state that
//! survives a process restart. Everything else is reconstructed from
//! scratch on the next call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use gitclient::{GitClient, RepoState, classify};

use crate::config::Config;
use crate::generator::{Generate, GenerateRequest};
use crate::metadata::{MetadataError, RecordError, UnitInfo, UpdateRecord};

use super::error::EngineError;

type Result<T> = std::result::Result<T, EngineError>;

/// Reserved prefix marking branches owned by the engine
pub const BRANCH_PREFIX: &str = "pm-";

/// Tag marking the commit right after a unit's last generation
pub fn creation_tag(unit_name: &str) -> String {
    format!("pmAFTER_ADDING_{unit_name}")
}

/// Branch hosting the freshly regenerated base during an update
pub fn temp_branch(unit_name: &str) -> String {
    format!("pm-before-updating-{unit_name}")
}

/// Branch holding the user's edits being replayed during an update
pub fn work_branch(unit_name: &str) -> String {
    format!("pm-updating-{unit_name}")
}

/// Lower-case a name and strip separators, for directory matching
fn canonical_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Nearest ancestor of `start` (inclusive) containing a `.git` entry
pub fn find_enclosing_repo(start: &Path) -> Option<PathBuf> {
    let mut candidate = Some(start);
    while let Some(dir) = candidate {
        if dir.join(".git").exists() {
            return Some(dir.to_path_buf());
        }
        candidate = dir.parent();
    }
    None
}

/// Outcome of a successful create
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    /// Directory the unit was generated into
    pub unit_dir: PathBuf,
    /// Creation tag now marking HEAD
    pub tag: String,
}

/// Outcome of a successful update or continue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// New output committed; the creation tag moved to the new HEAD
    Updated,
    /// Regenerated output matched the committed tree; nothing touched
    NoChanges,
    /// The generator produced no output at all; the update was abandoned
    NothingGenerated,
}

/// Environment established by `prepare_environment`
struct Environment {
    unit_dir: PathBuf,
    /// Whether this call parked unrelated changes in the stash
    stashed: bool,
}

/// Everything finalize needs, whether reached directly or via continue
struct UpdateContext {
    record: UpdateRecord,
    unit_dir: PathBuf,
    stashed: bool,
}

/// The unit lifecycle engine
///
/// Holds the injected repository client and generator plus an explicit
/// working directory; the process-wide working directory is never
/// consulted or mutated.
pub struct UnitEngine {
    config: Config,
    client: GitClient,
    generator: Arc<dyn Generate>,
    workdir: PathBuf,
}

impl UnitEngine {
    pub fn new(config: Config, client: GitClient, generator: Arc<dyn Generate>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            client,
            generator,
            workdir: workdir.into(),
        }
    }

    /// Generate a new unit, commit it, and tag the result
    pub async fn create(&mut self, kind: &str, name: &str, version: Option<&str>) -> Result<CreateOutcome> {
        info!(%kind, %name, "creating unit");
        let env = self.prepare_environment(kind, name, version, true, false).await?;

        let request = self.generate_request(kind, name, version, &env.unit_dir);
        let report = self.generator.generate(&request).await?;
        debug!(files = report.files_written, "generator finished");

        UnitInfo {
            unit_type: kind.to_string(),
        }
        .save(&env.unit_dir)
        .await?;

        self.client.add(&[env.unit_dir.as_path()]).await?;
        self.client.commit(&format!("add unit {name}")).await?;
        if self.config.update.spacer_commit {
            self.client
                .commit_allowing_empty(&format!("unit {name} generated"))
                .await?;
        }

        if env.stashed {
            self.client.stash_pop().await?;
        }

        let tag = creation_tag(name);
        self.client.create_tag(&tag).await?;
        info!(%tag, "unit created");
        Ok(CreateOutcome {
            unit_dir: env.unit_dir,
            tag,
        })
    }

    /// Regenerate a unit and replay the user's edits on top
    ///
    /// A rebase conflict returns [`EngineError::RebaseConflict`] and leaves
    /// the temp branch, work branch, and update record in place; resume
    /// with [`continue_update`](Self::continue_update).
    pub async fn update(&mut self, name: Option<&str>, version: Option<&str>) -> Result<UpdateOutcome> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self
                .workdir
                .file_name()
                .map(|base| base.to_string_lossy().into_owned())
                .ok_or_else(|| EngineError::UnexpectedState("working directory has no base name".to_string()))?,
        };
        info!(%name, "updating unit");

        let unit_dir = self.resolve_unit_dir(&name);
        let info = match UnitInfo::load(&unit_dir).await {
            Ok(info) => info,
            Err(MetadataError::Io(e)) => return Err(e.into()),
            Err(_) => return Err(EngineError::NotProjmakerUnit { path: unit_dir }),
        };
        let kind = info.unit_type;

        let env = self.prepare_environment(&kind, &name, version, false, false).await?;

        let tag_after = creation_tag(&name);
        if self.client.tags_matching(&tag_after).await?.is_empty() {
            return Err(EngineError::MissingCreationTag { tag: tag_after });
        }

        let origin = self
            .client
            .current_branch()
            .await?
            .ok_or_else(|| EngineError::UnexpectedState("no current branch to update from".to_string()))?;
        let tag_before = format!("{tag_after}~{}", self.config.history_offset());

        let tmp = temp_branch(&name);
        let work = work_branch(&name);

        self.client.create_branch(&tmp, &tag_before).await?;
        self.client.checkout(&tmp).await?;

        // The pre-generation tree may still carry the unit from a later
        // commit's point of view; regeneration starts from nothing
        if env.unit_dir.exists() {
            debug!(path = %env.unit_dir.display(), "clearing unit directory on temp branch");
            tokio::fs::remove_dir_all(&env.unit_dir).await?;
        }

        let request = self.generate_request(&kind, &name, version, &env.unit_dir);
        let report = self.generator.generate(&request).await?;
        debug!(files = report.files_written, "generator finished");

        if classify(&self.client).await? == RepoState::Clean {
            warn!("generator produced no output; abandoning update");
            self.client.checkout(&origin).await?;
            self.client.delete_branch(&tmp).await?;
            if env.stashed {
                self.client.stash_pop().await?;
            }
            return Ok(UpdateOutcome::NothingGenerated);
        }

        UnitInfo {
            unit_type: kind.clone(),
        }
        .save(&env.unit_dir)
        .await?;
        self.client.add(&[env.unit_dir.as_path()]).await?;
        self.client.commit(&format!("regenerate unit {name}")).await?;

        self.client.create_branch(&work, &origin).await?;
        let record = UpdateRecord {
            unit_type: kind,
            unit_name: name.clone(),
            orig_branch: origin,
            work_branch: work.clone(),
            tmp_branch: tmp.clone(),
            generator_version: version.map(str::to_string),
        };
        match record.store(&self.client, &work).await {
            Ok(()) => {}
            Err(RecordError::Git(e)) => return Err(e.into()),
            Err(e) => return Err(EngineError::UnexpectedState(e.to_string())),
        }

        info!(%work, %tmp, "replaying user edits onto the regenerated base");
        if let Err(err) = self.client.rebase_onto_from_point(&work, &tag_after, &tmp).await {
            return match classify(&self.client).await? {
                RepoState::OperationInProgress => {
                    warn!(%name, "rebase stopped on conflicts; update suspended");
                    Err(EngineError::RebaseConflict { unit: name })
                }
                _ => Err(err.into()),
            };
        }

        self.finalize(UpdateContext {
            record,
            unit_dir: env.unit_dir,
            stashed: env.stashed,
        })
        .await
    }

    /// Resume an update suspended on rebase conflicts
    ///
    /// Requires the operator to have completed the rebase first; the
    /// engine picks the update back up from the work branch's record.
    pub async fn continue_update(&mut self) -> Result<UpdateOutcome> {
        info!("continuing interrupted update");
        let repo_root = find_enclosing_repo(&self.workdir).ok_or_else(|| EngineError::NotInGitRepo {
            path: self.workdir.clone(),
        })?;
        self.client.connect(&repo_root);

        if classify(&self.client).await? == RepoState::OperationInProgress {
            return Err(EngineError::OperationStillInProgress);
        }

        let branch = self
            .client
            .current_branch()
            .await?
            .ok_or_else(|| EngineError::UnexpectedState("no current branch".to_string()))?;
        if !branch.starts_with(BRANCH_PREFIX) {
            return Err(EngineError::NotInPmBranch { branch });
        }

        let record = match UpdateRecord::load(&self.client, &branch).await {
            Ok(record) => record,
            Err(RecordError::Git(e)) => return Err(e.into()),
            Err(_) => return Err(EngineError::BadUpdateRecord { branch }),
        };

        let env = self
            .prepare_environment(
                &record.unit_type,
                &record.unit_name,
                record.generator_version.as_deref(),
                false,
                true,
            )
            .await?;

        self.finalize(UpdateContext {
            record,
            unit_dir: env.unit_dir,
            stashed: env.stashed,
        })
        .await
    }

    /// Land the rebased unit tree back on the origin branch
    async fn finalize(&mut self, ctx: UpdateContext) -> Result<UpdateOutcome> {
        let state = classify(&self.client).await?;
        if state != RepoState::Clean {
            return Err(EngineError::WorkdirNotClean { state });
        }

        let name = &ctx.record.unit_name;
        info!(%name, origin = %ctx.record.orig_branch, "finalizing update");

        self.client.checkout(&ctx.record.orig_branch).await?;

        if ctx.unit_dir.exists() {
            tokio::fs::remove_dir_all(&ctx.unit_dir).await?;
        }
        self.client
            .checkout_path_from_branch(&ctx.unit_dir, &ctx.record.work_branch)
            .await?;
        // Stage deletions the path checkout leaves behind
        self.client.add(&[ctx.unit_dir.as_path()]).await?;

        self.client.delete_branch(&ctx.record.tmp_branch).await?;
        self.client.delete_branch(&ctx.record.work_branch).await?;

        let outcome = if classify(&self.client).await? == RepoState::Clean {
            info!(%name, "regenerated output matches the committed tree");
            UpdateOutcome::NoChanges
        } else {
            self.client.commit(&format!("update unit {name}")).await?;
            let tag = creation_tag(name);
            self.client.move_tag(&tag, "HEAD").await?;
            info!(%name, %tag, "unit updated");
            UpdateOutcome::Updated
        };

        if ctx.stashed {
            self.client.stash_pop().await?;
        }
        Ok(outcome)
    }

    /// Shared precondition and setup work for every lifecycle call
    async fn prepare_environment(
        &mut self,
        kind: &str,
        name: &str,
        version: Option<&str>,
        create_mode: bool,
        expect_pm_branch: bool,
    ) -> Result<Environment> {
        let unit_dir = self.resolve_unit_dir(name);
        debug!(unit_dir = %unit_dir.display(), create_mode, "preparing environment");

        let request = self.generate_request(kind, name, version, &unit_dir);
        if !self.generator.available(&request).await {
            return Err(EngineError::NoGenerator {
                name: request.qualified_name(),
                root: request.template_root,
            });
        }

        let repo_root = unit_dir
            .parent()
            .and_then(find_enclosing_repo)
            .ok_or_else(|| EngineError::NotInGitRepo { path: unit_dir.clone() })?;
        self.client.connect(&repo_root);
        if !self.client.is_repository().await? {
            return Err(EngineError::NotInGitRepo { path: unit_dir });
        }

        if !expect_pm_branch
            && let Some(branch) = self.client.current_branch().await?
            && branch.starts_with(BRANCH_PREFIX)
        {
            return Err(EngineError::InPmBranch { branch });
        }

        if create_mode {
            let tag = creation_tag(name);
            if !self.client.tags_matching(&tag).await?.is_empty() {
                return Err(EngineError::TagExists { tag });
            }
            if unit_dir.exists() {
                ensure_effectively_empty(&unit_dir)?;
            } else {
                tokio::fs::create_dir_all(&unit_dir).await?;
            }
        } else if !unit_dir.exists() {
            return Err(EngineError::CantFindUnit { path: unit_dir });
        }

        // Stashing needs at least one commit to exist
        if self.client.commit_count().await? == 0 {
            info!("repository has no commits; creating an empty initial commit");
            self.client.commit_allowing_empty("initial commit").await?;
        }

        let mut stashed = false;
        if classify(&self.client).await? != RepoState::Clean {
            stashed = self.client.stash_push_excluding(&unit_dir).await?;
            let state = classify(&self.client).await?;
            if state != RepoState::Clean {
                return Err(EngineError::StashFailed { state });
            }
        }

        Ok(Environment { unit_dir, stashed })
    }

    /// The unit directory: the working directory itself when its
    /// canonicalized base name matches the unit name, else a child of it
    fn resolve_unit_dir(&self, name: &str) -> PathBuf {
        let base = self
            .workdir
            .file_name()
            .map(|base| base.to_string_lossy().into_owned())
            .unwrap_or_default();
        if canonical_name(&base) == canonical_name(name) {
            self.workdir.clone()
        } else {
            self.workdir.join(name)
        }
    }

    fn generate_request(&self, kind: &str, name: &str, version: Option<&str>, unit_dir: &Path) -> GenerateRequest {
        GenerateRequest {
            kind: kind.to_string(),
            version: version.map(str::to_string),
            unit_name: name.to_string(),
            template_root: self.config.template_root(),
            output_dir: unit_dir.to_path_buf(),
        }
    }
}

/// A create target may exist, but only empty or holding the repository's
/// own metadata directory
fn ensure_effectively_empty(dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name() != ".git" {
            return Err(EngineError::OutputDirNotEmpty {
                path: dir.to_path_buf(),
            });
        }
    }
    Ok(())
}
