//! End-to-end lifecycle tests
//!
//! These drive the engine against real git repositories in temp dirs,
//! with a fake generator standing in for template rendering where the
//! test needs to vary output between runs.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;

use gitclient::{GitClient, RepoState, classify};
use projmaker::config::Config;
use projmaker::engine::{EngineError, UnitEngine, UpdateOutcome};
use projmaker::generator::{Generate, GenerateReport, GenerateRequest, GeneratorError, TemplateGenerator};
use projmaker::metadata::{UNIT_INFO_FILE, UpdateRecord};

// =============================================================================
// Helpers
// =============================================================================

/// Test generator writing a fixed set of files
struct FakeGenerator {
    files: BTreeMap<&'static str, &'static str>,
}

impl FakeGenerator {
    fn new(files: &[(&'static str, &'static str)]) -> Arc<Self> {
        Arc::new(Self {
            files: files.iter().copied().collect(),
        })
    }
}

#[async_trait]
impl Generate for FakeGenerator {
    async fn available(&self, _request: &GenerateRequest) -> bool {
        true
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateReport, GeneratorError> {
        for (rel, content) in &self.files {
            let target = request.output_dir.join(rel);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, content).await?;
        }
        Ok(GenerateReport {
            files_written: self.files.len(),
        })
    }
}

async fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .env("GIT_EDITOR", "true")
        .current_dir(dir)
        .output()
        .await
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

async fn git_out(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .unwrap();
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

async fn setup_git_repo(dir: &Path) {
    git(dir, &["init", "-b", "main"]).await;
    git(dir, &["config", "user.email", "test@test.com"]).await;
    git(dir, &["config", "user.name", "Test"]).await;
    git(dir, &["config", "commit.gpgsign", "false"]).await;
    git(dir, &["commit", "--allow-empty", "-m", "initial"]).await;
}

fn engine_at(workdir: &Path, generator: Arc<dyn Generate>) -> UnitEngine {
    UnitEngine::new(Config::default(), GitClient::new(), generator, workdir)
}

fn connected(dir: &Path) -> GitClient {
    let mut client = GitClient::new();
    client.connect(dir);
    client
}

// =============================================================================
// Create
// =============================================================================

#[tokio::test]
async fn test_create_end_to_end_with_template_generator() {
    let repo = TempDir::new().unwrap();
    setup_git_repo(repo.path()).await;

    // Real template rendering: a "basic" template producing file1 and file2
    let templates = TempDir::new().unwrap();
    std::fs::create_dir_all(templates.path().join("basic")).unwrap();
    std::fs::write(templates.path().join("basic/file1"), "one\n").unwrap();
    std::fs::write(templates.path().join("basic/file2.hbs"), "unit {{name}}\n").unwrap();

    let mut config = Config::default();
    config.templates.root = templates.path().to_path_buf();
    let mut engine = UnitEngine::new(
        config,
        GitClient::new(),
        Arc::new(TemplateGenerator::new()),
        repo.path(),
    );

    let before = git_out(repo.path(), &["rev-list", "--count", "HEAD"]).await;
    let outcome = engine.create("basic", "empty", None).await.unwrap();

    // Both files present, rendered where templated
    assert_eq!(
        std::fs::read_to_string(repo.path().join("empty/file1")).unwrap(),
        "one\n"
    );
    assert_eq!(
        std::fs::read_to_string(repo.path().join("empty/file2")).unwrap(),
        "unit empty\n"
    );
    assert!(repo.path().join("empty").join(UNIT_INFO_FILE).exists());

    // Exactly one new commit on HEAD
    let after = git_out(repo.path(), &["rev-list", "--count", "HEAD"]).await;
    assert_eq!(after.parse::<u64>().unwrap(), before.parse::<u64>().unwrap() + 1);

    // Tag invariant: exactly one creation tag, at HEAD
    assert_eq!(outcome.tag, "pmAFTER_ADDING_empty");
    let tags = git_out(repo.path(), &["tag", "-l", "pmAFTER_ADDING_empty"]).await;
    assert_eq!(tags.lines().count(), 1);
    let tag_commit = git_out(repo.path(), &["rev-parse", "pmAFTER_ADDING_empty^{commit}"]).await;
    let head = git_out(repo.path(), &["rev-parse", "HEAD"]).await;
    assert_eq!(tag_commit, head);

    let client = connected(repo.path());
    assert_eq!(classify(&client).await.unwrap(), RepoState::Clean);
}

#[tokio::test]
async fn test_create_twice_fails_with_tag_exists() {
    let repo = TempDir::new().unwrap();
    setup_git_repo(repo.path()).await;
    let generator = FakeGenerator::new(&[("file1", "one\n")]);

    let mut engine = engine_at(repo.path(), generator.clone());
    engine.create("basic", "demo", None).await.unwrap();

    let result = engine.create("basic", "demo", None).await;
    assert!(matches!(result, Err(EngineError::TagExists { .. })));
}

#[tokio::test]
async fn test_create_fails_on_nonempty_target() {
    let repo = TempDir::new().unwrap();
    setup_git_repo(repo.path()).await;
    std::fs::create_dir(repo.path().join("demo")).unwrap();
    std::fs::write(repo.path().join("demo/already.txt"), "here\n").unwrap();

    let mut engine = engine_at(repo.path(), FakeGenerator::new(&[("file1", "one\n")]));
    let result = engine.create("basic", "demo", None).await;
    assert!(matches!(result, Err(EngineError::OutputDirNotEmpty { .. })));
}

#[tokio::test]
async fn test_create_outside_repository_fails() {
    let dir = TempDir::new().unwrap();

    let mut engine = engine_at(dir.path(), FakeGenerator::new(&[("file1", "one\n")]));
    let result = engine.create("basic", "demo", None).await;
    assert!(matches!(result, Err(EngineError::NotInGitRepo { .. })));
}

#[tokio::test]
async fn test_create_self_heals_commitless_repository() {
    let repo = TempDir::new().unwrap();
    git(repo.path(), &["init", "-b", "main"]).await;
    git(repo.path(), &["config", "user.email", "test@test.com"]).await;
    git(repo.path(), &["config", "user.name", "Test"]).await;
    git(repo.path(), &["config", "commit.gpgsign", "false"]).await;

    let mut engine = engine_at(repo.path(), FakeGenerator::new(&[("file1", "one\n")]));
    engine.create("basic", "demo", None).await.unwrap();

    // The engine created the missing first commit itself
    let count = git_out(repo.path(), &["rev-list", "--count", "HEAD"]).await;
    assert_eq!(count, "2");

    let client = connected(repo.path());
    assert_eq!(classify(&client).await.unwrap(), RepoState::Clean);
}

#[tokio::test]
async fn test_create_refused_on_pm_branch() {
    let repo = TempDir::new().unwrap();
    setup_git_repo(repo.path()).await;
    git(repo.path(), &["checkout", "-b", "pm-updating-other"]).await;

    let mut engine = engine_at(repo.path(), FakeGenerator::new(&[("file1", "one\n")]));
    let result = engine.create("basic", "demo", None).await;
    assert!(matches!(result, Err(EngineError::InPmBranch { .. })));
}

#[tokio::test]
async fn test_create_resolves_matching_directory_name() {
    let repo = TempDir::new().unwrap();
    setup_git_repo(repo.path()).await;
    let workdir = repo.path().join("project_one");
    std::fs::create_dir(&workdir).unwrap();

    let mut engine = engine_at(&workdir, FakeGenerator::new(&[("file1", "one\n")]));
    let outcome = engine.create("basic", "ProjectOne", None).await.unwrap();

    // The canonicalized directory name matches, so the unit lands in the
    // working directory itself, not a subdirectory
    assert_eq!(outcome.unit_dir, workdir);
    assert!(workdir.join("file1").exists());
    assert!(!workdir.join("ProjectOne").exists());
}

// =============================================================================
// Update
// =============================================================================

#[tokio::test]
async fn test_update_noop_leaves_everything_unchanged() {
    let repo = TempDir::new().unwrap();
    setup_git_repo(repo.path()).await;
    let generator = FakeGenerator::new(&[("file1", "one\n"), ("file2", "two\n")]);

    let mut engine = engine_at(repo.path(), generator.clone());
    engine.create("basic", "demo", None).await.unwrap();

    let head_before = git_out(repo.path(), &["rev-parse", "HEAD"]).await;
    let tag_before = git_out(repo.path(), &["rev-parse", "pmAFTER_ADDING_demo"]).await;

    let outcome = engine.update(Some("demo"), None).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::NoChanges);

    assert_eq!(git_out(repo.path(), &["rev-parse", "HEAD"]).await, head_before);
    assert_eq!(
        git_out(repo.path(), &["rev-parse", "pmAFTER_ADDING_demo"]).await,
        tag_before
    );
    assert_eq!(git_out(repo.path(), &["branch", "--list", "pm-*"]).await, "");

    let client = connected(repo.path());
    assert_eq!(classify(&client).await.unwrap(), RepoState::Clean);
}

#[tokio::test]
async fn test_update_preserves_hand_edits() {
    let repo = TempDir::new().unwrap();
    setup_git_repo(repo.path()).await;

    let v1 = FakeGenerator::new(&[("file1", "generated one\n"), ("file2", "generated two\n")]);
    let mut engine = engine_at(repo.path(), v1);
    engine.create("basic", "demo", None).await.unwrap();

    // Hand-edit one generated file and commit it
    std::fs::write(repo.path().join("demo/file1"), "hand edited\n").unwrap();
    git(repo.path(), &["add", "demo/file1"]).await;
    git(repo.path(), &["commit", "-m", "hand edit"]).await;

    // The new generator changes only the unrelated file
    let v2 = FakeGenerator::new(&[("file1", "generated one\n"), ("file2", "new two\n")]);
    let mut engine = engine_at(repo.path(), v2);
    let outcome = engine.update(Some("demo"), None).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Updated);

    // The hand edit survives and the unrelated file reflects the new output
    assert_eq!(
        std::fs::read_to_string(repo.path().join("demo/file1")).unwrap(),
        "hand edited\n"
    );
    assert_eq!(
        std::fs::read_to_string(repo.path().join("demo/file2")).unwrap(),
        "new two\n"
    );

    // Tag tracks the finalize commit; ephemeral branches are gone
    let head = git_out(repo.path(), &["rev-parse", "HEAD"]).await;
    let tag = git_out(repo.path(), &["rev-parse", "pmAFTER_ADDING_demo^{commit}"]).await;
    assert_eq!(tag, head);
    assert_eq!(git_out(repo.path(), &["branch", "--list", "pm-*"]).await, "");
    assert_eq!(git_out(repo.path(), &["rev-parse", "--abbrev-ref", "HEAD"]).await, "main");

    let client = connected(repo.path());
    assert_eq!(classify(&client).await.unwrap(), RepoState::Clean);
}

#[tokio::test]
async fn test_update_stash_safety_for_unrelated_changes() {
    let repo = TempDir::new().unwrap();
    setup_git_repo(repo.path()).await;
    std::fs::write(repo.path().join("notes.txt"), "original\n").unwrap();
    git(repo.path(), &["add", "notes.txt"]).await;
    git(repo.path(), &["commit", "-m", "add notes"]).await;

    let v1 = FakeGenerator::new(&[("file1", "one\n")]);
    let mut engine = engine_at(repo.path(), v1);
    engine.create("basic", "demo", None).await.unwrap();

    // Unrelated uncommitted change outside the unit directory
    std::fs::write(repo.path().join("notes.txt"), "work in progress\n").unwrap();

    let v2 = FakeGenerator::new(&[("file1", "changed one\n")]);
    let mut engine = engine_at(repo.path(), v2);
    let outcome = engine.update(Some("demo"), None).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Updated);

    // Byte-identical and still uncommitted
    assert_eq!(
        std::fs::read_to_string(repo.path().join("notes.txt")).unwrap(),
        "work in progress\n"
    );
    let client = connected(repo.path());
    let changed = client.changed_paths().await.unwrap();
    assert!(changed.iter().any(|entry| entry.contains("notes.txt")));
}

#[tokio::test]
async fn test_update_without_metadata_fails() {
    let repo = TempDir::new().unwrap();
    setup_git_repo(repo.path()).await;
    std::fs::create_dir(repo.path().join("plain")).unwrap();
    std::fs::write(repo.path().join("plain/file.txt"), "not ours\n").unwrap();

    let mut engine = engine_at(repo.path(), FakeGenerator::new(&[("file1", "one\n")]));
    let result = engine.update(Some("plain"), None).await;
    assert!(matches!(result, Err(EngineError::NotProjmakerUnit { .. })));
}

#[tokio::test]
async fn test_update_without_creation_tag_fails() {
    let repo = TempDir::new().unwrap();
    setup_git_repo(repo.path()).await;

    // A unit directory with metadata but no creation tag
    std::fs::create_dir(repo.path().join("demo")).unwrap();
    std::fs::write(
        repo.path().join("demo").join(UNIT_INFO_FILE),
        "{\"unit_type\": \"basic\"}\n",
    )
    .unwrap();
    git(repo.path(), &["add", "demo"]).await;
    git(repo.path(), &["commit", "-m", "fake unit"]).await;

    let mut engine = engine_at(repo.path(), FakeGenerator::new(&[("file1", "one\n")]));
    let result = engine.update(Some("demo"), None).await;
    assert!(matches!(result, Err(EngineError::MissingCreationTag { .. })));
}

// =============================================================================
// Conflict suspension and resume
// =============================================================================

#[tokio::test]
async fn test_conflict_suspends_then_continue_finishes() {
    let repo = TempDir::new().unwrap();
    setup_git_repo(repo.path()).await;

    let v1 = FakeGenerator::new(&[("file1", "generated line\n")]);
    let mut engine = engine_at(repo.path(), v1);
    engine.create("basic", "demo", None).await.unwrap();

    // Hand edit colliding with the new generator output on the same line
    std::fs::write(repo.path().join("demo/file1"), "user line\n").unwrap();
    git(repo.path(), &["add", "demo/file1"]).await;
    git(repo.path(), &["commit", "-m", "user edit"]).await;

    let v2 = FakeGenerator::new(&[("file1", "new generated line\n")]);
    let mut engine = engine_at(repo.path(), v2.clone());
    let result = engine.update(Some("demo"), None).await;
    assert!(matches!(result, Err(EngineError::RebaseConflict { .. })));

    // Suspended: operation in progress, ephemeral branches and record intact
    let client = connected(repo.path());
    assert_eq!(classify(&client).await.unwrap(), RepoState::OperationInProgress);
    let branches = git_out(repo.path(), &["branch", "--list", "pm-*"]).await;
    assert!(branches.contains("pm-updating-demo"));
    assert!(branches.contains("pm-before-updating-demo"));
    let record = UpdateRecord::load(&client, "pm-updating-demo").await.unwrap();
    assert_eq!(record.unit_name, "demo");
    assert_eq!(record.orig_branch, "main");

    // Refusing to continue while the rebase is unresolved
    let mut engine = engine_at(repo.path(), v2.clone());
    let result = engine.continue_update().await;
    assert!(matches!(result, Err(EngineError::OperationStillInProgress)));

    // Operator resolves, stages, and completes the rebase
    std::fs::write(repo.path().join("demo/file1"), "resolved line\n").unwrap();
    git(repo.path(), &["add", "demo/file1"]).await;
    git(repo.path(), &["rebase", "--continue"]).await;
    assert_eq!(
        git_out(repo.path(), &["rev-parse", "--abbrev-ref", "HEAD"]).await,
        "pm-updating-demo"
    );

    let mut engine = engine_at(repo.path(), v2);
    let outcome = engine.continue_update().await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Updated);

    // Resolution landed on the origin branch, branches gone, tag moved to HEAD
    assert_eq!(git_out(repo.path(), &["rev-parse", "--abbrev-ref", "HEAD"]).await, "main");
    assert_eq!(
        std::fs::read_to_string(repo.path().join("demo/file1")).unwrap(),
        "resolved line\n"
    );
    assert_eq!(git_out(repo.path(), &["branch", "--list", "pm-*"]).await, "");
    let head = git_out(repo.path(), &["rev-parse", "HEAD"]).await;
    let tag = git_out(repo.path(), &["rev-parse", "pmAFTER_ADDING_demo^{commit}"]).await;
    assert_eq!(tag, head);
    assert_eq!(classify(&client).await.unwrap(), RepoState::Clean);
}

#[tokio::test]
async fn test_continue_on_non_pm_branch_fails() {
    let repo = TempDir::new().unwrap();
    setup_git_repo(repo.path()).await;

    let mut engine = engine_at(repo.path(), FakeGenerator::new(&[("file1", "one\n")]));
    let result = engine.continue_update().await;
    assert!(matches!(result, Err(EngineError::NotInPmBranch { .. })));
}

// =============================================================================
// Spacer commit configuration
// =============================================================================

#[tokio::test]
async fn test_spacer_commit_offsets_history_by_two() {
    let repo = TempDir::new().unwrap();
    setup_git_repo(repo.path()).await;

    let mut config = Config::default();
    config.update.spacer_commit = true;

    let v1 = FakeGenerator::new(&[("file1", "one\n")]);
    let mut engine = UnitEngine::new(config.clone(), GitClient::new(), v1, repo.path());
    engine.create("basic", "demo", None).await.unwrap();

    // initial + unit commit + spacer
    let count = git_out(repo.path(), &["rev-list", "--count", "HEAD"]).await;
    assert_eq!(count, "3");

    // The tag sits on the spacer, whose tree is the finalized unit tree
    let tag_tree = git_out(repo.path(), &["rev-parse", "pmAFTER_ADDING_demo^{tree}"]).await;
    let head_tree = git_out(repo.path(), &["rev-parse", "HEAD^{tree}"]).await;
    assert_eq!(tag_tree, head_tree);

    // An update still reconciles correctly against the two-commit offset
    std::fs::write(repo.path().join("demo/extra.txt"), "kept\n").unwrap();
    git(repo.path(), &["add", "demo/extra.txt"]).await;
    git(repo.path(), &["commit", "-m", "add extra"]).await;

    let v2 = FakeGenerator::new(&[("file1", "changed one\n")]);
    let mut engine = UnitEngine::new(config, GitClient::new(), v2, repo.path());
    let outcome = engine.update(Some("demo"), None).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Updated);

    assert_eq!(
        std::fs::read_to_string(repo.path().join("demo/file1")).unwrap(),
        "changed one\n"
    );
    assert_eq!(
        std::fs::read_to_string(repo.path().join("demo/extra.txt")).unwrap(),
        "kept\n"
    );
}
