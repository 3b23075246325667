//! End-to-end tests driving [`crate::run_pipeline`] against real temporary
//! repositories, covering the scenarios worked through by hand in the
//! original `git_synthesizer.py` test fixtures.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use crate::grouper::{OneGroupPerChunk, SingleGroup};
use crate::run_pipeline;

use super::log_utils::CapturingLogger;

fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, o!())
}

/// A bare repo with a single committed file, returning its oid.
fn init_repo_with_file(contents: &str) -> (tempfile::TempDir, git2::Repository, git2::Oid) {
    let dir = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init_opts(
        dir.path(),
        git2::RepositoryInitOptions::new().initial_head("master"),
    )
    .unwrap();
    {
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "nobody").unwrap();
        config.set_str("user.email", "nobody@example.com").unwrap();
    }
    let oid = commit_file(&repo, None, "file.txt", contents, "Initial commit.");
    (dir, repo, oid)
}

/// Writes `contents` at `path` in a brand new tree built on top of `parent`
/// (or an empty tree if `parent` is `None`) and commits it.
fn commit_file(
    repo: &git2::Repository,
    parent: Option<git2::Oid>,
    path: &str,
    contents: &str,
    message: &str,
) -> git2::Oid {
    let blob_oid = repo.blob(contents.as_bytes()).unwrap();
    let mut builder = repo.treebuilder(None).unwrap();
    if let Some(parent_oid) = parent {
        let parent_commit = repo.find_commit(parent_oid).unwrap();
        let parent_tree = parent_commit.tree().unwrap();
        builder = repo.treebuilder(Some(&parent_tree)).unwrap();
    }
    builder
        .insert(path, blob_oid, git2::FileMode::Blob.into())
        .unwrap();
    let tree_oid = builder.write().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let signature = repo.signature().unwrap();
    let parents: Vec<git2::Commit> = parent
        .map(|p| repo.find_commit(p).unwrap())
        .into_iter()
        .collect();
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    repo.commit(None, &signature, &signature, message, &tree, &parent_refs)
        .unwrap()
}

fn file_at(repo: &git2::Repository, commit: git2::Oid, path: &str) -> Option<String> {
    let commit = repo.find_commit(commit).unwrap();
    let tree = commit.tree().unwrap();
    let entry = tree.get_path(Path::new(path)).ok()?;
    let blob = repo.find_blob(entry.id()).unwrap();
    Some(String::from_utf8(blob.content().to_vec()).unwrap())
}

#[test]
fn empty_diff_yields_no_commit() {
    let (_dir, repo, base) = init_repo_with_file("line one\nline two\n");
    let logger = test_logger();
    let result = run_pipeline(
        &logger,
        &repo,
        &base.to_string(),
        &base.to_string(),
        None,
        &OneGroupPerChunk,
        None,
        None,
        None,
    )
    .unwrap();
    assert!(result.is_none());
}

#[test]
fn basic_modification_produces_one_commit_with_final_content() {
    let (_dir, repo, base) = init_repo_with_file("alpha\nbeta\ngamma\n");
    let dirty = commit_file(&repo, Some(base), "file.txt", "alpha\nBETA\ngamma\n", "dirty");

    let logger = test_logger();
    let head = run_pipeline(
        &logger,
        &repo,
        &base.to_string(),
        &dirty.to_string(),
        None,
        &OneGroupPerChunk,
        None,
        None,
        None,
    )
    .unwrap()
    .expect("expected a synthesized commit");

    assert_eq!(file_at(&repo, head, "file.txt").unwrap(), "alpha\nBETA\ngamma\n");

    let commit = repo.find_commit(head).unwrap();
    assert_eq!(commit.parent_id(0).unwrap(), base);
}

#[test]
fn pure_deletion_of_two_nonadjacent_lines() {
    let (_dir, repo, base) =
        init_repo_with_file("keep1\nremove1\nkeep2\nremove2\nkeep3\n");
    let dirty = commit_file(&repo, Some(base), "file.txt", "keep1\nkeep2\nkeep3\n", "dirty");

    let logger = test_logger();
    let head = run_pipeline(
        &logger,
        &repo,
        &base.to_string(),
        &dirty.to_string(),
        None,
        &OneGroupPerChunk,
        None,
        None,
        None,
    )
    .unwrap()
    .expect("expected a synthesized commit");

    assert_eq!(file_at(&repo, head, "file.txt").unwrap(), "keep1\nkeep2\nkeep3\n");
}

#[test]
fn rename_with_modification_is_applied_at_new_path() {
    let (_dir, repo, base) = init_repo_with_file("hello world\nsecond line\n");

    // Build the dirty commit by writing the renamed file directly into a
    // new tree (no blob at the old path), so `git diff -M` must detect the
    // rename rather than see an add+delete pair it happens to match anyway.
    let new_contents = "hello world\nSECOND LINE\n";
    let blob_oid = repo.blob(new_contents.as_bytes()).unwrap();
    let mut builder = repo.treebuilder(None).unwrap();
    builder
        .insert("renamed.txt", blob_oid, git2::FileMode::Blob.into())
        .unwrap();
    let tree_oid = builder.write().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let signature = repo.signature().unwrap();
    let base_commit = repo.find_commit(base).unwrap();
    let dirty = repo
        .commit(None, &signature, &signature, "dirty", &tree, &[&base_commit])
        .unwrap();

    let logger = test_logger();
    let head = run_pipeline(
        &logger,
        &repo,
        &base.to_string(),
        &dirty.to_string(),
        None,
        &OneGroupPerChunk,
        None,
        None,
        None,
    )
    .unwrap()
    .expect("expected a synthesized commit");

    assert_eq!(file_at(&repo, head, "renamed.txt").unwrap(), new_contents);
    assert!(file_at(&repo, head, "file.txt").is_none());
}

#[test]
fn multi_file_disjoint_changes_group_into_one_commit_with_single_group() {
    let dir = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init_opts(
        dir.path(),
        git2::RepositoryInitOptions::new().initial_head("master"),
    )
    .unwrap();
    {
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "nobody").unwrap();
        config.set_str("user.email", "nobody@example.com").unwrap();
    }

    let blob_a = repo.blob(b"a1\na2\n").unwrap();
    let blob_b = repo.blob(b"b1\nb2\n").unwrap();
    let mut builder = repo.treebuilder(None).unwrap();
    builder.insert("a.txt", blob_a, git2::FileMode::Blob.into()).unwrap();
    builder.insert("b.txt", blob_b, git2::FileMode::Blob.into()).unwrap();
    let tree_oid = builder.write().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let signature = repo.signature().unwrap();
    let base = repo
        .commit(None, &signature, &signature, "base", &tree, &[])
        .unwrap();

    let blob_a2 = repo.blob(b"a1\nA2\n").unwrap();
    let blob_b2 = repo.blob(b"b1\nB2\n").unwrap();
    let mut builder = repo.treebuilder(None).unwrap();
    builder.insert("a.txt", blob_a2, git2::FileMode::Blob.into()).unwrap();
    builder.insert("b.txt", blob_b2, git2::FileMode::Blob.into()).unwrap();
    let tree_oid = builder.write().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let base_commit = repo.find_commit(base).unwrap();
    let dirty = repo
        .commit(None, &signature, &signature, "dirty", &tree, &[&base_commit])
        .unwrap();

    let logger = test_logger();
    let head = run_pipeline(
        &logger,
        &repo,
        &base.to_string(),
        &dirty.to_string(),
        None,
        &SingleGroup,
        None,
        None,
        None,
    )
    .unwrap()
    .expect("expected a synthesized commit");

    assert_eq!(file_at(&repo, head, "a.txt").unwrap(), "a1\nA2\n");
    assert_eq!(file_at(&repo, head, "b.txt").unwrap(), "b1\nB2\n");
    // Exactly one commit was synthesized on top of base.
    assert_eq!(repo.find_commit(head).unwrap().parent_id(0).unwrap(), base);
}

#[test]
fn target_path_restricts_the_diff_to_a_single_file() {
    let dir = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init_opts(
        dir.path(),
        git2::RepositoryInitOptions::new().initial_head("master"),
    )
    .unwrap();
    {
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "nobody").unwrap();
        config.set_str("user.email", "nobody@example.com").unwrap();
    }

    let blob_a = repo.blob(b"a1\n").unwrap();
    let blob_b = repo.blob(b"b1\n").unwrap();
    let mut builder = repo.treebuilder(None).unwrap();
    builder.insert("a.txt", blob_a, git2::FileMode::Blob.into()).unwrap();
    builder.insert("b.txt", blob_b, git2::FileMode::Blob.into()).unwrap();
    let tree_oid = builder.write().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let signature = repo.signature().unwrap();
    let base = repo
        .commit(None, &signature, &signature, "base", &tree, &[])
        .unwrap();

    let blob_a2 = repo.blob(b"A1\n").unwrap();
    let blob_b2 = repo.blob(b"B1\n").unwrap();
    let mut builder = repo.treebuilder(None).unwrap();
    builder.insert("a.txt", blob_a2, git2::FileMode::Blob.into()).unwrap();
    builder.insert("b.txt", blob_b2, git2::FileMode::Blob.into()).unwrap();
    let tree_oid = builder.write().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let base_commit = repo.find_commit(base).unwrap();
    let dirty = repo
        .commit(None, &signature, &signature, "dirty", &tree, &[&base_commit])
        .unwrap();

    let logger = test_logger();
    let head = run_pipeline(
        &logger,
        &repo,
        &base.to_string(),
        &dirty.to_string(),
        Some(Path::new("a.txt")),
        &OneGroupPerChunk,
        None,
        None,
        None,
    )
    .unwrap()
    .expect("expected a synthesized commit");

    assert_eq!(file_at(&repo, head, "a.txt").unwrap(), "A1\n");
    // b.txt was excluded by the pathspec, so it stays at the base content.
    assert_eq!(file_at(&repo, head, "b.txt").unwrap(), "b1\n");
}

#[test]
fn cancellation_flag_aborts_before_synthesis() {
    let (_dir, repo, base) = init_repo_with_file("alpha\nbeta\n");
    let dirty = commit_file(&repo, Some(base), "file.txt", "alpha\nBETA\n", "dirty");

    let cancelled = AtomicBool::new(true);
    let logger = test_logger();
    let result = run_pipeline(
        &logger,
        &repo,
        &base.to_string(),
        &dirty.to_string(),
        None,
        &OneGroupPerChunk,
        None,
        Some(&cancelled),
        None,
    );
    assert!(result.is_err());
}

#[test]
fn stack_limit_collapses_overflow_and_logs_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init_opts(
        dir.path(),
        git2::RepositoryInitOptions::new().initial_head("master"),
    )
    .unwrap();
    {
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "nobody").unwrap();
        config.set_str("user.email", "nobody@example.com").unwrap();
        config.set_i64(crate::config::MAX_STACK_CONFIG_NAME, 1).unwrap();
    }
    let signature = repo.signature().unwrap();

    let blob_a = repo.blob(b"a1\n").unwrap();
    let blob_b = repo.blob(b"b1\n").unwrap();
    let blob_c = repo.blob(b"c1\n").unwrap();
    let mut builder = repo.treebuilder(None).unwrap();
    builder.insert("a.txt", blob_a, git2::FileMode::Blob.into()).unwrap();
    builder.insert("b.txt", blob_b, git2::FileMode::Blob.into()).unwrap();
    builder.insert("c.txt", blob_c, git2::FileMode::Blob.into()).unwrap();
    let tree_oid = builder.write().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let base = repo.commit(None, &signature, &signature, "base", &tree, &[]).unwrap();

    let blob_a2 = repo.blob(b"A1\n").unwrap();
    let blob_b2 = repo.blob(b"B1\n").unwrap();
    let blob_c2 = repo.blob(b"C1\n").unwrap();
    let mut builder = repo.treebuilder(None).unwrap();
    builder.insert("a.txt", blob_a2, git2::FileMode::Blob.into()).unwrap();
    builder.insert("b.txt", blob_b2, git2::FileMode::Blob.into()).unwrap();
    builder.insert("c.txt", blob_c2, git2::FileMode::Blob.into()).unwrap();
    let tree_oid = builder.write().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let base_commit = repo.find_commit(base).unwrap();
    let dirty = repo
        .commit(None, &signature, &signature, "dirty", &tree, &[&base_commit])
        .unwrap();

    let mut capturing = CapturingLogger::new();
    let head = run_pipeline(
        &capturing.logger,
        &repo,
        &base.to_string(),
        &dirty.to_string(),
        None,
        &OneGroupPerChunk,
        None,
        None,
        None,
    )
    .unwrap()
    .expect("expected a synthesized commit");

    // Three disjoint single-file chunks would normally become three
    // commits under `OneGroupPerChunk`; narrate.maxStack=1 collapses them
    // into a single commit directly on top of base.
    assert_eq!(repo.find_commit(head).unwrap().parent_id(0).unwrap(), base);
    assert_eq!(file_at(&repo, head, "a.txt").unwrap(), "A1\n");
    assert_eq!(file_at(&repo, head, "b.txt").unwrap(), "B1\n");
    assert_eq!(file_at(&repo, head, "c.txt").unwrap(), "C1\n");

    let logs = capturing.logs();
    assert!(
        logs.iter().any(|l| l["msg"].as_str().unwrap_or("").contains("stack limit reached")),
        "expected a stack-limit warning in {logs:?}"
    );
}

#[test]
fn progress_callback_reports_all_four_phases() {
    let (_dir, repo, base) = init_repo_with_file("alpha\nbeta\ngamma\n");
    let dirty = commit_file(&repo, Some(base), "file.txt", "alpha\nBETA\ngamma\n", "dirty");

    let seen = std::cell::RefCell::new(Vec::new());
    let cb = |phase: &str, _done: u32, _total: u32| {
        seen.borrow_mut().push(phase.to_string());
    };

    let logger = test_logger();
    run_pipeline(
        &logger,
        &repo,
        &base.to_string(),
        &dirty.to_string(),
        None,
        &OneGroupPerChunk,
        None,
        None,
        Some(&cb),
    )
    .unwrap();

    let phases = seen.into_inner();
    for expected in ["mechanical", "semantic", "logical", "synthesis"] {
        assert!(phases.iter().any(|p| p == expected), "missing phase {expected} in {phases:?}");
    }
}
