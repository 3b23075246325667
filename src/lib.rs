//! Turns the diff between two commits into a sequence of small,
//! semantically coherent commits synthesized directly against the object
//! database (never touching the working tree or the index).
//!
//! The pipeline runs in stages C1-C12: `git_driver`/`diff_parser` parse the
//! raw unified diff (C1-C2), `chunk`/`chunker` split it into atomic units
//! and merge whitespace/comment-only runs back into their neighbors (C3-C8),
//! `labeller` attaches a semantic `Signature` via tree-sitter (C9),
//! `grouper::semantic` merges chunks that are provably the same edit (C10),
//! a `grouper::LogicalGrouper` assigns commit messages and ordering (C11),
//! and `synthesizer` builds the resulting tree/commit chain (C12).

#[macro_use]
extern crate slog;

pub mod ast;
pub mod chunk;
mod chunker;
pub mod config;
mod diff_parser;
pub mod error;
mod file_reader;
pub mod git_driver;
pub mod grouper;
mod labeller;
mod synthesizer;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};

use ast::query_manager::QueryManager;
use chunk::Chunk;
use git_driver::GitDriver;
use grouper::{CommitGroup, LogicalGrouper, Progress};
use labeller::{ContextProvider, FileContext};

/// Runs the full pipeline against `repo`: the diff from `base_commit` to
/// `dirty_commit` (optionally restricted to `target_path`) becomes zero or
/// more synthesized commits built on top of `base_commit`. Returns the tip
/// of the synthesized chain, or `None` for an empty diff or when `grouper`
/// produces no groups. Never mutates any ref; the caller decides whether and
/// where to point a branch at the returned commit.
pub fn run_pipeline(
    logger: &slog::Logger,
    repo: &git2::Repository,
    base_commit: &str,
    dirty_commit: &str,
    target_path: Option<&Path>,
    grouper: &dyn LogicalGrouper,
    user_guidance: Option<&str>,
    cancel: Option<&AtomicBool>,
    progress: Option<&dyn Fn(&str, u32, u32)>,
) -> Result<Option<git2::Oid>> {
    let is_cancelled = || cancel.is_some_and(|c| c.load(Ordering::SeqCst));

    let driver = GitDriver::discover(repo);
    let base_oid = git_driver::resolve_commit(repo, base_commit)?;
    let dirty_oid = git_driver::resolve_commit(repo, dirty_commit)?;
    let base_sha = base_oid.to_string();
    let dirty_sha = dirty_oid.to_string();
    debug!(logger, "resolved commit range"; "base" => &base_sha, "dirty" => &dirty_sha);

    let similarity = config::similarity(repo);
    let raw_diff = driver.diff(&base_sha, &dirty_sha, similarity, target_path)?;
    let hunks = diff_parser::parse_diff(&raw_diff)?;
    if hunks.is_empty() {
        debug!(logger, "no changes in range, nothing to synthesize");
        return Ok(None);
    }

    let chunks: Vec<Chunk> = hunks
        .into_iter()
        .map(Chunk::from_hunk)
        .collect::<std::result::Result<_, _>>()?;
    let atomic_chunks: Vec<Chunk> = chunks.into_iter().flat_map(chunker::atomic_split).collect();
    debug!(logger, "mechanical chunking complete"; "count" => atomic_chunks.len());
    if let Some(cb) = progress {
        cb("mechanical", atomic_chunks.len() as u32, atomic_chunks.len() as u32);
    }
    if is_cancelled() {
        bail!("pipeline cancelled during mechanical chunking");
    }

    let query_json = match config::query_config_path(repo) {
        Some(path) => std::fs::read(&path)
            .map_err(|e| anyhow::anyhow!("reading narrate.queryConfigPath {path}: {e}"))?,
        None => include_bytes!("../resources/queries.json").to_vec(),
    };
    let qm = QueryManager::from_json(&query_json)?;

    let mut pctx = PipelineContext {
        driver: &driver,
        qm: &qm,
        base_commit: &base_sha,
        dirty_commit: &dirty_sha,
        old_cache: HashMap::new(),
        new_cache: HashMap::new(),
    };

    let comment_lines_by_path = build_comment_lines_by_path(&mut pctx, &atomic_chunks);
    let merged_chunks = chunker::merge_context_only_neighbors(atomic_chunks, &comment_lines_by_path);

    if is_cancelled() {
        bail!("pipeline cancelled before labelling");
    }

    let total = merged_chunks.len() as u32;
    let mut labelled = Vec::with_capacity(merged_chunks.len());
    for (i, chunk) in merged_chunks.into_iter().enumerate() {
        let sig = labeller::label_chunk(&chunk, &mut pctx);
        labelled.push((chunk, sig));
        if let Some(cb) = progress {
            cb("semantic", (i + 1) as u32, total);
        }
    }

    let (semantic_chunks, immutable_chunks) = grouper::semantic::group_semantically(labelled);
    debug!(logger, "semantic grouping complete";
           "semantic" => semantic_chunks.len(), "immutable" => immutable_chunks.len());

    if is_cancelled() {
        bail!("pipeline cancelled before logical grouping");
    }

    let logical_progress = progress.map(|cb| move |p: Progress| cb(p.phase, p.done, p.total));
    let logical_progress_ref: Option<&dyn Fn(Progress)> =
        logical_progress.as_ref().map(|f| f as &dyn Fn(Progress));
    let groups = grouper.group_chunks(&semantic_chunks, &immutable_chunks, user_guidance, logical_progress_ref)?;
    debug!(logger, "logical grouping complete"; "groups" => groups.len());

    if groups.is_empty() {
        return Ok(None);
    }

    let max_stack = config::max_stack(repo);
    let groups = if groups.len() > max_stack {
        warn!(logger, "stack limit reached, collapsing overflow into the final commit";
              "limit" => max_stack, "groups" => groups.len());
        collapse_to_stack_limit(groups, max_stack)
    } else {
        groups
    };
    if is_cancelled() {
        bail!("pipeline cancelled before synthesis");
    }

    let mut synth_progress = progress.map(|cb| move |done: u32, total: u32| cb("synthesis", done, total));
    let synth_progress_ref: Option<&mut dyn FnMut(u32, u32)> =
        synth_progress.as_mut().map(|f| f as &mut dyn FnMut(u32, u32));
    let head = synthesizer::synthesize(logger, &driver, &base_sha, &groups, synth_progress_ref)?;

    Ok(head.map(|s| git2::Oid::from_str(&s)).transpose()?)
}

/// Feeds `labeller::ContextProvider` from the repository via `GitDriver`,
/// parsing each (path, side) pair at most once regardless of how many
/// chunks touch it. Unrestricted (`&[]`) ranges are used throughout: the
/// range parameter exists to bound tree-sitter query cost on huge files
/// that are analyzed once per file anyway, not to change correctness.
struct PipelineContext<'a> {
    driver: &'a GitDriver,
    qm: &'a QueryManager,
    base_commit: &'a str,
    dirty_commit: &'a str,
    old_cache: HashMap<Vec<u8>, Option<FileContext>>,
    new_cache: HashMap<Vec<u8>, Option<FileContext>>,
}

impl<'a> PipelineContext<'a> {
    fn build(&self, commit: &str, path: &[u8]) -> Option<FileContext> {
        let content = file_reader::read(self.driver, commit, path).ok().flatten()?;
        FileContext::build(self.qm, path, &content, &[])
    }
}

impl<'a> ContextProvider for PipelineContext<'a> {
    fn old_context(&mut self, path: &[u8], _ranges: &[(u32, u32)]) -> Option<&FileContext> {
        if !self.old_cache.contains_key(path) {
            let built = self.build(self.base_commit, path);
            self.old_cache.insert(path.to_vec(), built);
        }
        self.old_cache.get(path).and_then(|c| c.as_ref())
    }

    fn new_context(&mut self, path: &[u8], _ranges: &[(u32, u32)]) -> Option<&FileContext> {
        if !self.new_cache.contains_key(path) {
            let built = self.build(self.dirty_commit, path);
            self.new_cache.insert(path.to_vec(), built);
        }
        self.new_cache.get(path).and_then(|c| c.as_ref())
    }
}

/// Folds every group beyond the `(limit - 1)`th into one terminal group,
/// preserving chunk order, so the synthesized chain never exceeds `limit`
/// commits. `limit` is always >= 1 ([`config::max_stack`] never returns 0).
fn collapse_to_stack_limit(mut groups: Vec<CommitGroup>, limit: usize) -> Vec<CommitGroup> {
    let limit = limit.max(1);
    if groups.len() <= limit {
        return groups;
    }
    let overflow = groups.split_off(limit - 1);
    let chunks: Vec<Chunk> = overflow.into_iter().flat_map(|g| g.chunks).collect();
    groups.push(CommitGroup {
        chunks,
        commit_message: "Remaining changes (stack limit reached)".to_string(),
        extended_message: None,
        group_id: "group-overflow".to_string(),
    });
    groups
}

/// Builds a per-path comment-line set (union of both sides) for C8's
/// context-only-run detection, so a change that only touches comments
/// doesn't become its own commit.
fn build_comment_lines_by_path(
    ctx: &mut PipelineContext,
    chunks: &[Chunk],
) -> HashMap<Vec<u8>, HashSet<u32>> {
    let mut out: HashMap<Vec<u8>, HashSet<u32>> = HashMap::new();
    for chunk in chunks {
        for path in [chunk.old_path(), chunk.new_path()].into_iter().flatten() {
            if out.contains_key(path) {
                continue;
            }
            let mut lines = HashSet::new();
            if let Some(fc) = ctx.old_context(path, &[]) {
                lines.extend(fc.symbols.pure_comment_lines.iter().copied());
            }
            if let Some(fc) = ctx.new_context(path, &[]) {
                lines.extend(fc.symbols.pure_comment_lines.iter().copied());
            }
            out.insert(path.to_vec(), lines);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    mod log_utils;
    mod pipeline_e2e;

    use super::*;
    use crate::chunk::{Chunk, DeleteChunk};

    fn group(id: &str, path: &str) -> CommitGroup {
        CommitGroup {
            chunks: vec![Chunk::Delete(DeleteChunk { path: path.as_bytes().to_vec() })],
            commit_message: id.to_string(),
            extended_message: None,
            group_id: id.to_string(),
        }
    }

    #[test]
    fn collapse_is_a_no_op_under_the_limit() {
        let groups = vec![group("a", "a.txt"), group("b", "b.txt")];
        let result = collapse_to_stack_limit(groups, 5);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn collapse_folds_overflow_into_one_terminal_group() {
        let groups = vec![group("a", "a.txt"), group("b", "b.txt"), group("c", "c.txt")];
        let result = collapse_to_stack_limit(groups, 2);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].group_id, "a");
        assert_eq!(result[1].chunks.len(), 2);
    }
}
