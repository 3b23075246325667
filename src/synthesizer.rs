//! Synthesizer (C12): builds trees and commits by cumulative application,
//! entirely at the object-database level.
//!
//! Grounded in the original Python's `git_synthesizer.py`
//! (`_build_tree_from_plan`, `_apply_chunks_to_lines`,
//! `_get_full_tree_listing`) -- the algorithm (flat path->blob map from
//! `ls-tree`, rename handled by map-key move, per-file cursor-based line
//! splice, batch blob write, bottom-up `mktree` by directory grouping) is
//! ported and adapted to write blobs and trees in batches rather than one
//! plumbing call per hunk. The line-splice cursor technique is also
//! grounded in `git-absorb`'s
//! `apply_hunk_to_tree`/`split_lines_after` (`memchr::Memchr` newline
//! counting), generalized from a single hunk against a libgit2 blob writer
//! to many chunks against an in-memory byte buffer.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::chunk::{Chunk, LineItem};
use crate::error::PipelineError;
use crate::git_driver::GitDriver;
use crate::grouper::CommitGroup;

/// path -> (mode, blob-or-tree oid)
type Listing = BTreeMap<Vec<u8>, (String, String)>;

/// Builds `Cₙ` from `B` by applying groups `G₁..Gₙ` cumulatively. Returns
/// `None` if there are no groups (an empty diff never reaches here, but the
/// guard keeps the function total). Never calls `update-ref`; the caller
/// decides when the chain is complete and should become visible, keeping
/// ref mutation as the one place the repository's branches actually move.
pub fn synthesize(
    logger: &slog::Logger,
    driver: &GitDriver,
    base_commit: &str,
    groups: &[CommitGroup],
    mut progress: Option<&mut dyn FnMut(u32, u32)>,
) -> Result<Option<String>, PipelineError> {
    if groups.is_empty() {
        return Ok(None);
    }

    let base_listing: Listing = driver
        .ls_tree(base_commit)?
        .into_iter()
        .map(|(path, mode, oid)| (path, (mode, oid)))
        .collect();

    let mut parent = base_commit.to_string();
    let mut cumulative: Vec<Chunk> = Vec::new();
    let total = groups.len() as u32;

    for (k, group) in groups.iter().enumerate() {
        cumulative.extend(group.chunks.iter().cloned());
        let leaves: Vec<&Chunk> = cumulative.iter().flat_map(flatten).collect();

        let listing = build_tree_listing(driver, &base_listing, &leaves).map_err(|cause| {
            PipelineError::Synthesis { group_id: group.group_id.clone(), cause }
        })?;
        let tree_oid = build_dir(driver, &listing, b"")?;

        let message = match &group.extended_message {
            Some(ext) => format!("{}\n\n{}", group.commit_message, ext),
            None => group.commit_message.clone(),
        };
        let commit_oid = driver.commit_tree(&tree_oid, Some(&parent), &message)?;
        debug!(logger, "synthesized commit";
               "group" => &group.group_id, "commit" => &commit_oid, "tree" => &tree_oid);
        parent = commit_oid;

        if let Some(cb) = progress.as_deref_mut() {
            cb((k + 1) as u32, total);
        }
    }

    Ok(Some(parent))
}

/// `build_tree(base_tree, listing, [])` is identity -- a no-op call with
/// zero chunks just clones the base listing.
fn build_tree_listing(driver: &GitDriver, base_listing: &Listing, leaves: &[&Chunk]) -> Result<Listing> {
    let mut listing = base_listing.clone();
    let mut splice_chunks: HashMap<Vec<u8>, Vec<&Chunk>> = HashMap::new();
    let mut empty_adds: Vec<Vec<u8>> = Vec::new();

    for &chunk in leaves {
        match chunk {
            Chunk::Rename(c) => {
                let entry = listing
                    .remove(&c.old_path)
                    .with_context(|| format!("rename source missing from tree listing: {:?}", String::from_utf8_lossy(&c.old_path)))?;
                listing.insert(c.new_path.clone(), entry);
                if !c.items.is_empty() {
                    splice_chunks.entry(c.new_path.clone()).or_default().push(chunk);
                }
            }
            Chunk::Standard(c) => {
                splice_chunks.entry(c.path.clone()).or_default().push(chunk);
            }
            Chunk::EmptyAdd(c) => {
                empty_adds.push(c.path.clone());
                listing.insert(c.path.clone(), ("100644".to_string(), String::new()));
            }
            Chunk::Delete(c) => {
                listing.remove(&c.path);
            }
            Chunk::Composite(_) => unreachable!("flatten() expands composites before this point"),
        }
    }

    if splice_chunks.is_empty() && empty_adds.is_empty() {
        return Ok(listing);
    }

    let mut oid_for_path: HashMap<Vec<u8>, String> = HashMap::new();
    for path in splice_chunks.keys() {
        let (_, oid) = listing
            .get(path)
            .filter(|(_, oid)| !oid.is_empty())
            .with_context(|| format!("modified path missing from tree listing: {:?}", String::from_utf8_lossy(path)))?;
        oid_for_path.insert(path.clone(), oid.clone());
    }
    let oids: Vec<String> = oid_for_path.values().cloned().collect();
    let blobs = driver.cat_file_batch(&oids)?;

    let mut touched_paths: Vec<Vec<u8>> = splice_chunks.keys().cloned().collect();
    touched_paths.sort();

    let mut new_contents: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    for path in &touched_paths {
        let oid = &oid_for_path[path];
        let original = blobs.get(oid).cloned().unwrap_or_default();
        let mut parts: Vec<(u32, &[LineItem])> = splice_chunks[path]
            .iter()
            .filter_map(|c| splice_parts(c))
            .collect();
        parts.sort_by_key(|(start, _)| *start);
        new_contents.push((path.clone(), apply_splices(&original, &parts)));
    }
    for path in &empty_adds {
        new_contents.push((path.clone(), Vec::new()));
    }

    let mut tmp_files = Vec::with_capacity(new_contents.len());
    for (_, content) in &new_contents {
        let mut f = tempfile::NamedTempFile::new().context("creating temp file for blob write")?;
        f.write_all(content).context("writing temp blob content")?;
        f.flush().context("flushing temp blob content")?;
        tmp_files.push(f);
    }
    let tmp_paths: Vec<PathBuf> = tmp_files.iter().map(|f| f.path().to_path_buf()).collect();
    let new_oids = driver.hash_object_batch_paths(&tmp_paths)?;
    if new_oids.len() != new_contents.len() {
        bail!("hash-object --stdin-paths returned {} ids for {} inputs", new_oids.len(), new_contents.len());
    }

    for ((path, _), oid) in new_contents.iter().zip(new_oids.iter()) {
        let mode = listing.get(path).map(|(m, _)| m.clone()).unwrap_or_else(|| "100644".to_string());
        listing.insert(path.clone(), (mode, oid.clone()));
    }

    Ok(listing)
}

fn splice_parts(chunk: &Chunk) -> Option<(u32, &[LineItem])> {
    match chunk {
        Chunk::Standard(c) => Some((c.old_start, &c.items)),
        Chunk::Rename(c) if !c.items.is_empty() => Some((c.old_start, &c.items)),
        _ => None,
    }
}

fn flatten(chunk: &Chunk) -> Vec<&Chunk> {
    match chunk {
        Chunk::Composite(members) => members.iter().flat_map(flatten).collect(),
        other => vec![other],
    }
}

/// Scans `original`'s lines with a 1-indexed cursor and, for each chunk
/// sorted by `old_start`: copies `[cursor, old_start)`, emits the chunk's
/// addition lines (new-line order), advances the cursor past the removed
/// lines. Appends the tail.
fn apply_splices(original: &[u8], chunks: &[(u32, &[LineItem])]) -> Vec<u8> {
    let mut output = Vec::new();
    let mut remaining = original;
    let mut cursor: u32 = 1;

    for (old_start, items) in chunks {
        let skip = old_start.saturating_sub(cursor) as usize;
        let (pre, rest) = split_lines_after(remaining, skip);
        output.extend_from_slice(pre);
        remaining = rest;

        let mut additions: Vec<(u32, &[u8])> = items
            .iter()
            .filter_map(|i| match i {
                LineItem::Addition { new_line, text } => Some((*new_line, text.as_slice())),
                _ => None,
            })
            .collect();
        additions.sort_by_key(|(line, _)| *line);
        for (_, text) in additions {
            output.extend_from_slice(text);
        }

        let removal_count = items.iter().filter(|i| i.is_removal()).count();
        let (_, after) = split_lines_after(remaining, removal_count);
        remaining = after;
        cursor = old_start + removal_count as u32;
    }

    output.extend_from_slice(remaining);
    output
}

/// Returns `(first n lines, rest)`. Below ~1 MiB this runs entirely in
/// memory; larger files would stream through a temp file instead, but
/// since this is pure byte slicing either implementation is trivially
/// equivalent, so only the in-memory path is implemented.
fn split_lines_after(content: &[u8], n: usize) -> (&[u8], &[u8]) {
    let split_index = if n > 0 {
        memchr::Memchr::new(b'\n', content)
            .nth(n - 1)
            .map(|x| x + 1)
            .unwrap_or(content.len())
    } else {
        0
    };
    content.split_at(split_index)
}

/// Bottom-up `mktree`: groups the flat listing by `/`-separated directory
/// prefix and emits one `mktree` call per directory, recursing into
/// subdirectories first so their tree oids are available for the parent.
fn build_dir(driver: &GitDriver, listing: &Listing, prefix: &[u8]) -> Result<String, PipelineError> {
    let mut direct: Vec<(Vec<u8>, String, String)> = Vec::new();
    let mut subdirs: BTreeSet<Vec<u8>> = BTreeSet::new();

    for (path, (mode, oid)) in listing {
        if !path.starts_with(prefix) {
            continue;
        }
        let rest = &path[prefix.len()..];
        if rest.is_empty() {
            continue;
        }
        match rest.iter().position(|&b| b == b'/') {
            Some(slash) => {
                subdirs.insert(rest[..slash].to_vec());
            }
            None => direct.push((rest.to_vec(), mode.clone(), oid.clone())),
        }
    }

    let mut entries = direct;
    for sub in subdirs {
        let mut child_prefix = prefix.to_vec();
        child_prefix.extend_from_slice(&sub);
        child_prefix.push(b'/');
        let tree_oid = build_dir(driver, listing, &child_prefix)?;
        entries.push((sub, "040000".to_string(), tree_oid));
    }

    driver.mktree(&entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{LineItem, StandardChunk};

    #[test]
    fn apply_splices_replaces_a_single_line() {
        let original = b"a\nb\nc\nd\ne\n";
        let items = [
            LineItem::Removal { old_line: 3, text: b"c\n".to_vec() },
            LineItem::Addition { new_line: 3, text: b"three\n".to_vec() },
        ];
        let parts: Vec<(u32, &[LineItem])> = vec![(3, &items[..])];
        let result = apply_splices(original, &parts);
        assert_eq!(result, b"a\nb\nthree\nd\ne\n");
    }

    #[test]
    fn apply_splices_handles_two_nonadjacent_deletions() {
        let original = b"1\n2\n3\n4\n5\n";
        let removal_at = |line: u32, text: &[u8]| {
            vec![LineItem::Removal { old_line: line, text: text.to_vec() }]
        };
        let r2 = removal_at(2, b"2\n");
        let r4 = removal_at(4, b"4\n");
        let parts: Vec<(u32, &[LineItem])> = vec![(2, &r2[..]), (4, &r4[..])];
        let result = apply_splices(original, &parts);
        assert_eq!(result, b"1\n3\n5\n");
    }

    #[test]
    fn empty_chunk_plan_is_identity() {
        let original = b"unchanged\ncontent\n";
        let result = apply_splices(original, &[]);
        assert_eq!(result, original);
    }

    #[test]
    fn flatten_expands_nested_composites() {
        let leaf = Chunk::Standard(StandardChunk { path: b"a.txt".to_vec(), old_start: 1, new_start: 1, items: vec![] });
        let composite = Chunk::Composite(vec![Chunk::Composite(vec![leaf])]);
        assert_eq!(flatten(&composite).len(), 1);
    }
}
