//! Logical Grouper (C11) -- interface only.
//!
//! Grounded directly in the original Python's `grouper/interface.py`
//! (`LogicalGrouper.group_chunks`) and its concrete `SingleGrouper`
//! (`single_grouper.py`) -- ported as [`OneGroupPerChunk`], the default
//! implementation used when no model is configured. Concrete LLM-backed
//! groupers (the Python's `langchain_grouper.py`, `gemini_grouper.py`,
//! `embedding_grouper.py`) are out of scope; only the trait and the
//! deterministic default live here.

pub mod semantic;

use crate::chunk::Chunk;

/// A progress update for one pipeline phase. Recognized phase names:
/// `"mechanical"`, `"semantic"`, `"logical"`, `"synthesis"`.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub phase: &'a str,
    pub done: u32,
    pub total: u32,
}

/// An ordered group of chunks to be committed together, with a message.
#[derive(Debug, Clone)]
pub struct CommitGroup {
    pub chunks: Vec<Chunk>,
    pub commit_message: String,
    pub extended_message: Option<String>,
    pub group_id: String,
}

/// Produces ordered commit groups with messages. Implementations must
/// uphold three guarantees:
///
/// 1. Every input chunk appears in exactly one output group.
/// 2. A deterministic "one-group-per-chunk" implementation exists and is
///    the default when no model is configured ([`OneGroupPerChunk`]).
/// 3. The order of output groups is the order they should be committed in.
pub trait LogicalGrouper {
    fn group_chunks(
        &self,
        semantic_chunks: &[Chunk],
        immutable_chunks: &[Chunk],
        user_guidance: Option<&str>,
        progress: Option<&dyn Fn(Progress)>,
    ) -> anyhow::Result<Vec<CommitGroup>>;
}

/// The deterministic default grouper: every chunk (semantic, then
/// immutable, preserving input order) becomes its own commit group.
/// Message format matches the original Python's literal
/// `"Automatically generated commit #{n}"` convention.
pub struct OneGroupPerChunk;

impl LogicalGrouper for OneGroupPerChunk {
    fn group_chunks(
        &self,
        semantic_chunks: &[Chunk],
        immutable_chunks: &[Chunk],
        _user_guidance: Option<&str>,
        progress: Option<&dyn Fn(Progress)>,
    ) -> anyhow::Result<Vec<CommitGroup>> {
        let total = (semantic_chunks.len() + immutable_chunks.len()) as u32;
        let mut groups = Vec::with_capacity(total as usize);

        for (n, chunk) in semantic_chunks.iter().chain(immutable_chunks.iter()).enumerate() {
            groups.push(CommitGroup {
                chunks: vec![chunk.clone()],
                commit_message: format!("Automatically generated commit #{}", n + 1),
                extended_message: None,
                group_id: format!("group-{}", n + 1),
            });
            if let Some(cb) = progress {
                cb(Progress { phase: "logical", done: (n + 1) as u32, total });
            }
        }

        Ok(groups)
    }
}

/// A grouper that puts every chunk into a single "unassigned changes"
/// group -- useful as a cheap sanity baseline and in tests.
pub struct SingleGroup;

impl LogicalGrouper for SingleGroup {
    fn group_chunks(
        &self,
        semantic_chunks: &[Chunk],
        immutable_chunks: &[Chunk],
        _user_guidance: Option<&str>,
        progress: Option<&dyn Fn(Progress)>,
    ) -> anyhow::Result<Vec<CommitGroup>> {
        let chunks: Vec<Chunk> = semantic_chunks
            .iter()
            .chain(immutable_chunks.iter())
            .cloned()
            .collect();
        if let Some(cb) = progress {
            cb(Progress { phase: "logical", done: 1, total: 1 });
        }
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![CommitGroup {
            chunks,
            commit_message: "Unassigned changes".to_string(),
            extended_message: None,
            group_id: "group-unassigned".to_string(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, DeleteChunk};

    fn delete(path: &str) -> Chunk {
        Chunk::Delete(DeleteChunk { path: path.as_bytes().to_vec() })
    }

    #[test]
    fn one_group_per_chunk_covers_every_input_chunk_exactly_once() {
        let semantic = vec![delete("a.txt")];
        let immutable = vec![delete("b.bin")];
        let groups = OneGroupPerChunk.group_chunks(&semantic, &immutable, None, None).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].chunks.len(), 1);
        assert_eq!(groups[1].chunks.len(), 1);
    }

    #[test]
    fn single_group_merges_everything_in_order() {
        let semantic = vec![delete("a.txt")];
        let immutable = vec![delete("b.bin")];
        let groups = SingleGroup.group_chunks(&semantic, &immutable, None, None).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].chunks.len(), 2);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        let groups = OneGroupPerChunk.group_chunks(&[], &[], None, None).unwrap();
        assert!(groups.is_empty());
    }
}
