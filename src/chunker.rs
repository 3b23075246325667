//! Atomic splitting and context-only neighbor merging (C8).
//!
//! The atomic split is ported from the original Python's
//! `DiffChunk.split_into_atomic_chunks` two-pointer merge. Because a
//! Standard chunk's removals and additions are contiguous from `old_start`
//! / `new_start` (the contiguity invariant enforced in `chunk.rs`), a
//! removal's relative position within the chunk is just its index in
//! sorted order, and likewise for additions -- so the "same relative
//! position" test from the source collapses to comparing indices directly,
//! with `Option<usize>` standing in for the source's `float('inf')`
//! sentinel once one side runs out.

use std::collections::{HashMap, HashSet};

use crate::chunk::{Chunk, LineItem, RenameChunk, StandardChunk};

/// Splits a chunk's removals/additions into the smallest patch-valid units.
/// `Rename`/`EmptyAdd`/`Delete` pass through unchanged (they carry no
/// mergeable line items, or in Rename's case, no more than one path pair).
pub fn atomic_split(chunk: Chunk) -> Vec<Chunk> {
    match chunk {
        Chunk::Standard(c) => split_items(c.items)
            .into_iter()
            .map(|(old_start, new_start, items)| {
                Chunk::Standard(StandardChunk {
                    path: c.path.clone(),
                    old_start,
                    new_start,
                    items,
                })
            })
            .collect(),
        Chunk::Rename(c) => {
            if c.items.is_empty() {
                vec![Chunk::Rename(c)]
            } else {
                split_items(c.items)
                    .into_iter()
                    .map(|(old_start, new_start, items)| {
                        Chunk::Rename(RenameChunk {
                            old_path: c.old_path.clone(),
                            new_path: c.new_path.clone(),
                            old_start,
                            new_start,
                            items,
                        })
                    })
                    .collect()
            }
        }
        other => vec![other],
    }
}

fn split_items(items: Vec<LineItem>) -> Vec<(u32, u32, Vec<LineItem>)> {
    let mut removals: Vec<(u32, Vec<u8>)> = Vec::new();
    let mut additions: Vec<(u32, Vec<u8>)> = Vec::new();
    for item in items {
        match item {
            LineItem::Removal { old_line, text } => removals.push((old_line, text)),
            LineItem::Addition { new_line, text } => additions.push((new_line, text)),
        }
    }
    removals.sort_by_key(|(l, _)| *l);
    additions.sort_by_key(|(l, _)| *l);

    let min_len = removals.len().min(additions.len());
    let mut out = Vec::new();

    for i in 0..min_len {
        let (old_line, old_text) = removals[i].clone();
        let (new_line, new_text) = additions[i].clone();
        out.push((
            old_line,
            new_line,
            vec![
                LineItem::Removal { old_line, text: old_text },
                LineItem::Addition { new_line, text: new_text },
            ],
        ));
    }

    // Anchor point for any leftover lines: right after the matched region.
    let tail_new_anchor = additions.get(min_len.saturating_sub(1)).map_or(
        additions.first().map_or(0, |(l, _)| *l),
        |(l, _)| l + 1,
    );
    let tail_old_anchor = removals.get(min_len.saturating_sub(1)).map_or(
        removals.first().map_or(0, |(l, _)| *l),
        |(l, _)| l + 1,
    );

    for (old_line, text) in removals.into_iter().skip(min_len) {
        out.push((old_line, tail_new_anchor, vec![LineItem::Removal { old_line, text }]));
    }
    for (new_line, text) in additions.into_iter().skip(min_len) {
        out.push((tail_old_anchor, new_line, vec![LineItem::Addition { new_line, text }]));
    }

    out
}

fn is_context_only(items: &[LineItem], comment_lines: Option<&HashSet<u32>>) -> bool {
    items.iter().all(|item| match item {
        LineItem::Addition { new_line, text } => {
            is_blank(text) || comment_lines.is_some_and(|lines| lines.contains(new_line))
        }
        LineItem::Removal { old_line, text } => {
            is_blank(text) || comment_lines.is_some_and(|lines| lines.contains(old_line))
        }
    })
}

fn is_blank(text: &[u8]) -> bool {
    text.iter().all(u8::is_ascii_whitespace)
}

fn chunk_is_context_only(chunk: &Chunk, comment_lines_by_path: &HashMap<Vec<u8>, HashSet<u32>>) -> bool {
    match chunk {
        Chunk::Standard(c) => !c.items.is_empty() && is_context_only(&c.items, comment_lines_by_path.get(&c.path)),
        Chunk::Rename(c) if !c.items.is_empty() => {
            is_context_only(&c.items, comment_lines_by_path.get(&c.new_path))
        }
        _ => false,
    }
}

/// Wraps runs of context-only (blank/comment-only) chunks into a `Composite`
/// with the nearest non-context neighbor in the same file, preferring the
/// following one, so a whitespace-only edit never becomes its own commit
/// but its bytes are never dropped either.
pub fn merge_context_only_neighbors(
    chunks: Vec<Chunk>,
    comment_lines_by_path: &HashMap<Vec<u8>, HashSet<u32>>,
) -> Vec<Chunk> {
    let n = chunks.len();
    let mut slots: Vec<Option<Chunk>> = chunks.into_iter().map(Some).collect();

    let same_path = |a: &Chunk, b: &Chunk| a.canonical_path() == b.canonical_path();

    let mut i = 0;
    while i < n {
        let Some(current) = slots[i].as_ref() else {
            i += 1;
            continue;
        };
        if !chunk_is_context_only(current, comment_lines_by_path) {
            i += 1;
            continue;
        }

        let start = i;
        let mut end = i;
        while end + 1 < n {
            let (Some(a), Some(b)) = (slots[end].as_ref(), slots[end + 1].as_ref()) else {
                break;
            };
            if chunk_is_context_only(b, comment_lines_by_path) && same_path(a, b) {
                end += 1;
            } else {
                break;
            }
        }

        let has_following = end + 1 < n
            && slots[end + 1]
                .as_ref()
                .is_some_and(|next| same_path(slots[start].as_ref().unwrap(), next));
        let has_preceding = start > 0
            && slots[start - 1]
                .as_ref()
                .is_some_and(|prev| same_path(prev, slots[start].as_ref().unwrap()));

        if has_following {
            let mut members: Vec<Chunk> = (start..=end).map(|k| slots[k].take().unwrap()).collect();
            members.push(slots[end + 1].take().unwrap());
            slots[end + 1] = Some(Chunk::Composite(members));
        } else if has_preceding {
            let mut members = vec![slots[start - 1].take().unwrap()];
            members.extend((start..=end).map(|k| slots[k].take().unwrap()));
            slots[start - 1] = Some(Chunk::Composite(members));
        }
        // No eligible same-file neighbor: leave the run standalone rather
        // than merge across files and violate the single-file Composite
        // invariant.

        i = end + 1;
    }

    slots.into_iter().flatten().collect()
}
