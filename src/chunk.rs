//! The canonical chunk model.
//!
//! A `Chunk` is the thing that survives from mechanical chunking all the
//! way through to synthesis. Every non-`Composite` variant carries an
//! optional old path and optional new path; the variant itself is
//! determined by which of the two are present and whether they're equal,
//! matching `vibe.core.data.diff_chunk.DiffChunk`'s `is_file_rename` /
//! `is_standard_modification` / `is_file_addition` / `is_file_deletion`
//! properties.

use crate::diff_parser::{Hunk, RawLine};
use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineItem {
    Addition { new_line: u32, text: Vec<u8> },
    Removal { old_line: u32, text: Vec<u8> },
}

impl LineItem {
    pub fn is_addition(&self) -> bool {
        matches!(self, LineItem::Addition { .. })
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, LineItem::Removal { .. })
    }
}

/// In-place modification of a single file (old path == new path).
#[derive(Debug, Clone)]
pub struct StandardChunk {
    pub path: Vec<u8>,
    pub old_start: u32,
    pub new_start: u32,
    pub items: Vec<LineItem>,
}

/// Rename (old path != new path); may also carry content changes.
#[derive(Debug, Clone)]
pub struct RenameChunk {
    pub old_path: Vec<u8>,
    pub new_path: Vec<u8>,
    pub old_start: u32,
    pub new_start: u32,
    pub items: Vec<LineItem>,
}

/// A brand new file. No line items: the synthesizer creates an empty blob
/// and any content arrives as a sibling `Standard` chunk against that path.
#[derive(Debug, Clone)]
pub struct EmptyAddChunk {
    pub path: Vec<u8>,
    pub file_mode: Option<String>,
}

/// A file removed entirely.
#[derive(Debug, Clone)]
pub struct DeleteChunk {
    pub path: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum Chunk {
    Standard(StandardChunk),
    Rename(RenameChunk),
    EmptyAdd(EmptyAddChunk),
    Delete(DeleteChunk),
    /// A non-empty ordered sequence of other chunks, used both to carry
    /// whitespace/comment-only neighbors (C8) and to represent the result
    /// of a semantic union-find merge (C10).
    Composite(Vec<Chunk>),
}

impl Chunk {
    pub fn old_path(&self) -> Option<&[u8]> {
        match self {
            Chunk::Standard(c) => Some(&c.path),
            Chunk::Rename(c) => Some(&c.old_path),
            Chunk::EmptyAdd(_) => None,
            Chunk::Delete(c) => Some(&c.path),
            Chunk::Composite(members) => members.first().and_then(|m| m.old_path()),
        }
    }

    pub fn new_path(&self) -> Option<&[u8]> {
        match self {
            Chunk::Standard(c) => Some(&c.path),
            Chunk::Rename(c) => Some(&c.new_path),
            Chunk::EmptyAdd(c) => Some(&c.path),
            Chunk::Delete(_) => None,
            Chunk::Composite(members) => members.first().and_then(|m| m.new_path()),
        }
    }

    /// The key used everywhere downstream: new path if present, else old path.
    pub fn canonical_path(&self) -> &[u8] {
        self.new_path()
            .or_else(|| self.old_path())
            .expect("a chunk must have at least one path")
    }

    pub fn is_rename(&self) -> bool {
        match self {
            Chunk::Rename(_) => true,
            Chunk::Composite(members) => members.first().map_or(false, Chunk::is_rename),
            _ => false,
        }
    }

    /// Line ranges a labeller should visit: both sides for Standard/Rename,
    /// new side only for EmptyAdd, old side only for Delete.
    pub fn analysis_ranges(&self) -> AnalysisRanges {
        match self {
            Chunk::Standard(c) => ranges_from_items(&c.items),
            Chunk::Rename(c) => ranges_from_items(&c.items),
            Chunk::EmptyAdd(_) => AnalysisRanges::default(),
            Chunk::Delete(_) => AnalysisRanges::default(),
            Chunk::Composite(members) => {
                let mut merged = AnalysisRanges::default();
                for m in members {
                    let r = m.analysis_ranges();
                    merged.old.extend(r.old);
                    merged.new.extend(r.new);
                }
                merged
            }
        }
    }

    /// Every line item touched by this chunk, flattened through composites.
    pub fn flat_items(&self) -> Vec<&LineItem> {
        match self {
            Chunk::Standard(c) => c.items.iter().collect(),
            Chunk::Rename(c) => c.items.iter().collect(),
            Chunk::EmptyAdd(_) | Chunk::Delete(_) => Vec::new(),
            Chunk::Composite(members) => members.iter().flat_map(Chunk::flat_items).collect(),
        }
    }

    /// Checks the contiguity invariant: within one Standard chunk, removals
    /// are contiguous starting at `old_start` and additions are contiguous
    /// starting at `new_start`.
    pub fn check_contiguity(&self) -> Result<(), PipelineError> {
        match self {
            Chunk::Standard(c) => check_items_contiguous(&c.items, c.old_start, c.new_start),
            Chunk::Rename(c) => check_items_contiguous(&c.items, c.old_start, c.new_start),
            Chunk::EmptyAdd(_) | Chunk::Delete(_) => Ok(()),
            Chunk::Composite(members) => {
                for m in members {
                    m.check_contiguity()?;
                }
                Ok(())
            }
        }
    }
}

/// Builds the Chunk for one Hunk: walk the raw diff lines, assigning
/// `new_line = new_start + k_new` on `+` lines and `old_line = old_start +
/// k_old` on `-` lines, then pick the variant from which paths are present.
impl Chunk {
    pub fn from_hunk(hunk: Hunk) -> Result<Chunk, PipelineError> {
        let mut items = Vec::with_capacity(hunk.lines.len());
        let mut k_old = 0u32;
        let mut k_new = 0u32;
        for line in &hunk.lines {
            match line {
                RawLine::Removed(text) => {
                    items.push(LineItem::Removal {
                        old_line: hunk.old_start + k_old,
                        text: text.clone(),
                    });
                    k_old += 1;
                }
                RawLine::Added(text) => {
                    items.push(LineItem::Addition {
                        new_line: hunk.new_start + k_new,
                        text: text.clone(),
                    });
                    k_new += 1;
                }
                RawLine::Context(_) => {
                    k_old += 1;
                    k_new += 1;
                }
            }
        }

        let chunk = if hunk.is_file_addition {
            Chunk::EmptyAdd(EmptyAddChunk {
                path: hunk.canonical_path,
                file_mode: hunk.file_mode,
            })
        } else if hunk.is_file_deletion {
            Chunk::Delete(DeleteChunk {
                path: hunk.canonical_path,
            })
        } else if let Some(old_path) = hunk.old_path {
            Chunk::Rename(RenameChunk {
                old_path,
                new_path: hunk.canonical_path,
                old_start: hunk.old_start,
                new_start: hunk.new_start,
                items,
            })
        } else {
            Chunk::Standard(StandardChunk {
                path: hunk.canonical_path,
                old_start: hunk.old_start,
                new_start: hunk.new_start,
                items,
            })
        };
        chunk.check_contiguity()?;
        Ok(chunk)
    }
}

#[derive(Debug, Default, Clone)]
pub struct AnalysisRanges {
    pub old: Vec<(u32, u32)>,
    pub new: Vec<(u32, u32)>,
}

fn ranges_from_items(items: &[LineItem]) -> AnalysisRanges {
    let old_lines: Vec<u32> = items
        .iter()
        .filter_map(|i| match i {
            LineItem::Removal { old_line, .. } => Some(*old_line),
            _ => None,
        })
        .collect();
    let new_lines: Vec<u32> = items
        .iter()
        .filter_map(|i| match i {
            LineItem::Addition { new_line, .. } => Some(*new_line),
            _ => None,
        })
        .collect();

    let mut ranges = AnalysisRanges::default();
    if let (Some(&min), Some(&max)) = (old_lines.iter().min(), old_lines.iter().max()) {
        ranges.old.push((min, max));
    }
    if let (Some(&min), Some(&max)) = (new_lines.iter().min(), new_lines.iter().max()) {
        ranges.new.push((min, max));
    }
    ranges
}

fn check_items_contiguous(
    items: &[LineItem],
    old_start: u32,
    new_start: u32,
) -> Result<(), PipelineError> {
    let mut removal_lines: Vec<u32> = items
        .iter()
        .filter_map(|i| match i {
            LineItem::Removal { old_line, .. } => Some(*old_line),
            _ => None,
        })
        .collect();
    removal_lines.sort_unstable();
    let mut expected = old_start;
    for line in &removal_lines {
        if *line != expected {
            return Err(PipelineError::Chunking(format!(
                "non-contiguous removals: expected line {expected}, got {line}"
            )));
        }
        expected += 1;
    }

    let mut addition_lines: Vec<u32> = items
        .iter()
        .filter_map(|i| match i {
            LineItem::Addition { new_line, .. } => Some(*new_line),
            _ => None,
        })
        .collect();
    addition_lines.sort_unstable();
    let mut expected = new_start;
    for line in &addition_lines {
        if *line != expected {
            return Err(PipelineError::Chunking(format!(
                "non-contiguous additions: expected line {expected}, got {line}"
            )));
        }
        expected += 1;
    }

    Ok(())
}
