//! Parses `git diff --no-color --unified=0 -M<sim>` output into typed
//! `Hunk`s.
//!
//! Grounded in `owned.rs`'s hunk-line classification loop, generalized from
//! walking a `git2::Patch` to parsing raw unified-diff bytes directly, since
//! the Git Driver hands this component diff *text*, not a libgit2 object.

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLine {
    Context(Vec<u8>),
    Added(Vec<u8>),
    Removed(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct Hunk {
    pub canonical_path: Vec<u8>,
    pub old_path: Option<Vec<u8>>,
    pub file_mode: Option<String>,
    pub old_start: u32,
    pub old_len: u32,
    pub new_start: u32,
    pub new_len: u32,
    pub lines: Vec<RawLine>,
    pub is_rename: bool,
    pub is_file_addition: bool,
    pub is_file_deletion: bool,
}

struct FileBlock<'a> {
    header_lines: Vec<&'a [u8]>,
    hunk_lines: Vec<&'a [u8]>,
}

/// Parse the full output of `git diff --no-color --unified=0 -M<sim>`.
pub fn parse_diff(diff: &[u8]) -> Result<Vec<Hunk>, PipelineError> {
    let lines: Vec<&[u8]> = split_lines(diff);
    let blocks = split_into_file_blocks(&lines);

    let mut hunks = Vec::new();
    for block in blocks {
        hunks.extend(parse_file_block(&block)?);
    }
    Ok(hunks)
}

fn split_lines(diff: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, &b) in diff.iter().enumerate() {
        if b == b'\n' {
            out.push(&diff[start..i]);
            start = i + 1;
        }
    }
    if start < diff.len() {
        out.push(&diff[start..]);
    }
    out
}

fn split_into_file_blocks<'a>(lines: &[&'a [u8]]) -> Vec<FileBlock<'a>> {
    let mut blocks = Vec::new();
    let mut current_header: Vec<&[u8]> = Vec::new();
    let mut current_hunks: Vec<&[u8]> = Vec::new();
    let mut in_block = false;

    for &line in lines {
        if line.starts_with(b"diff --git ") {
            if in_block {
                blocks.push(FileBlock {
                    header_lines: std::mem::take(&mut current_header),
                    hunk_lines: std::mem::take(&mut current_hunks),
                });
            }
            in_block = true;
            current_header.push(line);
        } else if line.starts_with(b"@@") {
            current_hunks.push(line);
        } else if !current_hunks.is_empty() {
            current_hunks.push(line);
        } else {
            current_header.push(line);
        }
    }
    if in_block {
        blocks.push(FileBlock {
            header_lines: current_header,
            hunk_lines: current_hunks,
        });
    }
    blocks
}

fn header_path(line: &[u8], prefix: &[u8]) -> Option<Vec<u8>> {
    let rest = line.strip_prefix(prefix)?;
    // strip the "a/" or "b/" prefix git attaches by default
    let rest = rest.strip_prefix(b"a/").or_else(|| rest.strip_prefix(b"b/")).unwrap_or(rest);
    if rest == b"/dev/null" {
        None
    } else {
        Some(rest.to_vec())
    }
}

fn parse_file_block(block: &FileBlock) -> Result<Vec<Hunk>, PipelineError> {
    let mut old_path: Option<Vec<u8>> = None;
    let mut new_path: Option<Vec<u8>> = None;
    let mut is_rename = false;
    let mut is_file_addition = false;
    let mut is_file_deletion = false;
    let mut file_mode: Option<String> = None;

    for &line in &block.header_lines {
        if let Some(rest) = line.strip_prefix(b"--- ") {
            old_path = header_path(rest, b"");
        } else if let Some(rest) = line.strip_prefix(b"+++ ") {
            new_path = header_path(rest, b"");
        } else if line.starts_with(b"rename from ") {
            old_path = Some(line[b"rename from ".len()..].to_vec());
            is_rename = true;
        } else if line.starts_with(b"rename to ") {
            new_path = Some(line[b"rename to ".len()..].to_vec());
            is_rename = true;
        } else if line.starts_with(b"new file mode ") {
            is_file_addition = true;
            file_mode = Some(String::from_utf8_lossy(&line[b"new file mode ".len()..]).into_owned());
        } else if line.starts_with(b"deleted file mode ") {
            is_file_deletion = true;
        } else if line.starts_with(b"similarity index ") {
            is_rename = true;
        }
    }

    // `--- /dev/null` / `+++ /dev/null` also signal addition/deletion.
    if old_path.is_none() && new_path.is_some() {
        is_file_addition = true;
    }
    if old_path.is_some() && new_path.is_none() {
        is_file_deletion = true;
    }

    let canonical = new_path.clone().or_else(|| old_path.clone()).ok_or_else(|| {
        PipelineError::Chunking("diff block has neither old nor new path".to_string())
    })?;

    let mut hunks = Vec::new();
    let mut i = 0;
    while i < block.hunk_lines.len() {
        let header = block.hunk_lines[i];
        if !header.starts_with(b"@@") {
            i += 1;
            continue;
        }
        let (old_start, old_len, new_start, new_len) = parse_hunk_header(header)?;
        i += 1;

        let mut lines = Vec::new();
        while i < block.hunk_lines.len() && !block.hunk_lines[i].starts_with(b"@@") {
            let l = block.hunk_lines[i];
            if let Some(rest) = l.strip_prefix(b"+") {
                lines.push(RawLine::Added(rest.to_vec()));
            } else if let Some(rest) = l.strip_prefix(b"-") {
                lines.push(RawLine::Removed(rest.to_vec()));
            } else if let Some(rest) = l.strip_prefix(b" ") {
                lines.push(RawLine::Context(rest.to_vec()));
            }
            i += 1;
        }

        hunks.push(Hunk {
            canonical_path: canonical.clone(),
            old_path: if is_rename { old_path.clone() } else { None },
            file_mode: file_mode.clone(),
            old_start,
            old_len,
            new_start,
            new_len,
            lines,
            is_rename,
            is_file_addition,
            is_file_deletion,
        });
    }

    if hunks.is_empty() {
        // A pure file operation (rename/add/delete) with no content change
        // produces exactly one zero-length hunk.
        hunks.push(Hunk {
            canonical_path: canonical,
            old_path: if is_rename { old_path } else { None },
            file_mode,
            old_start: 0,
            old_len: 0,
            new_start: 0,
            new_len: 0,
            lines: Vec::new(),
            is_rename,
            is_file_addition,
            is_file_deletion,
        });
    }

    Ok(hunks)
}

/// Parses `@@ -l[,s] +l[,s] @@` headers. A missing `,s` defaults to `,1`.
fn parse_hunk_header(header: &[u8]) -> Result<(u32, u32, u32, u32), PipelineError> {
    let text = std::str::from_utf8(header)
        .map_err(|_| PipelineError::Chunking("non-utf8 hunk header".to_string()))?;
    let inner = text
        .strip_prefix("@@ ")
        .and_then(|s| s.split(" @@").next())
        .ok_or_else(|| PipelineError::Chunking(format!("malformed hunk header: {text}")))?;

    let mut parts = inner.split(' ');
    let old_part = parts
        .next()
        .ok_or_else(|| PipelineError::Chunking(format!("malformed hunk header: {text}")))?;
    let new_part = parts
        .next()
        .ok_or_else(|| PipelineError::Chunking(format!("malformed hunk header: {text}")))?;

    let (old_start, old_len) = parse_range(old_part, '-')?;
    let (new_start, new_len) = parse_range(new_part, '+')?;
    Ok((old_start, old_len, new_start, new_len))
}

fn parse_range(part: &str, sigil: char) -> Result<(u32, u32), PipelineError> {
    let part = part
        .strip_prefix(sigil)
        .ok_or_else(|| PipelineError::Chunking(format!("expected '{sigil}' prefix in {part}")))?;
    if let Some((start, len)) = part.split_once(',') {
        Ok((
            start.parse().map_err(|_| PipelineError::Chunking(format!("bad line number in {part}")))?,
            len.parse().map_err(|_| PipelineError::Chunking(format!("bad line count in {part}")))?,
        ))
    } else {
        let start: u32 = part.parse().map_err(|_| PipelineError::Chunking(format!("bad line number in {part}")))?;
        Ok((start, 1))
    }
}
