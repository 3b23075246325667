//! Per-line defined/external symbol sets and comment-only line detection.
//!
//! Grounded in the original Python's `Signature` dataclass fields
//! (`def_new_symbols`, `extern_new_symbols`, ...) and in
//! `CryptArtificer-booger`'s per-language `find_child_by_field` pattern for
//! pulling a definition's name out of its node.
//!
//! Convention: a token-query class prefixed `def_` produces defining
//! occurrences, one prefixed `ref_` produces referencing occurrences. A
//! `comment` class (if configured for the language) marks comment nodes.
//! Neither prefix is enforced by the JSON schema; it's a naming convention
//! this crate's `resources/queries.json` follows.

use std::collections::{HashMap, HashSet};

use tree_sitter::Node;

use crate::ast::query_manager::{QueryKind, QueryManager};
use crate::ast::LangId;

pub struct SymbolMap {
    pub defined_line_symbols: HashMap<u32, HashSet<String>>,
    pub extern_line_symbols: HashMap<u32, HashSet<String>>,
    pub pure_comment_lines: HashSet<u32>,
}

/// Every line key in `SymbolMap` is 1-indexed, matching unified-diff line
/// numbers, not tree-sitter's 0-indexed `Point::row`.
pub fn build_symbol_map(
    qm: &QueryManager,
    lang: LangId,
    root: Node,
    source: &[u8],
    ranges: &[(u32, u32)],
) -> SymbolMap {
    let mut defined_line_symbols: HashMap<u32, HashSet<String>> = HashMap::new();
    let mut all_defined_text: HashSet<String> = HashSet::new();
    let mut reference_hits: Vec<(u32, String, String)> = Vec::new();

    for class in qm.classes(lang) {
        let captures = qm.captures(lang, root, source, QueryKind::Token(class), ranges);
        for nodes in captures.values() {
            for node in nodes {
                let text = node.utf8_text(source).unwrap_or("").to_string();
                let line = node.start_position().row as u32 + 1;
                let key = symbol_key(&text, class, lang);
                if class.starts_with("def_") {
                    defined_line_symbols.entry(line).or_default().insert(key);
                    all_defined_text.insert(text);
                } else if class.starts_with("ref_") {
                    reference_hits.push((line, text, key));
                }
            }
        }
    }

    let mut extern_line_symbols: HashMap<u32, HashSet<String>> = HashMap::new();
    for (line, text, key) in reference_hits {
        if !all_defined_text.contains(&text) {
            extern_line_symbols.entry(line).or_default().insert(key);
        }
    }

    let pure_comment_lines = comment_lines(qm, lang, root, source, ranges);

    SymbolMap {
        defined_line_symbols,
        extern_line_symbols,
        pure_comment_lines,
    }
}

/// A line counts as "pure comment" only if its entire content -- not just
/// some overlapping node -- is the comment token; `let x = 1; // note` must
/// not be marked comment-only just because a comment node touches the line.
fn comment_lines(
    qm: &QueryManager,
    lang: LangId,
    root: Node,
    source: &[u8],
    ranges: &[(u32, u32)],
) -> HashSet<u32> {
    let mut lines = HashSet::new();
    let captures = qm.captures(lang, root, source, QueryKind::Token("comment"), ranges);
    for nodes in captures.values() {
        for node in nodes {
            let start_row = node.start_position().row as u32 + 1;
            let end_row = node.end_position().row as u32 + 1;
            if start_row == end_row {
                if line_prefix_is_blank(source, node.start_byte())
                    && line_suffix_is_blank(source, node.end_byte())
                {
                    lines.insert(start_row);
                }
                continue;
            }
            if line_prefix_is_blank(source, node.start_byte()) {
                lines.insert(start_row);
            }
            for l in (start_row + 1)..end_row {
                lines.insert(l);
            }
            if line_suffix_is_blank(source, node.end_byte()) {
                lines.insert(end_row);
            }
        }
    }
    lines
}

/// True if every byte between the start of the line containing `byte_pos`
/// and `byte_pos` itself is horizontal whitespace.
fn line_prefix_is_blank(source: &[u8], byte_pos: usize) -> bool {
    let line_start = source[..byte_pos]
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0);
    source[line_start..byte_pos].iter().all(|&b| b == b' ' || b == b'\t')
}

/// True if every byte between `byte_pos` and the end of its line (exclusive
/// of the newline) is horizontal whitespace.
fn line_suffix_is_blank(source: &[u8], byte_pos: usize) -> bool {
    let line_end = source[byte_pos..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| byte_pos + p)
        .unwrap_or(source.len());
    source[byte_pos..line_end].iter().all(|&b| b == b' ' || b == b'\t' || b == b'\r')
}

fn symbol_key(text: &str, class: &str, lang: LangId) -> String {
    format!("{text} {class} {}", lang.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::query_manager::QueryManager;
    use crate::ast::ParsedFile;

    #[test]
    fn symbol_key_includes_language_for_disambiguation() {
        assert_eq!(symbol_key("foo", "def_function", LangId::Rust), "foo def_function rust");
        assert_ne!(
            symbol_key("foo", "def_function", LangId::Rust),
            symbol_key("foo", "def_function", LangId::Python)
        );
    }

    fn rust_qm() -> QueryManager {
        QueryManager::from_json(include_bytes!("../../resources/queries.json")).unwrap()
    }

    #[test]
    fn defined_symbol_line_is_one_indexed() {
        let src = b"fn foo() {\n    let x = 1;\n}\n".to_vec();
        let qm = rust_qm();
        let parsed = ParsedFile::parse(LangId::Rust, src, vec![]).unwrap();
        let map = build_symbol_map(&qm, LangId::Rust, parsed.tree.root_node(), &parsed.content, &[]);
        // `fn foo` is on line 1 (1-indexed), not line 0.
        assert!(map.defined_line_symbols.get(&1).is_some());
        assert!(!map.defined_line_symbols.contains_key(&0));
    }

    #[test]
    fn trailing_comment_does_not_mark_the_whole_line_as_comment_only() {
        let src = b"fn foo() {\n    let x = 1; // note\n}\n".to_vec();
        let qm = rust_qm();
        let parsed = ParsedFile::parse(LangId::Rust, src, vec![]).unwrap();
        let map = build_symbol_map(&qm, LangId::Rust, parsed.tree.root_node(), &parsed.content, &[]);
        assert!(!map.pure_comment_lines.contains(&2));
    }

    #[test]
    fn standalone_comment_line_is_pure_comment() {
        let src = b"fn foo() {\n    // note\n    let x = 1;\n}\n".to_vec();
        let qm = rust_qm();
        let parsed = ParsedFile::parse(LangId::Rust, src, vec![]).unwrap();
        let map = build_symbol_map(&qm, LangId::Rust, parsed.tree.root_node(), &parsed.content, &[]);
        assert!(map.pure_comment_lines.contains(&2));
        assert!(!map.pure_comment_lines.contains(&3));
    }
}
