//! Grammar-driven parsing and language detection.
//!
//! Language-to-grammar mapping is grounded in
//! `CryptArtificer-booger::index::chunker::get_language`; extended here with
//! a shebang fallback for extensionless scripts, since the pipeline has to
//! classify arbitrary paths out of a diff rather than a pre-filtered file
//! walk.

pub mod query_manager;
pub mod scope;
pub mod symbols;

use tree_sitter::{Language, Parser, Tree};

pub use query_manager::QueryManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LangId {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    C,
}

impl LangId {
    pub fn name(self) -> &'static str {
        match self {
            LangId::Rust => "rust",
            LangId::Python => "python",
            LangId::JavaScript => "javascript",
            LangId::TypeScript => "typescript",
            LangId::Go => "go",
            LangId::C => "c",
        }
    }

    fn grammar(self) -> Language {
        match self {
            LangId::Rust => tree_sitter_rust::LANGUAGE.into(),
            LangId::Python => tree_sitter_python::LANGUAGE.into(),
            LangId::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            LangId::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            LangId::Go => tree_sitter_go::LANGUAGE.into(),
            LangId::C => tree_sitter_c::LANGUAGE.into(),
        }
    }
}

/// Extension-keyed detection with a shebang fallback for extensionless
/// scripts (`#!/usr/bin/env python3` etc.).
pub fn detect_language(path: &[u8], content: &[u8]) -> Option<LangId> {
    let path_str = String::from_utf8_lossy(path);
    let ext = path_str.rsplit('.').next().unwrap_or("");
    let by_ext = match ext {
        "rs" => Some(LangId::Rust),
        "py" => Some(LangId::Python),
        "js" | "jsx" | "mjs" | "cjs" => Some(LangId::JavaScript),
        "ts" | "tsx" => Some(LangId::TypeScript),
        "go" => Some(LangId::Go),
        "c" | "h" => Some(LangId::C),
        _ => None,
    };
    by_ext.or_else(|| detect_by_shebang(content))
}

fn detect_by_shebang(content: &[u8]) -> Option<LangId> {
    if !content.starts_with(b"#!") {
        return None;
    }
    let first_line = content.split(|&b| b == b'\n').next().unwrap_or(content);
    let line = String::from_utf8_lossy(first_line);
    if line.contains("python") {
        Some(LangId::Python)
    } else if line.contains("node") {
        Some(LangId::JavaScript)
    } else {
        None
    }
}

/// A parsed file restricted to the line ranges the pipeline actually needs
/// to analyze, plus the byte content the ranges index into.
pub struct ParsedFile {
    pub content: Vec<u8>,
    pub tree: Tree,
    pub language: LangId,
    pub ranges: Vec<(u32, u32)>,
}

impl ParsedFile {
    pub fn parse(language: LangId, content: Vec<u8>, ranges: Vec<(u32, u32)>) -> Option<Self> {
        let mut parser = Parser::new();
        parser.set_language(&language.grammar()).ok()?;
        let tree = parser.parse(&content, None)?;
        Some(ParsedFile {
            content,
            tree,
            language,
            ranges,
        })
    }
}
