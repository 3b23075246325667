//! Per-language capture queries, configured from a JSON resource rather
//! than hand-written `match node.kind()` arms.
//!
//! Where `CryptArtificer-booger::index::chunker` hand-writes a
//! `classify_rust`/`classify_python`/... function per language, this crate
//! drives everything off `tree_sitter::Query` text loaded from
//! `resources/queries.json` -- a config table scales across languages
//! without adding a Rust match arm per language feature, which is what a
//! grammar-query engine is for.

use std::collections::HashMap;

use serde::Deserialize;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Query, QueryCursor};

use crate::ast::LangId;
use crate::error::PipelineError;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TokenQueryEntry {
    Patterns(Vec<String>),
    Full {
        queries: Vec<String>,
        #[serde(default)]
        filters: Vec<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct LanguageConfig {
    scope_queries: Vec<String>,
    token_queries: HashMap<String, TokenQueryEntry>,
    /// Reserved for future cross-file symbol sharing; not consulted by any
    /// operation in this crate.
    #[serde(default)]
    #[allow(dead_code)]
    share_tokens_between_files: bool,
}

struct CompiledTokenClass {
    queries: Vec<Query>,
    filters: Vec<String>,
}

pub enum QueryKind<'a> {
    Scope,
    Token(&'a str),
}

pub struct QueryManager {
    scope_queries: HashMap<LangId, Vec<Query>>,
    token_queries: HashMap<LangId, HashMap<String, CompiledTokenClass>>,
}

const ALL_LANGS: &[LangId] = &[
    LangId::Rust,
    LangId::Python,
    LangId::JavaScript,
    LangId::TypeScript,
    LangId::Go,
    LangId::C,
];

impl QueryManager {
    pub fn from_json(raw: &[u8]) -> Result<Self, PipelineError> {
        let by_name: HashMap<String, LanguageConfig> = serde_json::from_slice(raw)
            .map_err(|e| PipelineError::Configuration(format!("invalid query config: {e}")))?;

        let mut scope_queries = HashMap::new();
        let mut token_queries = HashMap::new();

        for lang in ALL_LANGS {
            let Some(cfg) = by_name.get(lang.name()) else {
                continue;
            };
            let grammar = lang_grammar(*lang);

            let mut compiled_scopes = Vec::new();
            for pattern in &cfg.scope_queries {
                let q = Query::new(&grammar, pattern).map_err(|e| {
                    PipelineError::Configuration(format!(
                        "bad scope query for {}: {e}",
                        lang.name()
                    ))
                })?;
                compiled_scopes.push(q);
            }
            scope_queries.insert(*lang, compiled_scopes);

            let mut compiled_classes = HashMap::new();
            for (class, entry) in &cfg.token_queries {
                let (patterns, filters) = match entry {
                    TokenQueryEntry::Patterns(p) => (p.clone(), Vec::new()),
                    TokenQueryEntry::Full { queries, filters } => (queries.clone(), filters.clone()),
                };
                let mut compiled = Vec::new();
                for pattern in &patterns {
                    let q = Query::new(&grammar, pattern).map_err(|e| {
                        PipelineError::Configuration(format!(
                            "bad token query '{class}' for {}: {e}",
                            lang.name()
                        ))
                    })?;
                    compiled.push(q);
                }
                compiled_classes.insert(
                    class.clone(),
                    CompiledTokenClass {
                        queries: compiled,
                        filters,
                    },
                );
            }
            token_queries.insert(*lang, compiled_classes);
        }

        Ok(QueryManager {
            scope_queries,
            token_queries,
        })
    }

    /// The configured token-query class names for a language, e.g.
    /// `"def_function"`, `"ref_identifier"`.
    pub fn classes(&self, lang: LangId) -> Vec<&str> {
        self.token_queries
            .get(&lang)
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns matches grouped by capture class, restricted to nodes whose
    /// start point falls inside one of `ranges` (inclusive, 0-indexed).
    pub fn captures<'tree>(
        &self,
        lang: LangId,
        root: Node<'tree>,
        source: &[u8],
        kind: QueryKind,
        ranges: &[(u32, u32)],
    ) -> HashMap<String, Vec<Node<'tree>>> {
        let mut out: HashMap<String, Vec<Node<'tree>>> = HashMap::new();
        match kind {
            QueryKind::Scope => {
                if let Some(queries) = self.scope_queries.get(&lang) {
                    for query in queries {
                        collect_matches(query, root, source, ranges, &[], &mut out);
                    }
                }
            }
            QueryKind::Token(class) => {
                if let Some(classes) = self.token_queries.get(&lang) {
                    if let Some(compiled) = classes.get(class) {
                        for query in &compiled.queries {
                            collect_matches(query, root, source, ranges, &compiled.filters, &mut out);
                        }
                    }
                }
            }
        }
        out
    }
}

fn collect_matches<'tree>(
    query: &Query,
    root: Node<'tree>,
    source: &[u8],
    ranges: &[(u32, u32)],
    filters: &[String],
    out: &mut HashMap<String, Vec<Node<'tree>>>,
) {
    let mut cursor = QueryCursor::new();
    let capture_names = query.capture_names();
    let mut matches = cursor.matches(query, root, source);
    while let Some(m) = matches.next() {
        for capture in m.captures {
            let node = capture.node;
            let row = node.start_position().row as u32;
            if !ranges.is_empty() && !ranges.iter().any(|&(lo, hi)| row >= lo && row <= hi) {
                continue;
            }
            if !filters.is_empty() {
                let text = node.utf8_text(source).unwrap_or("");
                if filters.iter().any(|f| f == text) {
                    continue;
                }
            }
            let name = capture_names[capture.index as usize].to_string();
            out.entry(name).or_default().push(node);
        }
    }
}

fn lang_grammar(lang: LangId) -> tree_sitter::Language {
    match lang {
        LangId::Rust => tree_sitter_rust::LANGUAGE.into(),
        LangId::Python => tree_sitter_python::LANGUAGE.into(),
        LangId::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        LangId::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        LangId::Go => tree_sitter_go::LANGUAGE.into(),
        LangId::C => tree_sitter_c::LANGUAGE.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_config() {
        let raw = br#"{
            "rust": {
                "scope_queries": ["(function_item) @scope"],
                "token_queries": {
                    "identifier_function": ["(function_item name: (identifier) @name)"]
                }
            }
        }"#;
        let qm = QueryManager::from_json(raw).unwrap();
        assert!(qm.scope_queries.contains_key(&LangId::Rust));
        assert!(qm.token_queries[&LangId::Rust].contains_key("identifier_function"));
    }
}
