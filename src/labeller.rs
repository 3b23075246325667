//! Chunk Labeller (C9): attaches a `Signature` to each chunk.
//!
//! Grounded directly in the original Python's `chunk_lableler.py`
//! `Signature` dataclass and its `from_signatures` union-merge (ported
//! field-for-field: `languages`, `new_structural_scopes`, `new_fqns`,
//! `def_new_symbols`, ..., `*_filtered` variants). The source has an
//! ambiguous `new_symbols.update(new_symbols)` shadowing bug; the raw and
//! filtered accumulators here are each computed independently from first
//! principles instead of one being derived from the other.

use std::collections::HashSet;

use crate::ast::query_manager::QueryManager;
use crate::ast::scope::ScopeForest;
use crate::ast::symbols::{build_symbol_map, SymbolMap};
use crate::ast::{detect_language, LangId, ParsedFile};
use crate::chunk::Chunk;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedFqn {
    pub fqn: String,
    pub kind: String,
}

/// The semantic fingerprint attached to a chunk.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    pub languages: HashSet<String>,
    pub new_structural_scopes: HashSet<String>,
    pub old_structural_scopes: HashSet<String>,
    pub new_fqns: HashSet<TypedFqn>,
    pub old_fqns: HashSet<TypedFqn>,
    pub def_new_symbols: HashSet<String>,
    pub def_old_symbols: HashSet<String>,
    pub extern_new_symbols: HashSet<String>,
    pub extern_old_symbols: HashSet<String>,
    pub def_new_symbols_filtered: HashSet<String>,
    pub def_old_symbols_filtered: HashSet<String>,
    pub extern_new_symbols_filtered: HashSet<String>,
    pub extern_old_symbols_filtered: HashSet<String>,
}

impl Signature {
    fn merge(&mut self, other: &Signature) {
        self.languages.extend(other.languages.iter().cloned());
        self.new_structural_scopes.extend(other.new_structural_scopes.iter().cloned());
        self.old_structural_scopes.extend(other.old_structural_scopes.iter().cloned());
        self.new_fqns.extend(other.new_fqns.iter().cloned());
        self.old_fqns.extend(other.old_fqns.iter().cloned());
        self.def_new_symbols.extend(other.def_new_symbols.iter().cloned());
        self.def_old_symbols.extend(other.def_old_symbols.iter().cloned());
        self.extern_new_symbols.extend(other.extern_new_symbols.iter().cloned());
        self.extern_old_symbols.extend(other.extern_old_symbols.iter().cloned());
        self.def_new_symbols_filtered.extend(other.def_new_symbols_filtered.iter().cloned());
        self.def_old_symbols_filtered.extend(other.def_old_symbols_filtered.iter().cloned());
        self.extern_new_symbols_filtered.extend(other.extern_new_symbols_filtered.iter().cloned());
        self.extern_old_symbols_filtered.extend(other.extern_old_symbols_filtered.iter().cloned());
    }
}

/// Everything the labeller needs about one side (old or new) of one file:
/// parsed once per (path, commit) pair and reused across every chunk that
/// touches that file.
pub struct FileContext {
    pub language: LangId,
    pub forest: ScopeForest,
    pub symbols: SymbolMap,
}

impl FileContext {
    /// Returns `None` on a failed parse or an unrecognized language -- the
    /// caller demotes the owning chunk's signature to `None` and treats it
    /// as an opaque, unmergeable edit.
    pub fn build(qm: &QueryManager, path: &[u8], content: &[u8], ranges: &[(u32, u32)]) -> Option<FileContext> {
        let lang = detect_language(path, content)?;
        let parsed = ParsedFile::parse(lang, content.to_vec(), ranges.to_vec())?;
        let forest = ScopeForest::build(qm, lang, parsed.tree.root_node(), &parsed.content);
        let symbols = build_symbol_map(qm, lang, parsed.tree.root_node(), &parsed.content, ranges);
        Some(FileContext { language: lang, forest, symbols })
    }
}

/// Retrieves (or lazily builds and caches) the `FileContext` for a given
/// canonical path on a given side; so each file is parsed once even though
/// many chunks may reference the same path.
pub trait ContextProvider {
    fn old_context(&mut self, path: &[u8], ranges: &[(u32, u32)]) -> Option<&FileContext>;
    fn new_context(&mut self, path: &[u8], ranges: &[(u32, u32)]) -> Option<&FileContext>;
}

/// Builds the `Signature` for a chunk by visiting its member line ranges.
/// Composite chunks recurse into members and merge; if any member lacks a
/// valid analysis context, the whole chunk's signature is `None`.
pub fn label_chunk(chunk: &Chunk, ctx: &mut dyn ContextProvider) -> Option<Signature> {
    match chunk {
        Chunk::Composite(members) => {
            let mut acc = Signature::default();
            for m in members {
                let sig = label_chunk(m, ctx)?;
                acc.merge(&sig);
            }
            Some(acc)
        }
        Chunk::EmptyAdd(c) => {
            let ranges = chunk.analysis_ranges();
            let file = ctx.new_context(&c.path, &ranges.new)?;
            Some(side_signature(file, &ranges.new, &c.path, Side::New))
        }
        Chunk::Delete(c) => {
            let ranges = chunk.analysis_ranges();
            let file = ctx.old_context(&c.path, &ranges.old)?;
            Some(side_signature(file, &ranges.old, &c.path, Side::Old))
        }
        Chunk::Standard(_) | Chunk::Rename(_) => {
            let ranges = chunk.analysis_ranges();
            let old_path = chunk.old_path().unwrap_or_else(|| chunk.canonical_path());
            let new_path = chunk.new_path().unwrap_or_else(|| chunk.canonical_path());

            let mut sig = Signature::default();
            if !ranges.old.is_empty() {
                let old_file = ctx.old_context(old_path, &ranges.old)?;
                sig.merge(&side_signature(old_file, &ranges.old, old_path, Side::Old));
            }
            if !ranges.new.is_empty() {
                let new_file = ctx.new_context(new_path, &ranges.new)?;
                sig.merge(&side_signature(new_file, &ranges.new, new_path, Side::New));
            }
            Some(sig)
        }
    }
}

#[derive(Clone, Copy)]
enum Side {
    Old,
    New,
}

fn side_signature(file: &FileContext, ranges: &[(u32, u32)], path: &[u8], side: Side) -> Signature {
    let mut sig = Signature::default();
    sig.languages.insert(file.language.name().to_string());

    let structural = file.forest.structural_scope_lines();
    let named = file.forest.semantic_named_scopes();
    let path_str = String::from_utf8_lossy(path).into_owned();

    for &(start, end) in ranges {
        for line in start..=end {
            if let Some(kinds) = structural.get(&line) {
                match side {
                    Side::Old => sig.old_structural_scopes.extend(kinds.iter().cloned()),
                    Side::New => sig.new_structural_scopes.extend(kinds.iter().cloned()),
                }
            }
        }

        let fqns = fqns_crossed(&path_str, &named, &file.forest, start, end);
        match side {
            Side::Old => sig.old_fqns.extend(fqns),
            Side::New => sig.new_fqns.extend(fqns),
        }

        let opened_names = opened_scope_names_by_line(&file.forest, start, end);

        for line in start..=end {
            if let Some(defs) = file.symbols.defined_line_symbols.get(&line) {
                for key in defs {
                    let (raw, filtered) = match side {
                        Side::Old => (&mut sig.def_old_symbols, &mut sig.def_old_symbols_filtered),
                        Side::New => (&mut sig.def_new_symbols, &mut sig.def_new_symbols_filtered),
                    };
                    raw.insert(key.clone());
                    if !is_shadowed(key, opened_names.get(&line)) {
                        filtered.insert(key.clone());
                    }
                }
            }
            if let Some(externs) = file.symbols.extern_line_symbols.get(&line) {
                for key in externs {
                    let (raw, filtered) = match side {
                        Side::Old => (&mut sig.extern_old_symbols, &mut sig.extern_old_symbols_filtered),
                        Side::New => (&mut sig.extern_new_symbols, &mut sig.extern_new_symbols_filtered),
                    };
                    raw.insert(key.clone());
                    if !is_shadowed(key, opened_names.get(&line)) {
                        filtered.insert(key.clone());
                    }
                }
            }
        }
    }

    sig
}

/// A symbol key is `"<text> <class> <lang>"`; it's shadowed if its text
/// equals a scope name newly opened on the same line (a name-binding
/// occurrence, not a usage).
fn is_shadowed(key: &str, opened_on_line: Option<&HashSet<String>>) -> bool {
    let Some(names) = opened_on_line else { return false };
    let text = key.split(' ').next().unwrap_or(key);
    names.contains(text)
}

fn opened_scope_names_by_line(forest: &ScopeForest, start: u32, end: u32) -> std::collections::HashMap<u32, HashSet<String>> {
    let mut out: std::collections::HashMap<u32, HashSet<String>> = std::collections::HashMap::new();
    let named = forest.semantic_named_scopes();
    for line in start..=end {
        let Some(stack) = named.get(&line) else { continue };
        for &idx in stack {
            if let Some(scope) = forest.named_scope(idx) {
                let node = forest.node(idx);
                if node.start_line == line {
                    out.entry(line).or_default().insert(scope.name.to_string());
                }
            }
        }
    }
    out
}

/// Emits `"<file>:<a.b.c>"` FQNs for every enclosing scope crossed while
/// walking the range: on scope-stack shrink (an exit) and at the range's
/// final line.
fn fqns_crossed(
    file: &str,
    named: &std::collections::HashMap<u32, Vec<usize>>,
    forest: &ScopeForest,
    start: u32,
    end: u32,
) -> HashSet<TypedFqn> {
    let mut out = HashSet::new();
    let mut prev: Vec<usize> = Vec::new();
    for line in start..=end {
        let stack = named.get(&line).cloned().unwrap_or_default();
        if stack.len() < prev.len() && !prev.is_empty() {
            out.insert(build_fqn(file, &prev, forest));
        }
        prev = stack;
    }
    if !prev.is_empty() {
        out.insert(build_fqn(file, &prev, forest));
    }
    out
}

fn build_fqn(file: &str, stack: &[usize], forest: &ScopeForest) -> TypedFqn {
    let names: Vec<&str> = stack
        .iter()
        .filter_map(|&i| forest.named_scope(i).map(|s| s.name))
        .collect();
    let kind = stack
        .last()
        .and_then(|&i| forest.named_scope(i))
        .map(|s| s.kind.to_string())
        .unwrap_or_default();
    TypedFqn {
        fqn: format!("{file}:{}", names.join(".")),
        kind,
    }
}
