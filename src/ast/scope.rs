//! Nested scope forest, built from a language's scope queries.
//!
//! An arena of dense `usize` indices rather than owned parent/child
//! references -- scopes naturally form cycles of interest (child points
//! back to parent, parent enumerates children) that Rust's ownership model
//! can't express directly, so this is addressed by index the way an AST
//! pool typically is, rather than fought with `Rc`/`Weak`.

use std::collections::{HashMap, HashSet};

use tree_sitter::Node;

use crate::ast::query_manager::{QueryKind, QueryManager};
use crate::ast::LangId;

#[derive(Debug, Clone)]
pub struct ScopeNode {
    pub kind: String,
    pub name: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct NamedScope<'a> {
    pub kind: &'a str,
    pub name: &'a str,
}

pub struct ScopeForest {
    nodes: Vec<ScopeNode>,
}

impl ScopeForest {
    /// `start_line`/`end_line` are 1-indexed, matching unified-diff line
    /// numbers, not tree-sitter's 0-indexed `Point::row`.
    pub fn build(qm: &QueryManager, lang: LangId, root: Node, source: &[u8]) -> Self {
        let captures = qm.captures(lang, root, source, QueryKind::Scope, &[]);

        let mut raw: Vec<(u32, u32, String, Option<String>)> = Vec::new();
        for nodes in captures.values() {
            for node in nodes {
                let name = node
                    .child_by_field_name("name")
                    .and_then(|n| n.utf8_text(source).ok())
                    .map(|s| s.to_string());
                raw.push((
                    node.start_position().row as u32 + 1,
                    node.end_position().row as u32 + 1,
                    node.kind().to_string(),
                    name,
                ));
            }
        }
        raw.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut nodes: Vec<ScopeNode> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        for (start_line, end_line, kind, name) in raw {
            while let Some(&top) = stack.last() {
                if nodes[top].end_line >= end_line {
                    break;
                }
                stack.pop();
            }
            let parent = stack.last().copied();
            let idx = nodes.len();
            nodes.push(ScopeNode {
                kind,
                name,
                start_line,
                end_line,
                parent,
                children: Vec::new(),
            });
            if let Some(p) = parent {
                nodes[p].children.push(idx);
            }
            stack.push(idx);
        }

        ScopeForest { nodes }
    }

    pub fn node(&self, idx: usize) -> &ScopeNode {
        &self.nodes[idx]
    }

    pub fn named_scope(&self, idx: usize) -> Option<NamedScope> {
        let node = &self.nodes[idx];
        node.name.as_deref().map(|name| NamedScope {
            kind: &node.kind,
            name,
        })
    }

    /// Every kind token covering each line.
    pub fn structural_scope_lines(&self) -> HashMap<u32, HashSet<String>> {
        let mut out: HashMap<u32, HashSet<String>> = HashMap::new();
        for node in &self.nodes {
            for line in node.start_line..=node.end_line {
                out.entry(line).or_default().insert(node.kind.clone());
            }
        }
        out
    }

    /// Innermost-last stack of named enclosing scope indices, per line.
    pub fn semantic_named_scopes(&self) -> HashMap<u32, Vec<usize>> {
        let mut out: HashMap<u32, Vec<usize>> = HashMap::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            if node.name.is_none() {
                continue;
            }
            for line in node.start_line..=node.end_line {
                out.entry(line).or_default().push(idx);
            }
        }
        for stack in out.values_mut() {
            stack.sort_by_key(|&i| (self.nodes[i].start_line, std::cmp::Reverse(self.nodes[i].end_line)));
        }
        out
    }

    /// Smallest scope fully containing `[start, end]`, or `None`.
    pub fn lca(&self, start: u32, end: u32) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.start_line <= start && n.end_line >= end)
            .min_by_key(|(_, n)| n.end_line - n.start_line)
            .map(|(idx, _)| idx)
    }
}
