//! Semantic Grouper (C10): union-find merge of mechanically-split chunks
//! that clearly belong to the same logical edit.
//!
//! The disjoint-set itself is hand-rolled rather than pulled from a crate:
//! a few dozen lines of path-compressed union-find doesn't earn a
//! dependency, and this crate prefers small, self-contained pure functions
//! with a co-located `#[cfg(test)] mod tests`.

use crate::chunk::Chunk;
use crate::labeller::Signature;

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        DisjointSet { parent: (0..n).collect(), rank: vec![0; n] }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.rank[ra] < self.rank[rb] {
            self.parent[ra] = rb;
        } else if self.rank[ra] > self.rank[rb] {
            self.parent[rb] = ra;
        } else {
            self.parent[rb] = ra;
            self.rank[ra] += 1;
        }
    }
}

/// True if two signatures demonstrably refer to the same program entity:
/// a shared `TypedFQN` on either side, a shared defined symbol on the same
/// side, or a shared structural scope identifier within the same file.
fn should_merge(a: &Signature, b: &Signature, same_file: bool) -> bool {
    if a.new_fqns.intersection(&b.new_fqns).next().is_some() {
        return true;
    }
    if a.old_fqns.intersection(&b.old_fqns).next().is_some() {
        return true;
    }
    if a.def_new_symbols.intersection(&b.def_new_symbols).next().is_some() {
        return true;
    }
    if a.def_old_symbols.intersection(&b.def_old_symbols).next().is_some() {
        return true;
    }
    if same_file {
        let a_scopes = a.new_structural_scopes.union(&a.old_structural_scopes);
        let b_scopes: std::collections::HashSet<&String> =
            b.new_structural_scopes.union(&b.old_structural_scopes).collect();
        if a_scopes.into_iter().any(|s| b_scopes.contains(s)) {
            return true;
        }
    }
    false
}

/// Splits labelled chunks into semantic chunks (unions collapsed into
/// `Composite`s, preserving input order; non-merged chunks pass through as
/// singletons) and immutable chunks (null-signature, opaque, passed
/// through unchanged and never re-split or re-labelled).
pub fn group_semantically(labelled: Vec<(Chunk, Option<Signature>)>) -> (Vec<Chunk>, Vec<Chunk>) {
    let mut analyzable: Vec<(usize, Chunk, Signature)> = Vec::new();
    let mut immutable: Vec<Chunk> = Vec::new();

    for (chunk, sig) in labelled {
        match sig {
            Some(sig) => {
                let idx = analyzable.len();
                analyzable.push((idx, chunk, sig));
            }
            None => immutable.push(chunk),
        }
    }

    let n = analyzable.len();
    let mut dsu = DisjointSet::new(n);

    for i in 0..n {
        for j in (i + 1)..n {
            let same_file = analyzable[i].1.canonical_path() == analyzable[j].1.canonical_path();
            if should_merge(&analyzable[i].2, &analyzable[j].2, same_file) {
                dsu.union(i, j);
            }
        }
    }

    let mut buckets: std::collections::HashMap<usize, Vec<usize>> = std::collections::HashMap::new();
    for i in 0..n {
        let root = dsu.find(i);
        buckets.entry(root).or_default().push(i);
    }

    // Emit in the order each bucket's first (lowest-index) member appeared.
    let mut ordered_roots: Vec<usize> = buckets.keys().copied().collect();
    ordered_roots.sort_by_key(|&root| *buckets[&root].iter().min().unwrap());

    let mut chunks: Vec<Option<Chunk>> = analyzable.into_iter().map(|(_, c, _)| Some(c)).collect();
    let mut semantic_chunks = Vec::new();
    for root in ordered_roots {
        let mut members: Vec<usize> = buckets[&root].clone();
        members.sort_unstable();
        if members.len() == 1 {
            semantic_chunks.push(chunks[members[0]].take().unwrap());
        } else {
            let taken: Vec<Chunk> = members.iter().map(|&i| chunks[i].take().unwrap()).collect();
            semantic_chunks.push(Chunk::Composite(taken));
        }
    }

    (semantic_chunks, immutable)
}
