//! Module `merge` clusters factors (and variable sets) before factor-graph
//! construction. Candidate pairs are scored by support compatibility and
//! executed greedily from a max-heap; a merge violating the support-size or
//! BDD-size budget is rejected and the next candidate considered. Mandatory
//! hint pairs rank above every scored pair and bypass the budgets.

use {
    crate::{
        bdd::{Bdd, BddManager},
        types::{OrderedProxy, SolveResult},
    },
    std::collections::BinaryHeap,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum AmKind {
    Func,
    Var,
}

struct AmNode {
    kind: AmKind,
    bdd: Bdd,
    support: Bdd,
    /// candidate mergers this node participates in
    mergers: Vec<usize>,
    /// consumed by a merge; stale mergers mentioning it are skipped
    merged: bool,
}

struct AmMerger {
    node1: usize,
    node2: usize,
    dead: bool,
    mandatory: bool,
}

/// Pairs of factors that must end up in the same cluster.
#[derive(Default)]
pub struct MergeHints {
    pub pairs: Vec<(Bdd, Bdd)>,
}

/// Clustered factors and variable groups; the caller owns all handles.
pub struct MergeResults {
    pub factors: Vec<Bdd>,
    pub variables: Vec<Bdd>,
}

struct Merge<'a> {
    mgr: &'a mut BddManager,
    nodes: Vec<AmNode>,
    mergers: Vec<AmMerger>,
    heap: BinaryHeap<OrderedProxy<usize>>,
    largest_support_set: usize,
    largest_bdd_size: usize,
}

/// Cluster `factors` and group `variables` under the two budgets.
pub fn merge(
    mgr: &mut BddManager,
    factors: &[Bdd],
    variables: &[Bdd],
    largest_support_set: usize,
    largest_bdd_size: usize,
    hints: &MergeHints,
) -> SolveResult<MergeResults> {
    let mut m = Merge {
        mgr,
        nodes: Vec::new(),
        mergers: Vec::new(),
        heap: BinaryHeap::new(),
        largest_support_set,
        largest_bdd_size,
    };
    for f in factors {
        let bdd = m.mgr.dup(*f)?;
        let support = m.mgr.support(bdd)?;
        m.nodes.push(AmNode {
            kind: AmKind::Func,
            bdd,
            support,
            mergers: Vec::new(),
            merged: false,
        });
    }
    for v in variables {
        let bdd = m.mgr.dup(*v)?;
        let support = m.mgr.dup(*v)?;
        m.nodes.push(AmNode {
            kind: AmKind::Var,
            bdd,
            support,
            mergers: Vec::new(),
            merged: false,
        });
    }
    m.seed_candidates(hints)?;
    m.run()?;
    m.results()
}

impl<'a> Merge<'a> {
    fn support_width(&self, n: usize) -> usize {
        self.mgr.size(self.nodes[n].support).saturating_sub(1)
    }

    /// The compatibility score of a pair, or `None` when the pair may not
    /// merge: disconnected functions, or a support union over budget.
    fn compatibility(&mut self, a: usize, b: usize) -> SolveResult<Option<f64>> {
        let (sa, sb) = (self.nodes[a].support, self.nodes[b].support);
        let common = self.mgr.cube_intersection(sa, sb)?;
        let common_width = self.mgr.size(common).saturating_sub(1);
        self.mgr.free(common)?;
        if self.nodes[a].kind == AmKind::Func && common_width == 0 {
            return Ok(None);
        }
        let union = self.mgr.cube_union(sa, sb)?;
        let union_width = self.mgr.size(union).saturating_sub(1);
        self.mgr.free(union)?;
        if self.largest_support_set < union_width {
            return Ok(None);
        }
        let wa = self.support_width(a) as f64;
        let wb = self.support_width(b) as f64;
        Ok(Some(common_width as f64 / wa.min(wb)))
    }

    fn add_merger(&mut self, a: usize, b: usize, score: f64, mandatory: bool) {
        let id = self.mergers.len();
        self.mergers.push(AmMerger {
            node1: a,
            node2: b,
            dead: false,
            mandatory,
        });
        self.nodes[a].mergers.push(id);
        self.nodes[b].mergers.push(id);
        self.heap.push(OrderedProxy::new(id, score));
    }

    fn seed_candidates(&mut self, hints: &MergeHints) -> SolveResult<()> {
        for (x, y) in &hints.pairs {
            let a = self.nodes.iter().position(|n| n.bdd == *x);
            let b = self.nodes.iter().position(|n| n.bdd == *y);
            if let (Some(a), Some(b)) = (a, b) {
                debug_assert_eq!(self.nodes[a].kind, self.nodes[b].kind);
                self.add_merger(a, b, f64::INFINITY, true);
            }
        }
        for a in 0..self.nodes.len() {
            for b in a + 1..self.nodes.len() {
                if self.nodes[a].kind != self.nodes[b].kind {
                    continue;
                }
                if let Some(score) = self.compatibility(a, b)? {
                    self.add_merger(a, b, score, false);
                }
            }
        }
        Ok(())
    }

    /// Execute the most promising merger until all candidates are exhausted.
    fn run(&mut self) -> SolveResult<()> {
        while let Some(top) = self.heap.pop() {
            let mid = top.to();
            let (a, b, mandatory) = {
                let m = &self.mergers[mid];
                (m.node1, m.node2, m.mandatory)
            };
            if self.mergers[mid].dead || self.nodes[a].merged || self.nodes[b].merged {
                continue;
            }
            qlog!(Debug, "merging nodes {a} and {b} with score {}", top.value());
            let kind = self.nodes[a].kind;
            let merged_bdd = self.mgr.and(self.nodes[a].bdd, self.nodes[b].bdd)?;
            if kind == AmKind::Func
                && !mandatory
                && self.largest_bdd_size < self.mgr.size(merged_bdd)
            {
                self.mgr.free(merged_bdd)?;
                self.mergers[mid].dead = true;
                continue;
            }
            let support = match kind {
                AmKind::Func => self.mgr.support(merged_bdd)?,
                AmKind::Var => self.mgr.dup(merged_bdd)?,
            };
            let merged = self.nodes.len();
            self.nodes.push(AmNode {
                kind,
                bdd: merged_bdd,
                support,
                mergers: Vec::new(),
                merged: false,
            });
            self.nodes[a].merged = true;
            self.nodes[b].merged = true;
            // invalidate the stale mergers on the two endpoints and re-score
            // each surviving partner against the merged node
            let mut partners: Vec<usize> = Vec::new();
            let stale: Vec<usize> = self.nodes[a]
                .mergers
                .iter()
                .chain(self.nodes[b].mergers.iter())
                .copied()
                .collect();
            for sid in stale {
                let m = &mut self.mergers[sid];
                m.dead = true;
                let other = if m.node1 != a && m.node1 != b {
                    Some(m.node1)
                } else if m.node2 != a && m.node2 != b {
                    Some(m.node2)
                } else {
                    None
                };
                if let Some(o) = other {
                    if !self.nodes[o].merged && !partners.contains(&o) {
                        partners.push(o);
                    }
                }
            }
            for o in partners {
                if let Some(score) = self.compatibility(merged, o)? {
                    self.add_merger(merged, o, score, false);
                }
            }
        }
        Ok(())
    }

    /// Hand the surviving clusters to the caller, releasing everything else.
    fn results(&mut self) -> SolveResult<MergeResults> {
        let mut factors = Vec::new();
        let mut variables = Vec::new();
        for n in &self.nodes {
            self.mgr.free(n.support)?;
            if n.merged {
                self.mgr.free(n.bdd)?;
                continue;
            }
            match n.kind {
                AmKind::Func => factors.push(n.bdd),
                AmKind::Var => variables.push(n.bdd),
            }
        }
        self.nodes.clear();
        Ok(MergeResults { factors, variables })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(mgr: &mut BddManager, n: u32) -> Vec<Bdd> {
        (1..=n).map(|i| mgr.new_var_with_index(i).unwrap()).collect()
    }

    #[test]
    fn test_merge_respects_support_budget() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 4);
        // two chained implications sharing v2, plus an unrelated factor
        let n1 = mgr.not(v[0]).unwrap();
        let f0 = mgr.or(n1, v[1]).unwrap();
        let n2 = mgr.not(v[1]).unwrap();
        let f1 = mgr.or(n2, v[2]).unwrap();
        let f2 = v[3];
        let r = merge(&mut mgr, &[f0, f1, f2], &[], 3, 1 << 20, &MergeHints::default()).unwrap();
        // f0 and f1 merge (union support {1,2,3}), f2 shares no variable
        assert_eq!(r.factors.len(), 2);
        let expected = mgr.and(f0, f1).unwrap();
        assert!(r.factors.contains(&expected));
        assert!(r.factors.contains(&f2));

        // a tight budget forbids the merge
        let r2 = merge(&mut mgr, &[f0, f1, f2], &[], 2, 1 << 20, &MergeHints::default()).unwrap();
        assert_eq!(r2.factors.len(), 3);
    }

    #[test]
    fn test_merge_groups_variables() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 4);
        let r = merge(&mut mgr, &[], &v, 2, 1 << 20, &MergeHints::default()).unwrap();
        // pairs only: the budget stops any third variable from joining
        assert_eq!(r.variables.len(), 2);
        for g in &r.variables {
            assert_eq!(mgr.size(*g), 3);
        }
    }

    #[test]
    fn test_mandatory_hint_bypasses_budget() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 6);
        let f0 = mgr.and(v[0], v[1]).unwrap();
        let f1 = mgr.and(v[2], v[3]).unwrap();
        let hints = MergeHints {
            pairs: vec![(f0, f1)],
        };
        // disconnected pair, support budget too small: only the hint merges it
        let r = merge(&mut mgr, &[f0, f1], &[], 1, 1 << 20, &hints).unwrap();
        assert_eq!(r.factors.len(), 1);
        let expected = mgr.and(f0, f1).unwrap();
        assert_eq!(r.factors[0], expected);
    }

    #[test]
    fn test_bdd_size_budget_rejects() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 3);
        let x1 = mgr.xnor(v[0], v[1]).unwrap();
        let x2 = mgr.xnor(v[1], v[2]).unwrap();
        // the conjunction has more nodes than either operand
        let conj = mgr.and(x1, x2).unwrap();
        let cap = mgr.size(conj) - 1;
        let r = merge(&mut mgr, &[x1, x2], &[], 10, cap, &MergeHints::default()).unwrap();
        assert_eq!(r.factors.len(), 2);
    }
}
