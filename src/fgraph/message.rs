//! Cyclic message passing. A round updates a node from its incoming
//! messages and re-queues every neighbour whose incoming message changed;
//! convergence is declared when the worklist drains. The fixpoint is an
//! over-approximation of the exact projection on every variable node.

use {
    super::{FactorGraph, FgNodeKind, NodeId},
    crate::{
        bdd::{Bdd, BddManager},
        types::{FlagIF, FlagNode, SolveResult},
    },
    std::collections::VecDeque,
};

impl FactorGraph {
    /// Pass messages until no message changes. Returns the iteration count.
    pub fn converge(&mut self, mgr: &mut BddManager) -> SolveResult<usize> {
        if self.num_live_edges() == 0 {
            return Ok(0);
        }
        // reset all messages to `one`
        for e in self.live_edges() {
            let ed = self.edge_mut(e);
            let old_fv = ed.msg_fv.replace(mgr.one());
            let old_vf = ed.msg_vf.replace(mgr.one());
            for m in [old_fv, old_vf].into_iter().flatten() {
                mgr.free(m)?;
            }
        }
        self.clear_traversal_state();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for f in self.live_funcs() {
            self.node_mut(f).turn_on(FlagNode::VISITED);
            queue.push_back(f);
        }
        let mut iterations = 1;
        let mut processing_funcs = true;
        while let Some(n) = queue.pop_front() {
            if self.is_func(n) != processing_funcs {
                processing_funcs = !processing_funcs;
                iterations += 1;
            }
            if self.is_func(n) {
                self.func_node_pass_messages(mgr, n, &mut queue)?;
            } else {
                self.var_node_pass_messages(mgr, n, &mut queue)?;
            }
            self.node_mut(n).turn_off(FlagNode::VISITED);
        }
        Ok(iterations)
    }

    /// Conjoin the incoming function→variable messages and project the
    /// conjunction onto each neighbour factor's support.
    fn var_node_pass_messages(
        &mut self,
        mgr: &mut BddManager,
        n: NodeId,
        queue: &mut VecDeque<NodeId>,
    ) -> SolveResult<()> {
        let edges = self.live_neighbors(n);
        let incoming: Vec<Bdd> = edges
            .iter()
            .filter_map(|e| self.edge(*e).msg_fv)
            .collect();
        let conjoined = mgr.and_multi(&incoming)?;
        let conjoined_support = mgr.support(conjoined)?;
        for e in edges {
            let func = self.edge(e).func;
            let away = mgr.cube_diff(conjoined_support, self.support_of(func))?;
            let outgoing = mgr.forsome(conjoined, away)?;
            mgr.free(away)?;
            if self.edge(e).msg_vf == Some(outgoing) {
                mgr.free(outgoing)?;
                continue;
            }
            if let Some(old) = self.edge_mut(e).msg_vf.replace(outgoing) {
                mgr.free(old)?;
            }
            if !self.node(func).is(FlagNode::VISITED) {
                self.node_mut(func).turn_on(FlagNode::VISITED);
                queue.push_back(func);
            }
        }
        mgr.free(conjoined_support)?;
        mgr.free(conjoined)?;
        Ok(())
    }

    /// Project the conjunction of the node's factors and its incoming
    /// variable→function messages onto each neighbour variable's cube, in a
    /// single multi-operand descent per edge.
    fn func_node_pass_messages(
        &mut self,
        mgr: &mut BddManager,
        n: NodeId,
        queue: &mut VecDeque<NodeId>,
    ) -> SolveResult<()> {
        let edges = self.live_neighbors(n);
        let mut operands: Vec<Bdd> = self.factors_of(n).to_vec();
        operands.extend(edges.iter().filter_map(|e| self.edge(*e).msg_vf));
        let joint_support = mgr.vector_support(&operands)?;
        for e in edges {
            let var = self.edge(e).var;
            let away = mgr.cube_diff(joint_support, self.cube_of(var))?;
            let outgoing = mgr.and_exists_multi(&operands, away)?;
            mgr.free(away)?;
            if self.edge(e).msg_fv == Some(outgoing) {
                mgr.free(outgoing)?;
                continue;
            }
            if let Some(old) = self.edge_mut(e).msg_fv.replace(outgoing) {
                mgr.free(old)?;
            }
            if !self.node(var).is(FlagNode::VISITED) {
                self.node_mut(var).turn_on(FlagNode::VISITED);
                queue.push_back(var);
            }
        }
        mgr.free(joint_support)?;
        Ok(())
    }

    /// Project the conjunction of all factors onto `cube`, exactly. Used by
    /// tests and the exact pipeline as the reference answer.
    pub fn exact_projection(&mut self, mgr: &mut BddManager, cube: Bdd) -> SolveResult<Bdd> {
        let mut factors: Vec<Bdd> = Vec::new();
        for f in self.live_funcs() {
            factors.extend_from_slice(self.factors_of(f));
        }
        let joint = mgr.vector_support(&factors)?;
        let away = mgr.cube_diff(joint, cube)?;
        let result = mgr.and_exists_multi(&factors, away)?;
        mgr.free(joint)?;
        mgr.free(away)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::bdd::Bdd,
    };

    /// the twelve-variable, eight-factor graph from the engine's regression
    /// suite:
    /// f0 -- v1 -- f1 -- v2 -- f2 -- v4
    /// |     |     |
    /// v0    f4    v3
    /// |     |
    /// f3    v5 -- f5 -- v6 -- f6 -- v10
    /// |           |           |
    /// + -- v7     v9 -- f7 -- v11
    /// |
    /// + -- v8
    fn sample(mgr: &mut BddManager) -> (Vec<Bdd>, Vec<Bdd>) {
        let v: Vec<Bdd> = (1..=12).map(|i| mgr.new_var_with_index(i).unwrap()).collect();
        let not = |m: &mut BddManager, x: Bdd| m.not(x).unwrap();
        let mut fs = Vec::new();
        // f0 = v0 ∧ ¬v1
        let n1 = not(mgr, v[1]);
        fs.push(mgr.and(v[0], n1).unwrap());
        // f1 = (¬v1 ∧ v3) ∨ (v1 ∧ v2)
        let a = mgr.and(n1, v[3]).unwrap();
        let b = mgr.and(v[1], v[2]).unwrap();
        fs.push(mgr.or(a, b).unwrap());
        // f2 = ¬v2 ∧ v4
        let n2 = not(mgr, v[2]);
        fs.push(mgr.and(n2, v[4]).unwrap());
        // f3 = v0 → (v7 ∧ v8)
        let n0 = not(mgr, v[0]);
        let c = mgr.and(v[7], v[8]).unwrap();
        fs.push(mgr.or(n0, c).unwrap());
        // f4 = ¬v1 → v5
        fs.push(mgr.or(v[1], v[5]).unwrap());
        // f5 = (v5 ∧ v6) ∨ (¬v5 ∨ v9)
        let d = mgr.and(v[5], v[6]).unwrap();
        let n5 = not(mgr, v[5]);
        let e = mgr.or(n5, v[9]).unwrap();
        fs.push(mgr.or(d, e).unwrap());
        // f6 = (v6 ∧ v11) ∨ (¬v6 ∧ ¬v10)
        let g = mgr.and(v[6], v[11]).unwrap();
        let n6 = not(mgr, v[6]);
        let n10 = not(mgr, v[10]);
        let h = mgr.and(n6, n10).unwrap();
        fs.push(mgr.or(g, h).unwrap());
        // f7 = v11 → v9
        let n11 = not(mgr, v[11]);
        fs.push(mgr.or(n11, v[9]).unwrap());
        (fs, v)
    }

    #[test]
    fn test_converge_over_approximates() {
        let mut mgr = BddManager::new(1 << 22);
        let (fs, v) = sample(&mut mgr);
        let mut fg = FactorGraph::new(&mut mgr, &fs).unwrap();
        let iterations = fg.converge(&mut mgr).unwrap();
        assert!(0 < iterations);
        for var in &v {
            let exact = fg.exact_projection(&mut mgr, *var).unwrap();
            let msgs = fg.incoming_messages(&mut mgr, *var).unwrap();
            let conj = mgr.and_multi(&msgs).unwrap();
            assert!(mgr.leq(exact, conj).unwrap(), "message not an over-approximation");
            for m in msgs {
                mgr.free(m).unwrap();
            }
            mgr.free(conj).unwrap();
            mgr.free(exact).unwrap();
        }
        fg.release(&mut mgr).unwrap();
    }

    #[test]
    fn test_converge_exact_on_grouped_tree() {
        let mut mgr = BddManager::new(1 << 22);
        let (fs, v) = sample(&mut mgr);
        let mut fg = FactorGraph::new(&mut mgr, &fs).unwrap();
        // grouping v6, v9, v11 breaks the single cycle
        let c = {
            let a = mgr.cube_union(v[6], v[9]).unwrap();
            mgr.cube_union(a, v[11]).unwrap()
        };
        fg.group_vars(&mut mgr, c).unwrap();
        fg.converge(&mut mgr).unwrap();
        let groups: Vec<Bdd> = vec![
            v[0], v[1], v[2], v[3], v[4], v[5], c, v[7], v[8], v[10],
        ];
        for cube in groups {
            let exact = fg.exact_projection(&mut mgr, cube).unwrap();
            let msgs = fg.incoming_messages(&mut mgr, cube).unwrap();
            let conj = mgr.and_multi(&msgs).unwrap();
            assert_eq!(conj, exact, "acyclic convergence must be exact");
            for m in msgs {
                mgr.free(m).unwrap();
            }
            mgr.free(conj).unwrap();
            mgr.free(exact).unwrap();
        }
        fg.release(&mut mgr).unwrap();
    }
}
