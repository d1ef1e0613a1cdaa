//! Acyclic message passing: on a tree, one leaves-inward sweep delivers the
//! exact projection at the chosen root. A cyclic graph is first made acyclic
//! by universally quantifying back-edge functions, which turns the acyclic
//! sweep into an under-approximation of the exact result.

use {
    super::{EdgeId, FactorGraph, NodeId},
    crate::{
        bdd::{Bdd, BddManager},
        types::{FlagIF, FlagNode, SolveResult},
    },
    ahash::AHashSet,
    std::collections::VecDeque,
};

impl FactorGraph {
    /// Leaves-inward sweep toward `root` (a variable node). Each node emits
    /// its single unfinished message once all its other edges carry one;
    /// afterwards the incoming messages of `root` are the exact projections
    /// of the factor conjunction onto the root's cube.
    pub fn acyclic_messages(&mut self, mgr: &mut BddManager, root: NodeId) -> SolveResult<()> {
        debug_assert!(!self.is_func(root));
        if self.num_live_edges() == 0 {
            return Ok(());
        }
        // reset messages to "not passed" and message counts to zero
        for e in self.live_edges() {
            let ed = self.edge_mut(e);
            for m in [ed.msg_fv.take(), ed.msg_vf.take()].into_iter().flatten() {
                mgr.free(m)?;
            }
        }
        self.clear_traversal_state();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        let mut live: Vec<NodeId> = self.live_funcs();
        live.extend(self.live_vars());
        for n in live {
            if self.live_degree(n) == 1 && n != root {
                self.node_mut(n).turn_on(FlagNode::VISITED);
                queue.push_back(n);
            }
        }
        if queue.is_empty() {
            return Err(FactorGraph::leaf_error());
        }
        while let Some(n) = queue.pop_front() {
            self.node_mut(n).turn_off(FlagNode::VISITED);
            let degree = self.live_degree(n) as u32;
            let received = self.node(n).num_messages;
            debug_assert!(received + 1 == degree || received == degree);
            if received == degree {
                continue;
            }
            let parent = if self.is_func(n) {
                self.func_node_pass_up(mgr, n)?
            } else {
                self.var_node_pass_up(mgr, n)?
            };
            let pn = self.node(parent);
            if pn.num_messages as usize == self.live_degree(parent) - 1
                && parent != root
                && !pn.is(FlagNode::VISITED)
            {
                self.node_mut(parent).turn_on(FlagNode::VISITED);
                queue.push_back(parent);
            }
        }
        debug_assert_eq!(
            self.node(root).num_messages as usize,
            self.live_degree(root),
            "root did not receive messages from all neighbours"
        );
        Ok(())
    }

    /// The one live edge of `n` still missing its inward message.
    fn unfinished_edge(&self, n: NodeId, toward_func: bool) -> EdgeId {
        let mut found = None;
        for e in self.live_neighbors(n) {
            let ed = self.edge(e);
            let missing = if toward_func {
                ed.msg_fv.is_none()
            } else {
                ed.msg_vf.is_none()
            };
            if missing {
                debug_assert!(
                    found.is_none(),
                    "more than one unpassed message at node {}",
                    n.0
                );
                found = Some(e);
                #[cfg(not(feature = "boundary_check"))]
                break;
            }
        }
        found.expect("no unfinished edge in acyclic sweep")
    }

    /// A variable node's inward message: the conjunction of the messages on
    /// all its other edges.
    fn var_node_pass_up(&mut self, mgr: &mut BddManager, n: NodeId) -> SolveResult<NodeId> {
        let parent_edge = self.unfinished_edge(n, true);
        let incoming: Vec<Bdd> = self
            .live_neighbors(n)
            .into_iter()
            .filter(|e| *e != parent_edge)
            .map(|e| self.edge(e).msg_fv.expect("child message missing"))
            .collect();
        let message = mgr.and_multi(&incoming)?;
        self.edge_mut(parent_edge).msg_vf = Some(message);
        let parent = self.edge(parent_edge).func;
        self.node_mut(parent).num_messages += 1;
        Ok(parent)
    }

    /// A function node's inward message: its factors conjoined with the
    /// messages of all other edges, projected onto the parent variable's
    /// cube in one multi-operand descent.
    fn func_node_pass_up(&mut self, mgr: &mut BddManager, n: NodeId) -> SolveResult<NodeId> {
        let parent_edge = self.unfinished_edge(n, false);
        let mut operands: Vec<Bdd> = self.factors_of(n).to_vec();
        operands.extend(
            self.live_neighbors(n)
                .into_iter()
                .filter(|e| *e != parent_edge)
                .map(|e| self.edge(e).msg_vf.expect("child message missing")),
        );
        let parent_var = self.edge(parent_edge).var;
        let joint = mgr.vector_support(&operands)?;
        let away = mgr.cube_diff(joint, self.cube_of(parent_var))?;
        let message = mgr.and_exists_multi(&operands, away)?;
        mgr.free(joint)?;
        mgr.free(away)?;
        self.edge_mut(parent_edge).msg_fv = Some(message);
        self.node_mut(parent_var).num_messages += 1;
        Ok(parent_var)
    }

    /// BFS cycle check over the live graph; returns a witness node on a
    /// cycle, or `None` when the graph is acyclic.
    pub fn find_cycle(&mut self) -> Option<NodeId> {
        self.clear_traversal_state();
        let mut live: Vec<NodeId> = self.live_funcs();
        live.extend(self.live_vars());
        for start in live {
            if self.node(start).is(FlagNode::VISITED) {
                continue;
            }
            self.node_mut(start).turn_on(FlagNode::VISITED);
            let mut queue = VecDeque::from([start]);
            while let Some(u) = queue.pop_front() {
                for e in self.live_neighbors(u) {
                    let w = self.other_endpoint(e, u);
                    if Some(w) == self.node(u).parent {
                        continue;
                    }
                    if self.node(w).is(FlagNode::VISITED) {
                        return Some(u);
                    }
                    self.node_mut(w).turn_on(FlagNode::VISITED);
                    self.node_mut(w).parent = Some(u);
                    queue.push_back(w);
                }
            }
        }
        None
    }

    /// Break every cycle reachable in the live graph: BFS from `root`
    /// records back-edges, and each back-edge function is replaced by its
    /// universal quantification over the recorded variables (an
    /// under-approximation free of those variables). Returns the cube of all
    /// recorded variables; the caller owns it.
    pub fn make_acyclic(&mut self, mgr: &mut BddManager, root: NodeId) -> SolveResult<Bdd> {
        let mut recorded = mgr.one();
        loop {
            let back_edges = self.collect_back_edges(root);
            if back_edges.is_empty() {
                debug_assert!(self.find_cycle().is_none());
                return Ok(recorded);
            }
            // group the recorded variables by their back-edge function
            let mut by_func: Vec<(NodeId, Bdd)> = Vec::new();
            for e in back_edges {
                let (f, v) = (self.edge(e).func, self.edge(e).var);
                let vc = self.cube_of(v);
                match by_func.iter_mut().find(|(g, _)| *g == f) {
                    Some((_, cube)) => {
                        let next = mgr.cube_union(*cube, vc)?;
                        mgr.free(*cube)?;
                        *cube = next;
                    }
                    None => by_func.push((f, mgr.dup(vc)?)),
                }
            }
            for (f, cube) in by_func {
                let mut quantified = Vec::new();
                for factor in self.factors_of(f).to_vec() {
                    quantified.push(mgr.forall(factor, cube)?);
                }
                self.hide_node(f);
                self.add_func_node(mgr, quantified)?;
                let next = mgr.cube_union(recorded, cube)?;
                mgr.free(recorded)?;
                mgr.free(cube)?;
                recorded = next;
            }
        }
    }

    fn collect_back_edges(&mut self, root: NodeId) -> Vec<EdgeId> {
        self.clear_traversal_state();
        let mut back: AHashSet<EdgeId> = AHashSet::new();
        let mut starts: Vec<NodeId> = vec![root];
        starts.extend(self.live_funcs());
        starts.extend(self.live_vars());
        for start in starts {
            if !self.node_alive(start) || self.node(start).is(FlagNode::VISITED) {
                continue;
            }
            self.node_mut(start).turn_on(FlagNode::VISITED);
            let mut queue = VecDeque::from([start]);
            while let Some(u) = queue.pop_front() {
                for e in self.live_neighbors(u) {
                    let w = self.other_endpoint(e, u);
                    if Some(w) == self.node(u).parent {
                        continue;
                    }
                    if self.node(w).is(FlagNode::VISITED) {
                        back.insert(e);
                        continue;
                    }
                    self.node_mut(w).turn_on(FlagNode::VISITED);
                    self.node_mut(w).parent = Some(u);
                    queue.push_back(w);
                }
            }
        }
        let mut result: Vec<EdgeId> = back.into_iter().collect();
        result.sort_unstable_by_key(|e| e.0);
        result
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::bdd::Bdd,
    };

    /// a path-shaped graph: f0(v1,v2), f1(v2,v3), f2(v3,v4)
    fn tree(mgr: &mut BddManager) -> (Vec<Bdd>, Vec<Bdd>) {
        let v: Vec<Bdd> = (1..=4).map(|i| mgr.new_var_with_index(i).unwrap()).collect();
        let mut fs = Vec::new();
        for w in v.windows(2) {
            let n = mgr.not(w[0]).unwrap();
            fs.push(mgr.or(n, w[1]).unwrap());
        }
        (fs, v)
    }

    #[test]
    fn test_acyclic_messages_exact_at_root() {
        let mut mgr = BddManager::new(1 << 22);
        let (fs, v) = tree(&mut mgr);
        let mut fg = FactorGraph::new(&mut mgr, &fs).unwrap();
        let root = fg.get_var_node(&mut mgr, v[3]).unwrap().unwrap();
        fg.acyclic_messages(&mut mgr, root).unwrap();
        let exact = fg.exact_projection(&mut mgr, v[3]).unwrap();
        let msgs = fg.incoming_messages_of(&mut mgr, root).unwrap();
        let conj = mgr.and_multi(&msgs).unwrap();
        assert_eq!(conj, exact);
        for m in msgs {
            mgr.free(m).unwrap();
        }
        mgr.free(conj).unwrap();
        mgr.free(exact).unwrap();
        fg.release(&mut mgr).unwrap();
    }

    #[test]
    fn test_find_cycle() {
        let mut mgr = BddManager::new(1 << 22);
        let (fs, v) = tree(&mut mgr);
        let mut fg = FactorGraph::new(&mut mgr, &fs).unwrap();
        assert!(fg.find_cycle().is_none());
        // close the path into a cycle: f3(v4, v1)
        let n = mgr.not(v[3]).unwrap();
        let back = mgr.or(n, v[0]).unwrap();
        fg.add_func_node(&mut mgr, vec![back]).unwrap();
        assert!(fg.find_cycle().is_some());
    }

    #[test]
    fn test_make_acyclic_under_approximates() {
        let mut mgr = BddManager::new(1 << 22);
        let (mut fs, v) = tree(&mut mgr);
        let n = mgr.not(v[3]).unwrap();
        fs.push(mgr.or(n, v[0]).unwrap());
        let mut fg = FactorGraph::new(&mut mgr, &fs).unwrap();
        let exact_before = fg.exact_projection(&mut mgr, v[0]).unwrap();
        let root = fg.get_var_node(&mut mgr, v[0]).unwrap().unwrap();
        let recorded = fg.make_acyclic(&mut mgr, root).unwrap();
        assert!(!mgr.is_one(recorded));
        assert!(fg.find_cycle().is_none());
        // the weakened graph under-approximates the original conjunction
        let under = fg.exact_projection(&mut mgr, v[0]).unwrap();
        assert!(mgr.leq(under, exact_before).unwrap());
        // and its acyclic sweep is exact for the weakened graph
        fg.acyclic_messages(&mut mgr, root).unwrap();
        let msgs = fg.incoming_messages_of(&mut mgr, root).unwrap();
        let conj = mgr.and_multi(&msgs).unwrap();
        assert_eq!(conj, under);
        for m in msgs {
            mgr.free(m).unwrap();
        }
        mgr.free(conj).unwrap();
        mgr.free(under).unwrap();
        mgr.free(exact_before).unwrap();
        mgr.free(recorded).unwrap();
        fg.release(&mut mgr).unwrap();
    }
}
