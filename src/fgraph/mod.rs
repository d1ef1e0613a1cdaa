//! Module `fgraph` implements the factor graph: a bipartite graph of
//! function nodes (owning BDD factors) and variable nodes (owning variable
//! cubes), connected where a factor depends on a variable.
//!
//! Nodes and edges live in arenas addressed by ids; adjacency is a list of
//! edge ids, so the graph owns every object and there are no reference
//! cycles. Every object and its owning list entry carry a `born`/`died`
//! generation pair against the graph's logical clock: hiding an object sets
//! `died` to the current generation, [`FactorGraph::rollback`] revives
//! everything hidden at the current generation and deletes everything born
//! at it. This yields O(1) checkpoint/rollback without copying graphs.

/// acyclic message passing and cycle breaking
mod acyclic;
/// dot-format dump of the graph
mod dot;
/// cyclic message passing until convergence
mod message;

use {
    crate::{
        bdd::{Bdd, BddManager},
        types::{FlagIF, FlagNode, SolveError, SolveResult},
    },
    std::collections::VecDeque,
};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NodeId(pub(crate) u32);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct EdgeId(pub(crate) u32);

/// The two faces of a factor-graph node.
#[derive(Clone, Debug)]
pub enum FgNodeKind {
    /// owns one or more factors and their joint support cube
    Func { factors: Vec<Bdd>, support: Bdd },
    /// owns a cube of variables
    Var { cube: Bdd },
}

#[derive(Clone, Debug)]
pub struct FgNode {
    pub id: u32,
    pub kind: FgNodeKind,
    /// adjacent edges, dead ones included
    neigh: Vec<EdgeId>,
    /// BFS parent, transient
    parent: Option<NodeId>,
    /// messages received during an acyclic sweep, transient
    num_messages: u32,
    flags: FlagNode,
    born: u32,
    died: Option<u32>,
    /// position of the owning entry in this kind's list
    entry: usize,
}

#[derive(Clone, Debug)]
pub struct FgEdge {
    pub id: u32,
    pub func: NodeId,
    pub var: NodeId,
    /// message from function to variable; `None` means not yet passed
    pub msg_fv: Option<Bdd>,
    /// message from variable to function
    pub msg_vf: Option<Bdd>,
    born: u32,
    died: Option<u32>,
    entry: usize,
}

/// An intrusive-list entry; its generation pair must always equal the
/// owned object's.
#[derive(Clone, Copy, Debug)]
struct ListEntry {
    item: u32,
    born: u32,
    died: Option<u32>,
}

impl FlagIF for FgNode {
    type FlagType = FlagNode;
    fn is(&self, flag: Self::FlagType) -> bool {
        self.flags.contains(flag)
    }
    fn turn_off(&mut self, flag: Self::FlagType) {
        self.flags.remove(flag);
    }
    fn turn_on(&mut self, flag: Self::FlagType) {
        self.flags.insert(flag);
    }
}

#[inline]
fn alive_at(born: u32, died: Option<u32>, time: u32) -> bool {
    born <= time && died.map_or(true, |d| time < d)
}

pub struct FactorGraph {
    nodes: Vec<FgNode>,
    edges: Vec<FgEdge>,
    func_list: Vec<ListEntry>,
    var_list: Vec<ListEntry>,
    edge_list: Vec<ListEntry>,
    /// the logical clock; objects are live iff `born <= time < died`
    time: u32,
}

impl FactorGraph {
    /// Build the graph induced by `factors`: one function node per factor,
    /// one variable node per support variable, edges on support membership.
    pub fn new(mgr: &mut BddManager, factors: &[Bdd]) -> SolveResult<FactorGraph> {
        let mut fg = FactorGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
            func_list: Vec::new(),
            var_list: Vec::new(),
            edge_list: Vec::new(),
            time: 1,
        };
        let support = mgr.vector_support(factors)?;
        let mut indices = mgr.cube_indices(support)?;
        mgr.free(support)?;
        indices.sort_unstable();
        for i in indices {
            let cube = mgr.new_var_with_index(i)?;
            fg.add_var_node(mgr, cube)?;
        }
        for f in factors {
            let owned = mgr.dup(*f)?;
            fg.add_func_node(mgr, vec![owned])?;
        }
        fg.check_consistency();
        Ok(fg)
    }

    //
    //## accessors
    //

    pub(crate) fn node(&self, n: NodeId) -> &FgNode {
        &self.nodes[n.0 as usize]
    }
    pub(crate) fn node_mut(&mut self, n: NodeId) -> &mut FgNode {
        &mut self.nodes[n.0 as usize]
    }
    pub(crate) fn edge(&self, e: EdgeId) -> &FgEdge {
        &self.edges[e.0 as usize]
    }
    pub(crate) fn edge_mut(&mut self, e: EdgeId) -> &mut FgEdge {
        &mut self.edges[e.0 as usize]
    }

    pub fn is_func(&self, n: NodeId) -> bool {
        matches!(self.node(n).kind, FgNodeKind::Func { .. })
    }

    pub(crate) fn factors_of(&self, n: NodeId) -> &[Bdd] {
        match &self.node(n).kind {
            FgNodeKind::Func { factors, .. } => factors,
            FgNodeKind::Var { .. } => &[],
        }
    }

    pub(crate) fn support_of(&self, n: NodeId) -> Bdd {
        match &self.node(n).kind {
            FgNodeKind::Func { support, .. } => *support,
            FgNodeKind::Var { cube } => *cube,
        }
    }

    /// The cube owned by a variable node.
    pub fn cube_of(&self, n: NodeId) -> Bdd {
        debug_assert!(!self.is_func(n));
        self.support_of(n)
    }

    pub(crate) fn node_alive(&self, n: NodeId) -> bool {
        let nd = self.node(n);
        alive_at(nd.born, nd.died, self.time)
    }
    pub(crate) fn edge_alive(&self, e: EdgeId) -> bool {
        let ed = self.edge(e);
        alive_at(ed.born, ed.died, self.time)
    }

    pub(crate) fn live_funcs(&self) -> Vec<NodeId> {
        self.func_list
            .iter()
            .filter(|en| alive_at(en.born, en.died, self.time))
            .map(|en| NodeId(en.item))
            .collect()
    }
    pub(crate) fn live_vars(&self) -> Vec<NodeId> {
        self.var_list
            .iter()
            .filter(|en| alive_at(en.born, en.died, self.time))
            .map(|en| NodeId(en.item))
            .collect()
    }
    pub(crate) fn live_edges(&self) -> Vec<EdgeId> {
        self.edge_list
            .iter()
            .filter(|en| alive_at(en.born, en.died, self.time))
            .map(|en| EdgeId(en.item))
            .collect()
    }

    pub(crate) fn live_neighbors(&self, n: NodeId) -> Vec<EdgeId> {
        self.node(n)
            .neigh
            .iter()
            .copied()
            .filter(|e| self.edge_alive(*e))
            .collect()
    }

    pub(crate) fn live_degree(&self, n: NodeId) -> usize {
        self.node(n)
            .neigh
            .iter()
            .filter(|e| self.edge_alive(**e))
            .count()
    }

    /// The endpoint of `e` opposite to `n`.
    pub(crate) fn other_endpoint(&self, e: EdgeId, n: NodeId) -> NodeId {
        let ed = self.edge(e);
        if ed.func == n {
            ed.var
        } else {
            ed.func
        }
    }

    pub fn num_live_funcs(&self) -> usize {
        self.live_funcs().len()
    }
    pub fn num_live_vars(&self) -> usize {
        self.live_vars().len()
    }
    pub fn num_live_edges(&self) -> usize {
        self.live_edges().len()
    }

    //
    //## construction and mutation
    //

    /// Add a function node owning `factors`; consumes the handles.
    pub(crate) fn add_func_node(
        &mut self,
        mgr: &mut BddManager,
        factors: Vec<Bdd>,
    ) -> SolveResult<NodeId> {
        let support = mgr.vector_support(&factors)?;
        let id = self.nodes.len() as u32;
        let entry = self.func_list.len();
        self.nodes.push(FgNode {
            id,
            kind: FgNodeKind::Func { factors, support },
            neigh: Vec::new(),
            parent: None,
            num_messages: 0,
            flags: FlagNode::empty(),
            born: self.time,
            died: None,
            entry,
        });
        self.func_list.push(ListEntry {
            item: id,
            born: self.time,
            died: None,
        });
        let fid = NodeId(id);
        for v in self.live_vars() {
            let cube = self.cube_of(v);
            let common = mgr.cube_intersection(support, cube)?;
            let connected = !mgr.is_one(common);
            mgr.free(common)?;
            if connected {
                self.add_edge(mgr, fid, v);
            }
        }
        self.check_consistency();
        Ok(fid)
    }

    /// Add a variable node owning `cube`; consumes the handle.
    pub(crate) fn add_var_node(
        &mut self,
        mgr: &mut BddManager,
        cube: Bdd,
    ) -> SolveResult<NodeId> {
        let id = self.nodes.len() as u32;
        let entry = self.var_list.len();
        self.nodes.push(FgNode {
            id,
            kind: FgNodeKind::Var { cube },
            neigh: Vec::new(),
            parent: None,
            num_messages: 0,
            flags: FlagNode::empty(),
            born: self.time,
            died: None,
            entry,
        });
        self.var_list.push(ListEntry {
            item: id,
            born: self.time,
            died: None,
        });
        let vid = NodeId(id);
        for f in self.live_funcs() {
            let support = self.support_of(f);
            let common = mgr.cube_intersection(support, cube)?;
            let connected = !mgr.is_one(common);
            mgr.free(common)?;
            if connected {
                self.add_edge(mgr, f, vid);
            }
        }
        self.check_consistency();
        Ok(vid)
    }

    fn add_edge(&mut self, mgr: &mut BddManager, func: NodeId, var: NodeId) -> EdgeId {
        let id = self.edges.len() as u32;
        let entry = self.edge_list.len();
        self.edges.push(FgEdge {
            id,
            func,
            var,
            msg_fv: Some(mgr.one()),
            msg_vf: Some(mgr.one()),
            born: self.time,
            died: None,
            entry,
        });
        self.edge_list.push(ListEntry {
            item: id,
            born: self.time,
            died: None,
        });
        let eid = EdgeId(id);
        self.node_mut(func).neigh.push(eid);
        self.node_mut(var).neigh.push(eid);
        eid
    }

    /// Hide a node and its live edges at the current generation.
    pub fn hide_node(&mut self, n: NodeId) {
        for e in self.live_neighbors(n) {
            self.hide_edge(e);
        }
        let t = self.time;
        let nd = self.node_mut(n);
        nd.died = Some(t);
        let entry = nd.entry;
        let is_func = matches!(nd.kind, FgNodeKind::Func { .. });
        let list = if is_func {
            &mut self.func_list
        } else {
            &mut self.var_list
        };
        list[entry].died = Some(t);
        self.check_consistency();
    }

    /// Bring a hidden node back; its edges are revived separately (rollback
    /// handles them by generation).
    pub fn unhide_node(&mut self, n: NodeId) {
        let nd = self.node_mut(n);
        nd.died = None;
        let entry = nd.entry;
        let is_func = matches!(nd.kind, FgNodeKind::Func { .. });
        let list = if is_func {
            &mut self.func_list
        } else {
            &mut self.var_list
        };
        list[entry].died = None;
    }

    pub(crate) fn hide_edge(&mut self, e: EdgeId) {
        let t = self.time;
        let ed = self.edge_mut(e);
        ed.died = Some(t);
        let entry = ed.entry;
        self.edge_list[entry].died = Some(t);
    }

    pub(crate) fn unhide_edge(&mut self, e: EdgeId) {
        let ed = self.edge_mut(e);
        ed.died = None;
        let entry = ed.entry;
        self.edge_list[entry].died = None;
    }

    //
    //## generations
    //

    pub fn time(&self) -> u32 {
        self.time
    }

    /// Open a new generation; everything mutated from here on can be undone
    /// by one `rollback`.
    pub fn checkpoint(&mut self) {
        self.time += 1;
    }

    /// Undo the current generation: revive objects hidden at it, delete
    /// objects born at it, decrement the clock.
    pub fn rollback(&mut self, mgr: &mut BddManager) -> SolveResult<()> {
        let t = self.time;
        debug_assert!(1 < t, "rollback past the initial generation");
        // revive function nodes, variable nodes, then edges hidden at t
        for i in 0..self.func_list.len() {
            let en = self.func_list[i];
            if en.born < t && en.died == Some(t) {
                self.unhide_node(NodeId(en.item));
            }
        }
        for i in 0..self.var_list.len() {
            let en = self.var_list[i];
            if en.born < t && en.died == Some(t) {
                self.unhide_node(NodeId(en.item));
            }
        }
        for i in 0..self.edge_list.len() {
            let en = self.edge_list[i];
            if en.born < t && en.died == Some(t) {
                self.unhide_edge(EdgeId(en.item));
            }
        }
        // delete edges born at t
        while self.edge_list.last().map_or(false, |en| en.born == t) {
            let en = self.edge_list.pop().unwrap();
            let ed = self.edges.pop().unwrap();
            debug_assert_eq!(ed.id, en.item);
            debug_assert_eq!(ed.id as usize, self.edges.len());
            if let Some(m) = ed.msg_fv {
                mgr.free(m)?;
            }
            if let Some(m) = ed.msg_vf {
                mgr.free(m)?;
            }
            let eid = EdgeId(ed.id);
            self.node_mut(ed.func).neigh.retain(|x| *x != eid);
            self.node_mut(ed.var).neigh.retain(|x| *x != eid);
        }
        // delete nodes born at t (they sit at the arena tail, edges already gone)
        while self.nodes.last().map_or(false, |nd| nd.born == t) {
            let nd = self.nodes.pop().unwrap();
            debug_assert!(nd.neigh.iter().all(|e| (e.0 as usize) >= self.edges.len()));
            match nd.kind {
                FgNodeKind::Func { factors, support } => {
                    let en = self.func_list.pop().unwrap();
                    debug_assert_eq!(en.item, nd.id);
                    for f in factors {
                        mgr.free(f)?;
                    }
                    mgr.free(support)?;
                }
                FgNodeKind::Var { cube } => {
                    let en = self.var_list.pop().unwrap();
                    debug_assert_eq!(en.item, nd.id);
                    mgr.free(cube)?;
                }
            }
        }
        self.time = t - 1;
        self.check_consistency();
        Ok(())
    }

    //
    //## grouping and messages
    //

    /// Replace every variable node intersecting `cube` with a single node
    /// owning the union of their cubes; each function node keeps at most one
    /// edge to the new node.
    pub fn group_vars(&mut self, mgr: &mut BddManager, cube: Bdd) -> SolveResult<()> {
        let mut grouped = Vec::new();
        for v in self.live_vars() {
            let vc = self.cube_of(v);
            let common = mgr.cube_intersection(vc, cube)?;
            let hit = !mgr.is_one(common);
            mgr.free(common)?;
            if hit {
                grouped.push(v);
            }
        }
        if grouped.len() < 2 {
            return Ok(());
        }
        let mut union = mgr.one();
        for v in &grouped {
            let vc = self.cube_of(*v);
            let next = mgr.cube_union(union, vc)?;
            mgr.free(union)?;
            union = next;
        }
        for v in grouped {
            self.hide_node(v);
        }
        self.add_var_node(mgr, union)?;
        self.check_consistency();
        Ok(())
    }

    /// The first live variable node whose cube intersects `cube`.
    pub fn get_var_node(&mut self, mgr: &mut BddManager, cube: Bdd) -> SolveResult<Option<NodeId>> {
        for v in self.live_vars() {
            let vc = self.cube_of(v);
            let common = mgr.cube_intersection(vc, cube)?;
            let hit = !mgr.is_one(common);
            mgr.free(common)?;
            if hit {
                return Ok(Some(v));
            }
        }
        Ok(None)
    }

    /// Duplicates of the function→variable messages incoming to every live
    /// variable node intersecting `cube`. The caller owns the results.
    pub fn incoming_messages(
        &mut self,
        mgr: &mut BddManager,
        cube: Bdd,
    ) -> SolveResult<Vec<Bdd>> {
        let mut result = Vec::new();
        for v in self.live_vars() {
            let vc = self.cube_of(v);
            let common = mgr.cube_intersection(vc, cube)?;
            let hit = !mgr.is_one(common);
            mgr.free(common)?;
            if !hit {
                continue;
            }
            for e in self.live_neighbors(v) {
                if let Some(m) = self.edge(e).msg_fv {
                    result.push(mgr.dup(m)?);
                }
            }
        }
        Ok(result)
    }

    /// Duplicates of the messages incoming to one variable node.
    pub fn incoming_messages_of(
        &mut self,
        mgr: &mut BddManager,
        v: NodeId,
    ) -> SolveResult<Vec<Bdd>> {
        let mut result = Vec::new();
        for e in self.live_neighbors(v) {
            if let Some(m) = self.edge(e).msg_fv {
                result.push(mgr.dup(m)?);
            }
        }
        Ok(result)
    }

    /// `true` iff the live part of the graph forms one connected component.
    pub fn is_single_component(&mut self) -> bool {
        let mut live: Vec<NodeId> = self.live_funcs();
        live.extend(self.live_vars());
        let Some(&start) = live.first() else { return true };
        for n in &live {
            self.node_mut(*n).turn_off(FlagNode::VISITED);
        }
        let mut queue = VecDeque::from([start]);
        self.node_mut(start).turn_on(FlagNode::VISITED);
        let mut seen = 1;
        while let Some(u) = queue.pop_front() {
            for e in self.live_neighbors(u) {
                let w = self.other_endpoint(e, u);
                if !self.node(w).is(FlagNode::VISITED) {
                    self.node_mut(w).turn_on(FlagNode::VISITED);
                    seen += 1;
                    queue.push_back(w);
                }
            }
        }
        seen == live.len()
    }

    //
    //## invariants and teardown
    //

    /// Check the generational and adjacency invariants. A violation is a
    /// bug, never an input condition.
    pub fn verify(&self) -> Result<(), String> {
        for (list, want_func) in [(&self.func_list, true), (&self.var_list, false)] {
            for en in list.iter() {
                let nd = &self.nodes[en.item as usize];
                if matches!(nd.kind, FgNodeKind::Func { .. }) != want_func {
                    return Err(format!("node {} sits in the wrong list", nd.id));
                }
                if (nd.born, nd.died) != (en.born, en.died) {
                    return Err(format!(
                        "node {} generation ({}, {:?}) mismatches its entry ({}, {:?})",
                        nd.id, nd.born, nd.died, en.born, en.died
                    ));
                }
            }
        }
        for en in self.edge_list.iter() {
            let ed = &self.edges[en.item as usize];
            if (ed.born, ed.died) != (en.born, en.died) {
                return Err(format!(
                    "edge {} generation ({}, {:?}) mismatches its entry ({}, {:?})",
                    ed.id, ed.born, ed.died, en.born, en.died
                ));
            }
            if alive_at(ed.born, ed.died, self.time) {
                if !self.node_alive(ed.func) || !self.node_alive(ed.var) {
                    return Err(format!("live edge {} has a dead endpoint", ed.id));
                }
                if self.is_func(ed.var) || !self.is_func(ed.func) {
                    return Err(format!("edge {} endpoints have wrong kinds", ed.id));
                }
                let eid = EdgeId(ed.id);
                if !self.node(ed.func).neigh.contains(&eid)
                    || !self.node(ed.var).neigh.contains(&eid)
                {
                    return Err(format!("edge {} missing from an adjacency list", ed.id));
                }
            }
        }
        Ok(())
    }

    #[inline]
    fn check_consistency(&self) {
        #[cfg(feature = "boundary_check")]
        if let Err(why) = self.verify() {
            panic!("factor graph invariant violated: {why}");
        }
    }

    /// Free every BDD owned by the graph, dead objects included.
    pub fn release(mut self, mgr: &mut BddManager) -> SolveResult<()> {
        for nd in self.nodes.drain(..) {
            match nd.kind {
                FgNodeKind::Func { factors, support } => {
                    for f in factors {
                        mgr.free(f)?;
                    }
                    mgr.free(support)?;
                }
                FgNodeKind::Var { cube } => {
                    mgr.free(cube)?;
                }
            }
        }
        for ed in self.edges.drain(..) {
            if let Some(m) = ed.msg_fv {
                mgr.free(m)?;
            }
            if let Some(m) = ed.msg_vf {
                mgr.free(m)?;
            }
        }
        Ok(())
    }

    pub(crate) fn clear_traversal_state(&mut self) {
        let live: Vec<NodeId> = {
            let mut v = self.live_funcs();
            v.extend(self.live_vars());
            v
        };
        for n in live {
            let nd = self.node_mut(n);
            nd.flags = FlagNode::empty();
            nd.parent = None;
            nd.num_messages = 0;
        }
    }

    pub(crate) fn leaf_error() -> SolveError {
        SolveError::UnsupportedInput("factor graph has no leaf to start an acyclic sweep".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(mgr: &mut BddManager) -> (FactorGraph, Vec<Bdd>) {
        let v: Vec<Bdd> = (1..=4).map(|i| mgr.new_var_with_index(i).unwrap()).collect();
        // f0 = v1 ∧ ¬v2, f1 = v2 ∨ v3, f2 = ¬v3 ∧ v4
        let n2 = mgr.not(v[1]).unwrap();
        let f0 = mgr.and(v[0], n2).unwrap();
        let f1 = mgr.or(v[1], v[2]).unwrap();
        let n3 = mgr.not(v[2]).unwrap();
        let f2 = mgr.and(n3, v[3]).unwrap();
        let fg = FactorGraph::new(mgr, &[f0, f1, f2]).unwrap();
        (fg, v)
    }

    #[test]
    fn test_construction() {
        let mut mgr = BddManager::new(1 << 20);
        let (fg, _) = build(&mut mgr);
        assert_eq!(fg.num_live_funcs(), 3);
        assert_eq!(fg.num_live_vars(), 4);
        // supports: {1,2}, {2,3}, {3,4} -> 6 edges
        assert_eq!(fg.num_live_edges(), 6);
        assert!(fg.verify().is_ok());
    }

    #[test]
    fn test_group_vars() {
        let mut mgr = BddManager::new(1 << 20);
        let (mut fg, v) = build(&mut mgr);
        let c23 = mgr.cube_union(v[1], v[2]).unwrap();
        fg.group_vars(&mut mgr, c23).unwrap();
        assert_eq!(fg.num_live_vars(), 3);
        // every function node keeps a single edge to the grouped node
        assert_eq!(fg.num_live_edges(), 5);
        assert!(fg.verify().is_ok());
    }

    #[test]
    fn test_checkpoint_rollback() {
        let mut mgr = BddManager::new(1 << 20);
        let (mut fg, v) = build(&mut mgr);
        let funcs = fg.num_live_funcs();
        let vars = fg.num_live_vars();
        let edges = fg.num_live_edges();
        fg.checkpoint();
        let c23 = mgr.cube_union(v[1], v[2]).unwrap();
        fg.group_vars(&mut mgr, c23).unwrap();
        let hidden = fg.live_funcs()[0];
        fg.hide_node(hidden);
        assert_ne!(fg.num_live_vars(), vars);
        fg.rollback(&mut mgr).unwrap();
        assert_eq!(fg.num_live_funcs(), funcs);
        assert_eq!(fg.num_live_vars(), vars);
        assert_eq!(fg.num_live_edges(), edges);
        assert!(fg.verify().is_ok());
    }

    #[test]
    fn test_hide_unhide() {
        let mut mgr = BddManager::new(1 << 20);
        let (mut fg, _) = build(&mut mgr);
        let f = fg.live_funcs()[0];
        let deg = fg.live_degree(f);
        assert!(0 < deg);
        fg.hide_node(f);
        assert!(!fg.node_alive(f));
        assert_eq!(fg.live_degree(f), 0);
        assert!(fg.verify().is_ok());
    }

    #[test]
    fn test_connectedness() {
        let mut mgr = BddManager::new(1 << 20);
        let (mut fg, _) = build(&mut mgr);
        assert!(fg.is_single_component());
        // an isolated variable node splits the graph
        let v9 = mgr.new_var_with_index(9).unwrap();
        fg.add_var_node(&mut mgr, v9).unwrap();
        assert!(!fg.is_single_component());
    }

    #[test]
    fn test_incoming_messages_ownership() {
        let mut mgr = BddManager::new(1 << 20);
        let (mut fg, v) = build(&mut mgr);
        let msgs = fg.incoming_messages(&mut mgr, v[0]).unwrap();
        // v1 occurs in one factor
        assert_eq!(msgs.len(), 1);
        for m in msgs {
            mgr.free(m).unwrap();
        }
        fg.release(&mut mgr).unwrap();
    }
}
