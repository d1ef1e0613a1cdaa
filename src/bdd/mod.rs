//! Module `bdd` implements a reduced-ordered binary decision diagram engine
//! with complemented edges.
//!
//! All nodes live in an arena owned by a [`BddManager`]; a [`Bdd`] is a tagged
//! edge handle carrying its manager's id, so mixing handles from two managers
//! is a typed error instead of undefined behavior. The unique table enforces
//! structural hash consing, which makes semantic equivalence a pointer
//! comparison. The apply caches are advisory; garbage collection clears them
//! wholesale and sweeps unreferenced nodes.

/// binary and ternary recursive operations
mod apply;
/// multi-operand conjunction and projection, clipped variants, counting
mod multi;

pub use multi::ClipDirection;

use {
    crate::types::{Lit, SolveError, SolveResult},
    ahash::{AHashMap, AHashSet},
    std::{
        sync::atomic::{AtomicU32, Ordering},
        time::{Duration, Instant},
    },
};

/// A tagged pointer to a decision node; the least significant bit negates.
pub(crate) type Edge = u32;

pub(crate) const COMPL: Edge = 1;
pub(crate) const ONE_E: Edge = 0;
pub(crate) const ZERO_E: Edge = 1;
const TERMINAL_INDEX: u32 = u32::MAX;

#[inline]
pub(crate) fn is_compl(e: Edge) -> bool {
    e & COMPL == COMPL
}

#[inline]
pub(crate) fn not_e(e: Edge) -> Edge {
    e ^ COMPL
}

#[inline]
pub(crate) fn regular(e: Edge) -> Edge {
    e & !COMPL
}

#[inline]
fn node_id(e: Edge) -> usize {
    (e >> 1) as usize
}

/// An immutable decision node. The then-edge of a stored node is never
/// complemented; `rc` counts external handles on either polarity.
#[derive(Clone, Debug)]
struct Node {
    index: u32,
    t: Edge,
    e: Edge,
    rc: u32,
}

/// A referenced edge of some manager's diagram. Identity comparison decides
/// semantic equivalence.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Bdd {
    mgr: u32,
    e: Edge,
}

/// Operation tags distinguishing entries of the shared caches.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Op {
    And,
    Ite,
    Exists,
    Cofactor,
    AndMulti,
    AndExistsMulti,
    ClipAndUp,
    ClipAndDown,
    ClipAndExistsUp,
    ClipAndExistsDown,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) struct MultiKey {
    pub op: Op,
    pub operands: Box<[Edge]>,
    pub cube: Edge,
    pub depth: u32,
}

static NEXT_MANAGER_ID: AtomicU32 = AtomicU32::new(1);

/// Process-wide state of one diagram: arena, unique table, caches, ordering.
pub struct BddManager {
    id: u32,
    nodes: Vec<Node>,
    free_slots: Vec<u32>,
    unique: AHashMap<(u32, Edge, Edge), u32>,
    pub(crate) cache: AHashMap<(Op, Edge, Edge, Edge), Edge>,
    pub(crate) multi_cache: AHashMap<MultiKey, Edge>,
    /// variable index -> position in the ordering
    perm: Vec<u32>,
    /// position in the ordering -> variable index
    invperm: Vec<u32>,
    node_limit: usize,
    deadline: Option<Instant>,
    timeout_handler: Option<Box<dyn Fn()>>,
    /// set by a reordering pass to make public entry points retry
    reordered: bool,
    ops: u64,
}

impl BddManager {
    pub fn new(node_limit: usize) -> BddManager {
        BddManager {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            nodes: vec![Node {
                index: TERMINAL_INDEX,
                t: ONE_E,
                e: ONE_E,
                rc: 1,
            }],
            free_slots: Vec::new(),
            unique: AHashMap::new(),
            cache: AHashMap::new(),
            multi_cache: AHashMap::new(),
            perm: Vec::new(),
            invperm: Vec::new(),
            node_limit,
            deadline: None,
            timeout_handler: None,
            reordered: false,
            ops: 0,
        }
    }

    //
    //## constants and handles
    //

    pub fn one(&self) -> Bdd {
        Bdd { mgr: self.id, e: ONE_E }
    }
    pub fn zero(&self) -> Bdd {
        Bdd { mgr: self.id, e: ZERO_E }
    }
    pub fn is_one(&self, f: Bdd) -> bool {
        f.mgr == self.id && f.e == ONE_E
    }
    pub fn is_zero(&self, f: Bdd) -> bool {
        f.mgr == self.id && f.e == ZERO_E
    }

    /// Unwrap a handle, rejecting edges of another manager.
    pub(crate) fn edge_of(&self, f: Bdd) -> SolveResult<Edge> {
        if f.mgr == self.id {
            Ok(f.e)
        } else {
            Err(SolveError::ManagerMismatch)
        }
    }

    fn edges_of(&self, fs: &[Bdd]) -> SolveResult<Vec<Edge>> {
        fs.iter().map(|f| self.edge_of(*f)).collect()
    }

    /// Wrap an internal edge into a referenced public handle.
    /// Constants are exempt from reference counting.
    pub(crate) fn referred(&mut self, e: Edge) -> Bdd {
        if regular(e) != ONE_E {
            self.nodes[node_id(e)].rc += 1;
        }
        Bdd { mgr: self.id, e }
    }

    /// Take one more reference on a handle.
    pub fn dup(&mut self, f: Bdd) -> SolveResult<Bdd> {
        let e = self.edge_of(f)?;
        Ok(self.referred(e))
    }

    /// Release one reference. Constants are exempt.
    pub fn free(&mut self, f: Bdd) -> SolveResult<()> {
        let e = self.edge_of(f)?;
        if regular(e) == ONE_E {
            return Ok(());
        }
        let n = &mut self.nodes[node_id(e)];
        debug_assert!(0 < n.rc, "released an unreferenced node");
        n.rc = n.rc.saturating_sub(1);
        Ok(())
    }

    pub fn live_node_count(&self) -> usize {
        self.nodes.len() - self.free_slots.len()
    }

    //
    //## structural access for the CNF codec
    //

    pub(crate) fn is_complement_handle(&self, f: Bdd) -> bool {
        is_compl(f.e)
    }

    pub(crate) fn regular_handle(&self, f: Bdd) -> Bdd {
        Bdd {
            mgr: f.mgr,
            e: regular(f.e),
        }
    }

    pub(crate) fn is_constant_handle(&self, f: Bdd) -> bool {
        regular(f.e) == ONE_E
    }

    /// Variable index and the stored (canonical) children of a regular,
    /// non-terminal handle; the then-child is never complemented.
    pub(crate) fn top_children(&self, f: Bdd) -> (u32, Bdd, Bdd) {
        debug_assert!(!is_compl(f.e) && regular(f.e) != ONE_E);
        let n = &self.nodes[node_id(f.e)];
        (
            n.index,
            Bdd { mgr: f.mgr, e: n.t },
            Bdd { mgr: f.mgr, e: n.e },
        )
    }

    //
    //## node construction
    //

    pub(crate) fn ensure_var(&mut self, index: u32) {
        let want = index as usize + 1;
        while self.perm.len() < want {
            let next = self.perm.len() as u32;
            self.perm.push(next);
            self.invperm.push(next);
        }
    }

    #[inline]
    pub(crate) fn level_of(&self, e: Edge) -> u32 {
        let index = self.nodes[node_id(e)].index;
        if index == TERMINAL_INDEX {
            u32::MAX
        } else {
            self.perm[index as usize]
        }
    }

    #[inline]
    pub(crate) fn index_of(&self, e: Edge) -> u32 {
        self.nodes[node_id(e)].index
    }

    /// Then- and else-edges of a non-terminal edge, complement applied.
    #[inline]
    pub(crate) fn split(&self, e: Edge) -> (Edge, Edge) {
        let n = &self.nodes[node_id(e)];
        if is_compl(e) {
            (not_e(n.t), not_e(n.e))
        } else {
            (n.t, n.e)
        }
    }

    /// Find-or-create the node `ITE(index, t, e)` in canonical form.
    pub(crate) fn mk(&mut self, index: u32, t: Edge, e: Edge) -> SolveResult<Edge> {
        if t == e {
            return Ok(t);
        }
        debug_assert_eq!(self.invperm[self.perm[index as usize] as usize], index);
        debug_assert!(self.level_of(t) > self.perm[index as usize]);
        debug_assert!(self.level_of(e) > self.perm[index as usize]);
        let (t2, e2, negate) = if is_compl(t) {
            (not_e(t), not_e(e), true)
        } else {
            (t, e, false)
        };
        if let Some(&n) = self.unique.get(&(index, t2, e2)) {
            let edge = n << 1;
            return Ok(if negate { not_e(edge) } else { edge });
        }
        if self.node_limit <= self.live_node_count() {
            return Err(SolveError::OutOfMemory);
        }
        let slot = if let Some(s) = self.free_slots.pop() {
            self.nodes[s as usize] = Node {
                index,
                t: t2,
                e: e2,
                rc: 0,
            };
            s
        } else {
            self.nodes.push(Node {
                index,
                t: t2,
                e: e2,
                rc: 0,
            });
            (self.nodes.len() - 1) as u32
        };
        self.unique.insert((index, t2, e2), slot);
        let edge = slot << 1;
        Ok(if negate { not_e(edge) } else { edge })
    }

    /// The projection variable with the given index, as a referenced handle.
    pub fn new_var_with_index(&mut self, index: u32) -> SolveResult<Bdd> {
        self.ensure_var(index);
        let e = self.run(|m| m.mk(index, ONE_E, ZERO_E))?;
        Ok(self.referred(e))
    }

    //
    //## resource control
    //

    pub fn set_timeout(&mut self, limit: Duration) {
        self.deadline = Some(Instant::now() + limit);
    }
    pub fn clear_timeout(&mut self) {
        self.deadline = None;
    }
    pub fn set_timeout_handler(&mut self, handler: Box<dyn Fn()>) {
        self.timeout_handler = Some(handler);
    }

    /// Deadline check, amortized over recursive calls.
    #[inline]
    pub(crate) fn tick(&mut self) -> SolveResult<()> {
        self.ops = self.ops.wrapping_add(1);
        if self.ops & 0x3ff == 0 {
            if let Some(d) = self.deadline {
                if d <= Instant::now() {
                    return Err(SolveError::TimedOut);
                }
            }
        }
        Ok(())
    }

    /// Run a recursive core inside the reorder retry loop; invoke the
    /// registered handler when the deadline fired.
    pub(crate) fn run<F>(&mut self, mut body: F) -> SolveResult<Edge>
    where
        F: FnMut(&mut Self) -> SolveResult<Edge>,
    {
        loop {
            self.reordered = false;
            match body(self) {
                Ok(r) => {
                    if !self.reordered {
                        return Ok(r);
                    }
                }
                Err(SolveError::TimedOut) => {
                    if let Some(handler) = self.timeout_handler.take() {
                        handler();
                        self.timeout_handler = Some(handler);
                    }
                    return Err(SolveError::TimedOut);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Mark-and-sweep collection from externally referenced roots.
    /// Clears both advisory caches; returns the number of nodes reclaimed.
    pub fn garbage_collect(&mut self) -> usize {
        let mut marked: AHashSet<u32> = AHashSet::new();
        marked.insert(0);
        let mut stack: Vec<u32> = Vec::new();
        for (i, n) in self.nodes.iter().enumerate() {
            if 0 < n.rc && n.index != TERMINAL_INDEX {
                stack.push(i as u32);
            }
        }
        while let Some(i) = stack.pop() {
            if !marked.insert(i) {
                continue;
            }
            let n = &self.nodes[i as usize];
            stack.push((n.t >> 1) as u32);
            stack.push((n.e >> 1) as u32);
        }
        let dead_before = self.free_slots.len();
        let already_free: AHashSet<u32> = self.free_slots.iter().copied().collect();
        for i in 0..self.nodes.len() as u32 {
            if !marked.contains(&i) && !already_free.contains(&i) {
                let n = &self.nodes[i as usize];
                self.unique.remove(&(n.index, n.t, n.e));
                self.free_slots.push(i);
            }
        }
        self.cache.clear();
        self.multi_cache.clear();
        self.free_slots.len() - dead_before
    }

    //
    //## logical operations
    //

    pub fn not(&mut self, f: Bdd) -> SolveResult<Bdd> {
        let e = self.edge_of(f)?;
        Ok(self.referred(not_e(e)))
    }

    pub fn and(&mut self, f: Bdd, g: Bdd) -> SolveResult<Bdd> {
        let (fe, ge) = (self.edge_of(f)?, self.edge_of(g)?);
        let r = self.run(|m| m.and_rec(fe, ge))?;
        Ok(self.referred(r))
    }

    pub fn or(&mut self, f: Bdd, g: Bdd) -> SolveResult<Bdd> {
        let (fe, ge) = (self.edge_of(f)?, self.edge_of(g)?);
        let r = self.run(|m| Ok(not_e(m.and_rec(not_e(fe), not_e(ge))?)))?;
        Ok(self.referred(r))
    }

    pub fn xnor(&mut self, f: Bdd, g: Bdd) -> SolveResult<Bdd> {
        let (fe, ge) = (self.edge_of(f)?, self.edge_of(g)?);
        let r = self.run(|m| m.ite_rec(fe, ge, not_e(ge)))?;
        Ok(self.referred(r))
    }

    pub fn ite(&mut self, f: Bdd, g: Bdd, h: Bdd) -> SolveResult<Bdd> {
        let (fe, ge, he) = (self.edge_of(f)?, self.edge_of(g)?, self.edge_of(h)?);
        let r = self.run(|m| m.ite_rec(fe, ge, he))?;
        Ok(self.referred(r))
    }

    /// `∃cube. f`
    pub fn forsome(&mut self, f: Bdd, cube: Bdd) -> SolveResult<Bdd> {
        let (fe, ce) = (self.edge_of(f)?, self.edge_of(cube)?);
        let r = self.run(|m| m.exists_rec(fe, ce))?;
        Ok(self.referred(r))
    }

    /// `∀cube. f`
    pub fn forall(&mut self, f: Bdd, cube: Bdd) -> SolveResult<Bdd> {
        let (fe, ce) = (self.edge_of(f)?, self.edge_of(cube)?);
        let r = self.run(|m| Ok(not_e(m.exists_rec(not_e(fe), ce)?)))?;
        Ok(self.referred(r))
    }

    /// `∃cube. f ∧ g` in one descent.
    pub fn and_exists(&mut self, f: Bdd, g: Bdd, cube: Bdd) -> SolveResult<Bdd> {
        let (fe, ge, ce) = (self.edge_of(f)?, self.edge_of(g)?, self.edge_of(cube)?);
        let r = self.run(|m| m.and_exists_multi_rec(vec![fe, ge], ce))?;
        Ok(self.referred(r))
    }

    /// Restrict `f` by the literals of `cube` (mixed polarities allowed).
    pub fn cofactor(&mut self, f: Bdd, cube: Bdd) -> SolveResult<Bdd> {
        let (fe, ce) = (self.edge_of(f)?, self.edge_of(cube)?);
        let r = self.run(|m| m.cofactor_rec(fe, ce))?;
        Ok(self.referred(r))
    }

    /// Rename variables: `from[i]` becomes `to[i]`. Both slices hold
    /// projection variables of this manager.
    pub fn substitute_vars(&mut self, f: Bdd, from: &[Bdd], to: &[Bdd]) -> SolveResult<Bdd> {
        debug_assert_eq!(from.len(), to.len());
        let fe = self.edge_of(f)?;
        let mut map: AHashMap<u32, u32> = AHashMap::new();
        for (a, b) in from.iter().zip(to.iter()) {
            let (ae, be) = (self.edge_of(*a)?, self.edge_of(*b)?);
            map.insert(self.index_of(ae), self.index_of(be));
        }
        let mut memo: AHashMap<Edge, Edge> = AHashMap::new();
        let r = self.run(|m| m.substitute_rec(fe, &map, &mut memo))?;
        Ok(self.referred(r))
    }

    /// `acc ← acc ∧ f`, releasing the previous `acc`.
    pub fn and_accumulate(&mut self, acc: &mut Bdd, f: Bdd) -> SolveResult<()> {
        let next = self.and(*acc, f)?;
        self.free(*acc)?;
        *acc = next;
        Ok(())
    }

    /// `acc ← acc ∨ f`, releasing the previous `acc`.
    pub fn or_accumulate(&mut self, acc: &mut Bdd, f: Bdd) -> SolveResult<()> {
        let next = self.or(*acc, f)?;
        self.free(*acc)?;
        *acc = next;
        Ok(())
    }

    //
    //## cubes and supports
    //

    /// Union of two variable sets.
    pub fn cube_union(&mut self, a: Bdd, b: Bdd) -> SolveResult<Bdd> {
        self.and(a, b)
    }

    /// Variables common to both cubes.
    pub fn cube_intersection(&mut self, a: Bdd, b: Bdd) -> SolveResult<Bdd> {
        let (mut ae, mut be) = (self.edge_of(a)?, self.edge_of(b)?);
        let mut common = Vec::new();
        while ae != ONE_E && be != ONE_E {
            let (la, lb) = (self.level_of(ae), self.level_of(be));
            if la < lb {
                ae = self.split(ae).0;
            } else if lb < la {
                be = self.split(be).0;
            } else {
                common.push(self.index_of(ae));
                ae = self.split(ae).0;
                be = self.split(be).0;
            }
        }
        let e = self.cube_of_indices(&mut common)?;
        Ok(self.referred(e))
    }

    /// Variables of `a` not in `b`.
    pub fn cube_diff(&mut self, a: Bdd, b: Bdd) -> SolveResult<Bdd> {
        let (mut ae, mut be) = (self.edge_of(a)?, self.edge_of(b)?);
        let mut only = Vec::new();
        while ae != ONE_E {
            let (la, lb) = (self.level_of(ae), self.level_of(be));
            if la < lb {
                only.push(self.index_of(ae));
                ae = self.split(ae).0;
            } else if lb < la {
                be = self.split(be).0;
            } else {
                ae = self.split(ae).0;
                be = self.split(be).0;
            }
        }
        let e = self.cube_of_indices(&mut only)?;
        Ok(self.referred(e))
    }

    /// Build a positive cube over the given variable indices.
    pub(crate) fn cube_of_indices(&mut self, indices: &mut Vec<u32>) -> SolveResult<Edge> {
        for i in indices.iter() {
            self.ensure_var(*i);
        }
        indices.sort_unstable_by_key(|i| std::cmp::Reverse(self.perm[*i as usize]));
        indices.dedup();
        let mut acc = ONE_E;
        for i in indices.iter() {
            acc = self.mk(*i, acc, ZERO_E)?;
        }
        Ok(acc)
    }

    /// The set of variables `f` depends on, as a cube.
    pub fn support(&mut self, f: Bdd) -> SolveResult<Bdd> {
        let fe = self.edge_of(f)?;
        let mut indices = self.support_indices_of(&[fe]);
        let e = self.cube_of_indices(&mut indices)?;
        Ok(self.referred(e))
    }

    /// The joint support of a set of functions, as a cube.
    pub fn vector_support(&mut self, fs: &[Bdd]) -> SolveResult<Bdd> {
        let edges = self.edges_of(fs)?;
        let mut indices = self.support_indices_of(&edges);
        let e = self.cube_of_indices(&mut indices)?;
        Ok(self.referred(e))
    }

    pub(crate) fn support_indices_of(&self, roots: &[Edge]) -> Vec<u32> {
        let mut seen: AHashSet<u32> = AHashSet::new();
        let mut vars: AHashSet<u32> = AHashSet::new();
        let mut stack: Vec<u32> = roots.iter().map(|e| e >> 1).collect();
        while let Some(i) = stack.pop() {
            if !seen.insert(i) {
                continue;
            }
            let n = &self.nodes[i as usize];
            if n.index == TERMINAL_INDEX {
                continue;
            }
            vars.insert(n.index);
            stack.push(n.t >> 1);
            stack.push(n.e >> 1);
        }
        vars.into_iter().collect()
    }

    /// The variable index at the top of a cube (or any function).
    pub fn lowest_var_index(&self, cube: Bdd) -> SolveResult<u32> {
        let e = self.edge_of(cube)?;
        debug_assert_ne!(regular(e), ONE_E);
        Ok(self.index_of(e))
    }

    /// The topmost variable of a cube as a fresh handle.
    pub fn var_with_lowest_index(&mut self, cube: Bdd) -> SolveResult<Bdd> {
        let index = self.lowest_var_index(cube)?;
        self.new_var_with_index(index)
    }

    /// Iterate the variable indices of a cube, top down.
    pub fn cube_indices(&self, cube: Bdd) -> SolveResult<Vec<u32>> {
        let mut e = self.edge_of(cube)?;
        let mut out = Vec::new();
        while regular(e) != ONE_E {
            out.push(self.index_of(e));
            let (t, z) = self.split(e);
            e = if z == ZERO_E { t } else { z };
        }
        Ok(out)
    }

    //
    //## measurements
    //

    /// Number of nodes in the shared DAG rooted at `f`, terminal included.
    pub fn size(&self, f: Bdd) -> usize {
        let Ok(fe) = self.edge_of(f) else { return 0 };
        let mut seen: AHashSet<u32> = AHashSet::new();
        let mut stack = vec![fe >> 1];
        while let Some(i) = stack.pop() {
            if !seen.insert(i) {
                continue;
            }
            let n = &self.nodes[i as usize];
            if n.index != TERMINAL_INDEX {
                stack.push(n.t >> 1);
                stack.push(n.e >> 1);
            }
        }
        seen.len()
    }

    /// Number of satisfying assignments of `f` over `nvars` variables.
    pub fn count_minterm(&self, f: Bdd, nvars: u32) -> SolveResult<f64> {
        let fe = self.edge_of(f)?;
        let mut memo: AHashMap<Edge, f64> = AHashMap::new();
        let frac = self.minterm_fraction(fe, &mut memo);
        Ok(frac * 2f64.powi(nvars as i32))
    }

    fn minterm_fraction(&self, e: Edge, memo: &mut AHashMap<Edge, f64>) -> f64 {
        if e == ONE_E {
            return 1.0;
        }
        if e == ZERO_E {
            return 0.0;
        }
        if let Some(&f) = memo.get(&e) {
            return f;
        }
        let (t, el) = self.split(e);
        let f = 0.5 * self.minterm_fraction(t, memo) + 0.5 * self.minterm_fraction(el, memo);
        memo.insert(e, f);
        f
    }

    /// The satisfying paths of `f` as literal cubes (omitted vars are free).
    pub fn minterm_cubes(&self, f: Bdd) -> Vec<Vec<Lit>> {
        let Ok(fe) = self.edge_of(f) else { return Vec::new() };
        let mut out = Vec::new();
        let mut path: Vec<Lit> = Vec::new();
        self.collect_cubes(fe, &mut path, &mut out);
        out
    }

    fn collect_cubes(&self, e: Edge, path: &mut Vec<Lit>, out: &mut Vec<Vec<Lit>>) {
        if e == ONE_E {
            out.push(path.clone());
            return;
        }
        if e == ZERO_E {
            return;
        }
        let index = self.index_of(e) as Lit;
        let (t, el) = self.split(e);
        path.push(index);
        self.collect_cubes(t, path, out);
        path.pop();
        path.push(-index);
        self.collect_cubes(el, path, out);
        path.pop();
    }

    /// Dump the satisfying paths of `f` to stderr.
    pub fn print_minterms(&self, f: Bdd) {
        for cube in self.minterm_cubes(f) {
            eprintln!(
                "{}",
                cube.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(" ")
            );
        }
    }

    //
    //## multi-operand entry points
    //

    /// `⋀ fs`
    pub fn and_multi(&mut self, fs: &[Bdd]) -> SolveResult<Bdd> {
        let edges = self.edges_of(fs)?;
        let r = self.run(|m| m.and_multi_rec(edges.clone()))?;
        Ok(self.referred(r))
    }

    /// `∃cube. ⋀ fs` in a single descent, without materializing the conjunction.
    pub fn and_exists_multi(&mut self, fs: &[Bdd], cube: Bdd) -> SolveResult<Bdd> {
        let edges = self.edges_of(fs)?;
        let ce = self.edge_of(cube)?;
        let r = self.run(|m| m.and_exists_multi_rec(edges.clone(), ce))?;
        Ok(self.referred(r))
    }

    /// Depth-clipped `⋀ fs`: over-approximate (Up) or under-approximate (Down).
    pub fn clipping_and_multi(
        &mut self,
        fs: &[Bdd],
        max_depth: usize,
        direction: ClipDirection,
    ) -> SolveResult<Bdd> {
        let edges = self.edges_of(fs)?;
        let r = self.run(|m| m.clipping_and_multi_rec(edges.clone(), max_depth, direction))?;
        Ok(self.referred(r))
    }

    /// Depth-clipped `∃cube. ⋀ fs`.
    pub fn clipping_and_exists_multi(
        &mut self,
        fs: &[Bdd],
        cube: Bdd,
        max_depth: usize,
        direction: ClipDirection,
    ) -> SolveResult<Bdd> {
        let edges = self.edges_of(fs)?;
        let ce = self.edge_of(cube)?;
        let r = self.run(|m| {
            m.clipping_and_exists_multi_rec(edges.clone(), ce, max_depth, direction)
        })?;
        Ok(self.referred(r))
    }

    /// Minterms of `⋀ fs` over `nvars` variables, without the conjunction.
    pub fn count_minterm_multi(&mut self, fs: &[Bdd], nvars: u32) -> SolveResult<f64> {
        let edges = self.edges_of(fs)?;
        let frac = self.count_minterm_multi_rec(edges);
        Ok(frac * 2f64.powi(nvars as i32))
    }

    /// `true` iff `f` implies `g`.
    pub fn leq(&mut self, f: Bdd, g: Bdd) -> SolveResult<bool> {
        let (fe, ge) = (self.edge_of(f)?, self.edge_of(g)?);
        let r = self.run(|m| m.and_rec(fe, not_e(ge)))?;
        Ok(r == ZERO_E)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(mgr: &mut BddManager, n: u32) -> Vec<Bdd> {
        (1..=n).map(|i| mgr.new_var_with_index(i).unwrap()).collect()
    }

    #[test]
    fn test_identity_equivalence() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 2);
        let a = mgr.and(v[0], v[1]).unwrap();
        let b = mgr.and(v[1], v[0]).unwrap();
        assert_eq!(a, b);
        let na = mgr.not(a).unwrap();
        let nb = mgr.not(b).unwrap();
        assert_eq!(na, nb);
        assert_ne!(a, na);
    }

    #[test]
    fn test_complement_is_free() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 1);
        let nv = mgr.not(v[0]).unwrap();
        let back = mgr.not(nv).unwrap();
        assert_eq!(v[0], back);
        let z = mgr.and(v[0], nv).unwrap();
        assert!(mgr.is_zero(z));
        let o = mgr.or(v[0], nv).unwrap();
        assert!(mgr.is_one(o));
    }

    #[test]
    fn test_manager_mismatch() {
        let mut m1 = BddManager::new(1 << 20);
        let mut m2 = BddManager::new(1 << 20);
        let a = m1.new_var_with_index(1).unwrap();
        let b = m2.new_var_with_index(1).unwrap();
        assert_eq!(m1.and(a, b), Err(SolveError::ManagerMismatch));
    }

    #[test]
    fn test_cube_algebra() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 4);
        let c12 = mgr.cube_union(v[0], v[1]).unwrap();
        let c23 = mgr.cube_union(v[1], v[2]).unwrap();
        let inter = mgr.cube_intersection(c12, c23).unwrap();
        assert_eq!(inter, v[1]);
        let diff = mgr.cube_diff(c12, c23).unwrap();
        assert_eq!(diff, v[0]);
        assert_eq!(mgr.cube_indices(c12).unwrap(), vec![1, 2]);
        assert_eq!(mgr.lowest_var_index(c23).unwrap(), 2);
    }

    #[test]
    fn test_support() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 3);
        let nv2 = mgr.not(v[1]).unwrap();
        let f = mgr.and(v[0], nv2).unwrap();
        let s = mgr.support(f).unwrap();
        assert_eq!(mgr.cube_indices(s).unwrap(), vec![1, 2]);
        let g = mgr.or(f, v[2]).unwrap();
        let vs = mgr.vector_support(&[f, g]).unwrap();
        assert_eq!(mgr.cube_indices(vs).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_exists_forall() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 2);
        let f = mgr.and(v[0], v[1]).unwrap();
        let ex = mgr.forsome(f, v[1]).unwrap();
        assert_eq!(ex, v[0]);
        let fa = mgr.forall(f, v[1]).unwrap();
        assert!(mgr.is_zero(fa));
        let g = mgr.or(v[0], v[1]).unwrap();
        let fa2 = mgr.forall(g, v[1]).unwrap();
        assert_eq!(fa2, v[0]);
    }

    #[test]
    fn test_counting() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 3);
        let f = mgr.and(v[0], v[1]).unwrap();
        assert_eq!(mgr.count_minterm(f, 3).unwrap(), 2.0);
        let or = mgr.or(v[0], v[1]).unwrap();
        assert_eq!(mgr.count_minterm(or, 2).unwrap(), 3.0);
        assert_eq!(mgr.count_minterm_multi(&[v[0], v[1], v[2]], 3).unwrap(), 1.0);
    }

    #[test]
    fn test_size_and_gc() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 2);
        let f = mgr.and(v[0], v[1]).unwrap();
        assert_eq!(mgr.size(f), 3);
        assert_eq!(mgr.size(v[0]), 2);
        mgr.free(f).unwrap();
        let live = mgr.live_node_count();
        let swept = mgr.garbage_collect();
        assert_eq!(mgr.live_node_count(), live - swept);
        // the single variables stay referenced
        assert!(mgr.size(v[0]) == 2 && mgr.size(v[1]) == 2);
    }

    #[test]
    fn test_cofactor() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 3);
        let f = {
            let a = mgr.and(v[0], v[1]).unwrap();
            let nb = mgr.not(v[1]).unwrap();
            let b = mgr.and(nb, v[2]).unwrap();
            mgr.or(a, b).unwrap()
        };
        // f[v2 = 1] = v1
        let c = mgr.cofactor(f, v[1]).unwrap();
        assert_eq!(c, v[0]);
        // f[v2 = 0] = v3
        let n2 = mgr.not(v[1]).unwrap();
        let c2 = mgr.cofactor(f, n2).unwrap();
        assert_eq!(c2, v[2]);
    }

    #[test]
    fn test_substitute_vars() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 4);
        let f = mgr.and(v[0], v[1]).unwrap();
        let g = mgr
            .substitute_vars(f, &[v[0], v[1]], &[v[2], v[3]])
            .unwrap();
        let expected = mgr.and(v[2], v[3]).unwrap();
        assert_eq!(g, expected);
    }

    #[test]
    fn test_xnor_ite() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 2);
        let x = mgr.xnor(v[0], v[1]).unwrap();
        assert_eq!(mgr.count_minterm(x, 2).unwrap(), 2.0);
        let nx = mgr.not(x).unwrap();
        let xor = {
            let nb = mgr.not(v[1]).unwrap();
            mgr.ite(v[0], nb, v[1]).unwrap()
        };
        assert_eq!(nx, xor);
    }

    #[test]
    fn test_minterm_cubes() {
        let mut mgr = BddManager::new(1 << 20);
        let v = vars(&mut mgr, 2);
        let nv2 = mgr.not(v[1]).unwrap();
        let f = mgr.and(v[0], nv2).unwrap();
        assert_eq!(mgr.minterm_cubes(f), vec![vec![1, -2]]);
    }
}
