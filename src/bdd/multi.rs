//! Multi-operand conjunction and projection. One recursive descent conjoins
//! an arbitrary set of edges (optionally projecting a cube of variables out)
//! without ever materializing the conjunction; the cache is keyed on the
//! canonicalized operand set. Clipped variants trade precision for depth.

use {
    super::{not_e, BddManager, Edge, MultiKey, Op, ONE_E, ZERO_E},
    crate::types::SolveResult,
};

/// Rounding mode of the clipped operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClipDirection {
    /// clip toward `one`: the result is implied by the exact one
    Up,
    /// clip toward `zero`: the result implies the exact one
    Down,
}

impl ClipDirection {
    fn flip(self) -> Self {
        match self {
            ClipDirection::Up => ClipDirection::Down,
            ClipDirection::Down => ClipDirection::Up,
        }
    }
}

/// Outcome of operand canonicalization: either the already-known result or
/// the sorted, `one`-free operand set.
enum Canonical {
    Done(Edge),
    Operands(Vec<Edge>),
}

impl BddManager {
    /// Drop `one`s, sort, dedup; detect `zero` and complementary pairs.
    fn canonical_operands(&self, fs: Vec<Edge>) -> Canonical {
        let mut v: Vec<Edge> = fs.into_iter().filter(|e| *e != ONE_E).collect();
        v.sort_unstable();
        v.dedup();
        if v.binary_search(&ZERO_E).is_ok() {
            return Canonical::Done(ZERO_E);
        }
        for e in &v {
            if v.binary_search(&not_e(*e)).is_ok() {
                return Canonical::Done(ZERO_E);
            }
        }
        match v.len() {
            0 => Canonical::Done(ONE_E),
            1 => Canonical::Done(v[0]),
            _ => Canonical::Operands(v),
        }
    }

    /// The minimum ordering level over the set and the index realizing it.
    fn top_of(&self, fs: &[Edge]) -> (u32, u32) {
        let mut top = u32::MAX;
        let mut index = 0;
        for e in fs {
            let l = self.level_of(*e);
            if l < top {
                top = l;
                index = self.index_of(*e);
            }
        }
        (top, index)
    }

    /// Split every operand on the level `top`: members not depending on the
    /// variable are replicated into both branches.
    fn split_operands(&self, fs: &[Edge], top: u32) -> (Vec<Edge>, Vec<Edge>) {
        let mut tv = Vec::with_capacity(fs.len());
        let mut ev = Vec::with_capacity(fs.len());
        for e in fs {
            if self.level_of(*e) == top {
                let (t, el) = self.split(*e);
                tv.push(t);
                ev.push(el);
            } else {
                tv.push(*e);
                ev.push(*e);
            }
        }
        (tv, ev)
    }

    /// `⋀ fs`
    pub(crate) fn and_multi_rec(&mut self, fs: Vec<Edge>) -> SolveResult<Edge> {
        let operands = match self.canonical_operands(fs) {
            Canonical::Done(e) => return Ok(e),
            Canonical::Operands(v) => v,
        };
        self.tick()?;
        let key = MultiKey {
            op: Op::AndMulti,
            operands: operands.clone().into_boxed_slice(),
            cube: ONE_E,
            depth: 0,
        };
        if let Some(&r) = self.multi_cache.get(&key) {
            return Ok(r);
        }
        let (top, index) = self.top_of(&operands);
        let (tv, ev) = self.split_operands(&operands, top);
        let t = self.and_multi_rec(tv)?;
        let e = self.and_multi_rec(ev)?;
        let r = if t == e { t } else { self.mk(index, t, e)? };
        self.multi_cache.insert(key, r);
        Ok(r)
    }

    /// `∃cube. ⋀ fs`
    pub(crate) fn and_exists_multi_rec(&mut self, fs: Vec<Edge>, cube: Edge) -> SolveResult<Edge> {
        let operands = match self.canonical_operands(fs) {
            Canonical::Done(e) => {
                return if e == ONE_E || e == ZERO_E {
                    Ok(e)
                } else {
                    self.exists_rec(e, cube)
                };
            }
            Canonical::Operands(v) => v,
        };
        if cube == ONE_E {
            return self.and_multi_rec(operands);
        }
        self.tick()?;
        let key = MultiKey {
            op: Op::AndExistsMulti,
            operands: operands.clone().into_boxed_slice(),
            cube,
            depth: 0,
        };
        if let Some(&r) = self.multi_cache.get(&key) {
            return Ok(r);
        }
        let (top, index) = self.top_of(&operands);
        // skip quantified variables that no operand depends on
        let mut cube2 = cube;
        while self.level_of(cube2) < top {
            cube2 = self.split(cube2).0;
            if cube2 == ONE_E {
                let r = self.and_multi_rec(operands)?;
                self.multi_cache.insert(key, r);
                return Ok(r);
            }
        }
        let (tv, ev) = self.split_operands(&operands, top);
        let r = if self.level_of(cube2) == top {
            // the topmost variable is quantified
            let rest = self.split(cube2).0;
            let t = self.and_exists_multi_rec(tv, rest)?;
            if t == ONE_E || ev.contains(&t) {
                t
            } else {
                let mut ev = ev;
                ev.retain(|x| *x != not_e(t));
                let e = self.and_exists_multi_rec(ev, rest)?;
                if t == e {
                    t
                } else {
                    // t ∨ e, combined directly since both operands are known
                    not_e(self.and_rec(not_e(t), not_e(e))?)
                }
            }
        } else {
            let t = self.and_exists_multi_rec(tv, cube2)?;
            let e = self.and_exists_multi_rec(ev, cube2)?;
            if t == e {
                t
            } else {
                self.mk(index, t, e)?
            }
        };
        self.multi_cache.insert(key, r);
        Ok(r)
    }

    /// Depth-clipped `⋀ fs`.
    pub(crate) fn clipping_and_multi_rec(
        &mut self,
        fs: Vec<Edge>,
        depth: usize,
        direction: ClipDirection,
    ) -> SolveResult<Edge> {
        let operands = match self.canonical_operands(fs) {
            Canonical::Done(e) => return Ok(e),
            Canonical::Operands(v) => v,
        };
        if depth == 0 {
            // if some member is implied by every other, it is the exact result
            let mut min = Some(operands[0]);
            for e in &operands[1..] {
                let Some(m) = min else { break };
                if self.and_rec(m, not_e(*e))? == ZERO_E {
                    // m implies e, keep m
                } else if self.and_rec(*e, not_e(m))? == ZERO_E {
                    min = Some(*e);
                } else {
                    min = None;
                }
            }
            if let Some(m) = min {
                return Ok(m);
            }
            return Ok(match direction {
                ClipDirection::Up => ONE_E,
                ClipDirection::Down => ZERO_E,
            });
        }
        self.tick()?;
        let op = match direction {
            ClipDirection::Up => Op::ClipAndUp,
            ClipDirection::Down => Op::ClipAndDown,
        };
        let key = MultiKey {
            op,
            operands: operands.clone().into_boxed_slice(),
            cube: ONE_E,
            depth: depth as u32,
        };
        if let Some(&r) = self.multi_cache.get(&key) {
            return Ok(r);
        }
        let (top, index) = self.top_of(&operands);
        let (tv, ev) = self.split_operands(&operands, top);
        let t = self.clipping_and_multi_rec(tv, depth - 1, direction)?;
        let e = self.clipping_and_multi_rec(ev, depth - 1, direction)?;
        let r = if t == e { t } else { self.mk(index, t, e)? };
        self.multi_cache.insert(key, r);
        Ok(r)
    }

    /// Depth-clipped `∃cube. ⋀ fs`.
    pub(crate) fn clipping_and_exists_multi_rec(
        &mut self,
        fs: Vec<Edge>,
        cube: Edge,
        depth: usize,
        direction: ClipDirection,
    ) -> SolveResult<Edge> {
        let operands = match self.canonical_operands(fs) {
            Canonical::Done(e) => {
                return if e == ONE_E || e == ZERO_E {
                    Ok(e)
                } else {
                    self.exists_rec(e, cube)
                };
            }
            Canonical::Operands(v) => v,
        };
        if cube == ONE_E {
            return self.clipping_and_multi_rec(operands, depth, direction);
        }
        if depth == 0 {
            return Ok(match direction {
                ClipDirection::Up => ONE_E,
                ClipDirection::Down => ZERO_E,
            });
        }
        self.tick()?;
        let op = match direction {
            ClipDirection::Up => Op::ClipAndExistsUp,
            ClipDirection::Down => Op::ClipAndExistsDown,
        };
        let key = MultiKey {
            op,
            operands: operands.clone().into_boxed_slice(),
            cube,
            depth: depth as u32,
        };
        if let Some(&r) = self.multi_cache.get(&key) {
            return Ok(r);
        }
        let depth = depth - 1;
        let (top, index) = self.top_of(&operands);
        let top_cube = self.level_of(cube);
        let r = if top_cube < top {
            // no operand depends on the topmost quantified variable
            let rest = self.split(cube).0;
            self.clipping_and_exists_multi_rec(operands, rest, depth, direction)?
        } else {
            let (tv, ev) = self.split_operands(&operands, top);
            let next_cube = if top_cube == top {
                self.split(cube).0
            } else {
                cube
            };
            let t = self.clipping_and_exists_multi_rec(tv, next_cube, depth, direction)?;
            if t == ONE_E && top_cube == top {
                ONE_E
            } else {
                let e = self.clipping_and_exists_multi_rec(ev, next_cube, depth, direction)?;
                if top_cube == top {
                    // t ∨ e through the clipped AND of the complements
                    let or =
                        self.clipping_and_multi_rec(vec![not_e(t), not_e(e)], depth, direction.flip())?;
                    not_e(or)
                } else if t == e {
                    t
                } else {
                    self.mk(index, t, e)?
                }
            }
        };
        self.multi_cache.insert(key, r);
        Ok(r)
    }

    /// Fraction of assignments satisfying `⋀ fs`.
    pub(crate) fn count_minterm_multi_rec(&self, fs: Vec<Edge>) -> f64 {
        if fs.contains(&ZERO_E) {
            return 0.0;
        }
        let mut operands: Vec<Edge> = fs.into_iter().filter(|e| *e != ONE_E).collect();
        operands.sort_unstable();
        operands.dedup();
        if operands.is_empty() {
            return 1.0;
        }
        let (top, _) = self.top_of(&operands);
        let (tv, ev) = self.split_operands(&operands, top);
        0.5 * self.count_minterm_multi_rec(tv) + 0.5 * self.count_minterm_multi_rec(ev)
    }
}
