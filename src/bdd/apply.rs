//! Recursive cores of the binary and ternary operations. All functions work
//! on raw edges; public wrappers in the parent module handle reference
//! counting and the reorder retry loop.

use {
    super::{not_e, regular, BddManager, Edge, Op, ONE_E, ZERO_E},
    crate::types::SolveResult,
    ahash::AHashMap,
};

impl BddManager {
    pub(crate) fn and_rec(&mut self, f: Edge, g: Edge) -> SolveResult<Edge> {
        if f == ONE_E {
            return Ok(g);
        }
        if g == ONE_E {
            return Ok(f);
        }
        if f == g {
            return Ok(f);
        }
        if f == ZERO_E || g == ZERO_E || f == not_e(g) {
            return Ok(ZERO_E);
        }
        self.tick()?;
        let (k1, k2) = if f < g { (f, g) } else { (g, f) };
        if let Some(&r) = self.cache.get(&(Op::And, k1, k2, ONE_E)) {
            return Ok(r);
        }
        let (lf, lg) = (self.level_of(f), self.level_of(g));
        let top = lf.min(lg);
        let index = if lf == top {
            self.index_of(f)
        } else {
            self.index_of(g)
        };
        let (ft, fe) = if lf == top { self.split(f) } else { (f, f) };
        let (gt, ge) = if lg == top { self.split(g) } else { (g, g) };
        let t = self.and_rec(ft, gt)?;
        let e = self.and_rec(fe, ge)?;
        let r = self.mk(index, t, e)?;
        self.cache.insert((Op::And, k1, k2, ONE_E), r);
        Ok(r)
    }

    pub(crate) fn ite_rec(&mut self, f: Edge, g: Edge, h: Edge) -> SolveResult<Edge> {
        if f == ONE_E {
            return Ok(g);
        }
        if f == ZERO_E {
            return Ok(h);
        }
        if g == h {
            return Ok(g);
        }
        if g == ONE_E && h == ZERO_E {
            return Ok(f);
        }
        if g == ZERO_E && h == ONE_E {
            return Ok(not_e(f));
        }
        self.tick()?;
        if let Some(&r) = self.cache.get(&(Op::Ite, f, g, h)) {
            return Ok(r);
        }
        let (lf, lg, lh) = (self.level_of(f), self.level_of(g), self.level_of(h));
        let top = lf.min(lg).min(lh);
        let index = if lf == top {
            self.index_of(f)
        } else if lg == top {
            self.index_of(g)
        } else {
            self.index_of(h)
        };
        let (ft, fe) = if lf == top { self.split(f) } else { (f, f) };
        let (gt, ge) = if lg == top { self.split(g) } else { (g, g) };
        let (ht, he) = if lh == top { self.split(h) } else { (h, h) };
        let t = self.ite_rec(ft, gt, ht)?;
        let e = self.ite_rec(fe, ge, he)?;
        let r = self.mk(index, t, e)?;
        self.cache.insert((Op::Ite, f, g, h), r);
        Ok(r)
    }

    /// `∃cube. f`
    pub(crate) fn exists_rec(&mut self, f: Edge, cube: Edge) -> SolveResult<Edge> {
        if regular(f) == ONE_E || cube == ONE_E {
            return Ok(f);
        }
        let lf = self.level_of(f);
        // skip quantified variables above the function
        let mut cube = cube;
        while cube != ONE_E && self.level_of(cube) < lf {
            cube = self.split(cube).0;
        }
        if cube == ONE_E {
            return Ok(f);
        }
        self.tick()?;
        if let Some(&r) = self.cache.get(&(Op::Exists, f, cube, ONE_E)) {
            return Ok(r);
        }
        let index = self.index_of(f);
        let (ft, fe) = self.split(f);
        let r = if self.level_of(cube) == lf {
            let rest = self.split(cube).0;
            let t = self.exists_rec(ft, rest)?;
            if t == ONE_E {
                ONE_E
            } else {
                let e = self.exists_rec(fe, rest)?;
                not_e(self.and_rec(not_e(t), not_e(e))?)
            }
        } else {
            let t = self.exists_rec(ft, cube)?;
            let e = self.exists_rec(fe, cube)?;
            self.mk(index, t, e)?
        };
        self.cache.insert((Op::Exists, f, cube, ONE_E), r);
        Ok(r)
    }

    /// Restrict `f` by a cube of literals; a literal's polarity is read off
    /// which child of the cube node is `zero`.
    pub(crate) fn cofactor_rec(&mut self, f: Edge, cube: Edge) -> SolveResult<Edge> {
        if regular(cube) == ONE_E || regular(f) == ONE_E {
            return Ok(f);
        }
        self.tick()?;
        if let Some(&r) = self.cache.get(&(Op::Cofactor, f, cube, ONE_E)) {
            return Ok(r);
        }
        let (lf, lc) = (self.level_of(f), self.level_of(cube));
        let (ct, ce) = self.split(cube);
        let r = if lc < lf {
            let rest = if ce == ZERO_E { ct } else { ce };
            self.cofactor_rec(f, rest)?
        } else if lf < lc {
            let index = self.index_of(f);
            let (ft, fe) = self.split(f);
            let t = self.cofactor_rec(ft, cube)?;
            let e = self.cofactor_rec(fe, cube)?;
            self.mk(index, t, e)?
        } else {
            let (ft, fe) = self.split(f);
            if ce == ZERO_E {
                self.cofactor_rec(ft, ct)?
            } else {
                self.cofactor_rec(fe, ce)?
            }
        };
        self.cache.insert((Op::Cofactor, f, cube, ONE_E), r);
        Ok(r)
    }

    /// Rebuild `f` with variables renamed through `map`.
    pub(crate) fn substitute_rec(
        &mut self,
        f: Edge,
        map: &AHashMap<u32, u32>,
        memo: &mut AHashMap<Edge, Edge>,
    ) -> SolveResult<Edge> {
        if regular(f) == ONE_E {
            return Ok(f);
        }
        if let Some(&r) = memo.get(&f) {
            return Ok(r);
        }
        self.tick()?;
        let index = self.index_of(f);
        let (ft, fe) = self.split(f);
        let t = self.substitute_rec(ft, map, memo)?;
        let e = self.substitute_rec(fe, map, memo)?;
        let target = map.get(&index).copied().unwrap_or(index);
        self.ensure_var(target);
        let v = self.mk(target, ONE_E, ZERO_E)?;
        let r = self.ite_rec(v, t, e)?;
        memo.insert(f, r);
        Ok(r)
    }
}
