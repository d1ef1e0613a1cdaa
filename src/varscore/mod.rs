//! Module `varscore` eliminates an existential block one variable at a time.
//!
//! The state is a set of factors F and a set of variables Q. A variable in
//! the support of exactly one factor is quantified out of it directly.
//! Otherwise the variable with the lowest score (the summed size of the
//! factors it occurs in) is picked and its two smallest factors conjoined —
//! through `and_exists` when they are its only occurrences. When the
//! predicted conjunction size exceeds the caller's budget, a pluggable
//! approximation strategy takes the step instead.

/// approximation strategies for oversized conjunction steps
mod approx;

pub use approx::{EarlyQuantification, Exact, FactorGraphApprox};

use {
    crate::{
        bdd::{Bdd, BddManager},
        types::{Delete, SolveResult},
    },
    std::collections::{BTreeMap, BTreeSet},
};

/// API for taking one elimination step when the exact conjunction would
/// exceed the size budget.
pub trait ApproximationIF {
    fn process(
        &self,
        mgr: &mut BddManager,
        q: Bdd,
        t1: Bdd,
        t2: Bdd,
        vsq: &mut VarScoreQuantification,
    ) -> SolveResult<()>;
}

/// The (F, Q) elimination state.
pub struct VarScoreQuantification {
    /// factor set, identity semantics
    factors: Vec<Bdd>,
    /// variable -> factors it occurs in
    vars: BTreeMap<Bdd, BTreeSet<Bdd>>,
}

impl VarScoreQuantification {
    pub fn new(mgr: &mut BddManager, factors: &[Bdd], q_cube: Bdd) -> SolveResult<Self> {
        let mut vsq = VarScoreQuantification {
            factors: Vec::new(),
            vars: BTreeMap::new(),
        };
        for f in factors {
            if !vsq.factors.contains(f) {
                vsq.factors.push(mgr.dup(*f)?);
            }
        }
        for index in mgr.cube_indices(q_cube)? {
            let q = mgr.new_var_with_index(index)?;
            let mut neighbors = BTreeSet::new();
            for f in &vsq.factors {
                let sup = mgr.support(*f)?;
                let common = mgr.cube_intersection(sup, q)?;
                let hit = !mgr.is_one(common);
                mgr.free(sup)?;
                mgr.free(common)?;
                if hit {
                    neighbors.insert(*f);
                }
            }
            if neighbors.is_empty() {
                mgr.free(q)?;
            } else {
                vsq.vars.insert(q, neighbors);
            }
        }
        Ok(vsq)
    }

    pub fn factors(&self) -> &[Bdd] {
        &self.factors
    }

    pub fn find_var_with_only_one_factor(&self) -> Option<Bdd> {
        self.vars
            .iter()
            .find(|(_, fs)| fs.len() == 1)
            .map(|(q, _)| *q)
    }

    pub fn neighboring_factors(&self, q: Bdd) -> Vec<Bdd> {
        self.vars.get(&q).map_or_else(Vec::new, |fs| fs.iter().copied().collect())
    }

    /// Drop a factor from the state and from every occurrence set.
    pub fn remove_factor(&mut self, mgr: &mut BddManager, factor: Bdd) -> SolveResult<()> {
        for fs in self.vars.values_mut() {
            fs.remove(&factor);
        }
        if self.factors.contains(&factor) {
            self.factors.delete_unstable(|f| *f == factor);
            mgr.free(factor)?;
        }
        Ok(())
    }

    /// Insert a factor (borrowed; an owning duplicate is taken) and register
    /// it with every variable in its support.
    pub fn add_factor(&mut self, mgr: &mut BddManager, factor: Bdd) -> SolveResult<()> {
        if self.factors.contains(&factor) {
            return Ok(());
        }
        let owned = mgr.dup(factor)?;
        self.factors.push(owned);
        let sup = mgr.support(owned)?;
        for (q, fs) in self.vars.iter_mut() {
            let common = mgr.cube_intersection(*q, sup)?;
            if !mgr.is_one(common) {
                fs.insert(owned);
            }
            mgr.free(common)?;
        }
        mgr.free(sup)?;
        Ok(())
    }

    pub fn remove_var(&mut self, mgr: &mut BddManager, q: Bdd) -> SolveResult<()> {
        if self.vars.remove(&q).is_some() {
            mgr.free(q)?;
        }
        Ok(())
    }

    /// The variable minimizing the summed size of its factors.
    pub fn var_with_lowest_score(&self, mgr: &BddManager) -> Bdd {
        let mut best: Option<(Bdd, usize)> = None;
        for (q, fs) in &self.vars {
            if fs.is_empty() {
                continue;
            }
            let score: usize = fs.iter().map(|f| mgr.size(*f)).sum();
            if best.map_or(true, |(_, s)| score < s) {
                best = Some((*q, score));
            }
        }
        best.expect("no variable left to score").0
    }

    /// The two smallest factors in `q`'s occurrence set.
    pub fn smallest_two_neighbors(&self, mgr: &BddManager, q: Bdd) -> (Bdd, Bdd) {
        let fs = &self.vars[&q];
        debug_assert!(2 <= fs.len());
        let mut first: Option<(Bdd, usize)> = None;
        let mut second: Option<(Bdd, usize)> = None;
        for f in fs {
            let s = mgr.size(*f);
            if first.map_or(true, |(_, fs_)| s < fs_) {
                second = first;
                first = Some((*f, s));
            } else if second.map_or(true, |(_, ss)| s < ss) {
                second = Some((*f, s));
            }
        }
        (first.unwrap().0, second.unwrap().0)
    }

    pub fn is_finished(&self) -> bool {
        self.vars.values().all(|fs| fs.is_empty())
    }

    /// Hand the remaining factors to the caller and release the state.
    pub fn into_factors(mut self, mgr: &mut BddManager) -> SolveResult<Vec<Bdd>> {
        for (q, _) in std::mem::take(&mut self.vars) {
            mgr.free(q)?;
        }
        Ok(std::mem::take(&mut self.factors))
    }
}

/// Size estimate of `b1 ∧ b2` from the sizes and support overlap of the
/// conjuncts: disjoint supports add, fully shared supports multiply.
pub fn predicted_and_size(mgr: &mut BddManager, b1: Bdd, b2: Bdd) -> SolveResult<f64> {
    let sp1 = mgr.support(b1)?;
    let sp2 = mgr.support(b2)?;
    let common = mgr.cube_intersection(sp1, sp2)?;
    let nb1 = mgr.size(b1) as f64;
    let nb2 = mgr.size(b2) as f64;
    let nsp1 = mgr.size(sp1).saturating_sub(1) as f64;
    let nsp2 = mgr.size(sp2).saturating_sub(1) as f64;
    let nc = mgr.size(common).saturating_sub(1) as f64;
    mgr.free(sp1)?;
    mgr.free(sp2)?;
    mgr.free(common)?;
    if nsp1 == 0.0 || nsp2 == 0.0 {
        return Ok(nb1 + nb2);
    }
    Ok(nb1 * (nsp1 - nc) / nsp1 + nb2 * (nsp2 - nc) / nsp2 + nb1 * nb2 * nc * nc / nsp1 / nsp2)
}

/// Eliminate every variable of `q_cube` from the conjunction of `factors`,
/// approximating oversized steps through `strategy`. The returned factors
/// conjoin to (an approximation of) `∃q_cube. ⋀ factors`.
pub fn quantify(
    mgr: &mut BddManager,
    factors: &[Bdd],
    q_cube: Bdd,
    max_bdd_size: usize,
    strategy: &dyn ApproximationIF,
) -> SolveResult<Vec<Bdd>> {
    let mut vsq = VarScoreQuantification::new(mgr, factors, q_cube)?;
    let exact = Exact;
    while !vsq.is_finished() {
        if let Some(q) = vsq.find_var_with_only_one_factor() {
            qlog!(Debug, "found var with only one factor");
            let t = vsq.neighboring_factors(q)[0];
            let projected = mgr.forsome(t, q)?;
            vsq.remove_factor(mgr, t)?;
            vsq.remove_var(mgr, q)?;
            vsq.add_factor(mgr, projected)?;
            mgr.free(projected)?;
        } else {
            let q = vsq.var_with_lowest_score(mgr);
            let (t1, t2) = vsq.smallest_two_neighbors(mgr, q);
            if (max_bdd_size as f64) < predicted_and_size(mgr, t1, t2)? {
                strategy.process(mgr, q, t1, t2, &mut vsq)?;
            } else {
                exact.process(mgr, q, t1, t2, &mut vsq)?;
            }
        }
    }
    vsq.into_factors(mgr)
}
