//! Strategies for an elimination step whose exact conjunction would blow the
//! size budget: take it anyway (`Exact`), quantify the variable out of one
//! factor alone (`EarlyQuantification`, an over-approximation of the step),
//! or solve the step's neighbourhood with a local factor graph over fresh
//! proxy variables (`FactorGraphApprox`).

use {
    super::{ApproximationIF, VarScoreQuantification},
    crate::{
        bdd::{Bdd, BddManager},
        fgraph::FactorGraph,
        merge::{merge, MergeHints},
        types::SolveResult,
    },
    std::collections::BTreeMap,
};

/// Conjoin the two factors; quantify on the fly when they are the
/// variable's only occurrences.
pub struct Exact;

impl ApproximationIF for Exact {
    fn process(
        &self,
        mgr: &mut BddManager,
        q: Bdd,
        t1: Bdd,
        t2: Bdd,
        vsq: &mut VarScoreQuantification,
    ) -> SolveResult<()> {
        if vsq.neighboring_factors(q).len() == 2 {
            qlog!(Debug, "found var with exactly two factors");
            let t = mgr.and_exists(t1, t2, q)?;
            vsq.remove_factor(mgr, t1)?;
            vsq.remove_factor(mgr, t2)?;
            vsq.remove_var(mgr, q)?;
            vsq.add_factor(mgr, t)?;
            mgr.free(t)?;
        } else {
            qlog!(Debug, "merging two factors");
            let t = mgr.and(t1, t2)?;
            vsq.remove_factor(mgr, t1)?;
            vsq.remove_factor(mgr, t2)?;
            vsq.add_factor(mgr, t)?;
            mgr.free(t)?;
        }
        Ok(())
    }
}

/// Quantify the variable out of the first factor alone, delaying the
/// conjunction; the variable keeps its other occurrences.
pub struct EarlyQuantification;

impl ApproximationIF for EarlyQuantification {
    fn process(
        &self,
        mgr: &mut BddManager,
        q: Bdd,
        t1: Bdd,
        _t2: Bdd,
        vsq: &mut VarScoreQuantification,
    ) -> SolveResult<()> {
        qlog!(Debug, "early quantification of a variable");
        let projected = mgr.forsome(t1, q)?;
        vsq.remove_factor(mgr, t1)?;
        vsq.add_factor(mgr, projected)?;
        mgr.free(projected)?;
        Ok(())
    }
}

/// Replace each non-`q` variable of `q`'s factors with a per-factor proxy
/// variable chained by equality factors, converge a local factor graph, and
/// feed the reverse-substituted incoming messages back as factors. The
/// result over-approximates `∃q. ⋀ neighbours(q)`.
pub struct FactorGraphApprox {
    pub largest_support_set: usize,
}

impl ApproximationIF for FactorGraphApprox {
    fn process(
        &self,
        mgr: &mut BddManager,
        q: Bdd,
        _t1: Bdd,
        _t2: Bdd,
        vsq: &mut VarScoreQuantification,
    ) -> SolveResult<()> {
        let qneigh = vsq.neighboring_factors(q);
        let all: Vec<Bdd> = vsq.factors().to_vec();
        let greatest_index = largest_index(mgr, &all);
        let mut fgm = FactorGraphModifier::new(mgr, q, greatest_index)?;
        for f in &all {
            if qneigh.contains(f) {
                fgm.add_q_factor(mgr, *f)?;
            } else {
                fgm.add_non_q_factor(mgr, *f)?;
            }
        }
        let proxies = fgm.quantified_vars(mgr)?;
        let merged = merge(
            mgr,
            fgm.new_factors(),
            &proxies,
            self.largest_support_set,
            usize::MAX,
            &MergeHints::default(),
        )?;
        for p in proxies {
            mgr.free(p)?;
        }
        let mut fg = FactorGraph::new(mgr, &merged.factors)?;
        for group in fgm.groups() {
            fg.group_vars(mgr, *group)?;
        }
        for group in &merged.variables {
            fg.group_vars(mgr, *group)?;
        }
        let iterations = fg.converge(mgr)?;
        qlog!(Info, "local factor graph converged in {iterations} iterations");

        for n in &qneigh {
            vsq.remove_factor(mgr, *n)?;
        }
        vsq.remove_var(mgr, q)?;

        let groups: Vec<Bdd> = fgm.groups().to_vec();
        for group in groups {
            let messages = fg.incoming_messages(mgr, group)?;
            for m in messages {
                let back = fgm.reverse_substitute(mgr, m)?;
                vsq.add_factor(mgr, back)?;
                mgr.free(back)?;
                mgr.free(m)?;
            }
        }
        fg.release(mgr)?;
        for f in merged.factors {
            mgr.free(f)?;
        }
        for v in merged.variables {
            mgr.free(v)?;
        }
        fgm.release(mgr)?;
        Ok(())
    }
}

fn largest_index(mgr: &BddManager, factors: &[Bdd]) -> u32 {
    factors
        .iter()
        .flat_map(|f| mgr.edge_of(*f).map(|e| mgr.support_indices_of(&[e])))
        .flatten()
        .max()
        .unwrap_or(0)
}

/// Rewrites `q`'s factors over fresh proxy variables. Each occurrence of a
/// variable gets its own proxy, chained to the previous one by an equality
/// factor, so the rewritten factors share variables only through `q` and the
/// equality chain.
struct FactorGraphModifier {
    q: Bdd,
    next_index: u32,
    /// original variable -> its proxy chain, starting with itself
    chains: BTreeMap<Bdd, Vec<Bdd>>,
    new_factors: Vec<Bdd>,
    /// one cube of proxies per rewritten factor
    groups: Vec<Bdd>,
    orig_vars: Vec<Bdd>,
    proxy_vars: Vec<Bdd>,
}

impl FactorGraphModifier {
    fn new(mgr: &mut BddManager, q: Bdd, greatest_index: u32) -> SolveResult<Self> {
        let _ = mgr.edge_of(q)?;
        Ok(FactorGraphModifier {
            q,
            next_index: greatest_index,
            chains: BTreeMap::new(),
            new_factors: Vec::new(),
            groups: Vec::new(),
            orig_vars: Vec::new(),
            proxy_vars: Vec::new(),
        })
    }

    fn equality(mgr: &mut BddManager, a: Bdd, b: Bdd) -> SolveResult<Bdd> {
        mgr.xnor(a, b)
    }

    /// A fresh proxy for `var`, plus the factor chaining it to the previous
    /// proxy (or to `var` itself for the first occurrence).
    fn new_proxy(&mut self, mgr: &mut BddManager, var: Bdd) -> SolveResult<(Bdd, Bdd)> {
        let prev = *self.chains.entry(var).or_insert_with(|| vec![var]).last().unwrap();
        self.next_index += 1;
        let proxy = mgr.new_var_with_index(self.next_index)?;
        self.chains.get_mut(&var).unwrap().push(proxy);
        let link = Self::equality(mgr, prev, proxy)?;
        Ok((proxy, link))
    }

    fn add_non_q_factor(&mut self, mgr: &mut BddManager, factor: Bdd) -> SolveResult<()> {
        let owned = mgr.dup(factor)?;
        self.new_factors.push(owned);
        Ok(())
    }

    fn add_q_factor(&mut self, mgr: &mut BddManager, factor: Bdd) -> SolveResult<()> {
        let mut from = Vec::new();
        let mut to = Vec::new();
        let mut group = mgr.one();
        let mut equality = mgr.one();
        let sup = mgr.support(factor)?;
        let mut indices = mgr.cube_indices(sup)?;
        mgr.free(sup)?;
        indices.sort_unstable();
        for index in indices {
            let var = mgr.new_var_with_index(index)?;
            if var == self.q {
                mgr.free(var)?;
                continue;
            }
            let (proxy, link) = self.new_proxy(mgr, var)?;
            from.push(var);
            to.push(proxy);
            self.orig_vars.push(var);
            self.proxy_vars.push(proxy);
            let next = mgr.cube_union(group, proxy)?;
            mgr.free(group)?;
            group = next;
            mgr.and_accumulate(&mut equality, link)?;
            mgr.free(link)?;
        }
        let rewritten = mgr.substitute_vars(factor, &from, &to)?;
        self.new_factors.push(rewritten);
        self.new_factors.push(equality);
        self.groups.push(group);
        Ok(())
    }

    fn new_factors(&self) -> &[Bdd] {
        &self.new_factors
    }

    fn groups(&self) -> &[Bdd] {
        &self.groups
    }

    /// Every variable of the rewritten factors outside the proxy groups,
    /// individually; these are the candidates for variable grouping.
    fn quantified_vars(&self, mgr: &mut BddManager) -> SolveResult<Vec<Bdd>> {
        let mut all = mgr.vector_support(&self.new_factors)?;
        for g in &self.groups {
            let next = mgr.cube_diff(all, *g)?;
            mgr.free(all)?;
            all = next;
        }
        let indices = mgr.cube_indices(all)?;
        mgr.free(all)?;
        let mut vars = Vec::new();
        for i in indices {
            vars.push(mgr.new_var_with_index(i)?);
        }
        Ok(vars)
    }

    /// Map a message over proxies back to the original variables.
    fn reverse_substitute(&self, mgr: &mut BddManager, f: Bdd) -> SolveResult<Bdd> {
        mgr.substitute_vars(f, &self.proxy_vars, &self.orig_vars)
    }

    fn release(mut self, mgr: &mut BddManager) -> SolveResult<()> {
        for f in self.new_factors.drain(..) {
            mgr.free(f)?;
        }
        for g in self.groups.drain(..) {
            mgr.free(g)?;
        }
        for v in self.orig_vars.drain(..) {
            mgr.free(v)?;
        }
        for v in self.proxy_vars.drain(..) {
            mgr.free(v)?;
        }
        // the chain map holds copies of handles owned by orig_vars/proxy_vars
        self.chains.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::varscore::quantify,
    };

    fn ring(mgr: &mut BddManager, n: u32) -> (Vec<Bdd>, Vec<Bdd>) {
        let v: Vec<Bdd> = (1..=n).map(|i| mgr.new_var_with_index(i).unwrap()).collect();
        let mut fs = Vec::new();
        for i in 0..n as usize {
            let a = v[i];
            let b = v[(i + 1) % n as usize];
            let na = mgr.not(a).unwrap();
            fs.push(mgr.or(na, b).unwrap());
        }
        (fs, v)
    }

    #[test]
    fn test_proxy_chain_equalities() {
        let mut mgr = BddManager::new(1 << 20);
        let q = mgr.new_var_with_index(5).unwrap();
        let a = mgr.new_var_with_index(10).unwrap();
        let mut fgm = FactorGraphModifier::new(&mut mgr, q, 30).unwrap();
        let (p1, l1) = fgm.new_proxy(&mut mgr, a).unwrap();
        assert_eq!(mgr.lowest_var_index(p1).unwrap(), 31);
        // the link factor forces a == p1
        let na = mgr.not(p1).unwrap();
        let conflict = mgr.and_multi(&[l1, a, na]).unwrap();
        assert!(mgr.is_zero(conflict));
        let (p2, l2) = fgm.new_proxy(&mut mgr, a).unwrap();
        assert_eq!(mgr.lowest_var_index(p2).unwrap(), 32);
        // chained: p1 == p2
        let np2 = mgr.not(p2).unwrap();
        let conflict2 = mgr.and_multi(&[l2, p1, np2]).unwrap();
        assert!(mgr.is_zero(conflict2));
    }

    #[test]
    fn test_factor_graph_strategy_over_approximates() {
        let mut mgr = BddManager::new(1 << 22);
        let (fs, v) = ring(&mut mgr, 4);
        let cube = mgr.cube_union(v[1], v[3]).unwrap();
        let strategy = FactorGraphApprox {
            largest_support_set: 2,
        };
        let result = quantify(&mut mgr, &fs, cube, 0, &strategy).unwrap();
        let got = mgr.and_multi(&result).unwrap();
        let exact = mgr.and_exists_multi(&fs, cube).unwrap();
        assert!(mgr.leq(exact, got).unwrap());
    }
}
