//! Module `resolve` implements approximate variable elimination on plain
//! CNF, without BDDs. Every clause holding exactly one eliminable literal
//! seeds a search that grows the seed by resolving against candidates with
//! exactly one flipped literal (the pivot); a seed free of eliminable
//! literals enters the result. The search is capped by a clause-tree depth
//! and an advisory wall-clock deadline; the produced clause set
//! over-approximates `∃V.F`.

use {
    crate::{
        config::Config,
        types::{vi, Clause, FlagClause, FlagIF, Lit, Qdimacs, QuantifierKind, SolveError,
                SolveResult},
    },
    ahash::{AHashMap, AHashSet},
    std::{
        collections::BTreeSet,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    },
};

struct SeedClause {
    clause: Clause,
    flags: FlagClause,
}

impl FlagIF for SeedClause {
    type FlagType = FlagClause;
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

/// The seed-growth elimination engine.
pub struct ApproxVarElim {
    clauses: Vec<SeedClause>,
    /// literal -> clauses containing it
    occurs: AHashMap<Lit, Vec<usize>>,
    /// variables to eliminate, ascending
    vars_to_eliminate: Vec<u32>,
    result: BTreeSet<Clause>,
}

impl ApproxVarElim {
    pub fn from_qdimacs(qdimacs: &Qdimacs) -> SolveResult<ApproxVarElim> {
        let innermost = qdimacs.innermost().ok_or_else(|| {
            SolveError::UnsupportedInput("at least one quantifier block is required".into())
        })?;
        if innermost.kind != QuantifierKind::Exists {
            return Err(SolveError::UnsupportedInput(
                "innermost quantifier must be existential".into(),
            ));
        }
        let mut vars_to_eliminate = innermost.variables.clone();
        vars_to_eliminate.sort_unstable();
        vars_to_eliminate.dedup();
        let mut ave = ApproxVarElim {
            clauses: Vec::new(),
            occurs: AHashMap::new(),
            vars_to_eliminate,
            result: BTreeSet::new(),
        };
        for c in &qdimacs.clauses {
            ave.add_clause(c.clone());
        }
        Ok(ave)
    }

    fn add_clause(&mut self, clause: Clause) {
        if self.clauses.iter().any(|s| s.clause == clause) {
            return;
        }
        let id = self.clauses.len();
        for l in clause.iter() {
            self.occurs.entry(*l).or_default().push(id);
        }
        self.clauses.push(SeedClause {
            clause,
            flags: FlagClause::ENABLED,
        });
    }

    pub fn result_clauses(&self) -> &BTreeSet<Clause> {
        &self.result
    }

    /// Grow seeds until every branch is explored, the depth bound prunes it,
    /// or the deadline expires. The deadline is advisory: the engine finishes
    /// its current node and stops.
    pub fn eliminate_all(&mut self, max_clause_tree_size: usize, timeout: Option<Duration>) {
        let expired = Arc::new(AtomicBool::new(false));
        if let Some(limit) = timeout {
            let flag = Arc::clone(&expired);
            thread::spawn(move || {
                thread::sleep(limit);
                flag.store(true, Ordering::Release);
            });
        }
        let mut terminal = Vec::new();
        for (id, sc) in self.clauses.iter_mut().enumerate() {
            let eliminable = sc.clause.literals_over(&self.vars_to_eliminate);
            match eliminable.len() {
                0 => {
                    sc.turn_on(FlagClause::PASSED_THROUGH);
                    self.result.insert(sc.clause.clone());
                }
                1 => terminal.push(id),
                _ => (),
            }
        }
        for id in terminal {
            if expired.load(Ordering::Acquire) {
                qlog!(Warning, "resolution deadline expired, keeping partial result");
                break;
            }
            let seed = self.clauses[id].clause.clone();
            let mut locked: AHashSet<Lit> = AHashSet::new();
            let mut eliminated: AHashMap<u32, usize> = AHashMap::new();
            self.grow_seed(
                seed,
                max_clause_tree_size,
                &mut locked,
                &mut eliminated,
                &expired,
            );
            // every result reachable through this clause has been explored
            self.clauses[id].turn_off(FlagClause::ENABLED);
        }
    }

    fn grow_seed(
        &mut self,
        seed: Clause,
        depth: usize,
        locked: &mut AHashSet<Lit>,
        eliminated: &mut AHashMap<u32, usize>,
        expired: &Arc<AtomicBool>,
    ) {
        let open = seed.literals_over(&self.vars_to_eliminate);
        if !seed.is_empty() && open.is_empty() {
            #[cfg(feature = "trace_resolution")]
            eprintln!("# resolution result {seed}");
            self.result.insert(seed);
            return;
        }
        if depth == 0 || expired.load(Ordering::Acquire) {
            return;
        }
        for pivot in open {
            if locked.contains(&pivot) {
                continue;
            }
            let candidates = self.occurs.get(&-pivot).cloned().unwrap_or_default();
            for cid in candidates {
                if expired.load(Ordering::Acquire) {
                    return;
                }
                if !self.clauses[cid].is(FlagClause::ENABLED) {
                    continue;
                }
                // a candidate holds the negated pivot, so it cannot be a
                // clause that passed through to the result
                debug_assert!(!self.clauses[cid].is(FlagClause::PASSED_THROUGH));
                let candidate = &self.clauses[cid].clause;
                // exactly one flipped literal: the pivot
                if seed.flipped_against(candidate) != vec![-pivot] {
                    continue;
                }
                let resolvent = seed.resolve_on(candidate, vi(pivot));
                let Some(recovered) = self.recover_reintroduced(resolvent, eliminated) else {
                    continue;
                };
                #[cfg(feature = "trace_resolution")]
                eprintln!("# resolve {seed} with {candidate} on {pivot} -> {recovered}");
                locked.insert(pivot);
                eliminated.insert(vi(pivot), cid);
                self.grow_seed(recovered, depth - 1, locked, eliminated, expired);
                eliminated.remove(&vi(pivot));
                locked.remove(&pivot);
            }
        }
    }

    /// A resolution may re-introduce a literal whose variable was already
    /// eliminated up the branch. Re-eliminate it with the clause remembered
    /// in the per-variable resolver map; give up on any further regression.
    fn recover_reintroduced(
        &self,
        mut resolvent: Clause,
        eliminated: &AHashMap<u32, usize>,
    ) -> Option<Clause> {
        if resolvent.is_tautology() {
            return None;
        }
        let mut recovered: AHashSet<u32> = AHashSet::new();
        loop {
            let back = resolvent
                .iter()
                .copied()
                .find(|l| eliminated.contains_key(&vi(*l)));
            let Some(l) = back else {
                return Some(resolvent);
            };
            // one recovery per variable; a second regression gives up
            if !recovered.insert(vi(l)) {
                return None;
            }
            let resolver = &self.clauses[eliminated[&vi(l)]].clause;
            if !resolver.contains(-l) || resolvent.flipped_against(resolver) != vec![-l] {
                return None;
            }
            resolvent = resolvent.resolve_on(resolver, vi(l));
            if resolvent.is_tautology() {
                return None;
            }
        }
    }
}

/// Run the engine over a parsed problem with the caller's bounds.
pub fn approximate_projection(qdimacs: &Qdimacs, config: &Config) -> SolveResult<BTreeSet<Clause>> {
    let mut ave = ApproxVarElim::from_qdimacs(qdimacs)?;
    let timeout = if config.timeout_seconds == 0 {
        None
    } else {
        Some(Duration::from_secs(config.timeout_seconds))
    };
    ave.eliminate_all(config.max_clause_tree_size, timeout);
    Ok(ave.result_clauses().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(q: &Qdimacs, depth: usize) -> BTreeSet<Clause> {
        let mut ave = ApproxVarElim::from_qdimacs(q).expect("build");
        ave.eliminate_all(depth, None);
        ave.result_clauses().clone()
    }

    #[test]
    fn test_two_clause_resolution() {
        let q = Qdimacs::from_clauses(5, vec![4, 5], vec![vec![-1, 3, 4], vec![-4, 2]]);
        let result = run(&q, 3);
        assert_eq!(result.len(), 1);
        assert!(result.contains(&Clause::new(vec![-1, 2, 3])));
    }

    #[test]
    fn test_implication_chain_collapses() {
        let q = Qdimacs::from_clauses(
            11,
            vec![1, 2, 3, 4, 5],
            vec![
                vec![1, 6],
                vec![-1, 2, 7],
                vec![-2, 3, 8],
                vec![-3, 4, 9],
                vec![-4, 5, 10],
                vec![-5, 11],
            ],
        );
        let result = run(&q, 8);
        assert_eq!(result.len(), 1);
        assert!(result.contains(&Clause::new(vec![6, 7, 8, 9, 10, 11])));
    }

    #[test]
    fn test_depth_bound_prunes() {
        let q = Qdimacs::from_clauses(
            11,
            vec![1, 2, 3, 4, 5],
            vec![
                vec![1, 6],
                vec![-1, 2, 7],
                vec![-2, 3, 8],
                vec![-3, 4, 9],
                vec![-4, 5, 10],
                vec![-5, 11],
            ],
        );
        // five resolutions are needed; a shallower tree finds nothing
        assert!(run(&q, 3).is_empty());
    }

    #[test]
    fn test_pass_through_untouched_clauses() {
        let q = Qdimacs::from_clauses(4, vec![4], vec![vec![1, 2], vec![3, 4], vec![-4, 2]]);
        let result = run(&q, 4);
        assert!(result.contains(&Clause::new(vec![1, 2])));
        assert!(result.contains(&Clause::new(vec![2, 3])));
    }

    #[test]
    fn test_rejects_universal_innermost() {
        let mut q = Qdimacs::from_clauses(2, vec![2], vec![vec![1, 2]]);
        q.quantifiers[0].kind = QuantifierKind::ForAll;
        assert!(matches!(
            ApproxVarElim::from_qdimacs(&q),
            Err(SolveError::UnsupportedInput(_))
        ));
    }

    #[test]
    fn test_deadline_is_advisory() {
        let q = Qdimacs::from_clauses(5, vec![4, 5], vec![vec![-1, 3, 4], vec![-4, 2]]);
        let mut ave = ApproxVarElim::from_qdimacs(&q).expect("build");
        // an already-expired deadline still leaves a consistent (empty) state
        ave.eliminate_all(3, Some(Duration::from_secs(0)));
        assert!(ave.result_clauses().len() <= 1);
    }
}
