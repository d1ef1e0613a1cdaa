//! Module `refine` strengthens an over-approximate projection toward the
//! exact one, driven by an external MUC (minimal unsatisfiable core)
//! enumerator.
//!
//! The *must problem* keeps, for every input clause, only its quantified
//! literals; the negated non-quantified rest is remembered as the
//! *assignment* witnessing "this sub-clause is triggered". Each MUC the
//! enumerator delivers names a set of sub-clauses whose assignments cannot
//! all be extended over the quantified variables; if the current CNF still
//! admits their union, the negation of that union is added as a blocking
//! clause, otherwise the combinations of clauses behind the SAT conflict
//! are marked inconsistent to prune the enumerator's search.
//!
//! The enumerator and its SAT solver are external collaborators, seen here
//! only as traits; `oracle` ships small reference implementations.

/// reference implementations of the external interfaces
pub mod oracle;

pub use oracle::{BasicSolver, ExhaustiveMucEnumerator};

use {
    crate::types::{vi, Clause, Lit, Qdimacs, QuantifierKind, SolveError, SolveResult},
    std::collections::{BTreeMap, BTreeSet},
};

/// API of the SAT solver driven by the refinement callback.
pub trait SatSolverIF {
    fn add_clause(&mut self, lits: &[Lit]);
    /// solve under the given assumption literals.
    fn solve_with(&mut self, assumptions: &[Lit]) -> bool;
    /// the subset of the last assumptions responsible for unsatisfiability;
    /// valid after `solve_with` returned `false`.
    fn conflict(&self) -> &[Lit];
}

/// API the callback uses to prune the enumerator's exploration. The
/// enumerator hands itself to the callback through this handle, so the
/// callback never outlives it.
pub trait MucExplorerIF {
    fn mark_inconsistent_set(&mut self, clause_indices: &[usize]);
    fn mark_inconsistent_pair(&mut self, a: usize, b: usize) {
        self.mark_inconsistent_set(&[a, b]);
    }
}

/// API of the refinement callback the enumerator reports MUCs to.
pub trait MucCallbackIF {
    fn process_muc(&mut self, muc: &[Vec<Lit>], explorer: &mut dyn MucExplorerIF);
}

/// API of the external MUC enumerator.
pub trait MucEnumeratorIF: MucExplorerIF {
    fn enumerate(&mut self, callback: &mut dyn MucCallbackIF);
}

/// The clause set handed to the MUC enumerator, with marker variables
/// de-duplicating equal quantified sub-clauses.
pub struct MustProblem {
    pub num_variables: u32,
    pub clauses: Vec<Clause>,
    /// pairs of clauses whose assignments clash on some variable
    pub inconsistent_pairs: Vec<(usize, usize)>,
}

/// The refinement state: the evolving CNF, the sub-clause bookkeeping and
/// the SAT solver mirroring the CNF.
pub struct MucRefiner<S: SatSolverIF> {
    cnf: BTreeSet<Clause>,
    clause_to_assignments: BTreeMap<Clause, Vec<Lit>>,
    assignment_to_clause_indices: BTreeMap<Lit, BTreeSet<usize>>,
    solver: S,
}

impl<S: SatSolverIF> MucRefiner<S> {
    /// Build the must problem from the original input and mirror the
    /// current over-approximation `cnf` into `solver`.
    pub fn new(
        qdimacs: &Qdimacs,
        cnf: BTreeSet<Clause>,
        mut solver: S,
    ) -> SolveResult<(MucRefiner<S>, MustProblem)> {
        let innermost = qdimacs.innermost().ok_or_else(|| {
            SolveError::UnsupportedInput("at least one quantifier block is required".into())
        })?;
        if innermost.kind != QuantifierKind::Exists {
            return Err(SolveError::UnsupportedInput(
                "innermost quantifier must be existential".into(),
            ));
        }
        for c in &cnf {
            solver.add_clause(c.lits());
        }
        let quantified: BTreeSet<u32> = innermost.variables.iter().copied().collect();
        let mut num_variables = qdimacs.num_variables;
        let mut output_clauses: Vec<Clause> = Vec::new();
        let mut seen: BTreeSet<Clause> = BTreeSet::new();
        let mut clause_to_assignments: BTreeMap<Clause, Vec<Lit>> = BTreeMap::new();
        let mut assignment_to_clause_indices: BTreeMap<Lit, BTreeSet<usize>> = BTreeMap::new();
        for clause in &qdimacs.clauses {
            let sub: Vec<Lit> = clause
                .iter()
                .copied()
                .filter(|l| quantified.contains(&vi(*l)))
                .collect();
            if sub.is_empty() {
                continue;
            }
            let assignments: Vec<Lit> = clause
                .iter()
                .copied()
                .filter(|l| !quantified.contains(&vi(*l)))
                .map(|l| -l)
                .collect();
            let sub = Clause::new(sub);
            let position = output_clauses.len();
            if seen.insert(sub.clone()) {
                clause_to_assignments.insert(sub.clone(), assignments.clone());
                output_clauses.push(sub);
            } else {
                // a fresh marker variable keeps the duplicate distinct, and a
                // unit clause pins the marker to false
                num_variables += 1;
                let marker = num_variables as Lit;
                let mut lits = sub.lits().to_vec();
                lits.push(marker);
                let extended = Clause::new(lits);
                clause_to_assignments.insert(extended.clone(), assignments.clone());
                output_clauses.push(extended);
                let pin = Clause::new(vec![-marker]);
                clause_to_assignments.insert(pin.clone(), Vec::new());
                output_clauses.push(pin);
            }
            for a in assignments {
                assignment_to_clause_indices.entry(a).or_default().insert(position);
            }
        }
        let mut inconsistent_pairs = Vec::new();
        let mut marked: BTreeSet<(usize, usize)> = BTreeSet::new();
        for (a, positions) in &assignment_to_clause_indices {
            if *a < 0 {
                continue;
            }
            let Some(opposite) = assignment_to_clause_indices.get(&-a) else {
                continue;
            };
            for p in positions {
                for q in opposite {
                    let (lo, hi) = (*p.min(q), *p.max(q));
                    if lo != hi && marked.insert((lo, hi)) {
                        qlog!(Debug, "marking clauses {lo} and {hi} inconsistent on {a}");
                        inconsistent_pairs.push((lo, hi));
                    }
                }
            }
        }
        let problem = MustProblem {
            num_variables,
            clauses: output_clauses,
            inconsistent_pairs,
        };
        let refiner = MucRefiner {
            cnf,
            clause_to_assignments,
            assignment_to_clause_indices,
            solver,
        };
        Ok((refiner, problem))
    }

    /// The refined CNF after enumeration finished.
    pub fn into_cnf(self) -> BTreeSet<Clause> {
        self.cnf
    }
}

impl<S: SatSolverIF> MucCallbackIF for MucRefiner<S> {
    fn process_muc(&mut self, muc: &[Vec<Lit>], explorer: &mut dyn MucExplorerIF) {
        let mut assignments: BTreeSet<Lit> = BTreeSet::new();
        for lits in muc {
            let clause = Clause::new(lits.clone());
            let found = self
                .clause_to_assignments
                .get(&clause)
                .expect("MUC clause missing from the assignment map");
            for a in found {
                debug_assert!(!assignments.contains(&-a));
                assignments.insert(*a);
            }
        }
        let assumptions: Vec<Lit> = assignments.iter().copied().collect();
        if self.solver.solve_with(&assumptions) {
            // the assignment is still allowed but unextendable: block it
            let blocking: Vec<Lit> = assumptions.iter().map(|a| -a).collect();
            self.solver.add_clause(&blocking);
            let clause = Clause::new(blocking);
            qlog!(Info, "adding clause {clause} to solution");
            self.cnf.insert(clause);
        } else {
            // already blocked: prune every combination of clauses behind the
            // conflicting assignments
            let conflict = self.solver.conflict().to_vec();
            let sets: Vec<&BTreeSet<usize>> = conflict
                .iter()
                .map(|l| {
                    self.assignment_to_clause_indices
                        .get(l)
                        .expect("conflict literal missing from the clause-index map")
                })
                .collect();
            let mut combination = Vec::with_capacity(sets.len());
            let mut disabled = 0usize;
            mark_cartesian(&sets, &mut combination, explorer, &mut disabled);
            qlog!(Info, "disabled {disabled} sets in the MUC enumerator");
        }
    }
}

fn mark_cartesian(
    sets: &[&BTreeSet<usize>],
    combination: &mut Vec<usize>,
    explorer: &mut dyn MucExplorerIF,
    disabled: &mut usize,
) {
    match sets.split_first() {
        None => {
            explorer.mark_inconsistent_set(combination);
            *disabled += 1;
        }
        Some((head, rest)) => {
            for index in head.iter() {
                combination.push(*index);
                mark_cartesian(rest, combination, explorer, disabled);
                combination.pop();
            }
        }
    }
}

/// Run the full refinement loop with the given external tools.
pub fn refine<S, E, F>(
    qdimacs: &Qdimacs,
    cnf: BTreeSet<Clause>,
    solver: S,
    make_enumerator: F,
) -> SolveResult<BTreeSet<Clause>>
where
    S: SatSolverIF,
    E: MucEnumeratorIF,
    F: FnOnce(&MustProblem) -> E,
{
    let (mut refiner, problem) = MucRefiner::new(qdimacs, cnf, solver)?;
    let mut enumerator = make_enumerator(&problem);
    for (a, b) in &problem.inconsistent_pairs {
        enumerator.mark_inconsistent_pair(*a, *b);
    }
    enumerator.enumerate(&mut refiner);
    Ok(refiner.into_cnf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must_problem(q: &Qdimacs) -> (MucRefiner<BasicSolver>, MustProblem) {
        MucRefiner::new(q, BTreeSet::new(), BasicSolver::new()).expect("build")
    }

    #[test]
    fn test_must_problem_keeps_quantified_subclauses() {
        let q = Qdimacs::from_clauses(
            4,
            vec![3, 4],
            vec![vec![1, 3], vec![-2, 4], vec![1, 2]],
        );
        let (_, problem) = must_problem(&q);
        // the clause without quantified literals is dropped
        assert_eq!(problem.clauses.len(), 2);
        assert_eq!(problem.clauses[0], Clause::new(vec![3]));
        assert_eq!(problem.clauses[1], Clause::new(vec![4]));
        assert_eq!(problem.num_variables, 4);
    }

    #[test]
    fn test_duplicate_subclause_gets_marker() {
        let q = Qdimacs::from_clauses(3, vec![3], vec![vec![1, 3], vec![2, 3]]);
        let (_, problem) = must_problem(&q);
        // {3}, {3, marker}, {-marker}
        assert_eq!(problem.clauses.len(), 3);
        assert_eq!(problem.num_variables, 4);
        assert_eq!(problem.clauses[1], Clause::new(vec![3, 4]));
        assert_eq!(problem.clauses[2], Clause::new(vec![-4]));
    }

    #[test]
    fn test_opposite_assignments_marked_inconsistent() {
        let q = Qdimacs::from_clauses(3, vec![3], vec![vec![-1, 3], vec![1, -3]]);
        let (_, problem) = must_problem(&q);
        // assignments {1} and {-1} can never trigger together
        assert_eq!(problem.inconsistent_pairs, vec![(0, 1)]);
    }

    #[test]
    fn test_refinement_reaches_exact_projection() {
        // ∃2. (¬1∨2) ∧ (1∨¬2) ∧ (¬1∨¬2) == ¬1, starting from the empty
        // over-approximation
        let q = Qdimacs::from_clauses(
            2,
            vec![2],
            vec![vec![-1, 2], vec![1, -2], vec![-1, -2]],
        );
        let refined = refine(&q, BTreeSet::new(), BasicSolver::new(), |p| {
            ExhaustiveMucEnumerator::new(p.num_variables, &p.clauses)
        })
        .expect("refine");
        assert_eq!(refined.len(), 1);
        assert!(refined.contains(&Clause::new(vec![-1])));
    }
}
