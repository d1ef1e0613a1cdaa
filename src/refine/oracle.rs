//! Reference implementations of the external refinement interfaces: a
//! unit-propagating backtracking SAT solver and an exhaustive MUC
//! enumerator. Both are meant for small problems and for the test suite;
//! production deployments plug real tools into the same traits.

use {
    super::{MucCallbackIF, MucEnumeratorIF, MucExplorerIF, SatSolverIF},
    crate::types::{is_positive, vi, Clause, Lit},
    ahash::AHashMap,
    std::collections::BTreeSet,
};

enum Status {
    Sat,
    Conflict,
    Unit(Lit),
    Branch(Lit),
}

fn status(clauses: &[Vec<Lit>], assign: &AHashMap<u32, bool>) -> Status {
    let mut branch: Option<Lit> = None;
    let mut unit: Option<Lit> = None;
    let mut all_satisfied = true;
    for c in clauses {
        let mut satisfied = false;
        let mut unassigned: Option<Lit> = None;
        let mut open = 0;
        for l in c {
            match assign.get(&vi(*l)) {
                Some(v) => {
                    if *v == is_positive(*l) {
                        satisfied = true;
                        break;
                    }
                }
                None => {
                    open += 1;
                    unassigned = Some(*l);
                }
            }
        }
        if satisfied {
            continue;
        }
        if open == 0 {
            return Status::Conflict;
        }
        all_satisfied = false;
        if open == 1 && unit.is_none() {
            unit = unassigned;
        }
        if branch.is_none() {
            branch = unassigned;
        }
    }
    if all_satisfied {
        Status::Sat
    } else if let Some(u) = unit {
        Status::Unit(u)
    } else {
        Status::Branch(branch.expect("open clause without literal"))
    }
}

fn solve(clauses: &[Vec<Lit>], assign: AHashMap<u32, bool>) -> bool {
    let mut assign = assign;
    loop {
        match status(clauses, &assign) {
            Status::Sat => return true,
            Status::Conflict => return false,
            Status::Unit(l) => {
                assign.insert(vi(l), is_positive(l));
            }
            Status::Branch(l) => {
                let mut high = assign.clone();
                high.insert(vi(l), is_positive(l));
                if solve(clauses, high) {
                    return true;
                }
                assign.insert(vi(l), !is_positive(l));
            }
        }
    }
}

pub(crate) fn satisfiable(clauses: &[Vec<Lit>]) -> bool {
    solve(clauses, AHashMap::new())
}

/// A tiny assumption-capable SAT solver.
#[derive(Default)]
pub struct BasicSolver {
    clauses: Vec<Vec<Lit>>,
    conflict: Vec<Lit>,
}

impl BasicSolver {
    pub fn new() -> BasicSolver {
        BasicSolver::default()
    }

    fn unsat_under(&self, assumptions: &[Lit]) -> bool {
        let mut all = self.clauses.clone();
        all.extend(assumptions.iter().map(|a| vec![*a]));
        !satisfiable(&all)
    }
}

impl SatSolverIF for BasicSolver {
    fn add_clause(&mut self, lits: &[Lit]) {
        let c = Clause::new(lits.to_vec());
        if !c.is_tautology() {
            self.clauses.push(c.lits().to_vec());
        }
    }

    fn solve_with(&mut self, assumptions: &[Lit]) -> bool {
        if !self.unsat_under(assumptions) {
            return true;
        }
        // deletion-minimize the failed assumption set
        let mut core = assumptions.to_vec();
        let mut i = 0;
        while i < core.len() {
            let mut trial = core.clone();
            trial.remove(i);
            if self.unsat_under(&trial) {
                core = trial;
            } else {
                i += 1;
            }
        }
        self.conflict = core;
        false
    }

    fn conflict(&self) -> &[Lit] {
        &self.conflict
    }
}

/// Enumerates every minimal unsatisfiable subset of a clause list in
/// ascending size order, honoring the inconsistent sets marked by the
/// callback. Exhaustive by construction, so only suitable for small
/// problems; the visit budget guards against blow-up and is reported when
/// hit.
pub struct ExhaustiveMucEnumerator {
    clauses: Vec<Vec<Lit>>,
    inconsistent: Vec<BTreeSet<usize>>,
    visit_budget: usize,
    truncated: bool,
}

impl ExhaustiveMucEnumerator {
    pub fn new(num_variables: u32, clauses: &[Clause]) -> ExhaustiveMucEnumerator {
        debug_assert!(clauses
            .iter()
            .all(|c| c.iter().all(|l| vi(*l) <= num_variables)));
        ExhaustiveMucEnumerator {
            clauses: clauses.iter().map(|c| c.lits().to_vec()).collect(),
            inconsistent: Vec::new(),
            visit_budget: 1 << 20,
            truncated: false,
        }
    }

    fn is_pruned(&self, combination: &[usize]) -> bool {
        self.inconsistent
            .iter()
            .any(|s| s.iter().all(|i| combination.contains(i)))
    }

    fn subset(&self, combination: &[usize]) -> Vec<Vec<Lit>> {
        combination.iter().map(|i| self.clauses[*i].clone()).collect()
    }

    fn is_minimal_unsat(&self, combination: &[usize]) -> bool {
        if satisfiable(&self.subset(combination)) {
            return false;
        }
        for skip in 0..combination.len() {
            let reduced: Vec<usize> = combination
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, c)| *c)
                .collect();
            if !satisfiable(&self.subset(&reduced)) {
                return false;
            }
        }
        true
    }

    fn visit(
        &mut self,
        start: usize,
        size: usize,
        combination: &mut Vec<usize>,
        callback: &mut dyn MucCallbackIF,
    ) {
        if self.visit_budget == 0 {
            if !self.truncated {
                self.truncated = true;
                qlog!(Warning, "MUC enumeration budget exhausted, search truncated");
            }
            return;
        }
        if size == 0 {
            self.visit_budget -= 1;
            if self.is_pruned(combination) {
                return;
            }
            if self.is_minimal_unsat(combination) {
                let muc = self.subset(combination);
                callback.process_muc(&muc, self);
            }
            return;
        }
        for i in start..=self.clauses.len().saturating_sub(size) {
            combination.push(i);
            self.visit(i + 1, size - 1, combination, callback);
            combination.pop();
        }
    }
}

impl MucExplorerIF for ExhaustiveMucEnumerator {
    fn mark_inconsistent_set(&mut self, clause_indices: &[usize]) {
        self.inconsistent
            .push(clause_indices.iter().copied().collect());
    }
}

impl MucEnumeratorIF for ExhaustiveMucEnumerator {
    fn enumerate(&mut self, callback: &mut dyn MucCallbackIF) {
        for size in 1..=self.clauses.len() {
            let mut combination = Vec::with_capacity(size);
            self.visit(0, size, &mut combination, callback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_solver() {
        let mut s = BasicSolver::new();
        s.add_clause(&[1, 2]);
        s.add_clause(&[-1, 2]);
        assert!(s.solve_with(&[]));
        assert!(s.solve_with(&[2]));
        assert!(!s.solve_with(&[-2, 1]));
        // -2 alone already clashes with the clauses
        assert_eq!(s.conflict(), &[-2]);
    }

    #[test]
    fn test_tautologies_are_dropped() {
        let mut s = BasicSolver::new();
        s.add_clause(&[1, -1]);
        assert!(s.solve_with(&[1]));
        assert!(s.solve_with(&[-1]));
    }

    struct Collect {
        mucs: Vec<Vec<Vec<Lit>>>,
    }
    impl MucCallbackIF for Collect {
        fn process_muc(&mut self, muc: &[Vec<Lit>], _explorer: &mut dyn MucExplorerIF) {
            self.mucs.push(muc.to_vec());
        }
    }

    #[test]
    fn test_enumerator_finds_minimal_cores() {
        let clauses = vec![
            Clause::new(vec![1]),
            Clause::new(vec![-1]),
            Clause::new(vec![2]),
        ];
        let mut e = ExhaustiveMucEnumerator::new(2, &clauses);
        let mut c = Collect { mucs: Vec::new() };
        e.enumerate(&mut c);
        assert_eq!(c.mucs, vec![vec![vec![1], vec![-1]]]);
    }

    #[test]
    fn test_enumerator_honors_marks() {
        let clauses = vec![Clause::new(vec![1]), Clause::new(vec![-1])];
        let mut e = ExhaustiveMucEnumerator::new(1, &clauses);
        e.mark_inconsistent_pair(0, 1);
        let mut c = Collect { mucs: Vec::new() };
        e.enumerate(&mut c);
        assert!(c.mucs.is_empty());
    }
}
