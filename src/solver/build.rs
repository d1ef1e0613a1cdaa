//! Construction and preprocessing: input validation, the conflicting-unary
//! check, and the partitioning pre-pass that splits a clause set into
//! variable-connected components solved independently.

use {
    super::Solver,
    crate::{
        bdd::BddManager,
        config::Config,
        types::{vi, Clause, Qdimacs, QuantifierKind, SolveError, SolveResult},
    },
    ahash::AHashMap,
    std::time::Duration,
};

impl Solver {
    /// Read and validate the input file named by the configuration.
    pub fn build(config: &Config) -> SolveResult<Solver> {
        crate::types::set_verbosity(config.verbosity);
        let qdimacs = Qdimacs::try_from(config.input_file.as_path())?;
        Solver::try_from_qdimacs(qdimacs, config)
    }

    /// Wrap an already-parsed problem.
    pub fn try_from_qdimacs(qdimacs: Qdimacs, config: &Config) -> SolveResult<Solver> {
        let innermost = qdimacs.innermost().ok_or_else(|| {
            SolveError::UnsupportedInput("at least one quantifier block is required".into())
        })?;
        if innermost.kind != QuantifierKind::Exists {
            return Err(SolveError::UnsupportedInput(
                "innermost quantifier must be existential".into(),
            ));
        }
        check_conflicting_units(&qdimacs)?;
        let mut mgr = BddManager::new(config.bdd_node_limit);
        if 0 < config.bdd_timeout_seconds {
            mgr.set_timeout(Duration::from_secs(config.bdd_timeout_seconds));
            mgr.set_timeout_handler(Box::new(|| {
                qlog!(Warning, "BDD operation hit its deadline");
            }));
        }
        Ok(Solver {
            config: config.clone(),
            mgr,
            qdimacs,
        })
    }
}

/// Callers should have unit-propagated already; opposite unit clauses are a
/// fatal input error, not something to recover from.
fn check_conflicting_units(qdimacs: &Qdimacs) -> SolveResult<()> {
    let mut seen: AHashMap<u32, bool> = AHashMap::new();
    for c in &qdimacs.clauses {
        if c.len() != 1 {
            continue;
        }
        let l = c.lits()[0];
        let positive = 0 < l;
        if let Some(prev) = seen.insert(vi(l), positive) {
            if prev != positive {
                return Err(SolveError::ConflictingUnit(vi(l)));
            }
        }
    }
    Ok(())
}

/// Group clause indices into variable-connected components.
pub(crate) fn split_into_components(clauses: &[Clause]) -> Vec<Vec<usize>> {
    let mut parent: AHashMap<u32, u32> = AHashMap::new();
    fn find(parent: &mut AHashMap<u32, u32>, v: u32) -> u32 {
        let p = *parent.entry(v).or_insert(v);
        if p == v {
            return v;
        }
        let root = find(parent, p);
        parent.insert(v, root);
        root
    }
    for c in clauses {
        let mut lits = c.iter();
        if let Some(first) = lits.next() {
            let a = find(&mut parent, vi(*first));
            for l in lits {
                let b = find(&mut parent, vi(*l));
                parent.insert(b, a);
            }
        }
    }
    let mut groups: Vec<(u32, Vec<usize>)> = Vec::new();
    let mut trivial: Vec<Vec<usize>> = Vec::new();
    for (i, c) in clauses.iter().enumerate() {
        match c.iter().next() {
            None => trivial.push(vec![i]),
            Some(l) => {
                let root = find(&mut parent, vi(*l));
                match groups.iter_mut().find(|(r, _)| *r == root) {
                    Some((_, g)) => g.push(i),
                    None => groups.push((root, vec![i])),
                }
            }
        }
    }
    let mut result: Vec<Vec<usize>> = groups.into_iter().map(|(_, g)| g).collect();
    result.append(&mut trivial);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicting_units_are_fatal() {
        let q = Qdimacs::from_clauses(2, vec![2], vec![vec![1], vec![-1], vec![1, 2]]);
        assert_eq!(
            Solver::try_from_qdimacs(q, &Config::default()).err(),
            Some(SolveError::ConflictingUnit(1))
        );
    }

    #[test]
    fn test_universal_innermost_rejected() {
        let mut q = Qdimacs::from_clauses(2, vec![2], vec![vec![1, 2]]);
        q.quantifiers[0].kind = QuantifierKind::ForAll;
        assert!(matches!(
            Solver::try_from_qdimacs(q, &Config::default()),
            Err(SolveError::UnsupportedInput(_))
        ));
    }

    #[test]
    fn test_component_split() {
        let clauses = vec![
            Clause::new(vec![1, 2]),
            Clause::new(vec![3, 4]),
            Clause::new(vec![-2, 5]),
            Clause::new(vec![]),
        ];
        let groups = split_into_components(&clauses);
        assert_eq!(groups.len(), 3);
        assert!(groups.contains(&vec![0, 2]));
        assert!(groups.contains(&vec![1]));
        assert!(groups.contains(&vec![3]));
    }
}
