//! A parsed QDIMACS problem in BDD form: one conjoined BDD per clause,
//! keyed by the clause's literal set, plus the quantifier prefix as cubes.
//! The structure owns its BDDs; the driver releases it once the output CNF
//! has been written.

use {
    crate::{
        bdd::{Bdd, BddManager},
        types::{is_positive, vi, Clause, Lit, Qdimacs, QuantifierKind, SolveResult},
    },
    std::collections::BTreeMap,
};

/// One quantifier block in BDD form.
pub struct BddQuantification {
    pub kind: QuantifierKind,
    pub cube: Bdd,
}

/// QDIMACS in BDD form.
pub struct QdimacsToBdd {
    pub num_variables: u32,
    /// quantifications ordered from outermost to innermost
    pub quantifications: Vec<BddQuantification>,
    /// CNF factors, mapped from the literal-set clause to its BDD
    pub clauses: BTreeMap<Clause, Bdd>,
}

impl QdimacsToBdd {
    pub fn new(mgr: &mut BddManager, qdimacs: &Qdimacs) -> SolveResult<QdimacsToBdd> {
        let mut quantifications = Vec::new();
        for q in &qdimacs.quantifiers {
            let mut indices = q.variables.clone();
            let mut cube = mgr.one();
            for i in indices.drain(..) {
                let v = mgr.new_var_with_index(i)?;
                let next = mgr.cube_union(cube, v)?;
                mgr.free(cube)?;
                mgr.free(v)?;
                cube = next;
            }
            quantifications.push(BddQuantification { kind: q.kind, cube });
        }
        let mut clauses = BTreeMap::new();
        for c in &qdimacs.clauses {
            if clauses.contains_key(c) {
                continue;
            }
            let bdd = Self::clause_bdd(mgr, c)?;
            clauses.insert(c.clone(), bdd);
        }
        Ok(QdimacsToBdd {
            num_variables: qdimacs.num_variables,
            quantifications,
            clauses,
        })
    }

    fn clause_bdd(mgr: &mut BddManager, clause: &Clause) -> SolveResult<Bdd> {
        let mut acc = mgr.zero();
        for l in clause.iter() {
            let lit_bdd = Self::literal_bdd(mgr, *l)?;
            mgr.or_accumulate(&mut acc, lit_bdd)?;
            mgr.free(lit_bdd)?;
        }
        Ok(acc)
    }

    /// The BDD of a single literal, referenced.
    pub fn literal_bdd(mgr: &mut BddManager, l: Lit) -> SolveResult<Bdd> {
        let v = mgr.new_var_with_index(vi(l))?;
        if is_positive(l) {
            Ok(v)
        } else {
            let n = mgr.not(v)?;
            mgr.free(v)?;
            Ok(n)
        }
    }

    /// The innermost quantification, if any.
    pub fn innermost(&self) -> Option<&BddQuantification> {
        self.quantifications.last()
    }

    /// All clause BDDs in clause order, as borrowed handles.
    pub fn factors(&self) -> Vec<Bdd> {
        self.clauses.values().copied().collect()
    }

    /// The exact projection `∃(innermost). ⋀ clauses` through one
    /// multi-operand descent. Outer prefix blocks are left untouched: they
    /// are preserved in the output, not processed.
    pub fn exact_projection(&self, mgr: &mut BddManager) -> SolveResult<Bdd> {
        let factors = self.factors();
        let innermost_cube = match self.innermost() {
            Some(q) => {
                debug_assert_eq!(q.kind, QuantifierKind::Exists);
                q.cube
            }
            None => mgr.one(),
        };
        mgr.and_exists_multi(&factors, innermost_cube)
    }

    /// Rebuild a BDD from a clause set produced by the pipeline, projecting
    /// out any Tseytin variables above `num_variables`.
    pub fn cnf_to_bdd<'a, I>(&self, mgr: &mut BddManager, cnf: I) -> SolveResult<Bdd>
    where
        I: IntoIterator<Item = &'a Clause>,
    {
        let mut result = mgr.one();
        let mut tseytin_cube = mgr.one();
        for clause in cnf {
            let mut acc = mgr.zero();
            for l in clause.iter() {
                let lit_bdd = Self::literal_bdd(mgr, *l)?;
                mgr.or_accumulate(&mut acc, lit_bdd)?;
                mgr.free(lit_bdd)?;
                if self.num_variables < vi(*l) {
                    let v = mgr.new_var_with_index(vi(*l))?;
                    let next = mgr.cube_union(tseytin_cube, v)?;
                    mgr.free(tseytin_cube)?;
                    mgr.free(v)?;
                    tseytin_cube = next;
                }
            }
            mgr.and_accumulate(&mut result, acc)?;
            mgr.free(acc)?;
        }
        if !mgr.is_one(tseytin_cube) {
            let projected = mgr.forsome(result, tseytin_cube)?;
            mgr.free(result)?;
            result = projected;
        }
        mgr.free(tseytin_cube)?;
        Ok(result)
    }

    /// Free every owned BDD.
    pub fn release(mut self, mgr: &mut BddManager) -> SolveResult<()> {
        for q in self.quantifications.drain(..) {
            mgr.free(q.cube)?;
        }
        for (_, bdd) in std::mem::take(&mut self.clauses) {
            mgr.free(bdd)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clause_bdds() {
        let mut mgr = BddManager::new(1 << 20);
        let q = Qdimacs::from_clauses(3, vec![3], vec![vec![1, -2], vec![-1, 3], vec![1, -2]]);
        let b = QdimacsToBdd::new(&mut mgr, &q).unwrap();
        // the duplicate clause collapses
        assert_eq!(b.clauses.len(), 2);
        let c = &b.clauses[&Clause::new(vec![1, -2])];
        assert_eq!(mgr.count_minterm(*c, 2).unwrap(), 3.0);
        let cube = b.innermost().unwrap().cube;
        assert_eq!(mgr.cube_indices(cube).unwrap(), vec![3]);
        b.release(&mut mgr).unwrap();
    }

    #[test]
    fn test_exact_projection() {
        let mut mgr = BddManager::new(1 << 20);
        // ∃2. (1∨2) ∧ (¬2∨3): satisfied by choosing 2 freely unless forced
        let q = Qdimacs::from_clauses(3, vec![2], vec![vec![1, 2], vec![-2, 3]]);
        let b = QdimacsToBdd::new(&mut mgr, &q).unwrap();
        let p = b.exact_projection(&mut mgr).unwrap();
        // 1∨3 remains
        let v1 = mgr.new_var_with_index(1).unwrap();
        let v3 = mgr.new_var_with_index(3).unwrap();
        let expected = mgr.or(v1, v3).unwrap();
        assert_eq!(p, expected);
        b.release(&mut mgr).unwrap();
    }

    #[test]
    fn test_empty_clause_projects_to_zero() {
        let mut mgr = BddManager::new(1 << 20);
        let q = Qdimacs::from_clauses(2, vec![2], vec![vec![1], vec![]]);
        let b = QdimacsToBdd::new(&mut mgr, &q).unwrap();
        let p = b.exact_projection(&mut mgr).unwrap();
        assert!(mgr.is_zero(p));
        b.release(&mut mgr).unwrap();
    }
}
