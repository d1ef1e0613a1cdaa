//! Tseytin encoding of BDDs into CNF. Each internal node `ITE(v, t, e)`
//! binds a fresh CNF variable `r` with four clauses; a node on a variable
//! from the existentially-quantified set uses the three-clause dropping
//! encoding `r ↔ (t ∨ e)` instead. Complemented edges negate the Tseytin
//! literal, and every node is visited once through a cache keyed on node
//! identity.

use {
    crate::{
        bdd::{Bdd, BddManager},
        types::{Clause, Lit, SolveResult},
    },
    ahash::{AHashMap, AHashSet},
    std::{
        collections::{BTreeMap, BTreeSet},
        io::{self, Write},
    },
};

struct TseytinEncoder {
    next_var: Lit,
    /// BDD variable index -> CNF variable
    independent: BTreeMap<u32, Lit>,
    /// `None` renumbers independents on first sight; `Some` keeps identity
    /// and allocates Tseytin variables above the reserved count
    identity: bool,
    /// regular node handle (or constant) -> CNF variable
    node_var: AHashMap<Bdd, Lit>,
    clauses: Vec<Vec<Lit>>,
}

impl TseytinEncoder {
    /// File mode: CNF variables are renumbered through the cache.
    fn renumbering() -> TseytinEncoder {
        TseytinEncoder {
            next_var: 0,
            independent: BTreeMap::new(),
            identity: false,
            node_var: AHashMap::new(),
            clauses: Vec::new(),
        }
    }

    /// Pipeline mode: BDD variable `i` stays CNF variable `i`, and fresh
    /// Tseytin variables start above `num_reserved`.
    fn identity(num_reserved: u32) -> TseytinEncoder {
        TseytinEncoder {
            next_var: num_reserved as Lit,
            independent: BTreeMap::new(),
            identity: true,
            node_var: AHashMap::new(),
            clauses: Vec::new(),
        }
    }

    fn cnf_var_for_index(&mut self, index: u32) -> Lit {
        if self.identity {
            self.independent.entry(index).or_insert(index as Lit);
            return index as Lit;
        }
        if let Some(v) = self.independent.get(&index) {
            return *v;
        }
        self.next_var += 1;
        self.independent.insert(index, self.next_var);
        self.next_var
    }

    fn fresh_var(&mut self) -> Lit {
        self.next_var += 1;
        self.next_var
    }

    /// Encode `f` and return its Tseytin literal.
    fn encode(&mut self, mgr: &BddManager, f: Bdd, exists: &AHashSet<u32>) -> Lit {
        if let Some(&r) = self.node_var.get(&f) {
            return r;
        }
        // constants: a unit clause pins the dedicated variable
        if mgr.is_constant_handle(f) {
            let r = self.fresh_var();
            self.node_var.insert(f, r);
            let sign = if mgr.is_zero(f) { -1 } else { 1 };
            self.clauses.push(vec![r * sign]);
            return r;
        }
        // complemented edge: encode the regular node, negate the literal
        if mgr.is_complement_handle(f) {
            let r = self.encode(mgr, mgr.regular_handle(f), exists);
            return -r;
        }
        let (index, t_child, e_child) = mgr.top_children(f);
        let v = self.cnf_var_for_index(index);
        let r = self.fresh_var();
        let t = self.encode(mgr, t_child, exists);
        let e = self.encode(mgr, e_child, exists);
        if exists.contains(&index) {
            // r ↔ (t ∨ e): the variable is dropped at this site
            self.clauses.push(vec![-r, t, e]);
            self.clauses.push(vec![r, -t]);
            self.clauses.push(vec![r, -e]);
        } else {
            // r ↔ ITE(v, t, e)
            self.clauses.push(vec![-r, -v, t]);
            self.clauses.push(vec![-r, v, e]);
            self.clauses.push(vec![r, v, -e]);
            self.clauses.push(vec![r, -v, -t]);
        }
        self.node_var.insert(f, r);
        r
    }
}

fn exists_indices(mgr: &mut BddManager, exists_cube: Bdd) -> SolveResult<AHashSet<u32>> {
    Ok(mgr.cube_indices(exists_cube)?.into_iter().collect())
}

/// In-memory Tseytin encoding of a set of functions, preserving variable
/// numbering. Each function's Tseytin literal is asserted by a unit clause;
/// fresh variables are allocated above `num_reserved`.
pub fn tseytin_cnf(
    mgr: &mut BddManager,
    funcs: &[Bdd],
    num_reserved: u32,
    exists_cube: Bdd,
) -> SolveResult<BTreeSet<Clause>> {
    let exists = exists_indices(mgr, exists_cube)?;
    let mut enc = TseytinEncoder::identity(num_reserved);
    for f in funcs {
        let r = enc.encode(mgr, *f, &exists);
        enc.clauses.push(vec![r]);
    }
    Ok(enc.clauses.into_iter().map(Clause::new).collect())
}

/// Write a DIMACS file whose models count `(⋀ upper) ∧ ¬(⋀ lower)`: every
/// upper-limit Tseytin literal is asserted individually, and the negated
/// lower-limit literals form a single clause. A `c ind` header declares the
/// independent variables.
pub fn dump_for_model_counting<W: Write>(
    mgr: &mut BddManager,
    all_vars: &[Bdd],
    exists_cube: Bdd,
    upper: &[Bdd],
    lower: &[Bdd],
    out: &mut W,
) -> SolveResult<()> {
    let exists = exists_indices(mgr, exists_cube)?;
    let mut enc = TseytinEncoder::renumbering();
    for v in all_vars {
        let index = mgr.lowest_var_index(*v)?;
        enc.cnf_var_for_index(index);
    }
    for u in upper {
        let r = enc.encode(mgr, *u, &exists);
        enc.clauses.push(vec![r]);
    }
    if !lower.is_empty() {
        let negated: Vec<Lit> = lower.iter().map(|l| -enc.encode(mgr, *l, &exists)).collect();
        enc.clauses.push(negated);
    }
    write_dimacs(&enc, out).map_err(|_| crate::types::SolveError::IOError)
}

fn write_dimacs<W: Write>(enc: &TseytinEncoder, out: &mut W) -> io::Result<()> {
    write!(out, "c ind ")?;
    for v in enc.independent.values() {
        write!(out, "{v} ")?;
    }
    writeln!(out, "0")?;
    writeln!(out, "p cnf {} {}", enc.next_var, enc.clauses.len())?;
    for c in &enc.clauses {
        for l in c {
            write!(out, "{l} ")?;
        }
        writeln!(out, "0")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{codec::QdimacsToBdd, types::Qdimacs},
    };

    #[test]
    fn test_round_trip_through_cnf() {
        let mut mgr = BddManager::new(1 << 20);
        let v: Vec<Bdd> = (1..=3).map(|i| mgr.new_var_with_index(i).unwrap()).collect();
        let n2 = mgr.not(v[1]).unwrap();
        let a = mgr.and(v[0], n2).unwrap();
        let f = mgr.or(a, v[2]).unwrap();
        let one = mgr.one();
        let cnf = tseytin_cnf(&mut mgr, &[f], 3, one).unwrap();
        // rebuild: conjoin the clauses and project out the Tseytin variables
        let q = Qdimacs::from_clauses(3, vec![], vec![]);
        let q2b = QdimacsToBdd::new(&mut mgr, &q).unwrap();
        let back = q2b.cnf_to_bdd(&mut mgr, cnf.iter()).unwrap();
        assert_eq!(back, f);
        q2b.release(&mut mgr).unwrap();
    }

    #[test]
    fn test_round_trip_constants() {
        let mut mgr = BddManager::new(1 << 20);
        let one = mgr.one();
        let zero = mgr.zero();
        let q = Qdimacs::from_clauses(1, vec![], vec![]);
        let q2b = QdimacsToBdd::new(&mut mgr, &q).unwrap();
        let cnf_one = tseytin_cnf(&mut mgr, &[one], 1, one).unwrap();
        let back_one = q2b.cnf_to_bdd(&mut mgr, cnf_one.iter()).unwrap();
        assert!(mgr.is_one(back_one));
        let cnf_zero = tseytin_cnf(&mut mgr, &[zero], 1, one).unwrap();
        let back_zero = q2b.cnf_to_bdd(&mut mgr, cnf_zero.iter()).unwrap();
        assert!(mgr.is_zero(back_zero));
        q2b.release(&mut mgr).unwrap();
    }

    #[test]
    fn test_dropping_encoding_projects_variable() {
        let mut mgr = BddManager::new(1 << 20);
        let v: Vec<Bdd> = (1..=2).map(|i| mgr.new_var_with_index(i).unwrap()).collect();
        // f = v1 ∧ v2, dropping v2 at encode time yields ∃v2. f = v1
        let f = mgr.and(v[0], v[1]).unwrap();
        let cnf = tseytin_cnf(&mut mgr, &[f], 2, v[1]).unwrap();
        let q = Qdimacs::from_clauses(2, vec![], vec![]);
        let q2b = QdimacsToBdd::new(&mut mgr, &q).unwrap();
        let back = q2b.cnf_to_bdd(&mut mgr, cnf.iter()).unwrap();
        assert_eq!(back, v[0]);
        q2b.release(&mut mgr).unwrap();
    }

    #[test]
    fn test_dimacs_dump_format() {
        let mut mgr = BddManager::new(1 << 20);
        let v: Vec<Bdd> = (1..=2).map(|i| mgr.new_var_with_index(i).unwrap()).collect();
        let f = mgr.and(v[0], v[1]).unwrap();
        let lower = mgr.or(v[0], v[1]).unwrap();
        let one = mgr.one();
        let mut buf = Vec::new();
        dump_for_model_counting(&mut mgr, &v, one, &[f], &[lower], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("c ind 1 2 0"));
        assert!(lines.next().unwrap().starts_with("p cnf "));
        assert!(text.lines().skip(2).all(|l| l.ends_with(" 0")));
    }
}
