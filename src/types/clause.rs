//! Clauses as sorted, deduplicated sets of literals.

use {
    super::lit::{vi, Lit},
    std::fmt,
};

/// A clause; literal order is normalized so that equal literal sets compare equal.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Clause {
    lits: Vec<Lit>,
}

impl Clause {
    pub fn new(mut lits: Vec<Lit>) -> Clause {
        lits.sort_unstable();
        lits.dedup();
        Clause { lits }
    }
    pub fn lits(&self) -> &[Lit] {
        &self.lits
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Lit> {
        self.lits.iter()
    }
    pub fn len(&self) -> usize {
        self.lits.len()
    }
    pub fn is_empty(&self) -> bool {
        self.lits.is_empty()
    }
    pub fn contains(&self, l: Lit) -> bool {
        self.lits.binary_search(&l).is_ok()
    }
    /// `true` if the clause holds some literal together with its negation.
    pub fn is_tautology(&self) -> bool {
        self.lits.iter().any(|l| self.contains(-*l))
    }
    /// All literals whose variable appears in `vars`; `vars` must be sorted.
    pub fn literals_over(&self, vars: &[u32]) -> Vec<Lit> {
        self.lits
            .iter()
            .copied()
            .filter(|l| vars.binary_search(&vi(*l)).is_ok())
            .collect()
    }
    /// Literals of `that` whose negation appears in `self`.
    pub fn flipped_against(&self, that: &Clause) -> Vec<Lit> {
        that.lits.iter().copied().filter(|l| self.contains(-*l)).collect()
    }
    /// The resolvent of `self` and `that` on `pivot_var`.
    ///
    /// Both occurrences of the pivot variable are dropped; everything else is
    /// merged. The caller checks that the result is not a tautology.
    pub fn resolve_on(&self, that: &Clause, pivot_var: u32) -> Clause {
        let mut lits = Vec::with_capacity(self.lits.len() + that.lits.len() - 1);
        lits.extend(self.lits.iter().copied().filter(|l| vi(*l) != pivot_var));
        lits.extend(that.lits.iter().copied().filter(|l| vi(*l) != pivot_var));
        Clause::new(lits)
    }
}

impl From<&[Lit]> for Clause {
    fn from(lits: &[Lit]) -> Clause {
        Clause::new(lits.to_vec())
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.lits.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        let c = Clause::new(vec![3, -1, 3, 2]);
        assert_eq!(c.lits(), &[-1, 2, 3]);
        assert!(c.contains(-1));
        assert!(!c.contains(1));
    }

    #[test]
    fn test_resolution() {
        let c1 = Clause::new(vec![-1, 3, 4]);
        let c2 = Clause::new(vec![-4, 2]);
        let r = c1.resolve_on(&c2, 4);
        assert_eq!(r.lits(), &[-1, 2, 3]);
        assert!(!r.is_tautology());
        assert_eq!(c1.flipped_against(&c2), vec![-4]);
    }

    #[test]
    fn test_literals_over() {
        let c = Clause::new(vec![-5, -2, 1, 4]);
        assert_eq!(c.literals_over(&[2, 4]), vec![-2, 4]);
    }
}
