//! QDIMACS input: a DIMACS CNF extended with quantifier prefix lines
//! (`e v1 v2 … 0`, `a v1 v2 … 0`) between the header and the clause block.

use {
    super::{
        clause::Clause,
        lit::{vi, Lit},
        SolveError, SolveResult,
    },
    std::{
        fs::File,
        io::{BufRead, BufReader},
        path::Path,
    },
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QuantifierKind {
    ForAll,
    Exists,
}

/// One quantifier block of the prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Quantifier {
    pub kind: QuantifierKind,
    pub variables: Vec<u32>,
}

/// A parsed QDIMACS problem.
#[derive(Clone, Debug, Default)]
pub struct Qdimacs {
    pub num_variables: u32,
    /// quantifier blocks ordered from outermost to innermost
    pub quantifiers: Vec<Quantifier>,
    pub clauses: Vec<Clause>,
}

impl Qdimacs {
    /// Build an on-memory problem with a single existential block.
    pub fn from_clauses(num_variables: u32, exists: Vec<u32>, clauses: Vec<Vec<Lit>>) -> Qdimacs {
        Qdimacs {
            num_variables,
            quantifiers: vec![Quantifier {
                kind: QuantifierKind::Exists,
                variables: exists,
            }],
            clauses: clauses.into_iter().map(Clause::new).collect(),
        }
    }

    /// The innermost quantifier block, if any.
    pub fn innermost(&self) -> Option<&Quantifier> {
        self.quantifiers.last()
    }

    /// Variables not bound by any quantifier, in ascending order.
    pub fn free_variables(&self) -> Vec<u32> {
        let mut bound = vec![false; self.num_variables as usize + 1];
        for q in &self.quantifiers {
            for v in &q.variables {
                bound[*v as usize] = true;
            }
        }
        (1..=self.num_variables).filter(|v| !bound[*v as usize]).collect()
    }

    pub fn parse<R: BufRead>(reader: R) -> SolveResult<Qdimacs> {
        let mut num_variables: Option<u32> = None;
        let mut num_clauses: usize = 0;
        let mut quantifiers: Vec<Quantifier> = Vec::new();
        let mut clauses: Vec<Clause> = Vec::new();
        let mut building: Vec<Lit> = Vec::new();
        let mut last_line = 0;
        let fail = |line: usize, reason: &str| SolveError::ParseFailure {
            line,
            reason: reason.to_string(),
        };
        for (i, line) in reader.lines().enumerate() {
            let lno = i + 1;
            last_line = lno;
            let line = line.map_err(|_| SolveError::IOError)?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('c') {
                continue;
            }
            if let Some(rest) = line.strip_prefix('p') {
                if num_variables.is_some() {
                    return Err(fail(lno, "duplicate problem header"));
                }
                let mut it = rest.split_whitespace();
                if it.next() != Some("cnf") {
                    return Err(fail(lno, "expected 'p cnf <vars> <clauses>'"));
                }
                let nv = it
                    .next()
                    .and_then(|s| s.parse::<u32>().ok())
                    .ok_or_else(|| fail(lno, "bad variable count in header"))?;
                num_clauses = it
                    .next()
                    .and_then(|s| s.parse::<usize>().ok())
                    .ok_or_else(|| fail(lno, "bad clause count in header"))?;
                num_variables = Some(nv);
                continue;
            }
            let nv = num_variables.ok_or_else(|| fail(lno, "clause before 'p cnf' header"))?;
            let mut toks = line.split_whitespace().peekable();
            if let Some(&kw) = toks.peek() {
                if kw == "e" || kw == "a" {
                    if !clauses.is_empty() || !building.is_empty() {
                        return Err(fail(lno, "quantifier line after the clause block"));
                    }
                    toks.next();
                    let kind = if kw == "e" {
                        QuantifierKind::Exists
                    } else {
                        QuantifierKind::ForAll
                    };
                    let mut variables = Vec::new();
                    let mut terminated = false;
                    for t in toks {
                        let v = t
                            .parse::<u32>()
                            .map_err(|_| fail(lno, "bad variable in quantifier line"))?;
                        if v == 0 {
                            terminated = true;
                            break;
                        }
                        if nv < v {
                            return Err(fail(lno, "quantified variable out of range"));
                        }
                        variables.push(v);
                    }
                    if !terminated {
                        return Err(fail(lno, "quantifier line not terminated by 0"));
                    }
                    quantifiers.push(Quantifier { kind, variables });
                    continue;
                }
            }
            for t in toks {
                let l = t.parse::<Lit>().map_err(|_| fail(lno, "bad literal"))?;
                if l == 0 {
                    clauses.push(Clause::new(std::mem::take(&mut building)));
                } else {
                    if nv < vi(l) {
                        return Err(fail(lno, "literal out of range"));
                    }
                    building.push(l);
                }
            }
        }
        if !building.is_empty() {
            return Err(fail(last_line, "clause not terminated by 0"));
        }
        let num_variables =
            num_variables.ok_or_else(|| fail(last_line, "missing 'p cnf' header"))?;
        if clauses.len() != num_clauses {
            qlog!(
                Warning,
                "header declared {} clauses but {} were read",
                num_clauses,
                clauses.len()
            );
        }
        Ok(Qdimacs {
            num_variables,
            quantifiers,
            clauses,
        })
    }
}

impl TryFrom<&Path> for Qdimacs {
    type Error = SolveError;
    fn try_from(path: &Path) -> SolveResult<Qdimacs> {
        let fs = File::open(path).map_err(|_| SolveError::IOError)?;
        Qdimacs::parse(BufReader::new(fs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "c a 2-QBF chain\n\
                          p cnf 5 2\n\
                          a 1 2 3 0\n\
                          e 4 5 0\n\
                          -1 3 4 0\n\
                          -4 2 0\n";

    #[test]
    fn test_parse() {
        let q = Qdimacs::parse(SAMPLE.as_bytes()).expect("parse");
        assert_eq!(q.num_variables, 5);
        assert_eq!(q.quantifiers.len(), 2);
        assert_eq!(q.innermost().unwrap().kind, QuantifierKind::Exists);
        assert_eq!(q.innermost().unwrap().variables, vec![4, 5]);
        assert_eq!(q.clauses.len(), 2);
        assert_eq!(q.clauses[0].lits(), &[-1, 3, 4]);
        assert!(q.free_variables().is_empty());
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(
            Qdimacs::parse("p cnf 2 1\n1 3 0\n".as_bytes()),
            Err(SolveError::ParseFailure { line: 2, .. })
        ));
        assert!(matches!(
            Qdimacs::parse("1 2 0\n".as_bytes()),
            Err(SolveError::ParseFailure { line: 1, .. })
        ));
        assert!(matches!(
            Qdimacs::parse("p cnf 2 1\n1 2 0\ne 1 0\n".as_bytes()),
            Err(SolveError::ParseFailure { line: 3, .. })
        ));
    }

    #[test]
    fn test_free_variables() {
        let q = Qdimacs::from_clauses(4, vec![2, 3], vec![vec![1, -2], vec![3, 4]]);
        assert_eq!(q.free_variables(), vec![1, 4]);
    }
}
