//! Module `solver` orchestrates the projection pipelines.
//!
//! The primary pipeline builds per-clause BDDs, clusters them under the
//! support and size budgets, converges a factor graph, Tseytin-encodes the
//! incoming messages of the free variables, and optionally strengthens the
//! result through MUC refinement. Alternative pipelines substitute the
//! var-score eliminator or the pure-CNF resolution engine, and an exact
//! pipeline answers through a single multi-operand AND-EXISTS.

/// construction, validation and the partitioning pre-pass
mod build;

pub(crate) use build::split_into_components;

use {
    crate::{
        bdd::BddManager,
        codec::{tseytin_cnf, QdimacsToBdd},
        config::{Config, Method},
        merge::{merge, MergeHints},
        refine::{refine, BasicSolver, ExhaustiveMucEnumerator},
        resolve,
        types::{vi, Clause, Lit, Qdimacs, SolveResult},
        varscore,
    },
    std::{
        collections::BTreeSet,
        io::{self, Write},
    },
};

/// The result of a projection: a CNF over the free variables (plus Tseytin
/// variables introduced by the encoding).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Projection {
    /// number of variables of the Tseytin-expanded problem
    pub num_variables: u32,
    /// the variables free in the projected result
    pub free_variables: Vec<u32>,
    pub clauses: Vec<Vec<Lit>>,
}

impl Projection {
    /// Write the DIMACS form: `c ind` comment, header, clause block.
    pub fn write_dimacs<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "c ind ")?;
        for v in &self.free_variables {
            write!(out, "{v} ")?;
        }
        writeln!(out, "0")?;
        writeln!(out, "p cnf {} {}", self.num_variables, self.clauses.len())?;
        for c in &self.clauses {
            for l in c {
                write!(out, "{l} ")?;
            }
            writeln!(out, "0")?;
        }
        Ok(())
    }
}

/// The top-level driver. Owns the BDD manager and the parsed input.
pub struct Solver {
    pub config: Config,
    pub mgr: BddManager,
    pub qdimacs: Qdimacs,
}

impl Solver {
    /// Compute the projection with the configured pipeline.
    pub fn solve(&mut self) -> SolveResult<Projection> {
        // an empty clause makes every projection zero
        if self.qdimacs.clauses.iter().any(|c| c.is_empty()) {
            qlog!(Info, "input contains the empty clause");
            return Ok(self.into_projection([Clause::new(vec![])].into_iter().collect()));
        }
        let cnf = match self.config.method {
            Method::FactorGraph => self.solve_factor_graph()?,
            Method::VarScore => self.solve_var_score()?,
            Method::Resolution => resolve::approximate_projection(&self.qdimacs, &self.config)?,
            Method::ExactBdd => self.solve_exact()?,
        };
        let cnf = if self.config.run_mus_tool && self.config.method != Method::ExactBdd {
            qlog!(Info, "running MUC refinement on {} clauses", cnf.len());
            refine(&self.qdimacs, cnf, BasicSolver::new(), |p| {
                ExhaustiveMucEnumerator::new(p.num_variables, &p.clauses)
            })?
        } else {
            cnf
        };
        if self.config.compute_exact_using_bdd {
            self.compare_with_exact(&cnf)?;
        }
        Ok(self.into_projection(cnf))
    }

    /// Tseytin variables are allocated above the original variables plus
    /// room for one marker variable per clause.
    fn reserved_variables(&self) -> u32 {
        self.qdimacs.num_variables + 2 * self.qdimacs.clauses.len() as u32
    }

    /// The primary pipeline, run per variable-connected component.
    fn solve_factor_graph(&mut self) -> SolveResult<BTreeSet<Clause>> {
        let mut result: BTreeSet<Clause> = BTreeSet::new();
        let mut reserved = self.reserved_variables();
        let components = split_into_components(&self.qdimacs.clauses);
        qlog!(Info, "split input into {} components", components.len());
        for group in components {
            let sub = Qdimacs {
                num_variables: self.qdimacs.num_variables,
                quantifiers: self.qdimacs.quantifiers.clone(),
                clauses: group.iter().map(|i| self.qdimacs.clauses[*i].clone()).collect(),
            };
            let partial = factor_graph_component(&mut self.mgr, &sub, &self.config, reserved)?;
            for c in &partial {
                reserved = reserved.max(c.iter().map(|l| vi(*l)).max().unwrap_or(0));
            }
            result.extend(partial);
        }
        Ok(result)
    }

    fn solve_var_score(&mut self) -> SolveResult<BTreeSet<Clause>> {
        let q2b = QdimacsToBdd::new(&mut self.mgr, &self.qdimacs)?;
        let factors = q2b.factors();
        let cube = q2b.innermost().expect("validated at build time").cube;
        let strategy = varscore::FactorGraphApprox {
            largest_support_set: self.config.largest_support_set,
        };
        let results = varscore::quantify(
            &mut self.mgr,
            &factors,
            cube,
            self.config.largest_bdd_size,
            &strategy,
        )?;
        let one = self.mgr.one();
        let reserved = self.reserved_variables();
        let cnf = tseytin_cnf(&mut self.mgr, &results, reserved, one)?;
        for f in results {
            self.mgr.free(f)?;
        }
        q2b.release(&mut self.mgr)?;
        Ok(cnf)
    }

    fn solve_exact(&mut self) -> SolveResult<BTreeSet<Clause>> {
        let q2b = QdimacsToBdd::new(&mut self.mgr, &self.qdimacs)?;
        let exact = q2b.exact_projection(&mut self.mgr)?;
        let one = self.mgr.one();
        let reserved = self.reserved_variables();
        let cnf = tseytin_cnf(&mut self.mgr, &[exact], reserved, one)?;
        self.mgr.free(exact)?;
        q2b.release(&mut self.mgr)?;
        Ok(cnf)
    }

    /// Cross-check a CNF result against the exact BDD answer.
    fn compare_with_exact(&mut self, cnf: &BTreeSet<Clause>) -> SolveResult<()> {
        let q2b = QdimacsToBdd::new(&mut self.mgr, &self.qdimacs)?;
        let exact = q2b.exact_projection(&mut self.mgr)?;
        let rebuilt = q2b.cnf_to_bdd(&mut self.mgr, cnf.iter())?;
        if exact == rebuilt {
            qlog!(Info, "result matches the exact projection");
        } else {
            let nvars = self.qdimacs.num_variables;
            let exact_count = self.mgr.count_minterm(exact, nvars)?;
            let result_count = self.mgr.count_minterm(rebuilt, nvars)?;
            qlog!(
                Warning,
                "result over-approximates: {result_count} minterms against {exact_count} exact"
            );
            qlog_bdd!(Debug, self.mgr, exact, "exact projection:");
        }
        self.mgr.free(exact)?;
        self.mgr.free(rebuilt)?;
        q2b.release(&mut self.mgr)?;
        Ok(())
    }

    fn into_projection(&self, cnf: BTreeSet<Clause>) -> Projection {
        let num_variables = cnf
            .iter()
            .flat_map(|c| c.iter().map(|l| vi(*l)))
            .max()
            .unwrap_or(0)
            .max(self.qdimacs.num_variables);
        Projection {
            num_variables,
            free_variables: self.qdimacs.free_variables(),
            clauses: cnf.into_iter().map(|c| c.lits().to_vec()).collect(),
        }
    }
}

/// One component through build → merge → converge → encode.
fn factor_graph_component(
    mgr: &mut BddManager,
    sub: &Qdimacs,
    config: &Config,
    reserved: u32,
) -> SolveResult<BTreeSet<Clause>> {
    let q2b = QdimacsToBdd::new(mgr, sub)?;
    let factors = q2b.factors();
    if factors.is_empty() {
        q2b.release(mgr)?;
        return Ok(BTreeSet::new());
    }
    // one variable handle per distinct clause variable, kept apart by
    // quantification so no group mixes bound and free variables
    let qcube = q2b.innermost().expect("validated at build time").cube;
    let mut quantified = Vec::new();
    let mut free = Vec::new();
    let joint = mgr.vector_support(&factors)?;
    for i in mgr.cube_indices(joint)? {
        let v = mgr.new_var_with_index(i)?;
        let common = mgr.cube_intersection(v, qcube)?;
        let bound = !mgr.is_one(common);
        mgr.free(common)?;
        if bound {
            quantified.push(v);
        } else {
            free.push(v);
        }
    }
    mgr.free(joint)?;
    let merged = merge(
        mgr,
        &factors,
        &quantified,
        config.largest_support_set,
        config.largest_bdd_size,
        &MergeHints::default(),
    )?;
    let free_groups = merge(
        mgr,
        &[],
        &free,
        config.largest_support_set,
        config.largest_bdd_size,
        &MergeHints::default(),
    )?;
    for v in quantified.into_iter().chain(free) {
        mgr.free(v)?;
    }
    qlog!(
        Info,
        "merged to {} factors and {} variable groups",
        merged.factors.len(),
        merged.variables.len() + free_groups.variables.len()
    );
    let mut fg = crate::fgraph::FactorGraph::new(mgr, &merged.factors)?;
    for group in merged.variables.iter().chain(free_groups.variables.iter()) {
        fg.group_vars(mgr, *group)?;
    }
    let iterations = fg.converge(mgr)?;
    qlog!(Info, "factor graph converged in {iterations} iterations");
    // the over-approximation lives on the component's free variables
    let support = mgr.vector_support(&factors)?;
    let free_cube = mgr.cube_diff(support, qcube)?;
    mgr.free(support)?;
    let messages = fg.incoming_messages(mgr, free_cube)?;
    mgr.free(free_cube)?;
    let one = mgr.one();
    let cnf = tseytin_cnf(mgr, &messages, reserved, one)?;
    for m in messages {
        mgr.free(m)?;
    }
    fg.release(mgr)?;
    for f in merged.factors {
        mgr.free(f)?;
    }
    for v in merged.variables.into_iter().chain(free_groups.variables) {
        mgr.free(v)?;
    }
    q2b.release(mgr)?;
    Ok(cnf)
}

#[cfg(test)]
mod tests {
    use {super::*, crate::types::SolveError};

    fn solve_with(q: Qdimacs, method: Method, run_mus: bool) -> SolveResult<Projection> {
        let config = Config {
            method,
            run_mus_tool: run_mus,
            compute_exact_using_bdd: true,
            ..Config::default()
        };
        Solver::try_from_qdimacs(q, &config)?.solve()
    }

    fn three_clause_problem() -> Qdimacs {
        Qdimacs::from_clauses(2, vec![2], vec![vec![-1, 2], vec![1, -2], vec![-1, -2]])
    }

    /// rebuild the projected CNF as a BDD and compare it with the exact
    /// projection: equal, or a strict over-approximation
    fn distance_from_exact(q: &Qdimacs, p: &Projection) -> (bool, bool) {
        let mut mgr = BddManager::new(1 << 22);
        let q2b = QdimacsToBdd::new(&mut mgr, q).unwrap();
        let exact = q2b.exact_projection(&mut mgr).unwrap();
        let clauses: BTreeSet<Clause> =
            p.clauses.iter().map(|c| Clause::new(c.clone())).collect();
        let rebuilt = q2b.cnf_to_bdd(&mut mgr, clauses.iter()).unwrap();
        (exact == rebuilt, mgr.leq(exact, rebuilt).unwrap())
    }

    #[test]
    fn test_exact_pipeline() {
        let q = three_clause_problem();
        let p = solve_with(q.clone(), Method::ExactBdd, false).unwrap();
        assert_eq!(distance_from_exact(&q, &p), (true, true));
        assert_eq!(p.free_variables, vec![1]);
    }

    #[test]
    fn test_factor_graph_with_refinement_is_exact() {
        let q = three_clause_problem();
        let p = solve_with(q.clone(), Method::FactorGraph, true).unwrap();
        assert_eq!(distance_from_exact(&q, &p), (true, true));
    }

    #[test]
    fn test_resolution_with_refinement_gives_literal_result() {
        let q = three_clause_problem();
        let p = solve_with(q, Method::Resolution, true).unwrap();
        assert_eq!(p.clauses, vec![vec![-1]]);
    }

    #[test]
    fn test_factor_graph_over_approximates_without_refinement() {
        let q = three_clause_problem();
        let p = solve_with(q.clone(), Method::FactorGraph, false).unwrap();
        let (_, implied) = distance_from_exact(&q, &p);
        assert!(implied, "projection must be implied by the exact result");
    }

    #[test]
    fn test_var_score_pipeline() {
        let q = Qdimacs::from_clauses(
            4,
            vec![2, 3],
            vec![vec![-1, 2], vec![-2, 3], vec![-3, 4]],
        );
        let p = solve_with(q.clone(), Method::VarScore, false).unwrap();
        let (_, implied) = distance_from_exact(&q, &p);
        assert!(implied);
    }

    #[test]
    fn test_empty_clause_set_projects_to_one() {
        let q = Qdimacs::from_clauses(2, vec![2], vec![]);
        let p = solve_with(q, Method::FactorGraph, false).unwrap();
        assert!(p.clauses.is_empty());
    }

    #[test]
    fn test_empty_clause_projects_to_zero() {
        let q = Qdimacs::from_clauses(2, vec![2], vec![vec![1, 2], vec![]]);
        let p = solve_with(q, Method::FactorGraph, false).unwrap();
        assert_eq!(p.clauses, vec![Vec::<Lit>::new()]);
    }

    #[test]
    fn test_write_dimacs() {
        let p = Projection {
            num_variables: 3,
            free_variables: vec![1, 3],
            clauses: vec![vec![-1, 3], vec![3]],
        };
        let mut buf = Vec::new();
        p.write_dimacs(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "c ind 1 3 0\np cnf 3 2\n-1 3 0\n3 0\n");
    }

    #[test]
    fn test_build_requires_input_file() {
        let config = Config::from("no/such/file.qdimacs");
        assert_eq!(Solver::build(&config).err(), Some(SolveError::IOError));
    }
}
