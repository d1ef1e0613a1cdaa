#![allow(clippy::upper_case_acronyms)]
/*!
# A QDIMACS projection engine in Rust

Qproj computes a CNF over-approximation of `∃Q.F` for a CNF formula F whose
innermost quantifier block Q is existential, the core step of symbolic model
checking of transition relations and of skolem-function synthesis.
It combines several cooperating engines:

- a reduced-ordered BDD engine with complemented edges and multi-operand
  conjunction/projection primitives (`and_multi`, `and_exists_multi`)
- a factor-graph message-passing engine with variable grouping, cyclic
  convergence and exact acyclic sweeps
- a greedy cluster merger working under support-size and BDD-size budgets
- a variable-scoring eliminator with pluggable approximation strategies
- a pure-CNF seed-growth resolution engine
- a MUC-driven refinement loop that strengthens the over-approximation
  toward the exact projection

# Examples

## Project a QDIMACS file through the factor-graph pipeline

```no_run
use qproj::*;

let config = Config::from("cnfs/chain.qdimacs");
if let Ok(mut s) = Solver::build(&config) {
    if let Ok(projection) = s.solve() {
        println!("{} clauses", projection.clauses.len());
    }
}
```

## On-memory projection of a clause vector

```
use qproj::{types::Qdimacs, Config, Method, Solver};

let q = Qdimacs::from_clauses(2, vec![2], vec![vec![-1, 2], vec![1, -2], vec![-1, -2]]);
let config = Config {
    method: Method::Resolution,
    run_mus_tool: true,
    ..Config::default()
};
let mut s = Solver::try_from_qdimacs(q, &config).expect("build");
let projection = s.solve().expect("solve");
assert_eq!(projection.clauses, vec![vec![-1]]);
```
*/
#[macro_use]
mod macros;

/// Module `bdd` implements the decision-diagram engine and its multi-operand operations.
pub mod bdd;
/// Module `codec` converts between CNF clause sets and BDDs (Tseytin encoding and back).
pub mod codec;
/// Module `config` provides the configuration and CLI.
pub mod config;
/// Module `fgraph` provides the factor graph and its message-passing algorithms.
pub mod fgraph;
/// Module `merge` clusters factors and variables under support and size budgets.
pub mod merge;
/// Module `refine` drives an external MUC enumerator to strengthen a projection.
pub mod refine;
/// Module `resolve` implements approximate variable elimination on plain CNF.
pub mod resolve;
/// Module `solver` provides the top-level pipelines.
pub mod solver;
/// Module `types` provides various building blocks, including some common traits.
pub mod types;
/// Module `varscore` eliminates variables one at a time by a size score.
pub mod varscore;

pub use {
    config::{Config, Method},
    solver::{Projection, Solver},
    types::{SolveError, SolveResult, Verbosity},
};

/// Qproj version number.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[macro_use]
extern crate bitflags;
