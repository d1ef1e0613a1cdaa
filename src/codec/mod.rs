//! Module `codec` converts between CNF clause sets and BDDs: building
//! per-clause BDDs from a parsed QDIMACS, Tseytin-encoding BDDs back into
//! CNF (both to a DIMACS file for model counting and in-memory for the
//! refinement pipeline), and the reverse CNF→BDD path.

/// per-clause BDDs of a QDIMACS problem
mod qdimacs_to_bdd;
/// Tseytin encoding of BDDs into CNF
mod tseytin;

pub use {
    qdimacs_to_bdd::{BddQuantification, QdimacsToBdd},
    tseytin::{dump_for_model_counting, tseytin_cnf},
};
