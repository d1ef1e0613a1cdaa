/// Crate `config` provides the projection engine's configuration and CLI.
use {
    crate::types::Verbosity,
    std::{path::PathBuf, str::FromStr},
};

/// Which pipeline computes the projection.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Method {
    /// cluster factors, pass messages on the factor graph, refine
    #[default]
    FactorGraph,
    /// eliminate variables one at a time by their size score
    VarScore,
    /// approximate resolution on plain CNF, no BDDs
    Resolution,
    /// exact result through a single multi-operand AND-EXISTS
    ExactBdd,
}

impl FromStr for Method {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "factor-graph" | "factorgraph" | "fg" => Ok(Method::FactorGraph),
            "var-score" | "varscore" => Ok(Method::VarScore),
            "resolution" | "resolve" | "ave" => Ok(Method::Resolution),
            "exact-bdd" | "exact" => Ok(Method::ExactBdd),
            _ => Err(format!(
                "could not parse method '{s}', expected factor-graph/var-score/resolution/exact-bdd"
            )),
        }
    }
}

/// Configuration built from command line options
#[derive(Clone, Debug, clap::Parser)]
#[command(name = "qproj", about, version)]
pub struct Config {
    //
    //## clustering budgets
    //
    /// Largest allowed support-set size while clumping factors
    #[arg(long = "largestSupportSet", default_value = "50")]
    pub largest_support_set: usize,

    /// Largest allowed BDD size while clumping factors
    #[arg(long = "largestBddSize", default_value = "1000000000")]
    pub largest_bdd_size: usize,

    //
    //## resolution engine
    //
    /// Depth bound on the clause growth tree
    #[arg(long = "maxClauseTreeSize", default_value = "20")]
    pub max_clause_tree_size: usize,

    /// Wall-clock limit for the resolution engine in seconds; 0 disables it
    #[arg(long = "timeoutSeconds", default_value = "0")]
    pub timeout_seconds: u64,

    //
    //## pipeline
    //
    /// Pipeline used to compute the projection
    #[arg(long = "method", default_value = "factor-graph")]
    pub method: Method,

    /// Run the MUC refinement loop on the approximate result
    #[arg(long = "runMusTool")]
    pub run_mus_tool: bool,

    /// Also compute the exact result with plain BDD operations
    #[arg(long = "computeExactUsingBdd")]
    pub compute_exact_using_bdd: bool,

    //
    //## I/O configuration
    //
    /// Input qdimacs file whose innermost quantifier is existential
    #[arg(long = "inputFile")]
    pub input_file: PathBuf,

    /// Output CNF file, or 'stdout'
    #[arg(long = "outputFile")]
    pub output_file: Option<String>,

    /// Log verbosity (QUIET/ERROR/WARNING/INFO/DEBUG)
    #[arg(long = "verbosity", default_value = "ERROR")]
    pub verbosity: Verbosity,

    //
    //## BDD manager
    //
    /// Soft cap on live BDD nodes
    #[arg(skip = 50_000_000usize)]
    pub bdd_node_limit: usize,

    /// Deadline for any single BDD operation in seconds; 0 disables it
    #[arg(skip)]
    pub bdd_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            largest_support_set: 50,
            largest_bdd_size: 1_000_000_000,
            max_clause_tree_size: 20,
            timeout_seconds: 0,
            method: Method::FactorGraph,
            run_mus_tool: false,
            compute_exact_using_bdd: false,
            input_file: PathBuf::new(),
            output_file: None,
            verbosity: Verbosity::Error,
            bdd_node_limit: 50_000_000,
            bdd_timeout_seconds: 0,
        }
    }
}

impl<T> From<T> for Config
where
    PathBuf: From<T>,
{
    fn from(path: T) -> Config {
        Config {
            input_file: PathBuf::from(path),
            ..Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!("factor-graph".parse::<Method>(), Ok(Method::FactorGraph));
        assert_eq!("AVE".parse::<Method>(), Ok(Method::Resolution));
        assert!("fancy".parse::<Method>().is_err());
    }

    #[test]
    fn test_from_path() {
        let config = Config::from("cnfs/chain.qdimacs");
        assert_eq!(config.largest_support_set, 50);
        assert_eq!(config.input_file.to_str(), Some("cnfs/chain.qdimacs"));
    }
}
