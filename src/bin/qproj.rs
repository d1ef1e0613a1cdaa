// Existential projection of QDIMACS formulas
use {
    clap::Parser,
    qproj::{Config, SolveError, Solver},
    std::{fs::File, io, process::exit},
};

fn main() {
    let config = Config::parse();
    if let Err(why) = run(&config) {
        eprintln!("qproj: {why}");
        exit(1);
    }
}

fn run(config: &Config) -> Result<(), SolveError> {
    let mut solver = Solver::build(config)?;
    let projection = solver.solve()?;
    match config.output_file.as_deref() {
        None | Some("stdout") => {
            let stdout = io::stdout();
            projection
                .write_dimacs(&mut stdout.lock())
                .map_err(|_| SolveError::IOError)?;
        }
        Some(path) => {
            let mut out = File::create(path).map_err(|_| SolveError::IOError)?;
            projection.write_dimacs(&mut out).map_err(|_| SolveError::IOError)?;
        }
    }
    Ok(())
}
