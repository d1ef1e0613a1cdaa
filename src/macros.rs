/// Verbosity-gated logging to stderr.
///
/// ```ignore
/// qlog!(Info, "merged to {} factors", n);
/// ```
#[macro_export]
macro_rules! qlog {
    ($lvl: ident, $($arg: tt)*) => {{
        let lvl = $crate::types::Verbosity::$lvl;
        if lvl <= $crate::types::verbosity() {
            eprintln!("[{}] {}", lvl.name(), format_args!($($arg)*));
        }
    }};
}

/// Log a BDD's minterms at the given verbosity.
macro_rules! qlog_bdd {
    ($lvl: ident, $mgr: expr, $bdd: expr, $($arg: tt)*) => {{
        let lvl = $crate::types::Verbosity::$lvl;
        if lvl <= $crate::types::verbosity() {
            eprintln!("[{}] {}", lvl.name(), format_args!($($arg)*));
            for cube in $mgr.minterm_cubes($bdd).iter() {
                eprintln!(
                    "  {}",
                    cube.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(" ")
                );
            }
        }
    }};
}
