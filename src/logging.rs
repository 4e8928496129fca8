//! Log output for the `ragdbg` binary.
//!
//! Logs go to stderr so stdout carries only command output. `RUST_LOG`
//! wins when set; otherwise the crate logs at `info` (`debug` with
//! `--verbose`) and everything else at `warn`.

use tracing_subscriber::EnvFilter;

fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("warn,rag_debug={level},ragdbg={level}")
}

/// Install the global tracing subscriber. Safe to call more than once;
/// later calls are ignored.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
