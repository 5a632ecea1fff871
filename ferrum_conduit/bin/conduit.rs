use ferrum_conduit::core::registry::Registry;
use ferrum_conduit::framework::cli;
use std::process::ExitCode;

/// Conduit binary program, runs YAML job setups with the stock implementations
fn main() -> ExitCode {
    cli::main_with(Registry::with_builtins(), None)
}
