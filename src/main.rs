//! accdb CLI entry point
//!
//! Argument parsing, configuration and dispatch all live in the CLI module.
//! main only turns its result into a process exit code.

use accdb::cli;

fn main() {
    std::process::exit(cli::run());
}
