//! Entry point for `logrig-stubd`.

use std::process::ExitCode;

fn main() -> ExitCode {
    logrig_e2e::run(std::env::args_os())
}
