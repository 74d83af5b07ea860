//! Subcommand implementations. Each `cmd_*` reports its own errors and
//! exits with status 1 on failure.

pub(crate) mod activity;
pub(crate) mod banks;
pub(crate) mod create;
pub(crate) mod move_deal;
pub(crate) mod normalize;

use std::future::Future;
use std::process;

use serde::Serialize;

use crate::config::ServeConfig;
use crate::store::Session;
use crate::{report_error, OutputFormat};

/// Run `future` to completion on a fresh runtime.
pub(crate) fn block_on<F: Future>(future: F, output: OutputFormat, quiet: bool) -> F::Output {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(future),
        Err(e) => {
            report_error(
                &format!("failed to create tokio runtime: {}", e),
                output,
                quiet,
            );
            process::exit(1);
        }
    }
}

pub(crate) fn open_session(config: &ServeConfig, output: OutputFormat, quiet: bool) -> Session {
    match Session::open(config.store_path.as_deref(), config.engine.clone()) {
        Ok(session) => session,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

/// Unwrap `result` or report the error and exit.
pub(crate) fn or_exit<T>(result: Result<T, String>, output: OutputFormat, quiet: bool) -> T {
    match result {
        Ok(value) => value,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("error serializing output: {}", e);
            process::exit(1);
        }
    }
}
