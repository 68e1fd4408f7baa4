//! Inspects how a project's traffic is sampled by its SDKs before a dynamic sampling rule is
//! created.
//!
//! `dsdist` draws a random sample of root transactions from a dataset, summarizes the client
//! sample rates recorded on them and, for rules on distributed traces, counts how transactions of
//! the sampled traces spread across the projects of the organization.
//!
//! # Exit Codes
//!
//!  - `0`: The report was printed.
//!  - `1`: The command failed, for example because the dataset could not be loaded.
//!  - `2`: The request was rejected. A JSON body with a `detail` message is printed to stdout.
//!
//! # Workspace Crates
//!
//! `dsdist` is split into the following workspace crates:
//!
//!  - `dsdist`: Main entry point and command line interface.
//!  - [`dsdist-config`]: Static configuration for the CLI.
//!  - [`dsdist-log`]: Logging setup and utilities.
//!  - [`dsdist-query`]: Query service contract and the in-memory dataset backend.
//!  - [`dsdist-sampling`]: Sample rate distributions and project breakdowns.
//!  - [`dsdist-statsd`]: Metrics client for StatsD.
//!
//! [`dsdist-config`]: ../dsdist_config/index.html
//! [`dsdist-log`]: ../dsdist_log/index.html
//! [`dsdist-query`]: ../dsdist_query/index.html
//! [`dsdist-sampling`]: ../dsdist_sampling/index.html
//! [`dsdist-statsd`]: ../dsdist_statsd/index.html

#![allow(
    clippy::print_stdout,
    reason = "reports and config dumps are written to stdout"
)]

mod cli;
mod cliapp;
mod setup;

use std::process;

use dsdist_sampling::ReportError;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => match err.downcast_ref::<ReportError>() {
            Some(report_error) if report_error.is_client_error() => {
                let body = serde_json::json!({ "detail": report_error.to_string() });
                println!("{body}");
                2
            }
            _ => {
                dsdist_log::ensure_error(&err);
                1
            }
        },
    };

    process::exit(exit_code);
}
