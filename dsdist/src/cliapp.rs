// This module implements the definition of the command line app.
//
// It must not have any other imports than clap, so that it stays independent of the rest of
// the application.
use clap::builder::{BoolishValueParser, PossibleValuesParser};
use clap::{Arg, ArgAction, Command, value_parser};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Inspects client sample rates of root transactions for dynamic sampling.";

pub fn make_app() -> Command {
    Command::new("dsdist")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .propagate_version(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .env("DSDIST_CONFIG")
                .default_value(".")
                .help("The path to the config folder."),
        )
        .arg(
            Arg::new("log_level")
                .value_name("LEVEL")
                .long("log-level")
                .global(true)
                .env("DSDIST_LOG_LEVEL")
                .value_parser(PossibleValuesParser::new([
                    "error", "warn", "info", "debug", "trace",
                ]))
                .help("The log level for dsdist."),
        )
        .arg(
            Arg::new("log_format")
                .value_name("FORMAT")
                .long("log-format")
                .global(true)
                .env("DSDIST_LOG_FORMAT")
                .value_parser(PossibleValuesParser::new([
                    "auto",
                    "pretty",
                    "simplified",
                    "json",
                ]))
                .help("The format of log output."),
        )
        .arg(
            Arg::new("statsd")
                .value_name("ADDR")
                .long("statsd")
                .global(true)
                .env("DSDIST_STATSD_ADDR")
                .help("The address of a StatsD server to send metrics to."),
        )
        .arg(
            Arg::new("dataset")
                .value_name("PATH")
                .long("dataset")
                .global(true)
                .env("DSDIST_DATASET")
                .help("The path to a JSON dataset of projects and events."),
        )
        .subcommand(
            Command::new("report")
                .about("Print the sample rate report of a project")
                .after_help(
                    "This samples root transactions of the project at random and prints \
                     statistics about the client sample rates recorded on them as JSON.  \
                     With distributed traces enabled, the transactions of the sampled \
                     traces are also counted per project.  Organizations whose traces \
                     span too many projects are rejected.",
                )
                .arg(
                    Arg::new("project")
                        .value_name("PROJECT_ID")
                        .long("project")
                        .short('p')
                        .required(true)
                        .value_parser(value_parser!(u64))
                        .help("The project to sample root transactions from."),
                )
                .arg(
                    Arg::new("query")
                        .value_name("QUERY")
                        .long("query")
                        .short('q')
                        .default_value("")
                        .help("An additional search query for root transactions."),
                )
                .arg(
                    Arg::new("sample_size")
                        .value_name("N")
                        .long("sample-size")
                        .short('n')
                        .value_parser(value_parser!(usize))
                        .help("The number of root transactions to sample, at most 1000."),
                )
                .arg(
                    Arg::new("distributed_trace")
                        .value_name("BOOL")
                        .long("distributed-trace")
                        .value_parser(BoolishValueParser::new())
                        .help("Whether to resolve the project breakdown of sampled traces."),
                )
                .arg(
                    Arg::new("stats_period")
                        .value_name("PERIOD")
                        .long("stats-period")
                        .help("How far to look back, for example 30m or 1h. At most 24h."),
                )
                .arg(
                    Arg::new("now")
                        .value_name("TIMESTAMP")
                        .long("now")
                        .help("The end of the time window as RFC 3339. Defaults to now."),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the dsdist config")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("show")
                        .about("Show the entire config out for debugging purposes")
                        .after_help(
                            "This dumps out the entire config including the values \
                             which are not in the config file but filled in from \
                             defaults.  The default output format is YAML but \
                             a debug format can also be specified.",
                        )
                        .arg(
                            Arg::new("format")
                                .short('f')
                                .long("format")
                                .value_parser(PossibleValuesParser::new(["debug", "yaml"]))
                                .default_value("yaml")
                                .action(ArgAction::Set)
                                .help("The output format"),
                        ),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_is_valid() {
        make_app().debug_assert();
    }

    #[test]
    fn test_report_arguments() {
        let matches = make_app()
            .try_get_matches_from([
                "dsdist",
                "report",
                "--project",
                "42",
                "--distributed-trace",
                "0",
                "--sample-size",
                "250",
            ])
            .unwrap();

        let (name, report) = matches.subcommand().unwrap();
        assert_eq!(name, "report");
        assert_eq!(report.get_one::<u64>("project"), Some(&42));
        assert_eq!(report.get_one::<bool>("distributed_trace"), Some(&false));
        assert_eq!(report.get_one::<usize>("sample_size"), Some(&250));
        assert_eq!(report.get_one::<String>("query").map(String::as_str), Some(""));
    }

    #[test]
    fn test_report_requires_project() {
        assert!(make_app().try_get_matches_from(["dsdist", "report"]).is_err());
    }
}
