use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use clap::ArgMatches;
use dsdist_config::{Config, OverridableConfig};
use dsdist_query::{MemoryBackend, ProjectId};
use dsdist_sampling::{ReportRequest, SamplingReportBuilder, StatsPeriod};

use crate::cliapp::make_app;
use crate::setup;

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(".");

    let mut config = Config::from_path(config_path)?;
    config.apply_override(extract_config_args(&matches))?;

    setup::init_logging(&config);
    setup::dump_spawn_infos(&config);
    setup::init_metrics(&config)?;

    match matches.subcommand() {
        Some(("report", matches)) => report(&config, matches),
        Some(("config", matches)) => manage_config(&config, matches),
        _ => unreachable!(),
    }
}

/// Extract config arguments from a parsed command line arguments object.
pub fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    OverridableConfig {
        log_level: matches.get_one("log_level").cloned(),
        log_format: matches.get_one("log_format").cloned(),
        statsd: matches.get_one("statsd").cloned(),
        dataset: matches.get_one("dataset").cloned(),
    }
}

/// Builds the report request from command line arguments and configured defaults.
fn extract_report_request(
    config: &Config,
    matches: &ArgMatches,
    backend: &MemoryBackend,
) -> Result<ReportRequest> {
    let project_id = ProjectId::new(
        matches
            .get_one::<u64>("project")
            .copied()
            .ok_or_else(|| anyhow!("missing project"))?,
    );

    let organization_id = backend
        .organization_of(project_id)
        .ok_or_else(|| anyhow!("project {project_id} does not exist in the dataset"))?;

    let stats_period = matches
        .get_one::<String>("stats_period")
        .map(String::as_str)
        .unwrap_or_else(|| config.default_stats_period())
        .parse::<StatsPeriod>()?;

    let end = match matches.get_one::<String>("now") {
        Some(now) => DateTime::parse_from_rfc3339(now)
            .with_context(|| format!("invalid timestamp {now:?}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    Ok(ReportRequest {
        project_id,
        organization_id,
        query: matches
            .get_one::<String>("query")
            .cloned()
            .unwrap_or_default(),
        sample_size: matches
            .get_one::<usize>("sample_size")
            .copied()
            .unwrap_or_else(|| config.default_sample_size()),
        distributed_trace: matches
            .get_one::<bool>("distributed_trace")
            .copied()
            .unwrap_or_else(|| config.default_distributed_trace()),
        stats_period,
        end,
    })
}

pub fn report(config: &Config, matches: &ArgMatches) -> Result<()> {
    let Some(dataset) = config.dataset_path() else {
        bail!("no dataset configured, pass --dataset or set dataset.path in the config");
    };

    let backend = Arc::new(MemoryBackend::from_path(dataset)?);
    let request = extract_report_request(config, matches, &backend)?;

    dsdist_log::info!(
        project = request.project_id.value(),
        organization = request.organization_id.value(),
        sample_size = request.effective_sample_size(),
        distributed_trace = request.distributed_trace,
        "building sampling report over {}",
        request.stats_period
    );

    let builder = SamplingReportBuilder::new(backend.clone(), backend);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("could not start the runtime")?;
    let report = runtime.block_on(builder.build(&request))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn manage_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", matches)) => show_config(config, matches),
        _ => unreachable!(),
    }
}

pub fn show_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.get_one::<String>("format").map(String::as_str) {
        Some("debug") => println!("{config:#?}"),
        Some("yaml") | None => println!("{}", config.to_yaml_string()?),
        Some(other) => bail!("unsupported config format {other:?}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_config_args() {
        let matches = make_app()
            .try_get_matches_from([
                "dsdist",
                "--log-level",
                "debug",
                "--dataset",
                "events.json",
                "config",
                "show",
            ])
            .unwrap();

        let overrides = extract_config_args(&matches);
        assert_eq!(overrides.log_level.as_deref(), Some("debug"));
        assert_eq!(overrides.dataset.as_deref(), Some("events.json"));
        assert_eq!(overrides.statsd, None);
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let matches = make_app()
            .try_get_matches_from(["dsdist", "report", "--project", "1", "--log-format", "json"])
            .unwrap();

        let overrides = extract_config_args(&matches);
        assert_eq!(overrides.log_format.as_deref(), Some("json"));
    }
}
