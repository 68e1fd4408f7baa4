use anyhow::Result;
use dsdist_config::Config;
use dsdist_statsd::MetricsConfig;

/// Initialize the logging system.
pub fn init_logging(config: &Config) {
    dsdist_log::init(config.logging());
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    dsdist_log::debug!("launching dsdist {}", dsdist_log::RELEASE);
    dsdist_log::debug!("  config folder: {}", config.path().display());
    dsdist_log::debug!("  log level: {}", config.logging().level);

    match config.dataset_path() {
        Some(path) => dsdist_log::debug!("  dataset: {}", path.display()),
        None => dsdist_log::debug!("  dataset: -"),
    }
}

/// Initialize the metric system.
pub fn init_metrics(config: &Config) -> Result<()> {
    let Some(host) = config.statsd_addr() else {
        return Ok(());
    };

    dsdist_statsd::init(MetricsConfig {
        prefix: config.metrics_prefix().to_owned(),
        host: host.to_owned(),
        default_tags: config.metrics_default_tags().clone(),
        sample_rate: config.metrics_sample_rate(),
    })?;

    Ok(())
}
