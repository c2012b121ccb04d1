//! Register an InfluxDB client from configuration and run its health check
use std::{path::PathBuf, time::Duration};

use anyhow::{Context, bail};
use influxdb3_client_integration::{
    Configuration, HostApplicationBuilder, InfluxDbClientExt, InfluxDbClientSettings,
};
use observability_deps::tracing::{info, warn};
use secrecy::{ExposeSecret, Secret};
use trogging::cli::LoggingConfig;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    /// JSON configuration file, skipped if it does not exist
    #[clap(
        short = 'c',
        long = "config-file",
        env = "INFLUXDB3_APPHOST_CONFIG_FILE",
        default_value = "appsettings.json"
    )]
    pub(crate) config_file: PathBuf,

    /// Only read environment variables starting with this prefix, which is removed from the key
    #[clap(long = "env-prefix", env = "INFLUXDB3_APPHOST_ENV_PREFIX")]
    pub(crate) env_prefix: Option<String>,

    /// Name of the connection, looked up as `ConnectionStrings:<name>`
    #[clap(
        short = 'n',
        long = "connection-name",
        env = "INFLUXDB3_APPHOST_CONNECTION_NAME",
        default_value = "influxdb"
    )]
    pub(crate) connection_name: String,

    /// Register a client keyed by the connection name
    #[clap(long = "keyed", default_value_t = false)]
    pub(crate) keyed: bool,

    /// Connection string, overriding any found in configuration
    #[clap(long = "connection-string", env = "INFLUXDB3_APPHOST_CONNECTION_STRING")]
    pub(crate) connection_string: Option<Secret<String>>,

    /// Health check timeout, e.g., `500ms` or `5s`, overriding configuration
    #[clap(long = "timeout", value_parser = humantime::parse_duration)]
    pub(crate) timeout: Option<Duration>,

    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,
}

impl Config {
    fn configuration(&self) -> anyhow::Result<Configuration> {
        Ok(Configuration::builder()
            .add_json_file(&self.config_file, true)?
            .add_env_vars(self.env_prefix.as_deref())
            .build()?)
    }

    fn apply_overrides(&self, settings: &mut InfluxDbClientSettings) {
        if let Some(connection_string) = &self.connection_string {
            settings.connection_string = Some(connection_string.expose_secret().clone());
        }
        if let Some(timeout) = self.timeout {
            settings.health_check_timeout =
                Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        }
    }
}

pub(crate) async fn command(config: Config) -> anyhow::Result<()> {
    let mut builder = HostApplicationBuilder::new(config.configuration()?);
    let configure = |settings: &mut InfluxDbClientSettings| config.apply_overrides(settings);
    let settings = if config.keyed {
        builder.add_keyed_influxdb_client(&config.connection_name, configure)
    } else {
        builder.add_influxdb_client(&config.connection_name, configure)
    }
    .with_context(|| format!("registering InfluxDB client '{}'", config.connection_name))?;

    let host = builder.build();
    if settings.disable_health_checks || host.health_checks().is_empty() {
        warn!("health checks are disabled, nothing to check");
        return Ok(());
    }

    let report = host.check_health().await;
    print!("{report}");
    if !report.is_healthy() {
        bail!("InfluxDB at connection '{}' is unhealthy", config.connection_name);
    }
    info!(connection_name = %config.connection_name, "InfluxDB is healthy");
    Ok(())
}
