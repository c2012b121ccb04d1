//! Declare an InfluxDB container and print the deployment manifest
use std::path::PathBuf;

use anyhow::Context;
use influxdb3_hosting::{AppModel, AppModelBuilder, InfluxDbOptions};
use observability_deps::tracing::info;
use secrecy::{ExposeSecret, Secret};
use trogging::cli::LoggingConfig;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    /// Name of the application, used as the prefix of generated volume names
    #[clap(
        long = "app-name",
        env = "INFLUXDB3_APPHOST_APP_NAME",
        default_value = "apphost"
    )]
    pub(crate) app_name: String,

    /// Directory that relative bind mount sources are resolved against
    #[clap(
        long = "app-host-dir",
        env = "INFLUXDB3_APPHOST_DIR",
        default_value = "."
    )]
    pub(crate) app_host_dir: PathBuf,

    /// Name of the InfluxDB resource
    #[clap(
        short = 'n',
        long = "name",
        env = "INFLUXDB3_APPHOST_RESOURCE_NAME",
        default_value = "influxdb"
    )]
    pub(crate) name: String,

    /// Initial admin user, `admin` if not given
    #[clap(long = "username", env = "INFLUXDB3_APPHOST_USERNAME")]
    pub(crate) username: Option<String>,

    /// Initial admin password, generated if not given
    #[clap(long = "password", env = "INFLUXDB3_APPHOST_PASSWORD")]
    pub(crate) password: Option<Secret<String>>,

    /// Initial organization, `influxdata` if not given
    #[clap(long = "org", env = "INFLUXDB3_APPHOST_ORG")]
    pub(crate) organization: Option<String>,

    /// Initial bucket, `default` if not given
    #[clap(long = "bucket", env = "INFLUXDB3_APPHOST_BUCKET")]
    pub(crate) bucket: Option<String>,

    /// Admin token, generated if not given
    #[clap(long = "token", env = "INFLUXDB3_APPHOST_TOKEN")]
    pub(crate) token: Option<Secret<String>>,

    /// Host port the HTTP endpoint is published on, allocated by the runtime if not given
    #[clap(long = "port", env = "INFLUXDB3_APPHOST_PORT")]
    pub(crate) port: Option<u16>,

    /// Tag of the `influxdb` image
    #[clap(long = "image-tag")]
    pub(crate) image_tag: Option<String>,

    /// Persist data in a named volume
    #[clap(long = "data-volume", default_value_t = false)]
    pub(crate) data_volume: bool,

    /// Name of the data volume, derived from the app and resource names if not given
    #[clap(long = "data-volume-name", requires = "data_volume")]
    pub(crate) data_volume_name: Option<String>,

    /// Persist data in a directory on the host
    #[clap(long = "data-bind-mount", conflicts_with = "data_volume")]
    pub(crate) data_bind_mount: Option<PathBuf>,

    /// Keep configuration in a named volume
    #[clap(long = "config-volume", default_value_t = false)]
    pub(crate) config_volume: bool,

    /// Mount configuration from a directory on the host
    #[clap(long = "config-bind-mount", conflicts_with = "config_volume")]
    pub(crate) config_bind_mount: Option<PathBuf>,

    /// Mount the configuration read-only
    #[clap(long = "config-read-only", default_value_t = false)]
    pub(crate) config_read_only: bool,

    /// Write the manifest to this file instead of stdout
    #[clap(short = 'o', long = "output")]
    pub(crate) output: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,
}

pub(crate) fn build_model(config: &Config) -> Result<AppModel, influxdb3_hosting::Error> {
    let name = config.name.as_str();
    let mut builder =
        AppModelBuilder::new(config.app_name.as_str()).with_app_host_directory(&config.app_host_dir);

    let mut options = InfluxDbOptions {
        port: config.port,
        ..Default::default()
    };
    if let Some(username) = &config.username {
        options.username = Some(builder.add_parameter(format!("{name}-username"), username, false)?);
    }
    if let Some(password) = &config.password {
        options.password = Some(builder.add_parameter(
            format!("{name}-password"),
            password.expose_secret(),
            true,
        )?);
    }
    if let Some(organization) = &config.organization {
        options.organization =
            Some(builder.add_parameter(format!("{name}-org"), organization, false)?);
    }
    if let Some(bucket) = &config.bucket {
        options.bucket = Some(builder.add_parameter(format!("{name}-bucket"), bucket, false)?);
    }
    if let Some(token) = &config.token {
        options.token = Some(builder.add_parameter(
            format!("{name}-token"),
            token.expose_secret(),
            true,
        )?);
    }

    let mut resource = builder.add_influxdb(name, options)?;
    if let Some(tag) = &config.image_tag {
        resource = resource.with_image_tag(tag);
    }
    if config.data_volume {
        resource = resource.with_data_volume(config.data_volume_name.as_deref(), false);
    }
    if let Some(source) = &config.data_bind_mount {
        resource = resource.with_data_bind_mount(source, false);
    }
    if config.config_volume {
        resource = resource.with_config_volume(None, config.config_read_only);
    }
    if let Some(source) = &config.config_bind_mount {
        resource = resource.with_config_bind_mount(source, config.config_read_only);
    }

    Ok(builder.build())
}

pub(crate) fn command(config: Config) -> anyhow::Result<()> {
    let model = build_model(&config).context("declaring the InfluxDB resource")?;
    let manifest = serde_json::to_string_pretty(&model.manifest())?;
    match &config.output {
        Some(path) => {
            std::fs::write(path, manifest)
                .with_context(|| format!("writing manifest to {}", path.display()))?;
            info!(path = %path.display(), "wrote manifest");
        }
        None => println!("{manifest}"),
    }
    Ok(())
}
