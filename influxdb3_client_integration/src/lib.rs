//! Register an InfluxDB client on an application host
//!
//! [`InfluxDbClientExt`] adds an [`influxdb3_client::Client`] to a [`HostApplicationBuilder`]: it
//! resolves the connection string from configuration, registers the client in the
//! [`ServiceRegistry`] on top of a managed transport, and adds a tracing source and a health
//! check unless those are disabled.
//!
//! # Example
//! ```
//! use influxdb3_client::Client;
//! use influxdb3_client_integration::{Configuration, HostApplicationBuilder, InfluxDbClientExt};
//!
//! let configuration = Configuration::builder()
//!     .add_in_memory([("ConnectionStrings:influx", "http://localhost:8086?token=my-token")])
//!     .build()?;
//! let mut builder = HostApplicationBuilder::new(configuration);
//! builder.add_influxdb_client("influx", |settings| settings.health_check_timeout = Some(500))?;
//!
//! let host = builder.build();
//! let client = host.services().get::<Client>()?;
//! assert_eq!(client.base_url().as_str(), "http://localhost:8086/");
//! # Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
//! ```
pub mod configuration;
pub mod health;
pub mod host;
pub mod http;
pub mod registrar;
pub mod services;
pub mod settings;
pub mod telemetry;

pub use configuration::{Configuration, ConfigurationBuilder, ConfigurationError};
pub use health::{
    HealthCheck, HealthCheckError, HealthCheckRegistration, HealthCheckRegistry,
    HealthCheckResult, HealthReport, HealthReportEntry, InfluxDbHealthCheck,
};
pub use host::{Host, HostApplicationBuilder};
pub use http::{
    DefaultHttpClientFactory, HttpClientError, HttpClientFactory, HttpClientOptions,
    HttpClientRegistry,
};
pub use registrar::{
    ACTIVITY_SOURCE_NAME, DEFAULT_CONFIG_SECTION_NAME, HEALTH_CHECK_NAME, InfluxDbClientExt,
    register_influxdb_client,
};
pub use services::{ServiceError, ServiceRegistry};
pub use settings::InfluxDbClientSettings;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    Argument(&'static str),

    #[error(
        "no connection string was found for '{connection_name}'; set '{connection_strings_key}' \
        or the 'ConnectionString' key of the '{section}' configuration section"
    )]
    MissingConnectionString {
        connection_name: String,
        connection_strings_key: String,
        section: String,
    },

    #[error("invalid connection string for '{connection_name}': {source}")]
    InvalidConnectionString {
        connection_name: String,
        #[source]
        source: influxdb3_client::Error,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    HealthCheck(#[from] HealthCheckError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
