//! Registration of an InfluxDB [`Client`] on a [`HostApplicationBuilder`]
//!
//! Settings are resolved in increasing order of precedence from:
//!
//! 1. the configuration section, `Aspire:InfluxDB:Client` or `Aspire:InfluxDB:Client:<name>` for
//!    keyed clients
//! 2. the named connection string `ConnectionStrings:<name>`
//! 3. the `configure` callback given to the registration
use std::sync::Arc;

use influxdb3_client::{Client, ConnectionString};
use observability_deps::tracing::{debug, info};

use crate::{
    Error, Result,
    configuration::{CONNECTION_STRINGS_SECTION, KEY_DELIMITER},
    health::{HealthCheckError, HealthCheckRegistration, InfluxDbHealthCheck},
    host::HostApplicationBuilder,
    http::{HttpClientFactory, HttpClientOptions},
    services::{BoxError, ServiceRegistry},
    settings::InfluxDbClientSettings,
};

/// Configuration section the client settings are bound from
pub const DEFAULT_CONFIG_SECTION_NAME: &str = "Aspire:InfluxDB:Client";

/// Tracing source subscribed to unless tracing is disabled
pub const ACTIVITY_SOURCE_NAME: &str = "InfluxDB.Client";

/// Name of the health check, suffixed with `_<name>` for keyed clients
pub const HEALTH_CHECK_NAME: &str = "InfluxDB.Client";

/// Adds InfluxDB clients to a host
pub trait InfluxDbClientExt {
    /// Register a [`Client`] as a plain singleton, replacing one registered before
    fn add_influxdb_client<F>(
        &mut self,
        connection_name: &str,
        configure: F,
    ) -> Result<InfluxDbClientSettings>
    where
        F: FnOnce(&mut InfluxDbClientSettings);

    /// Register a [`Client`] as a singleton keyed by `connection_name`
    fn add_keyed_influxdb_client<F>(
        &mut self,
        connection_name: &str,
        configure: F,
    ) -> Result<InfluxDbClientSettings>
    where
        F: FnOnce(&mut InfluxDbClientSettings);
}

impl InfluxDbClientExt for HostApplicationBuilder {
    fn add_influxdb_client<F>(
        &mut self,
        connection_name: &str,
        configure: F,
    ) -> Result<InfluxDbClientSettings>
    where
        F: FnOnce(&mut InfluxDbClientSettings),
    {
        register_influxdb_client(
            self,
            connection_name,
            None,
            DEFAULT_CONFIG_SECTION_NAME,
            configure,
        )
    }

    fn add_keyed_influxdb_client<F>(
        &mut self,
        connection_name: &str,
        configure: F,
    ) -> Result<InfluxDbClientSettings>
    where
        F: FnOnce(&mut InfluxDbClientSettings),
    {
        let section = format!("{DEFAULT_CONFIG_SECTION_NAME}{KEY_DELIMITER}{connection_name}");
        register_influxdb_client(
            self,
            connection_name,
            Some(connection_name),
            &section,
            configure,
        )
    }
}

/// Resolve settings for `connection_name` and register the client with its transport, tracing
/// source and health check
///
/// With a `service_key` the client is a keyed singleton addressed by `connection_name`, and the
/// health check is named `InfluxDB.Client_<service_key>`. A failed registration leaves the
/// builder unchanged. Returns the resolved settings.
pub fn register_influxdb_client<F>(
    builder: &mut HostApplicationBuilder,
    connection_name: &str,
    service_key: Option<&str>,
    config_section_path: &str,
    configure: F,
) -> Result<InfluxDbClientSettings>
where
    F: FnOnce(&mut InfluxDbClientSettings),
{
    if connection_name.trim().is_empty() {
        return Err(Error::Argument("connection name must not be empty"));
    }
    if service_key.is_some_and(|key| key.trim().is_empty()) {
        return Err(Error::Argument("service key must not be empty"));
    }

    let mut settings: InfluxDbClientSettings =
        builder.configuration().bind(config_section_path)?;
    if let Some(connection_string) = builder.configuration().connection_string(connection_name) {
        debug!(%connection_name, "using named connection string");
        settings.connection_string = Some(connection_string);
    }
    configure(&mut settings);

    let connection_string = match settings.connection_string.as_deref() {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => {
            return Err(Error::MissingConnectionString {
                connection_name: connection_name.to_string(),
                connection_strings_key: format!(
                    "{CONNECTION_STRINGS_SECTION}{KEY_DELIMITER}{connection_name}"
                ),
                section: config_section_path.to_string(),
            });
        }
    };
    let parsed: ConnectionString =
        connection_string
            .parse()
            .map_err(|source| Error::InvalidConnectionString {
                connection_name: connection_name.to_string(),
                source,
            })?;

    // everything that can fail happens before the registries change
    let health_check = if settings.disable_health_checks {
        None
    } else {
        let name = match service_key {
            Some(key) => format!("{HEALTH_CHECK_NAME}_{key}"),
            None => HEALTH_CHECK_NAME.to_string(),
        };
        if builder.health_checks().get(&name).is_some() {
            return Err(HealthCheckError::Duplicate(name).into());
        }
        let client = Client::from_connection_string(&connection_string).map_err(|source| {
            Error::InvalidConnectionString {
                connection_name: connection_name.to_string(),
                source,
            }
        })?;
        Some(
            HealthCheckRegistration::new(name, Arc::new(InfluxDbHealthCheck::new(client)))
                .with_timeout(settings.health_check_timeout()),
        )
    };

    let transport = format!("influxdb-{connection_name}");
    let client_transport = transport.clone();
    let client_connection_string = connection_string.clone();
    let factory = move |services: &ServiceRegistry| -> Result<Arc<Client>, BoxError> {
        let http_client = services
            .get::<dyn HttpClientFactory>()?
            .create_client(&client_transport)?;
        let client = Client::from_connection_string(&client_connection_string)?
            .with_http_client(http_client);
        Ok(Arc::new(client))
    };
    match service_key {
        Some(_) => builder
            .services()
            .add_keyed_singleton::<Client, _>(connection_name, factory)?,
        None => builder.services().add_singleton::<Client, _>(factory),
    }

    builder
        .http_clients_mut()
        .add(transport.as_str(), HttpClientOptions::default());

    if !settings.disable_tracing {
        builder.telemetry_mut().add_source(ACTIVITY_SOURCE_NAME);
    }

    if let Some(health_check) = health_check {
        builder.health_checks_mut().register(health_check)?;
    }

    info!(
        %connection_name,
        service_key = service_key.unwrap_or_default(),
        url = %parsed.base_url(),
        tracing = !settings.disable_tracing,
        health_checks = !settings.disable_health_checks,
        "registered InfluxDB client"
    );
    Ok(settings)
}
