//! The host being assembled at startup and the host it builds into
use std::sync::Arc;

use observability_deps::tracing::{debug, info};

use crate::{
    configuration::Configuration,
    health::{HealthCheckRegistry, HealthReport},
    http::{DefaultHttpClientFactory, HttpClientFactory, HttpClientRegistry},
    services::ServiceRegistry,
    telemetry::TelemetryRegistry,
};

/// Configuration and registries that integrations add themselves to
///
/// Registration functions take the builder explicitly; nothing is registered through global
/// state.
#[derive(Debug, Default)]
pub struct HostApplicationBuilder {
    configuration: Configuration,
    services: ServiceRegistry,
    http_clients: HttpClientRegistry,
    health_checks: HealthCheckRegistry,
    telemetry: TelemetryRegistry,
}

impl HostApplicationBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            ..Default::default()
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn configuration_mut(&mut self) -> &mut Configuration {
        &mut self.configuration
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn http_clients(&self) -> &HttpClientRegistry {
        &self.http_clients
    }

    pub fn http_clients_mut(&mut self) -> &mut HttpClientRegistry {
        &mut self.http_clients
    }

    pub fn health_checks(&self) -> &HealthCheckRegistry {
        &self.health_checks
    }

    pub fn health_checks_mut(&mut self) -> &mut HealthCheckRegistry {
        &mut self.health_checks
    }

    pub fn telemetry(&self) -> &TelemetryRegistry {
        &self.telemetry
    }

    pub fn telemetry_mut(&mut self) -> &mut TelemetryRegistry {
        &mut self.telemetry
    }

    /// Finish registration
    ///
    /// A [`DefaultHttpClientFactory`] over the recorded transports is registered unless a
    /// [`HttpClientFactory`] has been registered already.
    pub fn build(self) -> Host {
        let Self {
            configuration,
            services,
            http_clients,
            health_checks,
            telemetry,
        } = self;

        if !services.contains::<dyn HttpClientFactory>() {
            debug!("registering default HTTP client factory");
            services.add_instance::<dyn HttpClientFactory>(Arc::new(
                DefaultHttpClientFactory::new(http_clients),
            ));
        }
        info!(
            health_checks = health_checks.len(),
            tracing_sources = telemetry.sources().count(),
            "host built"
        );

        Host {
            configuration,
            services,
            health_checks,
            telemetry,
        }
    }
}

#[derive(Debug)]
pub struct Host {
    configuration: Configuration,
    services: ServiceRegistry,
    health_checks: HealthCheckRegistry,
    telemetry: TelemetryRegistry,
}

impl Host {
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn health_checks(&self) -> &HealthCheckRegistry {
        &self.health_checks
    }

    pub fn telemetry(&self) -> &TelemetryRegistry {
        &self.telemetry
    }

    pub async fn check_health(&self) -> HealthReport {
        self.health_checks.check_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpClientError;

    #[derive(Debug)]
    struct Custom;

    impl HttpClientFactory for Custom {
        fn create_client(&self, _name: &str) -> Result<reqwest::Client, HttpClientError> {
            Ok(reqwest::Client::new())
        }
    }

    #[test]
    fn build_registers_a_client_factory() {
        let host = HostApplicationBuilder::default().build();
        let factory = host.services().get::<dyn HttpClientFactory>().unwrap();
        factory.create_client("any").unwrap();
    }

    #[test]
    fn build_keeps_a_registered_client_factory() {
        let builder = HostApplicationBuilder::default();
        let custom: Arc<dyn HttpClientFactory> = Arc::new(Custom);
        builder.services().add_instance(Arc::clone(&custom));
        let host = builder.build();
        let factory = host.services().get::<dyn HttpClientFactory>().unwrap();
        assert!(Arc::ptr_eq(&factory, &custom));
    }
}
