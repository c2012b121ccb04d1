//! Named, managed HTTP transports
//!
//! Integrations record the transports they need on the [`HttpClientRegistry`] while the host is
//! being assembled; the [`HttpClientFactory`] registered in the service registry hands out the
//! actual [`reqwest::Client`] for a name.
use std::{collections::HashMap, fmt::Debug, time::Duration};

use indexmap::IndexMap;
use observability_deps::tracing::debug;
use parking_lot::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    #[error("failed to build HTTP client '{name}': {source}")]
    Build {
        name: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Options of a named transport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpClientOptions {
    /// Overall per-request timeout
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

/// Named transports requested by integrations
#[derive(Debug, Clone, Default)]
pub struct HttpClientRegistry {
    clients: IndexMap<String, HttpClientOptions>,
}

impl HttpClientRegistry {
    /// Record a named transport; a name that is already present keeps its first options
    pub fn add(&mut self, name: impl Into<String>, options: HttpClientOptions) -> bool {
        let name = name.into();
        if self.clients.contains_key(&name) {
            debug!(%name, "HTTP client already registered");
            return false;
        }
        debug!(%name, ?options, "registered HTTP client");
        self.clients.insert(name, options);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    pub fn options(&self, name: &str) -> Option<&HttpClientOptions> {
        self.clients.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }
}

/// Hands out the managed transport for a name
pub trait HttpClientFactory: Debug + Send + Sync {
    fn create_client(&self, name: &str) -> Result<reqwest::Client, HttpClientError>;
}

/// Builds each named client once from its recorded options and reuses it afterwards
///
/// Names that were never recorded get a client with default options.
#[derive(Debug, Default)]
pub struct DefaultHttpClientFactory {
    registry: HttpClientRegistry,
    clients: Mutex<HashMap<String, reqwest::Client>>,
}

impl DefaultHttpClientFactory {
    pub fn new(registry: HttpClientRegistry) -> Self {
        Self {
            registry,
            clients: Default::default(),
        }
    }
}

impl HttpClientFactory for DefaultHttpClientFactory {
    fn create_client(&self, name: &str) -> Result<reqwest::Client, HttpClientError> {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(name) {
            return Ok(client.clone());
        }

        let options = self.registry.options(name).cloned().unwrap_or_default();
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = options.user_agent {
            builder = builder.user_agent(user_agent);
        }
        let client = builder.build().map_err(|source| HttpClientError::Build {
            name: name.to_string(),
            source,
        })?;
        debug!(%name, "built HTTP client");
        clients.insert(name.to_string(), client.clone());
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registration_wins() {
        let mut registry = HttpClientRegistry::default();
        assert!(registry.add(
            "influx",
            HttpClientOptions {
                timeout: Some(Duration::from_secs(5)),
                ..Default::default()
            }
        ));
        assert!(!registry.add("influx", HttpClientOptions::default()));
        assert_eq!(
            registry.options("influx").and_then(|o| o.timeout),
            Some(Duration::from_secs(5))
        );
        assert_eq!(registry.names().collect::<Vec<_>>(), ["influx"]);
    }

    #[test]
    fn factory_builds_registered_and_unregistered_clients() {
        let mut registry = HttpClientRegistry::default();
        registry.add(
            "influx",
            HttpClientOptions {
                user_agent: Some("apphost".to_string()),
                ..Default::default()
            },
        );
        let factory = DefaultHttpClientFactory::new(registry);
        factory.create_client("influx").unwrap();
        factory.create_client("influx").unwrap();
        factory.create_client("other").unwrap();
        assert_eq!(factory.clients.lock().len(), 2);
    }
}
