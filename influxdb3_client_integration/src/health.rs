//! Named health checks and their execution
use std::{
    fmt::{self, Debug, Display},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures::future::join_all;
use humantime::format_duration;
use indexmap::IndexMap;
use influxdb3_client::{Client, HealthStatus};
use observability_deps::tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum HealthCheckError {
    #[error("a health check named '{0}' is already registered")]
    Duplicate(String),
}

/// Outcome of a single health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthCheckResult {
    Healthy,
    Unhealthy(String),
}

impl HealthCheckResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl Display for HealthCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

#[async_trait]
pub trait HealthCheck: Debug + Send + Sync {
    async fn check(&self) -> HealthCheckResult;
}

#[derive(Debug, Clone)]
pub struct HealthCheckRegistration {
    pub name: String,
    /// The check is reported unhealthy if it does not complete within this duration
    pub timeout: Option<Duration>,
    pub check: Arc<dyn HealthCheck>,
}

impl HealthCheckRegistration {
    pub fn new(name: impl Into<String>, check: Arc<dyn HealthCheck>) -> Self {
        Self {
            name: name.into(),
            timeout: None,
            check,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self) -> HealthReportEntry {
        let start = Instant::now();
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.check.check())
                .await
                .unwrap_or_else(|_| {
                    HealthCheckResult::Unhealthy(format!(
                        "timed out after {}",
                        format_duration(timeout)
                    ))
                }),
            None => self.check.check().await,
        };
        let duration = start.elapsed();
        match &result {
            HealthCheckResult::Healthy => debug!(name = %self.name, ?duration, "health check passed"),
            HealthCheckResult::Unhealthy(reason) => {
                warn!(name = %self.name, ?duration, %reason, "health check failed")
            }
        }
        HealthReportEntry {
            name: self.name.clone(),
            result,
            duration,
        }
    }
}

#[derive(Debug, Default)]
pub struct HealthCheckRegistry {
    registrations: IndexMap<String, HealthCheckRegistration>,
}

impl HealthCheckRegistry {
    /// Add a check; names must be unique
    pub fn register(&mut self, registration: HealthCheckRegistration) -> Result<(), HealthCheckError> {
        if self.registrations.contains_key(&registration.name) {
            return Err(HealthCheckError::Duplicate(registration.name));
        }
        info!(name = %registration.name, timeout = ?registration.timeout, "registered health check");
        self.registrations
            .insert(registration.name.clone(), registration);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&HealthCheckRegistration> {
        self.registrations.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.registrations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Run every check concurrently, each bounded by its own timeout
    pub async fn check_all(&self) -> HealthReport {
        let entries = join_all(self.registrations.values().map(|r| r.run())).await;
        HealthReport { entries }
    }
}

#[derive(Debug, Clone)]
pub struct HealthReportEntry {
    pub name: String,
    pub result: HealthCheckResult,
    pub duration: Duration,
}

/// Results of [`HealthCheckRegistry::check_all`] in registration order
#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    entries: Vec<HealthReportEntry>,
}

impl HealthReport {
    pub fn entries(&self) -> &[HealthReportEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&HealthReportEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Healthy when every check is healthy
    pub fn is_healthy(&self) -> bool {
        self.entries.iter().all(|e| e.result.is_healthy())
    }
}

impl Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(
                f,
                "{}: {} ({})",
                entry.name,
                entry.result,
                format_duration(entry.duration)
            )?;
        }
        Ok(())
    }
}

/// Probes the `/health` API of an InfluxDB server
#[derive(Debug)]
pub struct InfluxDbHealthCheck {
    client: Client,
}

impl InfluxDbHealthCheck {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthCheck for InfluxDbHealthCheck {
    async fn check(&self) -> HealthCheckResult {
        match self.client.health().await {
            Ok(health) if health.status == HealthStatus::Pass => HealthCheckResult::Healthy,
            Ok(health) => HealthCheckResult::Unhealthy(
                health
                    .message
                    .unwrap_or_else(|| format!("{} reported status fail", health.name)),
            ),
            Err(e) => HealthCheckResult::Unhealthy(e.to_string()),
        }
    }
}
