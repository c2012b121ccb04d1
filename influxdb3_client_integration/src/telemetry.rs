//! Tracing sources a host subscribes to
use indexmap::IndexSet;
use observability_deps::tracing::info;

#[derive(Debug, Clone, Default)]
pub struct TelemetryRegistry {
    sources: IndexSet<String>,
}

impl TelemetryRegistry {
    /// Subscribe to the named source, returns `false` if it was already subscribed
    pub fn add_source(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.sources.contains(&name) {
            return false;
        }
        info!(source = %name, "subscribed tracing source");
        self.sources.insert(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains(name)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_are_deduplicated() {
        let mut telemetry = TelemetryRegistry::default();
        assert!(telemetry.add_source("InfluxDB.Client"));
        assert!(!telemetry.add_source("InfluxDB.Client"));
        assert!(telemetry.add_source("Other"));
        assert!(telemetry.contains("InfluxDB.Client"));
        assert_eq!(
            telemetry.sources().collect::<Vec<_>>(),
            ["InfluxDB.Client", "Other"]
        );
    }
}
