//! Settings of a registered InfluxDB client
use std::time::Duration;

use serde::{Deserialize, Deserializer, de::Error as _};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

/// Settings read from configuration when registering a client
///
/// Bound from a [`Configuration`][crate::Configuration] section, where the recognized keys are
/// `ConnectionString`, `DisableHealthChecks`, `DisableTracing`, and `HealthCheckTimeout`
/// (milliseconds), matched case-insensitively.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InfluxDbClientSettings {
    /// Connection string of the form `http://<host>:<port>?token=<token>`
    #[serde(rename = "connectionstring")]
    pub connection_string: Option<String>,

    #[serde(rename = "disablehealthchecks", deserialize_with = "flag")]
    pub disable_health_checks: bool,

    #[serde(rename = "disabletracing", deserialize_with = "flag")]
    pub disable_tracing: bool,

    /// Health check timeout in milliseconds
    #[serde(rename = "healthchecktimeout")]
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub health_check_timeout: Option<u64>,
}

impl InfluxDbClientSettings {
    pub fn health_check_timeout(&self) -> Option<Duration> {
        self.health_check_timeout.map(Duration::from_millis)
    }
}

/// Accepts a boolean or a case-insensitive `true`/`false` string
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Str(String),
    }
    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Str(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
        Flag::Str(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
        Flag::Str(s) => Err(D::Error::custom(format!(
            "invalid boolean '{s}', expected true or false"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::Configuration;

    #[test]
    fn bind_from_string_values() {
        let config = Configuration::builder()
            .add_in_memory([
                ("Aspire:InfluxDB:Client:ConnectionString", "http://h:1?token=t"),
                ("Aspire:InfluxDB:Client:DisableHealthChecks", "true"),
                ("aspire:influxdb:client:disabletracing", "False"),
                ("Aspire:InfluxDB:Client:HealthCheckTimeout", "1500"),
            ])
            .build()
            .unwrap();
        let settings: InfluxDbClientSettings = config.bind("Aspire:InfluxDB:Client").unwrap();
        assert_eq!(
            settings,
            InfluxDbClientSettings {
                connection_string: Some("http://h:1?token=t".to_string()),
                disable_health_checks: true,
                disable_tracing: false,
                health_check_timeout: Some(1500),
            }
        );
        assert_eq!(
            settings.health_check_timeout(),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn bind_from_json_values() {
        let config = Configuration::builder()
            .add_json_str(r#"{"Settings": {"DisableTracing": true, "HealthCheckTimeout": 20}}"#)
            .build()
            .unwrap();
        let settings: InfluxDbClientSettings = config.bind("Settings").unwrap();
        assert!(settings.disable_tracing);
        assert!(!settings.disable_health_checks);
        assert_eq!(settings.health_check_timeout(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn malformed_values_are_rejected() {
        for (key, value) in [
            ("Settings:HealthCheckTimeout", "soon"),
            ("Settings:DisableTracing", "yes"),
        ] {
            let config = Configuration::builder()
                .add_in_memory([(key, value)])
                .build()
                .unwrap();
            assert!(
                config.bind::<InfluxDbClientSettings>("Settings").is_err(),
                "{key}={value} should not bind"
            );
        }
    }
}
