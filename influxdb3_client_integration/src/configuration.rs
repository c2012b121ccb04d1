//! Hierarchical key/value configuration
//!
//! Keys are paths of segments joined by `:`, e.g., `Aspire:InfluxDB:Client:DisableTracing`, and
//! are matched case-insensitively. A [`Configuration`] is layered from several [`figment`]
//! providers with [`ConfigurationBuilder`]; a key set by a later source replaces the value from
//! an earlier one.
//!
//! Every source has its keys lowercased before it is merged, so sections bind to
//! [`DeserializeOwned`] types whose fields are named in lowercase.
use std::path::Path;

use figment::{
    Figment, Metadata, Profile, Provider,
    providers::{Env, Format, Json, Serialized},
    value::{Dict, Map as ProfileMap, Value as FigmentValue},
};
use observability_deps::tracing::debug;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Separates segments of a configuration key
pub const KEY_DELIMITER: &str = ":";

/// Stands in for [`KEY_DELIMITER`] in environment variable names
pub const ENV_KEY_DELIMITER: &str = "__";

/// Section holding named connection strings
pub const CONNECTION_STRINGS_SECTION: &str = "ConnectionStrings";

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("failed to load configuration: {0}")]
    Load(#[source] Box<figment::Error>),

    #[error("configuration file {path} does not exist")]
    MissingFile { path: String },

    #[error("failed to bind configuration section '{section}': {source}")]
    Bind {
        section: String,
        #[source]
        source: Box<figment::Error>,
    },
}

pub type Result<T, E = ConfigurationError> = std::result::Result<T, E>;

#[derive(Debug, Clone)]
pub struct Configuration {
    figment: Figment,
    /// Merged values of every source, keys lowercased
    values: Map<String, Value>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            figment: Figment::new(),
            values: Map::new(),
        }
    }
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    fn find(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split(KEY_DELIMITER).map(str::to_ascii_lowercase);
        let mut value = self.values.get(&segments.next()?)?;
        for segment in segments {
            value = match value {
                Value::Object(map) => map.get(&segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(value)
    }

    /// The value at `key` rendered as a string; sections have no value
    pub fn get(&self, key: &str) -> Option<String> {
        match self.find(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => Some(String::new()),
            Value::Object(_) | Value::Array(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Number of top-level keys
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The connection string stored under `ConnectionStrings:<name>`, if any
    pub fn connection_string(&self, name: &str) -> Option<String> {
        self.get(&format!("{CONNECTION_STRINGS_SECTION}{KEY_DELIMITER}{name}"))
    }

    /// Whether `path` has a value or any value below it
    pub fn exists(&self, path: &str) -> bool {
        self.find(path).is_some()
    }

    /// The configuration below `path`, with keys relative to it
    pub fn section(&self, path: &str) -> Self {
        let values = match self.find(path) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        Self {
            figment: self.figment.focus(&figment_key(path)),
            values,
        }
    }

    /// Bind the section at `path` to `T`
    ///
    /// An absent section yields `T::default()`. Values that are present but cannot be converted
    /// to the target field type are an error.
    pub fn bind<T: DeserializeOwned + Default>(&self, path: &str) -> Result<T> {
        if !self.exists(path) {
            debug!(section = path, "configuration section absent, using defaults");
            return Ok(T::default());
        }
        self.figment
            .extract_inner(&figment_key(path))
            .map_err(|source| ConfigurationError::Bind {
                section: path.to_string(),
                source: Box::new(source),
            })
    }
}

/// `A:B:C` as the lowercased dotted key figment nests values under
fn figment_key(path: &str) -> String {
    path.split(KEY_DELIMITER)
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join(".")
}

/// Lowercases every key a provider emits so lookups ignore case across sources
#[derive(Debug)]
struct Lowercase<P>(P);

impl<P: Provider> Provider for Lowercase<P> {
    fn metadata(&self) -> Metadata {
        self.0.metadata()
    }

    fn data(&self) -> Result<ProfileMap<Profile, Dict>, figment::Error> {
        Ok(self
            .0
            .data()?
            .into_iter()
            .map(|(profile, dict)| (profile, lowercase_dict(dict)))
            .collect())
    }

    fn profile(&self) -> Option<Profile> {
        self.0.profile()
    }
}

fn lowercase_dict(dict: Dict) -> Dict {
    dict.into_iter()
        .map(|(key, value)| (key.to_ascii_lowercase(), lowercase_value(value)))
        .collect()
}

fn lowercase_value(value: FigmentValue) -> FigmentValue {
    match value {
        FigmentValue::Dict(tag, dict) => FigmentValue::Dict(tag, lowercase_dict(dict)),
        FigmentValue::Array(tag, items) => {
            FigmentValue::Array(tag, items.into_iter().map(lowercase_value).collect())
        }
        other => other,
    }
}

/// Assembles a [`Configuration`] from ordered sources
#[derive(Debug)]
pub struct ConfigurationBuilder {
    figment: Figment,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self {
            figment: Figment::new(),
        }
    }
}

impl ConfigurationBuilder {
    fn merge(mut self, provider: impl Provider) -> Self {
        self.figment = self.figment.merge(Lowercase(provider));
        self
    }

    /// Add key/value pairs, e.g., defaults or values from a test
    pub fn add_in_memory<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in pairs {
            self = self.merge(Serialized::default(&figment_key(key.as_ref()), value.into()));
        }
        self
    }

    /// Add a JSON document; nested objects become `:`-joined keys and array elements are keyed
    /// by their index
    pub fn add_json_str(self, json: &str) -> Self {
        self.merge(Json::string(json))
    }

    /// Add a JSON file; a missing file is skipped when `optional` is set
    pub fn add_json_file(self, path: impl AsRef<Path>, optional: bool) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            debug!(path = %path.display(), "loading configuration file");
            Ok(self.merge(Json::file(path)))
        } else if optional {
            debug!(path = %path.display(), "optional configuration file not found");
            Ok(self)
        } else {
            Err(ConfigurationError::MissingFile {
                path: path.display().to_string(),
            })
        }
    }

    /// Add variables from the process environment, where `__` separates key segments
    ///
    /// With a `prefix`, only names starting with it are taken and the prefix is removed.
    pub fn add_env_vars(self, prefix: Option<&str>) -> Self {
        let env = match prefix {
            Some(prefix) => Env::prefixed(prefix),
            None => Env::raw(),
        };
        self.merge(env.split(ENV_KEY_DELIMITER))
    }

    /// Merge every source; malformed documents are reported here
    pub fn build(self) -> Result<Configuration> {
        let values = self
            .figment
            .extract::<Map<String, Value>>()
            .map_err(|e| ConfigurationError::Load(Box::new(e)))?;
        Ok(Configuration {
            figment: self.figment,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    use super::*;

    #[test]
    fn keys_are_case_insensitive_and_later_sources_win() {
        let config = Configuration::builder()
            .add_in_memory([("Section:Key", "first")])
            .add_in_memory([("SECTION:key", "second")])
            .build()
            .unwrap();
        assert_eq!(config.get("section:KEY").as_deref(), Some("second"));
        assert_eq!(config.len(), 1);
    }

    #[test]
    fn json_documents_are_nested_by_key() {
        let config = Configuration::builder()
            .add_json_str(
                r#"{
                    "ConnectionStrings": { "influx": "http://localhost:8086?token=t" },
                    "Aspire": { "InfluxDB": { "Client": {
                        "DisableTracing": true,
                        "HealthCheckTimeout": 500,
                        "Tags": ["a", "b"]
                    } } }
                }"#,
            )
            .build()
            .unwrap();
        assert_eq!(
            config.connection_string("INFLUX").as_deref(),
            Some("http://localhost:8086?token=t")
        );
        assert_eq!(
            config.get("Aspire:InfluxDB:Client:DisableTracing").as_deref(),
            Some("true")
        );
        assert_eq!(
            config.get("Aspire:InfluxDB:Client:HealthCheckTimeout").as_deref(),
            Some("500")
        );
        assert_eq!(config.get("Aspire:InfluxDB:Client:Tags:1").as_deref(), Some("b"));
        assert_eq!(config.get("Aspire:InfluxDB"), None);
    }

    #[test]
    fn json_must_be_an_object() {
        let err = Configuration::builder()
            .add_json_str("[1, 2]")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Load(_)), "{err}");
    }

    #[test]
    fn json_files() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "appsettings.json",
                r#"{ "ConnectionStrings": { "influx": "http://file:8086?token=f" } }"#,
            )
            .unwrap();

            let config = Configuration::builder()
                .add_json_file("appsettings.json", false)
                .unwrap()
                .add_json_file("appsettings.Development.json", true)
                .unwrap()
                .build()
                .unwrap();
            assert_eq!(
                config.connection_string("influx").as_deref(),
                Some("http://file:8086?token=f")
            );

            let err = Configuration::builder()
                .add_json_file("missing.json", false)
                .unwrap_err();
            assert!(matches!(err, ConfigurationError::MissingFile { .. }));
            Ok(())
        });
    }

    #[test]
    fn env_vars_use_double_underscore_and_override_files() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "appsettings.json",
                r#"{ "ConnectionStrings": { "influx": "http://file:8086?token=f" }, "Plain": "file" }"#,
            )
            .unwrap();
            jail.set_env("APP_ConnectionStrings__influx", "http://env:1?token=x");
            jail.set_env("OTHER_Key", "ignored");

            let config = Configuration::builder()
                .add_json_file("appsettings.json", true)
                .unwrap()
                .add_env_vars(Some("APP_"))
                .build()
                .unwrap();
            assert_eq!(
                config.connection_string("influx").as_deref(),
                Some("http://env:1?token=x")
            );
            assert_eq!(config.get("Plain").as_deref(), Some("file"));
            assert_eq!(config.get("OTHER_Key"), None);
            assert_eq!(config.get("Key"), None);
            Ok(())
        });
    }

    #[test]
    fn sections() {
        let config = Configuration::builder()
            .add_in_memory([
                ("A:B:C", "1"),
                ("A:B:D", "2"),
                ("A:BX", "3"),
                ("Z", "4"),
            ])
            .build()
            .unwrap();
        assert!(config.exists("a:b"));
        assert!(config.exists("z"));
        assert!(!config.exists("a:c"));

        let section = config.section("A:B");
        assert_eq!(section.get("C").as_deref(), Some("1"));
        assert_eq!(section.get("D").as_deref(), Some("2"));
        assert_eq!(section.len(), 2);
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Example {
        name: Option<String>,
        nested: Nested,
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Nested {
        value: Option<String>,
    }

    #[test]
    fn bind_section() {
        let config = Configuration::builder()
            .add_in_memory([("Root:Name", "n"), ("Root:Nested:Value", "v")])
            .build()
            .unwrap();
        let expected = Example {
            name: Some("n".into()),
            nested: Nested {
                value: Some("v".into()),
            },
        };
        assert_eq!(config.bind::<Example>("root").unwrap(), expected);
        assert_eq!(config.section("ROOT").bind::<Nested>("nested").unwrap(), expected.nested);
        assert_eq!(config.bind::<Example>("missing").unwrap(), Example::default());
    }

    #[test]
    fn bind_reports_malformed_values() {
        #[derive(Debug, Default, Deserialize)]
        #[serde(default)]
        struct Typed {
            #[allow(dead_code)]
            nested: Nested,
        }
        let config = Configuration::builder()
            .add_in_memory([("Root:Nested", "not-an-object")])
            .build()
            .unwrap();
        let err = config.bind::<Typed>("Root").unwrap_err();
        assert!(
            matches!(err, ConfigurationError::Bind { ref section, .. } if section == "Root"),
            "{err}"
        );
    }
}
