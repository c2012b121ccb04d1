//! Externally supplied values of a resource
use std::sync::Arc;

use rand::{Rng, distributions::Alphanumeric};
use secrecy::{ExposeSecret, Secret};

/// Length of generated secrets, see [`ParameterResource::generated`]
pub const GENERATED_SECRET_LENGTH: usize = 22;

/// A named value supplied to the application model from outside, such as a password
#[derive(Debug)]
pub struct ParameterResource {
    name: String,
    value: Secret<String>,
    secret: bool,
    generated: bool,
}

impl ParameterResource {
    /// A plain parameter, shown as-is in manifests
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Secret::new(value.into()),
            secret: false,
            generated: false,
        }
    }

    /// A parameter whose value must not be written out in clear text
    pub fn secret(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            secret: true,
            ..Self::new(name, value)
        }
    }

    /// A secret parameter with a random alphanumeric value
    pub fn generated(name: impl Into<String>) -> Self {
        let value: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_SECRET_LENGTH)
            .map(char::from)
            .collect();
        Self {
            generated: true,
            ..Self::secret(name, value)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_secret(&self) -> bool {
        self.secret
    }

    pub fn is_generated(&self) -> bool {
        self.generated
    }

    pub fn value(&self) -> &str {
        self.value.expose_secret()
    }

    /// Placeholder for this parameter in an unresolved expression, e.g., `{influx-token.value}`
    pub fn value_expression(&self) -> String {
        format!("{{{}.value}}", self.name)
    }
}

/// A parameter the caller may have supplied, falling back to a fixed literal
#[derive(Debug, Clone)]
pub enum ParameterOrDefault {
    Supplied(Arc<ParameterResource>),
    Default(&'static str),
}

impl ParameterOrDefault {
    pub fn new(supplied: Option<&Arc<ParameterResource>>, default: &'static str) -> Self {
        match supplied {
            Some(p) => Self::Supplied(Arc::clone(p)),
            None => Self::Default(default),
        }
    }

    pub fn value_expression(&self) -> String {
        match self {
            Self::Supplied(p) => p.value_expression(),
            Self::Default(literal) => (*literal).to_string(),
        }
    }

    pub fn resolve(&self) -> String {
        match self {
            Self::Supplied(p) => p.value().to_string(),
            Self::Default(literal) => (*literal).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_parameters_are_random_secrets() {
        let a = ParameterResource::generated("influx-password");
        let b = ParameterResource::generated("influx-password");
        assert!(a.is_secret());
        assert!(a.is_generated());
        assert_eq!(a.value().len(), GENERATED_SECRET_LENGTH);
        assert!(a.value().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a.value(), b.value());
    }

    #[test]
    fn secret_value_is_redacted_in_debug_output() {
        let p = ParameterResource::secret("token", "my-secret-token");
        assert!(!format!("{p:?}").contains("my-secret-token"));
        assert_eq!(p.value(), "my-secret-token");
    }

    #[test]
    fn parameter_or_default() {
        let user = Arc::new(ParameterResource::new("influx-user", "root"));

        let supplied = ParameterOrDefault::new(Some(&user), "admin");
        assert_eq!(supplied.value_expression(), "{influx-user.value}");
        assert_eq!(supplied.resolve(), "root");

        let fallback = ParameterOrDefault::new(None, "admin");
        assert_eq!(fallback.value_expression(), "admin");
        assert_eq!(fallback.resolve(), "admin");
    }
}
