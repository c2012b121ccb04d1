//! The InfluxDB container resource
use std::sync::{Arc, OnceLock};

use crate::{
    Error, Result,
    container::{ContainerImage, ContainerMount},
    endpoint::{EndpointAnnotation, EndpointProperty, EndpointReference},
    expression::ReferenceExpression,
    parameter::{ParameterOrDefault, ParameterResource},
};

pub const INFLUXDB_REGISTRY: &str = "docker.io";
pub const INFLUXDB_IMAGE: &str = "library/influxdb";
pub const INFLUXDB_TAG: &str = "2.7";

/// Name of the primary endpoint
pub const PRIMARY_ENDPOINT_NAME: &str = "http";
pub const DEFAULT_HTTP_PORT: u16 = 8086;

pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_ORGANIZATION: &str = "influxdata";
pub const DEFAULT_BUCKET: &str = "default";

/// Container path of the data volume
pub const DATA_TARGET_PATH: &str = "/var/lib/influxdb2";
/// Container path of the configuration volume
pub const CONFIG_TARGET_PATH: &str = "/etc/influxdb2";

pub const ENV_INIT_MODE: &str = "DOCKER_INFLUXDB_INIT_MODE";
pub const ENV_INIT_USERNAME: &str = "DOCKER_INFLUXDB_INIT_USERNAME";
pub const ENV_INIT_PASSWORD: &str = "DOCKER_INFLUXDB_INIT_PASSWORD";
pub const ENV_INIT_ORG: &str = "DOCKER_INFLUXDB_INIT_ORG";
pub const ENV_INIT_BUCKET: &str = "DOCKER_INFLUXDB_INIT_BUCKET";
pub const ENV_INIT_ADMIN_TOKEN: &str = "DOCKER_INFLUXDB_INIT_ADMIN_TOKEN";

/// Parameters an [`InfluxDbResource`] is constructed from
///
/// `password` and `token` are required, the rest fall back to [`DEFAULT_USERNAME`],
/// [`DEFAULT_ORGANIZATION`] and [`DEFAULT_BUCKET`].
#[derive(Debug, Default, Clone)]
pub struct InfluxDbParameters {
    pub username: Option<Arc<ParameterResource>>,
    pub password: Option<Arc<ParameterResource>>,
    pub organization: Option<Arc<ParameterResource>>,
    pub bucket: Option<Arc<ParameterResource>>,
    pub token: Option<Arc<ParameterResource>>,
}

/// An InfluxDB 2.x container declared in an application model
#[derive(Debug)]
pub struct InfluxDbResource {
    name: Arc<str>,
    username: Option<Arc<ParameterResource>>,
    password: Arc<ParameterResource>,
    organization: Option<Arc<ParameterResource>>,
    bucket: Option<Arc<ParameterResource>>,
    token: Arc<ParameterResource>,
    image: ContainerImage,
    http_endpoint: Arc<EndpointAnnotation>,
    mounts: Vec<ContainerMount>,
    /// Built on first access; a `OnceLock` so concurrent readers agree on one reference
    primary_endpoint: OnceLock<EndpointReference>,
}

impl InfluxDbResource {
    /// Create the resource, failing if the password or token parameter is absent
    pub fn new(
        name: impl Into<String>,
        parameters: InfluxDbParameters,
        host_port: Option<u16>,
    ) -> Result<Self> {
        let name: String = name.into();
        let name: Arc<str> = name.into();
        let InfluxDbParameters {
            username,
            password,
            organization,
            bucket,
            token,
        } = parameters;
        let missing = |parameter| Error::MissingParameter {
            resource: name.to_string(),
            parameter,
        };
        let password = password.ok_or_else(|| missing("password"))?;
        let token = token.ok_or_else(|| missing("token"))?;

        let http_endpoint = Arc::new(EndpointAnnotation::new(
            Arc::clone(&name),
            PRIMARY_ENDPOINT_NAME,
            "http",
            DEFAULT_HTTP_PORT,
            host_port,
        ));

        Ok(Self {
            name,
            username,
            password,
            organization,
            bucket,
            token,
            image: ContainerImage::new(INFLUXDB_REGISTRY, INFLUXDB_IMAGE, INFLUXDB_TAG),
            http_endpoint,
            mounts: Vec::new(),
            primary_endpoint: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &ContainerImage {
        &self.image
    }

    pub fn mounts(&self) -> &[ContainerMount] {
        &self.mounts
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &EndpointAnnotation> {
        std::iter::once(self.http_endpoint.as_ref())
    }

    pub fn password_parameter(&self) -> &Arc<ParameterResource> {
        &self.password
    }

    pub fn token_parameter(&self) -> &Arc<ParameterResource> {
        &self.token
    }

    /// Parameters this resource was declared with, in a stable order
    pub fn parameters(&self) -> impl Iterator<Item = &Arc<ParameterResource>> {
        [
            self.username.as_ref(),
            Some(&self.password),
            self.organization.as_ref(),
            self.bucket.as_ref(),
            Some(&self.token),
        ]
        .into_iter()
        .flatten()
    }

    pub fn username(&self) -> ParameterOrDefault {
        ParameterOrDefault::new(self.username.as_ref(), DEFAULT_USERNAME)
    }

    pub fn organization(&self) -> ParameterOrDefault {
        ParameterOrDefault::new(self.organization.as_ref(), DEFAULT_ORGANIZATION)
    }

    pub fn bucket(&self) -> ParameterOrDefault {
        ParameterOrDefault::new(self.bucket.as_ref(), DEFAULT_BUCKET)
    }

    /// The `http` endpoint of the container
    pub fn primary_endpoint(&self) -> &EndpointReference {
        self.primary_endpoint
            .get_or_init(|| EndpointReference::new(Arc::clone(&self.http_endpoint)))
    }

    /// `{scheme}://{host}:{port}?token={token}`, with host and port deferred to allocation
    pub fn connection_string_expression(&self) -> ReferenceExpression {
        let endpoint = self.primary_endpoint();
        ReferenceExpression::builder()
            .append(endpoint.property(EndpointProperty::Scheme))
            .append("://")
            .append(endpoint.property(EndpointProperty::Host))
            .append(":")
            .append(endpoint.property(EndpointProperty::Port))
            .append("?token=")
            .append(Arc::clone(&self.token))
            .build()
    }

    /// Resolve the connection string; fails until the primary endpoint is allocated
    pub fn connection_string(&self) -> Result<String> {
        self.connection_string_expression().resolve()
    }

    /// Environment variables of the container, in the order they are applied
    pub fn environment(&self) -> Vec<(&'static str, ReferenceExpression)> {
        vec![
            (ENV_INIT_MODE, ReferenceExpression::single("setup")),
            (ENV_INIT_USERNAME, ReferenceExpression::single(self.username())),
            (
                ENV_INIT_PASSWORD,
                ReferenceExpression::single(Arc::clone(&self.password)),
            ),
            (ENV_INIT_ORG, ReferenceExpression::single(self.organization())),
            (ENV_INIT_BUCKET, ReferenceExpression::single(self.bucket())),
            (
                ENV_INIT_ADMIN_TOKEN,
                ReferenceExpression::single(Arc::clone(&self.token)),
            ),
        ]
    }

    pub fn resolve_environment(&self) -> Result<Vec<(String, String)>> {
        self.environment()
            .into_iter()
            .map(|(key, value)| Ok((key.to_string(), value.resolve()?)))
            .collect()
    }

    pub(crate) fn set_image_tag(&mut self, tag: impl Into<String>) {
        self.image.tag = tag.into();
    }

    /// Adds a mount, replacing any earlier mount on the same container path
    pub(crate) fn add_mount(&mut self, mount: ContainerMount) {
        self.mounts.retain(|m| m.target != mount.target);
        self.mounts.push(mount);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn secret(name: &str, value: &str) -> Option<Arc<ParameterResource>> {
        Some(Arc::new(ParameterResource::secret(name, value)))
    }

    fn required_only() -> InfluxDbParameters {
        InfluxDbParameters {
            password: secret("influx-password", "p4ssw0rd"),
            token: secret("influx-token", "my-secret-token"),
            ..Default::default()
        }
    }

    #[test]
    fn password_is_required() {
        let err = InfluxDbResource::new(
            "influx",
            InfluxDbParameters {
                token: secret("influx-token", "my-secret-token"),
                ..Default::default()
            },
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingParameter { ref resource, parameter: "password" } if resource == "influx"
        ));
    }

    #[test]
    fn token_is_required() {
        let err = InfluxDbResource::new(
            "influx",
            InfluxDbParameters {
                password: secret("influx-password", "p4ssw0rd"),
                ..Default::default()
            },
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingParameter {
                parameter: "token",
                ..
            }
        ));
    }

    #[test]
    fn environment_uses_defaults() {
        let resource = InfluxDbResource::new("influx", required_only(), None).unwrap();
        assert_eq!(
            resource.resolve_environment().unwrap(),
            vec![
                (ENV_INIT_MODE.to_string(), "setup".to_string()),
                (ENV_INIT_USERNAME.to_string(), "admin".to_string()),
                (ENV_INIT_PASSWORD.to_string(), "p4ssw0rd".to_string()),
                (ENV_INIT_ORG.to_string(), "influxdata".to_string()),
                (ENV_INIT_BUCKET.to_string(), "default".to_string()),
                (ENV_INIT_ADMIN_TOKEN.to_string(), "my-secret-token".to_string()),
            ]
        );
    }

    #[test]
    fn environment_uses_supplied_parameters() {
        let resource = InfluxDbResource::new(
            "influx",
            InfluxDbParameters {
                username: Some(Arc::new(ParameterResource::new("user", "root"))),
                organization: Some(Arc::new(ParameterResource::new("org", "acme"))),
                bucket: Some(Arc::new(ParameterResource::new("bucket", "metrics"))),
                ..required_only()
            },
            None,
        )
        .unwrap();
        let unresolved: Vec<_> = resource
            .environment()
            .into_iter()
            .map(|(k, v)| (k, v.value_expression()))
            .collect();
        assert_eq!(
            unresolved,
            vec![
                (ENV_INIT_MODE, "setup".to_string()),
                (ENV_INIT_USERNAME, "{user.value}".to_string()),
                (ENV_INIT_PASSWORD, "{influx-password.value}".to_string()),
                (ENV_INIT_ORG, "{org.value}".to_string()),
                (ENV_INIT_BUCKET, "{bucket.value}".to_string()),
                (ENV_INIT_ADMIN_TOKEN, "{influx-token.value}".to_string()),
            ]
        );
        assert_eq!(resource.parameters().count(), 5);
    }

    #[test]
    fn connection_string() {
        let resource = InfluxDbResource::new("influx", required_only(), None).unwrap();
        assert_eq!(
            resource.connection_string_expression().value_expression(),
            "{influx.bindings.http.scheme}://{influx.bindings.http.host}:{influx.bindings.http.port}?token={influx-token.value}"
        );
        assert!(matches!(
            resource.connection_string(),
            Err(Error::EndpointNotAllocated { .. })
        ));

        resource
            .primary_endpoint()
            .annotation()
            .allocate("localhost", 18086)
            .unwrap();
        assert_eq!(
            resource.connection_string().unwrap(),
            "http://localhost:18086?token=my-secret-token"
        );
    }

    #[test]
    fn connection_string_carries_the_token_verbatim() {
        let resource = InfluxDbResource::new(
            "influx",
            InfluxDbParameters {
                token: secret("influx-token", "abc+def/ghi=="),
                ..required_only()
            },
            None,
        )
        .unwrap();
        resource
            .primary_endpoint()
            .annotation()
            .allocate("localhost", 18086)
            .unwrap();
        let connection_string = resource.connection_string().unwrap();
        assert_eq!(connection_string, "http://localhost:18086?token=abc+def/ghi==");

        let parsed: influxdb3_client::ConnectionString = connection_string.parse().unwrap();
        assert_eq!(
            parsed.token().map(|t| t.expose_secret().as_str()),
            Some("abc+def/ghi==")
        );
    }

    #[test]
    fn primary_endpoint_is_cached() {
        let resource = InfluxDbResource::new("influx", required_only(), Some(18086)).unwrap();
        let first: *const EndpointReference = resource.primary_endpoint();
        let second: *const EndpointReference = resource.primary_endpoint();
        assert!(std::ptr::eq(first, second));
        assert_eq!(resource.primary_endpoint().annotation().port(), Some(18086));
        assert_eq!(resource.primary_endpoint().annotation().target_port(), 8086);
    }

    #[test]
    fn identical_inputs_give_identical_outputs() {
        let params = required_only();
        let a = InfluxDbResource::new("influx", params.clone(), None).unwrap();
        let b = InfluxDbResource::new("influx", params, None).unwrap();
        assert_eq!(
            a.resolve_environment().unwrap(),
            b.resolve_environment().unwrap()
        );
        assert_eq!(
            a.connection_string_expression().value_expression(),
            b.connection_string_expression().value_expression()
        );
    }
}
