//! Declaring resources in an application model
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexMap;
use observability_deps::tracing::{debug, info};

use crate::{
    Error, Result,
    container::{ContainerMount, MountKind},
    influxdb::{CONFIG_TARGET_PATH, DATA_TARGET_PATH, InfluxDbParameters, InfluxDbResource},
    parameter::ParameterResource,
};

const MAX_RESOURCE_NAME_LENGTH: usize = 64;

/// Options accepted by [`AppModelBuilder::add_influxdb`]
///
/// Unset `password` and `token` are generated as secret parameters named `<name>-password` and
/// `<name>-token`. `port` pins the host port of the `http` endpoint; otherwise the runtime picks
/// one.
#[derive(Debug, Default, Clone)]
pub struct InfluxDbOptions {
    pub username: Option<Arc<ParameterResource>>,
    pub password: Option<Arc<ParameterResource>>,
    pub organization: Option<Arc<ParameterResource>>,
    pub bucket: Option<Arc<ParameterResource>>,
    pub token: Option<Arc<ParameterResource>>,
    pub port: Option<u16>,
}

/// Collects the resources of an application before they are handed to a runtime
#[derive(Debug)]
pub struct AppModelBuilder {
    app_name: String,
    app_host_directory: PathBuf,
    parameters: IndexMap<String, Arc<ParameterResource>>,
    influxdbs: IndexMap<String, InfluxDbResource>,
}

impl AppModelBuilder {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            app_host_directory: PathBuf::from("."),
            parameters: IndexMap::new(),
            influxdbs: IndexMap::new(),
        }
    }

    /// Directory relative bind mount sources are resolved against
    pub fn with_app_host_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.app_host_directory = dir.into();
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Names are compared case-insensitively across all resource kinds
    fn ensure_available(&self, name: &str) -> Result<()> {
        validate_resource_name(name)?;
        if self
            .parameters
            .keys()
            .chain(self.influxdbs.keys())
            .any(|existing| existing.eq_ignore_ascii_case(name))
        {
            return Err(Error::DuplicateResource(name.to_string()));
        }
        Ok(())
    }

    /// Add a parameter; `secret` parameters are never written out in clear text
    pub fn add_parameter(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        secret: bool,
    ) -> Result<Arc<ParameterResource>> {
        let parameter = if secret {
            ParameterResource::secret(name, value)
        } else {
            ParameterResource::new(name, value)
        };
        self.ensure_available(parameter.name())?;
        Ok(self.insert_parameter(parameter))
    }

    fn insert_parameter(&mut self, parameter: ParameterResource) -> Arc<ParameterResource> {
        debug!(parameter = %parameter.name(), secret = parameter.is_secret(), "adding parameter");
        let parameter = Arc::new(parameter);
        self.parameters
            .insert(parameter.name().to_string(), Arc::clone(&parameter));
        parameter
    }

    /// Add an InfluxDB container named `name`
    pub fn add_influxdb(
        &mut self,
        name: impl Into<String>,
        options: InfluxDbOptions,
    ) -> Result<ResourceBuilder<'_>> {
        let name = name.into();
        let InfluxDbOptions {
            username,
            password,
            organization,
            bucket,
            token,
            port,
        } = options;

        // check every name up front so a failure leaves the model untouched
        self.ensure_available(&name)?;
        let password_name = password.is_none().then(|| format!("{name}-password"));
        let token_name = token.is_none().then(|| format!("{name}-token"));
        for generated in password_name.iter().chain(token_name.iter()) {
            self.ensure_available(generated)?;
        }

        let password = match (password, password_name) {
            (Some(p), _) => Some(p),
            (None, Some(n)) => Some(self.insert_parameter(ParameterResource::generated(n))),
            (None, None) => None,
        };
        let token = match (token, token_name) {
            (Some(t), _) => Some(t),
            (None, Some(n)) => Some(self.insert_parameter(ParameterResource::generated(n))),
            (None, None) => None,
        };

        let resource = InfluxDbResource::new(
            name.clone(),
            InfluxDbParameters {
                username,
                password,
                organization,
                bucket,
                token,
            },
            port,
        )?;
        info!(resource = %name, image = %resource.image(), "declared InfluxDB resource");

        Ok(ResourceBuilder {
            app_name: &self.app_name,
            app_host_directory: &self.app_host_directory,
            resource: self.influxdbs.entry(name).or_insert(resource),
        })
    }

    pub fn build(self) -> AppModel {
        AppModel {
            name: self.app_name,
            parameters: self.parameters,
            influxdbs: self.influxdbs,
        }
    }
}

/// Fluent configuration of an [`InfluxDbResource`] right after it is added
#[derive(Debug)]
pub struct ResourceBuilder<'a> {
    app_name: &'a str,
    app_host_directory: &'a Path,
    resource: &'a mut InfluxDbResource,
}

impl ResourceBuilder<'_> {
    pub fn resource(&self) -> &InfluxDbResource {
        self.resource
    }

    /// Use a different tag of the InfluxDB image
    pub fn with_image_tag(self, tag: impl Into<String>) -> Self {
        self.resource.set_image_tag(tag);
        self
    }

    /// Mount a named volume at `/var/lib/influxdb2`
    ///
    /// Without a name, one is derived from the application and resource names.
    pub fn with_data_volume(self, name: Option<&str>, read_only: bool) -> Self {
        self.with_volume(name, "data", DATA_TARGET_PATH, read_only)
    }

    /// Mount a host directory at `/var/lib/influxdb2`
    pub fn with_data_bind_mount(self, source: impl AsRef<Path>, read_only: bool) -> Self {
        self.with_bind_mount(source.as_ref(), DATA_TARGET_PATH, read_only)
    }

    /// Mount a named volume at `/etc/influxdb2`
    pub fn with_config_volume(self, name: Option<&str>, read_only: bool) -> Self {
        self.with_volume(name, "config", CONFIG_TARGET_PATH, read_only)
    }

    /// Mount a host directory at `/etc/influxdb2`
    pub fn with_config_bind_mount(self, source: impl AsRef<Path>, read_only: bool) -> Self {
        self.with_bind_mount(source.as_ref(), CONFIG_TARGET_PATH, read_only)
    }

    fn with_volume(self, name: Option<&str>, suffix: &str, target: &str, read_only: bool) -> Self {
        let source = match name {
            Some(name) => name.to_string(),
            None => volume_name(self.app_name, self.resource.name(), suffix),
        };
        self.resource.add_mount(ContainerMount {
            kind: MountKind::Volume,
            source,
            target: target.to_string(),
            read_only,
        });
        self
    }

    fn with_bind_mount(self, source: &Path, target: &str, read_only: bool) -> Self {
        let source = if source.is_absolute() {
            source.to_path_buf()
        } else {
            self.app_host_directory.join(source)
        };
        self.resource.add_mount(ContainerMount {
            kind: MountKind::BindMount,
            source: source.display().to_string(),
            target: target.to_string(),
            read_only,
        });
        self
    }
}

/// A finished application model
#[derive(Debug)]
pub struct AppModel {
    name: String,
    parameters: IndexMap<String, Arc<ParameterResource>>,
    influxdbs: IndexMap<String, InfluxDbResource>,
}

impl AppModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters in declaration order
    pub fn parameters(&self) -> impl Iterator<Item = &Arc<ParameterResource>> {
        self.parameters.values()
    }

    /// InfluxDB resources in declaration order
    pub fn influxdbs(&self) -> impl Iterator<Item = &InfluxDbResource> {
        self.influxdbs.values()
    }

    pub fn influxdb(&self, name: &str) -> Option<&InfluxDbResource> {
        self.influxdbs.get(name)
    }

    pub fn parameter(&self, name: &str) -> Option<&Arc<ParameterResource>> {
        self.parameters.get(name)
    }
}

/// Resource names must start with a letter and contain only ASCII letters, digits, and single
/// hyphens, with no trailing hyphen
fn validate_resource_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(Error::InvalidResourceName {
            name: name.to_string(),
            reason,
        })
    };
    if name.is_empty() {
        return invalid("name must not be empty");
    }
    if name.len() > MAX_RESOURCE_NAME_LENGTH {
        return invalid("name must be at most 64 characters long");
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return invalid("name must start with an ASCII letter");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return invalid("name must contain only ASCII letters, digits, and hyphens");
    }
    if name.ends_with('-') {
        return invalid("name must not end with a hyphen");
    }
    if name.contains("--") {
        return invalid("name must not contain consecutive hyphens");
    }
    Ok(())
}

fn volume_name(app_name: &str, resource_name: &str, suffix: &str) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect()
    };
    format!(
        "{}-{}-{suffix}",
        sanitize(app_name),
        sanitize(resource_name)
    )
}
