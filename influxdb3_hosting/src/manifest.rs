//! Deployment manifest output
//!
//! The manifest describes every resource with unresolved value expressions, so it can be written
//! before any endpoint is allocated and never contains secret values.
use serde_json::{Map, Value, json};

use crate::{
    builder::AppModel,
    container::MountKind,
    influxdb::InfluxDbResource,
    parameter::{GENERATED_SECRET_LENGTH, ParameterResource},
};

impl ParameterResource {
    pub fn manifest(&self) -> Value {
        let mut input = Map::new();
        input.insert("type".into(), json!("string"));
        if self.is_secret() {
            input.insert("secret".into(), json!(true));
        }
        if self.is_generated() {
            input.insert(
                "default".into(),
                json!({ "generate": { "minLength": GENERATED_SECRET_LENGTH } }),
            );
        } else if !self.is_secret() {
            input.insert("default".into(), json!({ "value": self.value() }));
        }

        json!({
            "type": "parameter.v0",
            "value": format!("{{{}.inputs.value}}", self.name()),
            "inputs": { "value": input },
        })
    }
}

impl InfluxDbResource {
    pub fn manifest(&self) -> Value {
        let mut manifest = Map::new();
        manifest.insert("type".into(), json!("container.v0"));
        manifest.insert(
            "connectionString".into(),
            json!(self.connection_string_expression().value_expression()),
        );
        manifest.insert("image".into(), json!(self.image().to_string()));

        let mount_entries = |kind: MountKind, source_key: &str| -> Vec<Value> {
            self.mounts()
                .iter()
                .filter(|m| m.kind == kind)
                .map(|m| json!({ source_key: m.source, "target": m.target, "readOnly": m.read_only }))
                .collect()
        };
        let volumes = mount_entries(MountKind::Volume, "name");
        if !volumes.is_empty() {
            manifest.insert("volumes".into(), Value::Array(volumes));
        }
        let bind_mounts = mount_entries(MountKind::BindMount, "source");
        if !bind_mounts.is_empty() {
            manifest.insert("bindMounts".into(), Value::Array(bind_mounts));
        }

        let env: Map<String, Value> = self
            .environment()
            .into_iter()
            .map(|(key, value)| (key.to_string(), json!(value.value_expression())))
            .collect();
        manifest.insert("env".into(), Value::Object(env));

        let bindings: Map<String, Value> = self
            .endpoints()
            .map(|endpoint| {
                let mut binding = json!({
                    "scheme": endpoint.scheme(),
                    "protocol": endpoint.protocol(),
                    "transport": endpoint.transport(),
                    "targetPort": endpoint.target_port(),
                });
                if let (Some(port), Some(obj)) = (endpoint.port(), binding.as_object_mut()) {
                    obj.insert("port".into(), json!(port));
                }
                (endpoint.name().to_string(), binding)
            })
            .collect();
        manifest.insert("bindings".into(), Value::Object(bindings));

        Value::Object(manifest)
    }
}

impl AppModel {
    pub fn manifest(&self) -> Value {
        let parameters = self
            .parameters()
            .map(|p| (p.name().to_string(), p.manifest()));
        let influxdbs = self
            .influxdbs()
            .map(|r| (r.name().to_string(), r.manifest()));
        let resources: Map<String, Value> = parameters.chain(influxdbs).collect();
        json!({ "resources": resources })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{AppModelBuilder, InfluxDbOptions};

    use super::*;

    #[test_log::test]
    fn influxdb_manifest() {
        let mut builder = AppModelBuilder::new("app").with_app_host_directory("/srv/apphost");
        let org = builder.add_parameter("org", "acme", false).unwrap();
        builder
            .add_influxdb(
                "influx",
                InfluxDbOptions {
                    organization: Some(org),
                    port: Some(18086),
                    ..Default::default()
                },
            )
            .unwrap()
            .with_data_volume(None, false)
            .with_config_bind_mount("influx-config", true);
        let model = builder.build();

        assert_eq!(
            model.manifest(),
            json!({
                "resources": {
                    "org": {
                        "type": "parameter.v0",
                        "value": "{org.inputs.value}",
                        "inputs": { "value": { "type": "string", "default": { "value": "acme" } } },
                    },
                    "influx-password": {
                        "type": "parameter.v0",
                        "value": "{influx-password.inputs.value}",
                        "inputs": { "value": {
                            "type": "string",
                            "secret": true,
                            "default": { "generate": { "minLength": 22 } },
                        } },
                    },
                    "influx-token": {
                        "type": "parameter.v0",
                        "value": "{influx-token.inputs.value}",
                        "inputs": { "value": {
                            "type": "string",
                            "secret": true,
                            "default": { "generate": { "minLength": 22 } },
                        } },
                    },
                    "influx": {
                        "type": "container.v0",
                        "connectionString": "{influx.bindings.http.scheme}://{influx.bindings.http.host}:{influx.bindings.http.port}?token={influx-token.value}",
                        "image": "docker.io/library/influxdb:2.7",
                        "volumes": [
                            { "name": "app-influx-data", "target": "/var/lib/influxdb2", "readOnly": false },
                        ],
                        "bindMounts": [
                            { "source": "/srv/apphost/influx-config", "target": "/etc/influxdb2", "readOnly": true },
                        ],
                        "env": {
                            "DOCKER_INFLUXDB_INIT_MODE": "setup",
                            "DOCKER_INFLUXDB_INIT_USERNAME": "admin",
                            "DOCKER_INFLUXDB_INIT_PASSWORD": "{influx-password.value}",
                            "DOCKER_INFLUXDB_INIT_ORG": "{org.value}",
                            "DOCKER_INFLUXDB_INIT_BUCKET": "default",
                            "DOCKER_INFLUXDB_INIT_ADMIN_TOKEN": "{influx-token.value}",
                        },
                        "bindings": {
                            "http": {
                                "scheme": "http",
                                "protocol": "tcp",
                                "transport": "http",
                                "targetPort": 8086,
                                "port": 18086,
                            },
                        },
                    },
                },
            })
        );
    }

    #[test]
    fn manifest_keeps_declaration_order() {
        let mut builder = AppModelBuilder::new("app");
        builder.add_parameter("zeta", "z", false).unwrap();
        builder
            .add_influxdb("metrics", InfluxDbOptions::default())
            .unwrap();
        builder.add_influxdb("archive", InfluxDbOptions::default()).unwrap();
        let manifest = builder.build().manifest();

        let keys = |value: &Value| -> Vec<String> {
            value.as_object().unwrap().keys().cloned().collect()
        };
        assert_eq!(
            keys(&manifest["resources"]),
            [
                "zeta",
                "metrics-password",
                "metrics-token",
                "archive-password",
                "archive-token",
                "metrics",
                "archive",
            ]
        );
        assert_eq!(
            keys(&manifest["resources"]["metrics"]["env"]),
            [
                "DOCKER_INFLUXDB_INIT_MODE",
                "DOCKER_INFLUXDB_INIT_USERNAME",
                "DOCKER_INFLUXDB_INIT_PASSWORD",
                "DOCKER_INFLUXDB_INIT_ORG",
                "DOCKER_INFLUXDB_INIT_BUCKET",
                "DOCKER_INFLUXDB_INIT_ADMIN_TOKEN",
            ]
        );

        let rendered = serde_json::to_string(&manifest["resources"]["metrics"]).unwrap();
        let mode = rendered.find("DOCKER_INFLUXDB_INIT_MODE").unwrap();
        let token = rendered.find("DOCKER_INFLUXDB_INIT_ADMIN_TOKEN").unwrap();
        assert!(rendered.starts_with(r#"{"type":"container.v0","connectionString":"#));
        assert!(mode < token, "{rendered}");
    }

    #[test]
    fn manifest_never_contains_secret_values() {
        let mut builder = AppModelBuilder::new("app");
        let token = builder
            .add_parameter("tok", "my-secret-token", true)
            .unwrap();
        builder
            .add_influxdb(
                "influx",
                InfluxDbOptions {
                    token: Some(token),
                    ..Default::default()
                },
            )
            .unwrap();
        let model = builder.build();
        let password = model.parameter("influx-password").unwrap().value().to_string();

        let rendered = model.manifest().to_string();
        assert!(!rendered.contains("my-secret-token"));
        assert!(!rendered.contains(&password));
    }
}
