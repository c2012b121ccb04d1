//! Declare InfluxDB containers in an application topology
//!
//! This crate builds [`InfluxDbResource`] descriptors: the image, endpoint, environment, and mounts
//! of an InfluxDB 2.x container, plus a connection-string [`ReferenceExpression`] that can be
//! handed to dependent applications. Nothing here starts containers or talks to the network. An
//! orchestration runtime takes the resulting [`AppModel`], allocates endpoints via
//! [`EndpointAnnotation::allocate`], and only then are the deferred values resolvable.
//!
//! # Example
//! ```
//! use influxdb3_hosting::{AppModelBuilder, InfluxDbOptions};
//!
//! let mut builder = AppModelBuilder::new("my-app");
//! builder
//!     .add_influxdb("influx", InfluxDbOptions::default())?
//!     .with_data_volume(None, false);
//! let model = builder.build();
//!
//! let influx = model.influxdb("influx").expect("declared above");
//! assert_eq!(
//!     influx.connection_string_expression().value_expression(),
//!     "{influx.bindings.http.scheme}://{influx.bindings.http.host}:{influx.bindings.http.port}?token={influx-token.value}",
//! );
//! # Ok::<(), influxdb3_hosting::Error>(())
//! ```
pub mod builder;
pub mod container;
pub mod endpoint;
pub mod expression;
pub mod influxdb;
pub mod manifest;
pub mod parameter;

pub use builder::{AppModel, AppModelBuilder, InfluxDbOptions, ResourceBuilder};
pub use container::{ContainerImage, ContainerMount, MountKind};
pub use endpoint::{
    AllocatedEndpoint, EndpointAnnotation, EndpointProperty, EndpointReference,
    EndpointReferenceExpression,
};
pub use expression::{ExpressionPart, ReferenceExpression, ReferenceExpressionBuilder};
pub use influxdb::{InfluxDbParameters, InfluxDbResource};
pub use parameter::{ParameterOrDefault, ParameterResource};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parameter '{parameter}' is required for resource '{resource}'")]
    MissingParameter {
        resource: String,
        parameter: &'static str,
    },

    #[error("invalid resource name '{name}': {reason}")]
    InvalidResourceName { name: String, reason: &'static str },

    #[error("a resource named '{0}' already exists in the application model")]
    DuplicateResource(String),

    #[error("endpoint '{endpoint}' of resource '{resource}' has not been allocated")]
    EndpointNotAllocated { resource: String, endpoint: String },

    #[error("endpoint '{endpoint}' of resource '{resource}' is already allocated")]
    EndpointAlreadyAllocated { resource: String, endpoint: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
