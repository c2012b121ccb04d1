//! Network endpoints exposed by a resource
//!
//! An [`EndpointAnnotation`] describes what the container listens on. The host and port that
//! clients should use are unknown until the orchestration runtime allocates them, so everything
//! derived from an endpoint goes through an [`EndpointReferenceExpression`] that can be rendered
//! as a placeholder before allocation and resolved after it.
use std::{
    fmt::Display,
    sync::{Arc, OnceLock},
};

use observability_deps::tracing::debug;

use crate::{Error, Result};

/// Host and port assigned to an endpoint by the orchestration runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedEndpoint {
    pub host: String,
    pub port: u16,
}

#[derive(Debug)]
pub struct EndpointAnnotation {
    resource: Arc<str>,
    name: String,
    scheme: String,
    transport: String,
    target_port: u16,
    port: Option<u16>,
    allocation: OnceLock<AllocatedEndpoint>,
}

impl EndpointAnnotation {
    pub fn new(
        resource: Arc<str>,
        name: impl Into<String>,
        scheme: impl Into<String>,
        target_port: u16,
        port: Option<u16>,
    ) -> Self {
        let scheme = scheme.into();
        Self {
            resource,
            name: name.into(),
            transport: scheme.clone(),
            scheme,
            target_port,
            port,
            allocation: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// Network protocol, always `tcp` for the endpoints declared here
    pub fn protocol(&self) -> &'static str {
        "tcp"
    }

    /// Port the container listens on
    pub fn target_port(&self) -> u16 {
        self.target_port
    }

    /// Host port requested at declaration, if any
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Record the host and port the runtime assigned to this endpoint
    ///
    /// Allocation happens once; a second call fails and leaves the first allocation in place.
    pub fn allocate(&self, host: impl Into<String>, port: u16) -> Result<()> {
        let host = host.into();
        debug!(resource = %self.resource, endpoint = %self.name, %host, port, "allocating endpoint");
        self.allocation
            .set(AllocatedEndpoint { host, port })
            .map_err(|_| Error::EndpointAlreadyAllocated {
                resource: self.resource.to_string(),
                endpoint: self.name.clone(),
            })
    }

    pub fn allocated(&self) -> Option<&AllocatedEndpoint> {
        self.allocation.get()
    }

    fn allocation_or_err(&self) -> Result<&AllocatedEndpoint> {
        self.allocated().ok_or_else(|| Error::EndpointNotAllocated {
            resource: self.resource.to_string(),
            endpoint: self.name.clone(),
        })
    }
}

/// Properties of an endpoint that an expression can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointProperty {
    Url,
    Host,
    Port,
    Scheme,
    TargetPort,
}

impl Display for EndpointProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url => write!(f, "url"),
            Self::Host => write!(f, "host"),
            Self::Port => write!(f, "port"),
            Self::Scheme => write!(f, "scheme"),
            Self::TargetPort => write!(f, "targetPort"),
        }
    }
}

/// Handle on a named endpoint of a resource
#[derive(Debug, Clone)]
pub struct EndpointReference {
    annotation: Arc<EndpointAnnotation>,
}

impl EndpointReference {
    pub fn new(annotation: Arc<EndpointAnnotation>) -> Self {
        Self { annotation }
    }

    pub fn resource_name(&self) -> &str {
        &self.annotation.resource
    }

    pub fn endpoint_name(&self) -> &str {
        self.annotation.name()
    }

    pub fn annotation(&self) -> &EndpointAnnotation {
        &self.annotation
    }

    pub fn is_allocated(&self) -> bool {
        self.annotation.allocated().is_some()
    }

    pub fn property(&self, property: EndpointProperty) -> EndpointReferenceExpression {
        EndpointReferenceExpression {
            endpoint: self.clone(),
            property,
        }
    }

    pub fn host(&self) -> Result<String> {
        self.property(EndpointProperty::Host).resolve()
    }

    pub fn port(&self) -> Result<u16> {
        Ok(self.annotation.allocation_or_err()?.port)
    }

    pub fn url(&self) -> Result<String> {
        self.property(EndpointProperty::Url).resolve()
    }
}

/// A single property of an endpoint, resolvable once the endpoint is allocated
#[derive(Debug, Clone)]
pub struct EndpointReferenceExpression {
    endpoint: EndpointReference,
    property: EndpointProperty,
}

impl EndpointReferenceExpression {
    pub fn endpoint(&self) -> &EndpointReference {
        &self.endpoint
    }

    pub fn property(&self) -> EndpointProperty {
        self.property
    }

    /// Placeholder form, e.g., `{influx.bindings.http.host}`
    pub fn value_expression(&self) -> String {
        format!(
            "{{{}.bindings.{}.{}}}",
            self.endpoint.resource_name(),
            self.endpoint.endpoint_name(),
            self.property
        )
    }

    pub fn resolve(&self) -> Result<String> {
        let annotation = self.endpoint.annotation();
        // scheme and target port are fixed at declaration
        match self.property {
            EndpointProperty::Scheme => return Ok(annotation.scheme().to_string()),
            EndpointProperty::TargetPort => return Ok(annotation.target_port().to_string()),
            _ => {}
        }
        let allocated = annotation.allocation_or_err()?;
        Ok(match self.property {
            EndpointProperty::Host => allocated.host.clone(),
            EndpointProperty::Port => allocated.port.to_string(),
            _ => format!(
                "{}://{}:{}",
                annotation.scheme(),
                allocated.host,
                allocated.port
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_endpoint() -> EndpointReference {
        EndpointReference::new(Arc::new(EndpointAnnotation::new(
            "influx".into(),
            "http",
            "http",
            8086,
            None,
        )))
    }

    #[test]
    fn placeholders_before_allocation() {
        let endpoint = http_endpoint();
        assert!(!endpoint.is_allocated());
        assert_eq!(
            endpoint.property(EndpointProperty::Host).value_expression(),
            "{influx.bindings.http.host}"
        );
        assert_eq!(
            endpoint
                .property(EndpointProperty::TargetPort)
                .value_expression(),
            "{influx.bindings.http.targetPort}"
        );

        let err = endpoint.host().unwrap_err();
        assert!(matches!(
            err,
            Error::EndpointNotAllocated { ref resource, ref endpoint } if resource == "influx" && endpoint == "http"
        ));
        assert_eq!(
            endpoint.property(EndpointProperty::Scheme).resolve().unwrap(),
            "http"
        );
        assert_eq!(
            endpoint
                .property(EndpointProperty::TargetPort)
                .resolve()
                .unwrap(),
            "8086"
        );
    }

    #[test]
    fn resolves_after_allocation() {
        let endpoint = http_endpoint();
        endpoint.annotation().allocate("localhost", 18086).unwrap();
        assert_eq!(endpoint.host().unwrap(), "localhost");
        assert_eq!(endpoint.port().unwrap(), 18086);
        assert_eq!(endpoint.url().unwrap(), "http://localhost:18086");
    }

    #[test]
    fn allocation_happens_once() {
        let endpoint = http_endpoint();
        endpoint.annotation().allocate("localhost", 18086).unwrap();
        let err = endpoint
            .annotation()
            .allocate("otherhost", 1)
            .unwrap_err();
        assert!(matches!(err, Error::EndpointAlreadyAllocated { .. }));
        assert_eq!(endpoint.host().unwrap(), "localhost");
    }

    #[test]
    fn concurrent_allocation_has_single_winner() {
        let endpoint = http_endpoint();
        let results: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8u16)
                .map(|i| {
                    let endpoint = endpoint.clone();
                    s.spawn(move || endpoint.annotation().allocate("localhost", 20000 + i).is_ok())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
        assert!(endpoint.is_allocated());
    }
}
