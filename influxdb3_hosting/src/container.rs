//! Container image and filesystem mounts
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerImage {
    pub registry: String,
    pub image: String,
    pub tag: String,
}

impl ContainerImage {
    pub fn new(
        registry: impl Into<String>,
        image: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            image: image.into(),
            tag: tag.into(),
        }
    }
}

impl Display for ContainerImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.image, self.tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    /// A named volume managed by the container runtime
    Volume,
    /// A host directory mounted into the container
    BindMount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerMount {
    pub kind: MountKind,
    /// Volume name or host path, depending on `kind`
    pub source: String,
    /// Path inside the container
    pub target: String,
    pub read_only: bool,
}
