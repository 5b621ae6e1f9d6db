use crate::{NamespacedName, ResourceId, ResourceKind};
use std::fmt;

/// Errors returned by a stack build.
///
/// A build fails on the first error it encounters; errors are never
/// aggregated and no partially-built stack is returned alongside them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An explicit scheme or IP address type is not one of the recognized
    /// values.
    #[error("invalid {field}: {value:?}")]
    InvalidEnum { field: &'static str, value: String },

    /// The gateway is being deleted but its load balancer has deletion
    /// protection enabled.
    #[error("load balancer deletion protection blocks deleting {gateway}")]
    DeletionProtected { gateway: NamespacedName },

    /// An external collaborator failed. The collaborator's error is kept as
    /// the source, unmodified.
    #[error("{component} failed: {source}")]
    Collaborator {
        component: Component,
        #[source]
        source: anyhow::Error,
    },

    /// Two builders allocated the same resource identity.
    #[error("duplicate {kind} resource: {id}")]
    DuplicateResourceId { kind: ResourceKind, id: ResourceId },

    /// The gateway, its routes, or its configuration cannot be expressed as
    /// load balancer resources.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("build cancelled")]
    Cancelled,
}

/// Names the collaborator that produced an [`Error::Collaborator`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Component {
    Subnets,
    SecurityGroups,
    Secrets,
    Tags,
    Addons,
}

// === impl Error ===

impl Error {
    pub(crate) fn invalid_enum(field: &'static str, value: &str) -> Self {
        Self::InvalidEnum {
            field,
            value: value.to_string(),
        }
    }

    pub fn invalid_config(msg: impl fmt::Display) -> Self {
        Self::InvalidConfig(msg.to_string())
    }

    pub fn collaborator(component: Component, source: impl Into<anyhow::Error>) -> Self {
        Self::Collaborator {
            component,
            source: source.into(),
        }
    }
}

// === impl Component ===

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subnets => "subnet resolution".fmt(f),
            Self::SecurityGroups => "security group resolution".fmt(f),
            Self::Secrets => "secret resolution".fmt(f),
            Self::Tags => "tagging".fmt(f),
            Self::Addons => "add-on reconciliation".fmt(f),
        }
    }
}
