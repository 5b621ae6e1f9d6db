use crate::ResourceRef;
use serde::Serialize;
use std::fmt;

/// A string-valued field that may not be known until the reconciler has
/// created the resource it comes from.
///
/// `Unresolved` is only ever a construction-time placeholder: builders patch
/// it before the owning resource is registered in a stack.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StringToken {
    Literal(String),
    ResourceField {
        resource: ResourceRef,
        field: &'static str,
    },
    Unresolved,
}

// === impl StringToken ===

impl StringToken {
    pub const LOAD_BALANCER_ARN: &'static str = "status.loadBalancerARN";
    pub const TARGET_GROUP_ARN: &'static str = "status.targetGroupARN";
    pub const SECURITY_GROUP_ID: &'static str = "status.groupID";

    pub fn literal(value: impl ToString) -> Self {
        Self::Literal(value.to_string())
    }

    pub fn field(resource: &ResourceRef, field: &'static str) -> Self {
        Self::ResourceField {
            resource: resource.clone(),
            field,
        }
    }

    /// Returns the resource this token depends on, if any.
    pub fn dependency(&self) -> Option<&ResourceRef> {
        match self {
            Self::ResourceField { resource, .. } => Some(resource),
            _ => None,
        }
    }
}

impl fmt::Display for StringToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => value.fmt(f),
            Self::ResourceField { resource, field } => write!(f, "${{{resource}.{field}}}"),
            Self::Unresolved => "<unresolved>".fmt(f),
        }
    }
}
