#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod addon;
pub mod elbv2;
mod error;
pub mod hostname;
pub mod route;
mod stack;
mod token;

pub use self::{
    error::{Component, Error},
    hostname::HostMatch,
    stack::{Resource, ResourceId, ResourceKind, ResourceRef, ResourceSpec, Stack},
    token::StringToken,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a namespaced Kubernetes object, e.g. a Gateway, Service or
/// Secret.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

// === impl NamespacedName ===

impl NamespacedName {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
