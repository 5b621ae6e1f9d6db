//! Kind-agnostic descriptions of the routes attached to a gateway.

use crate::{HostMatch, NamespacedName};
use serde::Serialize;
use std::{fmt, num::NonZeroU16};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RouteKind {
    Http,
    Grpc,
    Tcp,
    Tls,
    Udp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub kind: RouteKind,
    pub name: NamespacedName,
    pub hostnames: Vec<HostMatch>,
    pub rules: Vec<RouteRule>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteRule {
    /// A rule matches a request if any one of its matches is satisfied. A
    /// rule without matches matches every request.
    pub matches: Vec<RouteMatch>,
    pub backends: Vec<BackendRef>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteMatch {
    pub path: Option<PathMatch>,
    pub headers: Vec<HeaderMatch>,
    pub query_params: Vec<QueryParamMatch>,
    pub method: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderMatch {
    pub name: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryParamMatch {
    pub name: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Exact(String),
    Regex(String),
}

/// A weighted reference to a Service port.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BackendRef {
    pub service: NamespacedName,
    pub port: NonZeroU16,
    pub weight: u32,
    pub ip_family: IpFamily,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum IpFamily {
    #[default]
    Ipv4,
    Ipv6,
}

// === impl RouteKind ===

impl RouteKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTPRoute",
            Self::Grpc => "GRPCRoute",
            Self::Tcp => "TCPRoute",
            Self::Tls => "TLSRoute",
            Self::Udp => "UDPRoute",
        }
    }

    /// Indicates whether routes of this kind are routed at layer 7.
    pub const fn is_l7(&self) -> bool {
        matches!(self, Self::Http | Self::Grpc)
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// === impl RouteDescriptor ===

impl RouteDescriptor {
    pub fn new(kind: RouteKind, name: NamespacedName) -> Self {
        Self {
            kind,
            name,
            hostnames: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// The route's most specific hostname, which represents the route when
    /// ordering it against other routes.
    pub fn representative_hostname(&self) -> Option<&HostMatch> {
        HostMatch::most_specific(&self.hostnames)
    }
}

// === impl BackendRef ===

impl BackendRef {
    pub fn new(service: NamespacedName, port: NonZeroU16) -> Self {
        Self {
            service,
            port,
            weight: 1,
            ip_family: IpFamily::Ipv4,
        }
    }
}
