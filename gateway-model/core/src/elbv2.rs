//! Specs for the Elastic Load Balancing (v2) resources a stack is made of.

use crate::{Error, NamespacedName, StringToken};
use serde::{Serialize, Serializer};
use std::{collections::BTreeMap, fmt, num::NonZeroU16};

/// Declares an enum whose variants map one-to-one onto the strings the load
/// balancer API uses. Parsing is case-sensitive; unknown strings fail with
/// [`Error::InvalidEnum`] naming `$field`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident($field:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $value:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const VALUES: &'static [&'static str] = &[$($value),+];

            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $value ),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $value => Ok(Self::$variant), )+
                    _ => Err(Error::invalid_enum($field, s)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.as_str().fmt(f)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

string_enum! {
    pub enum LoadBalancerType("loadBalancerType") {
        Application => "application",
        Network => "network",
    }
}

string_enum! {
    pub enum Scheme("scheme") {
        InternetFacing => "internet-facing",
        Internal => "internal",
    }
}

string_enum! {
    pub enum IpAddressType("ipAddressType") {
        Ipv4 => "ipv4",
        DualStack => "dualstack",
        DualStackWithoutPublicIpv4 => "dualstack-without-public-ipv4",
    }
}

string_enum! {
    pub enum TargetType("targetType") {
        Instance => "instance",
        Ip => "ip",
    }
}

string_enum! {
    pub enum Protocol("protocol") {
        Http => "HTTP",
        Https => "HTTPS",
        Tcp => "TCP",
        Udp => "UDP",
        Tls => "TLS",
        TcpUdp => "TCP_UDP",
    }
}

string_enum! {
    pub enum ProtocolVersion("protocolVersion") {
        Http1 => "HTTP1",
        Grpc => "GRPC",
    }
}

string_enum! {
    pub enum TargetGroupIpAddressType("targetGroupIPAddressType") {
        Ipv4 => "ipv4",
        Ipv6 => "ipv6",
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub lb_type: LoadBalancerType,
    pub scheme: Scheme,
    pub ip_address_type: IpAddressType,
    pub subnet_mappings: Vec<SubnetMapping>,
    pub security_groups: Vec<StringToken>,
    pub attributes: Vec<Attribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_capacity: Option<MinimumCapacity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_prefix_for_ipv6_source_nat: Option<bool>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetMapping {
    pub subnet_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_ipv4_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_nat_ipv6_prefix: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimumCapacity {
    pub capacity_units: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupSpec {
    pub group_name: String,
    pub description: String,
    pub ingress: Vec<IpPermission>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpPermission {
    pub ip_protocol: String,
    pub from_port: Option<u16>,
    pub to_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_list_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerSpec {
    pub load_balancer: StringToken,
    pub port: NonZeroU16,
    pub protocol: Protocol,
    pub default_actions: Vec<Action>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpn_policy: Option<String>,

    /// Routing rules in evaluation order. Priorities increase with the
    /// index.
    pub rules: Vec<ListenerRule>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerRule {
    pub priority: u32,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<Action>,

    /// The route this rule was derived from.
    pub route: NamespacedName,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "field", rename_all = "kebab-case")]
pub enum RuleCondition {
    HostHeader { values: Vec<String> },
    PathPattern { values: Vec<String> },
    HttpHeader { name: String, values: Vec<String> },
    HttpRequestMethod { values: Vec<String> },
    QueryString { values: Vec<(String, String)> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Action {
    Forward {
        #[serde(rename = "targetGroups")]
        target_groups: Vec<WeightedTargetGroup>,
    },
    FixedResponse {
        #[serde(rename = "statusCode")]
        status_code: u16,
        #[serde(rename = "contentType")]
        content_type: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedTargetGroup {
    pub target_group: StringToken,
    pub weight: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupSpec {
    pub name: String,
    pub target_type: TargetType,
    pub protocol: Protocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<ProtocolVersion>,
    pub port: NonZeroU16,
    pub ip_address_type: TargetGroupIpAddressType,
    pub health_check: HealthCheck,
    pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub protocol: Protocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub port: String,
    pub interval_seconds: u32,
    pub timeout_seconds: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
}

/// Associates a target group with the Service whose endpoints it targets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupBindingSpec {
    /// Built as [`StringToken::Unresolved`] and patched with a reference to
    /// the target group once that group is registered.
    pub target_group_arn: StringToken,
    pub name: String,
    pub target_type: TargetType,
    pub service: NamespacedName,
    pub service_port: NonZeroU16,
    pub ip_address_type: TargetGroupIpAddressType,
    pub vpc_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networking: Option<Networking>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Networking {
    pub ingress: Vec<NetworkingRule>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NetworkingRule {
    pub from: Vec<StringToken>,
    pub ports: Vec<NetworkingPort>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NetworkingPort {
    pub protocol: Protocol,

    /// `None` permits every port.
    pub port: Option<NonZeroU16>,
}

// === impl IpAddressType ===

impl IpAddressType {
    pub fn is_dual_stack(&self) -> bool {
        !matches!(self, Self::Ipv4)
    }
}

// === impl Protocol ===

impl Protocol {
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Https | Self::Tls)
    }

    pub fn supported_by(&self, lb_type: LoadBalancerType) -> bool {
        match lb_type {
            LoadBalancerType::Application => matches!(self, Self::Http | Self::Https),
            LoadBalancerType::Network => {
                matches!(self, Self::Tcp | Self::Udp | Self::Tls | Self::TcpUdp)
            }
        }
    }
}

// === impl TargetGroupBindingSpec ===

impl TargetGroupBindingSpec {
    /// Points the binding at a registered target group.
    pub fn resolve_target_group(&mut self, target_group: &crate::ResourceRef) {
        self.target_group_arn = StringToken::field(target_group, StringToken::TARGET_GROUP_ARN);
    }
}
