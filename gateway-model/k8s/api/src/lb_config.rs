use crate::Cidr;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configures the load balancer provisioned for a gateway.
///
/// Every field is optional; unset fields fall back to the controller's
/// defaults.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema,
)]
#[kube(
    group = "gateway.k8s.aws",
    version = "v1beta1",
    kind = "LoadBalancerConfiguration",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerConfigurationSpec {
    pub load_balancer_name: Option<String>,

    /// `internet-facing` or `internal`.
    pub scheme: Option<String>,

    /// `ipv4`, `dualstack` or `dualstack-without-public-ipv4`.
    pub ip_address_type: Option<String>,

    /// Explicit subnets. Mutually exclusive with `loadBalancerSubnetsSelector`.
    pub load_balancer_subnets: Option<Vec<SubnetConfiguration>>,

    /// Selects subnets by tag: each key names a tag and its values are the
    /// accepted tag values.
    pub load_balancer_subnets_selector: Option<BTreeMap<String, Vec<String>>>,

    pub security_groups: Option<Vec<String>>,
    pub security_group_prefixes: Option<Vec<String>>,

    /// Client CIDRs allowed to reach the load balancer. Only applies to
    /// managed security groups.
    pub source_ranges: Option<Vec<Cidr>>,

    pub listener_configurations: Option<Vec<ListenerConfiguration>>,
    pub load_balancer_attributes: Option<Vec<LoadBalancerAttribute>>,
    pub tags: Option<BTreeMap<String, String>>,
    pub minimum_load_balancer_capacity: Option<MinimumLoadBalancerCapacity>,
    pub manage_backend_security_group_rules: Option<bool>,
    #[serde(rename = "wafV2")]
    pub waf_v2: Option<WafV2Configuration>,
    pub shield_configuration: Option<ShieldConfiguration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubnetConfiguration {
    /// A subnet ID or a subnet `Name` tag.
    pub identifier: String,
    pub eip_allocation: Option<String>,
    pub private_ipv4_allocation: Option<String>,
    pub ipv6_allocation: Option<String>,
    pub source_nat_ipv6_prefix: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenerConfiguration {
    /// Identifies the listener as `PROTOCOL:port`, e.g. `HTTPS:443`.
    pub protocol_port: String,
    pub default_certificate: Option<String>,
    pub certificates: Option<Vec<String>>,
    pub ssl_policy: Option<String>,
    pub alpn_policy: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct LoadBalancerAttribute {
    pub key: String,
    pub value: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MinimumLoadBalancerCapacity {
    pub capacity_units: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct WafV2Configuration {
    #[serde(rename = "webACL")]
    pub web_acl: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ShieldConfiguration {
    pub enabled: bool,
}

// === impl LoadBalancerConfigurationSpec ===

impl LoadBalancerConfigurationSpec {
    pub const DELETION_PROTECTION_ATTRIBUTE: &'static str = "deletion_protection.enabled";

    /// Returns the value of the first attribute named `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.load_balancer_attributes
            .iter()
            .flatten()
            .find(|attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }

    /// Returns the listener configuration for `protocol` on `port`.
    pub fn listener(&self, protocol: &str, port: u16) -> Option<&ListenerConfiguration> {
        let key = format!("{protocol}:{port}");
        self.listener_configurations
            .iter()
            .flatten()
            .find(|lc| lc.protocol_port == key)
    }
}

// === impl ListenerConfiguration ===

impl ListenerConfiguration {
    /// Iterates over the configured certificate ARNs, the default certificate
    /// first.
    pub fn certificate_arns(&self) -> impl Iterator<Item = &str> + '_ {
        self.default_certificate
            .iter()
            .chain(self.certificates.iter().flatten())
            .map(String::as_str)
    }
}
