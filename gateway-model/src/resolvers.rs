//! Interfaces to the collaborators a build consults, and the static
//! implementations the CLI uses.

use crate::RoutesByPort;
use anyhow::{bail, ensure, Result};
use gateway_model_core::{
    elbv2::{IpAddressType, IpPermission, Scheme, SecurityGroupSpec, SubnetMapping},
    Component, Error, NamespacedName, Stack, StringToken,
};
use gateway_model_k8s_api::{
    gateway::Gateway, lb_config::SubnetConfiguration, Cidr, LoadBalancerConfigurationSpec,
    ResourceExt,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
};
use tokio_util::sync::CancellationToken;

/// Selects the subnets a load balancer is placed in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SubnetSelection<'c> {
    /// Subnets named explicitly by the configuration.
    Explicit(&'c [SubnetConfiguration]),

    /// Subnets whose tags match a selector.
    Selector(&'c BTreeMap<String, Vec<String>>),

    /// No preference; the resolver discovers suitable subnets.
    Discover,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedSubnets {
    /// One mapping per availability zone.
    pub mappings: Vec<SubnetMapping>,

    /// Set when the mappings carry IPv6 source NAT prefixes.
    pub source_nat_prefixes: bool,
}

/// The security groups a load balancer and its targets use.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityGroupResult {
    pub load_balancer: Vec<StringToken>,

    /// The security group shared by load balancers that targets admit.
    pub backend: Option<StringToken>,

    /// Set when the backend security group was allocated for this build.
    pub backend_allocated: bool,
}

#[async_trait::async_trait]
pub trait SubnetResolver: Send + Sync {
    async fn resolve(
        &self,
        selection: SubnetSelection<'_>,
        scheme: Scheme,
        ip_address_type: IpAddressType,
        stack: &Stack,
    ) -> Result<ResolvedSubnets>;
}

#[async_trait::async_trait]
pub trait SecurityGroupResolver: Send + Sync {
    /// Resolves the security groups for a gateway's load balancer. Managed
    /// groups are registered in `stack`.
    async fn resolve(
        &self,
        stack: &mut Stack,
        config: &LoadBalancerConfigurationSpec,
        gateway: &Gateway,
        routes: &RoutesByPort,
        ip_address_type: IpAddressType,
    ) -> Result<SecurityGroupResult>;
}

/// Resolves TLS certificates stored in Kubernetes secrets.
#[async_trait::async_trait]
pub trait SecretResolver: Send + Sync {
    /// Returns the ARN of the certificate held by `secret`. The certificate
    /// must be issued by one of `allowed_ca_arns` when that list is not empty.
    async fn certificate_arn(
        &self,
        secret: &NamespacedName,
        allowed_ca_arns: &[String],
    ) -> Result<String>;
}

/// Awaits a collaborator, failing with [`Error::Cancelled`] if `cancel` fires
/// first.
pub(crate) async fn call<T>(
    cancel: &CancellationToken,
    component: Component,
    future: impl Future<Output = Result<T>>,
) -> Result<T, Error> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = future => res.map_err(|error| Error::collaborator(component, error)),
    }
}

/// Places load balancers in a fixed set of subnets unless the configuration
/// names subnets explicitly.
#[derive(Clone, Debug, Default)]
pub struct StaticSubnets {
    subnets: Vec<String>,
}

/// Uses the configuration's security groups, or manages a frontend group
/// derived from the gateway's listeners.
#[derive(Clone, Debug, Default)]
pub struct StaticSecurityGroups {
    backend_group_id: Option<String>,
}

/// Reports certificates by reference rather than resolving them, e.g.
/// `secret://ns/name`.
#[derive(Clone, Debug, Default)]
pub struct StaticSecrets(());

// === impl StaticSubnets ===

impl StaticSubnets {
    pub fn new(subnets: impl IntoIterator<Item = impl ToString>) -> Self {
        Self {
            subnets: subnets.into_iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait::async_trait]
impl SubnetResolver for StaticSubnets {
    async fn resolve(
        &self,
        selection: SubnetSelection<'_>,
        scheme: Scheme,
        ip_address_type: IpAddressType,
        _: &Stack,
    ) -> Result<ResolvedSubnets> {
        match selection {
            SubnetSelection::Explicit(subnets) => {
                let mut mappings = Vec::with_capacity(subnets.len());
                for subnet in subnets {
                    if subnet.eip_allocation.is_some() {
                        ensure!(
                            scheme == Scheme::InternetFacing,
                            "subnet {}: EIP allocations require an internet-facing load balancer",
                            subnet.identifier
                        );
                    }
                    if subnet.ipv6_allocation.is_some() || subnet.source_nat_ipv6_prefix.is_some() {
                        ensure!(
                            ip_address_type.is_dual_stack(),
                            "subnet {}: IPv6 allocations require a dual-stack load balancer",
                            subnet.identifier
                        );
                    }
                    mappings.push(SubnetMapping {
                        subnet_id: subnet.identifier.clone(),
                        allocation_id: subnet.eip_allocation.clone(),
                        private_ipv4_address: subnet.private_ipv4_allocation.clone(),
                        ipv6_address: subnet.ipv6_allocation.clone(),
                        source_nat_ipv6_prefix: subnet.source_nat_ipv6_prefix.clone(),
                    });
                }
                let source_nat = mappings.iter().any(|m| m.source_nat_ipv6_prefix.is_some());
                Ok(ResolvedSubnets {
                    mappings,
                    source_nat_prefixes: source_nat,
                })
            }
            SubnetSelection::Selector(_) => {
                bail!("subnet selectors require subnet discovery")
            }
            SubnetSelection::Discover => {
                ensure!(!self.subnets.is_empty(), "no subnets are available");
                let mappings = self
                    .subnets
                    .iter()
                    .map(|id| SubnetMapping {
                        subnet_id: id.clone(),
                        ..Default::default()
                    })
                    .collect();
                Ok(ResolvedSubnets {
                    mappings,
                    source_nat_prefixes: false,
                })
            }
        }
    }
}

// === impl StaticSecurityGroups ===

impl StaticSecurityGroups {
    pub const MANAGED_ID: &'static str = "ManagedLBSecurityGroup";

    pub fn new(backend_group_id: Option<String>) -> Self {
        Self { backend_group_id }
    }
}

#[async_trait::async_trait]
impl SecurityGroupResolver for StaticSecurityGroups {
    async fn resolve(
        &self,
        stack: &mut Stack,
        config: &LoadBalancerConfigurationSpec,
        gateway: &Gateway,
        _: &RoutesByPort,
        ip_address_type: IpAddressType,
    ) -> Result<SecurityGroupResult> {
        let backend = self.backend_group_id.as_ref().map(StringToken::literal);

        let groups = config.security_groups.as_deref().unwrap_or_default();
        if !groups.is_empty() {
            // Backend rules are opt-in for user-supplied groups.
            let manage_backend = config.manage_backend_security_group_rules == Some(true);
            let backend = backend.filter(|_| manage_backend);
            return Ok(SecurityGroupResult {
                load_balancer: groups.iter().map(StringToken::literal).collect(),
                backend_allocated: backend.is_some(),
                backend,
            });
        }

        let prefix_lists = config.security_group_prefixes.clone().unwrap_or_default();
        let mut source_ranges = config.source_ranges.clone().unwrap_or_default();
        if source_ranges.is_empty() && prefix_lists.is_empty() {
            source_ranges.push(Cidr::ANY_V4.parse()?);
            if ip_address_type.is_dual_stack() {
                source_ranges.push(Cidr::ANY_V6.parse()?);
            }
        }

        let ports = gateway
            .spec
            .listeners
            .iter()
            .map(|l| {
                let protocol = if l.protocol.eq_ignore_ascii_case("UDP") {
                    "udp"
                } else {
                    "tcp"
                };
                (protocol, l.port)
            })
            .collect::<BTreeSet<_>>();

        let mut ingress = Vec::new();
        for (protocol, port) in ports {
            let permission = IpPermission {
                ip_protocol: protocol.to_string(),
                from_port: Some(port),
                to_port: Some(port),
                cidr: None,
                prefix_list_id: None,
            };
            for cidr in &source_ranges {
                ingress.push(IpPermission {
                    cidr: Some(cidr.to_string()),
                    ..permission.clone()
                });
            }
            for prefix_list in &prefix_lists {
                ingress.push(IpPermission {
                    prefix_list_id: Some(prefix_list.clone()),
                    ..permission.clone()
                });
            }
        }

        let namespace = gateway.namespace().unwrap_or_default();
        let name = gateway.name_any();
        let spec = SecurityGroupSpec {
            group_name: format!("k8s-{namespace}-{name}"),
            description: format!("[k8s] Managed SecurityGroup for gateway {namespace}/{name}"),
            ingress,
            tags: config.tags.clone().unwrap_or_default(),
        };
        let managed = stack.add_resource(Self::MANAGED_ID, spec)?;

        Ok(SecurityGroupResult {
            load_balancer: vec![StringToken::field(&managed, StringToken::SECURITY_GROUP_ID)],
            backend_allocated: backend.is_some(),
            backend,
        })
    }
}

// === impl StaticSecrets ===

#[async_trait::async_trait]
impl SecretResolver for StaticSecrets {
    async fn certificate_arn(&self, secret: &NamespacedName, _: &[String]) -> Result<String> {
        Ok(format!("secret://{secret}"))
    }
}
