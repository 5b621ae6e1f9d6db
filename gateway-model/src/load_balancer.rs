use crate::{
    name,
    resolvers::{ResolvedSubnets, SecurityGroupResult},
    tags::TagHelper,
    BuilderConfig,
};
use gateway_model_core::{
    elbv2::{
        Attribute, IpAddressType, LoadBalancerSpec, LoadBalancerType, MinimumCapacity, Scheme,
    },
    Component, Error, NamespacedName,
};
use gateway_model_k8s_api::LoadBalancerConfigurationSpec;
use std::collections::BTreeMap;

/// The ID of the load balancer in every stack.
pub const LOAD_BALANCER_ID: &str = "LoadBalancer";

const MAX_NAME_LEN: usize = 32;

/// Builds the load balancer resource from the gateway's configuration and
/// the resolved subnets and security groups.
pub struct LoadBalancerSpecBuilder<'b> {
    config: &'b BuilderConfig,
    tags: &'b dyn TagHelper,
}

pub struct LoadBalancerInput<'i> {
    pub gateway: &'i NamespacedName,
    pub config: &'i LoadBalancerConfigurationSpec,
    pub scheme: Scheme,
    pub ip_address_type: IpAddressType,
    pub subnets: ResolvedSubnets,
    pub security_groups: &'i SecurityGroupResult,
}

// === impl LoadBalancerSpecBuilder ===

impl<'b> LoadBalancerSpecBuilder<'b> {
    pub fn new(config: &'b BuilderConfig, tags: &'b dyn TagHelper) -> Self {
        Self { config, tags }
    }

    pub fn build(&self, input: LoadBalancerInput<'_>) -> Result<LoadBalancerSpec, Error> {
        let LoadBalancerInput {
            gateway,
            config,
            scheme,
            ip_address_type,
            subnets,
            security_groups,
        } = input;
        let lb_type = self.config.load_balancer_type;

        if ip_address_type == IpAddressType::DualStackWithoutPublicIpv4 {
            if lb_type == LoadBalancerType::Network {
                return Err(Error::invalid_config(format!(
                    "network load balancers do not support ipAddressType {ip_address_type}"
                )));
            }
            if scheme == Scheme::Internal {
                return Err(Error::invalid_config(format!(
                    "ipAddressType {ip_address_type} requires an internet-facing load balancer"
                )));
            }
        }

        if subnets.mappings.is_empty() {
            return Err(Error::invalid_config(format!(
                "no subnets resolved for gateway {gateway}"
            )));
        }

        let source_nat = subnets.source_nat_prefixes && ip_address_type.is_dual_stack();
        let enable_prefix_for_ipv6_source_nat = match lb_type {
            LoadBalancerType::Network => Some(source_nat),
            LoadBalancerType::Application => None,
        };

        let tags = self
            .tags
            .load_balancer_tags(gateway, config)
            .map_err(|error| Error::collaborator(Component::Tags, error))?;

        Ok(LoadBalancerSpec {
            name: self.name(gateway, config, scheme)?,
            lb_type,
            scheme,
            ip_address_type,
            subnet_mappings: subnets.mappings,
            security_groups: security_groups.load_balancer.clone(),
            attributes: attributes(config)?,
            minimum_capacity: config
                .minimum_load_balancer_capacity
                .map(|c| MinimumCapacity {
                    capacity_units: c.capacity_units,
                }),
            enable_prefix_for_ipv6_source_nat,
            tags,
        })
    }

    fn name(
        &self,
        gateway: &NamespacedName,
        config: &LoadBalancerConfigurationSpec,
        scheme: Scheme,
    ) -> Result<String, Error> {
        if let Some(name) = config.load_balancer_name.as_deref() {
            validate_name(name)?;
            return Ok(name.to_string());
        }

        Ok(name::generate(
            &gateway.namespace,
            &gateway.name,
            &[
                &self.config.cluster_name,
                &gateway.namespace,
                &gateway.name,
                scheme.as_str(),
            ],
        ))
    }
}

fn validate_name(name: &str) -> Result<(), Error> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.starts_with("internal-");
    if !valid {
        return Err(Error::invalid_config(format!(
            "invalid load balancer name {name:?}"
        )));
    }
    Ok(())
}

/// Returns the configured attributes ordered by key.
fn attributes(config: &LoadBalancerConfigurationSpec) -> Result<Vec<Attribute>, Error> {
    let mut attrs = BTreeMap::<&str, &str>::new();
    for attr in config.load_balancer_attributes.iter().flatten() {
        match attrs.insert(&attr.key, &attr.value) {
            Some(prior) if prior != attr.value => {
                return Err(Error::invalid_config(format!(
                    "conflicting values for load balancer attribute {}: {prior:?} and {:?}",
                    attr.key, attr.value
                )));
            }
            _ => {}
        }
    }

    Ok(attrs
        .into_iter()
        .map(|(key, value)| Attribute {
            key: key.to_string(),
            value: value.to_string(),
        })
        .collect())
}
