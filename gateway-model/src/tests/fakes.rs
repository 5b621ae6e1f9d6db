//! Gateways, configurations, and collaborators for tests.

use crate::{
    addon::{AddonBuilder, StackAddonBuilder},
    resolvers::{
        ResolvedSubnets, SecretResolver, SecurityGroupResolver, SecurityGroupResult,
        StaticSecurityGroups, StaticSubnets, SubnetResolver, SubnetSelection,
    },
    BuilderConfig, RoutesByPort, StackBuilder,
};
use anyhow::{bail, Result};
use gateway_model_core::{
    addon::{AddonConfig, AddonMetadata},
    elbv2::{IpAddressType, Scheme},
    route::{BackendRef, RouteDescriptor, RouteKind, RouteRule},
    Component, HostMatch, NamespacedName, ResourceRef, Stack,
};
use gateway_model_k8s_api::{
    gateway::Gateway, lb_config::LoadBalancerAttribute, LoadBalancerConfigurationSpec,
};
use serde_json::{json, Value};
use std::{
    num::NonZeroU16,
    sync::{Arc, Mutex},
};

pub const SUBNETS: [&str; 2] = ["subnet-a", "subnet-b"];
pub const BACKEND_SG: &str = "sg-backend";

pub fn mk_gateway(ns: &str, name: &str, listeners: Vec<Value>) -> Gateway {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1beta1",
        "kind": "Gateway",
        "metadata": {
            "namespace": ns,
            "name": name,
        },
        "spec": {
            "gatewayClassName": "aws-alb",
            "listeners": listeners,
        },
    }))
    .expect("gateway must parse")
}

pub fn listener(name: &str, port: u16, protocol: &str) -> Value {
    json!({
        "name": name,
        "port": port,
        "protocol": protocol,
    })
}

pub fn http_listener(port: u16) -> Value {
    listener("http", port, "HTTP")
}

pub fn https_listener(name: &str, port: u16, hostname: Option<&str>, secret: &str) -> Value {
    let mut listener = terminating(listener(name, port, "HTTPS"), secret);
    if let Some(hostname) = hostname {
        listener["hostname"] = json!(hostname);
    }
    listener
}

pub fn tls_listener(name: &str, port: u16, secret: &str) -> Value {
    terminating(listener(name, port, "TLS"), secret)
}

fn terminating(mut listener: Value, secret: &str) -> Value {
    listener["tls"] = json!({
        "certificateRefs": [{ "name": secret }],
    });
    listener
}

pub fn mark_deleted(gateway: &mut Gateway) {
    let timestamp =
        serde_json::from_value(json!("2024-01-01T00:00:00Z")).expect("timestamp must parse");
    gateway.metadata.deletion_timestamp = Some(timestamp);
}

/// A configuration that sets `deletion_protection.enabled` when `protection`
/// is given.
pub fn mk_config(protection: Option<&str>) -> LoadBalancerConfigurationSpec {
    LoadBalancerConfigurationSpec {
        load_balancer_attributes: protection.map(|value| {
            vec![LoadBalancerAttribute {
                key: LoadBalancerConfigurationSpec::DELETION_PROTECTION_ATTRIBUTE.to_string(),
                value: value.to_string(),
            }]
        }),
        ..Default::default()
    }
}

pub fn mk_backend(ns: &str, name: &str, port: u16) -> BackendRef {
    BackendRef::new(
        NamespacedName::new(ns, name),
        NonZeroU16::new(port).expect("port must not be zero"),
    )
}

/// An HTTP route with a single catch-all rule.
pub fn mk_route(
    ns: &str,
    name: &str,
    hostnames: &[&str],
    backends: Vec<BackendRef>,
) -> RouteDescriptor {
    let mut route = RouteDescriptor::new(RouteKind::Http, NamespacedName::new(ns, name));
    route.hostnames = hostnames.iter().map(|h| HostMatch::parse(h)).collect();
    route.rules.push(RouteRule {
        matches: Vec::new(),
        backends,
    });
    route
}

pub fn on_port(port: u16, routes: Vec<RouteDescriptor>) -> RoutesByPort {
    let mut by_port = RoutesByPort::new();
    let port = NonZeroU16::new(port).expect("port must not be zero");
    by_port.insert(port, routes);
    by_port
}

pub fn mk_builder(config: BuilderConfig, fakes: &Arc<Collaborators>) -> StackBuilder {
    let builder = StackBuilder::new(config, fakes.clone(), fakes.clone());
    builder.with_addons(fakes.clone())
}

/// Records every collaborator call and optionally fails or stalls one
/// component. Results otherwise come from the static collaborators.
#[derive(Debug, Default)]
pub struct Collaborators {
    fail: Option<Component>,
    stall: Option<Component>,
    calls: Mutex<Vec<Component>>,
}

// === impl Collaborators ===

impl Collaborators {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(component: Component) -> Arc<Self> {
        Arc::new(Self {
            fail: Some(component),
            ..Default::default()
        })
    }

    /// Collaborators whose `component` never completes.
    pub fn stalled(component: Component) -> Arc<Self> {
        Arc::new(Self {
            stall: Some(component),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<Component> {
        self.calls.lock().expect("must not be poisoned").clone()
    }

    async fn enter(&self, component: Component) -> Result<()> {
        self.calls
            .lock()
            .expect("must not be poisoned")
            .push(component);
        if self.stall == Some(component) {
            std::future::pending::<()>().await;
        }
        if self.fail == Some(component) {
            bail!("{component:?} unavailable");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SubnetResolver for Collaborators {
    async fn resolve(
        &self,
        selection: SubnetSelection<'_>,
        scheme: Scheme,
        ip_address_type: IpAddressType,
        stack: &Stack,
    ) -> Result<ResolvedSubnets> {
        self.enter(Component::Subnets).await?;
        StaticSubnets::new(SUBNETS)
            .resolve(selection, scheme, ip_address_type, stack)
            .await
    }
}

#[async_trait::async_trait]
impl SecurityGroupResolver for Collaborators {
    async fn resolve(
        &self,
        stack: &mut Stack,
        config: &LoadBalancerConfigurationSpec,
        gateway: &Gateway,
        routes: &RoutesByPort,
        ip_address_type: IpAddressType,
    ) -> Result<SecurityGroupResult> {
        self.enter(Component::SecurityGroups).await?;
        StaticSecurityGroups::new(Some(BACKEND_SG.to_string()))
            .resolve(stack, config, gateway, routes, ip_address_type)
            .await
    }
}

#[async_trait::async_trait]
impl SecretResolver for Collaborators {
    async fn certificate_arn(&self, secret: &NamespacedName, _: &[String]) -> Result<String> {
        self.enter(Component::Secrets).await?;
        Ok(format!(
            "arn:aws:acm:us-west-2:000000000000:certificate/{}",
            secret.name
        ))
    }
}

#[async_trait::async_trait]
impl AddonBuilder for Collaborators {
    async fn build(
        &self,
        stack: &mut Stack,
        load_balancer: Option<&ResourceRef>,
        desired: &AddonConfig,
        previous: &[AddonMetadata],
    ) -> Result<Vec<AddonMetadata>> {
        self.enter(Component::Addons).await?;
        StackAddonBuilder::default()
            .build(stack, load_balancer, desired, previous)
            .await
    }
}
