use crate::{config::Feature, name, tags::TagHelper, BuilderConfig};
use ahash::AHashMap as HashMap;
use gateway_model_core::{
    elbv2::{
        HealthCheck, IpAddressType, LoadBalancerType, Networking, NetworkingPort, NetworkingRule,
        Protocol, ProtocolVersion, TargetGroupBindingSpec, TargetGroupIpAddressType,
        TargetGroupSpec, TargetType,
    },
    route::{BackendRef, IpFamily, RouteDescriptor, RouteKind},
    Component, Error, NamespacedName, ResourceId, ResourceRef, Stack, StringToken,
};
use gateway_model_k8s_api::LoadBalancerConfigurationSpec;
use tracing::debug;

/// Builds target groups, and the bindings that attach them to Services.
pub struct TargetGroupBuilder<'b> {
    config: &'b BuilderConfig,
    tags: &'b dyn TagHelper,
}

/// The parts of a build that every target group shares.
#[derive(Copy, Clone)]
pub struct TargetGroupContext<'c> {
    pub gateway: &'c NamespacedName,
    pub config: &'c LoadBalancerConfigurationSpec,
    pub ip_address_type: IpAddressType,

    /// The backend security group token, when one was resolved.
    pub backend_sg: Option<&'c StringToken>,
}

/// A target group and its binding, not yet registered in a stack.
///
/// The binding's target group reference is left unresolved until the target
/// group is registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetGroupOutput {
    pub id: ResourceId,
    pub target_group: TargetGroupSpec,
    pub binding: TargetGroupBindingSpec,
}

/// Tracks the target groups registered during a build so that every backend
/// gets at most one group.
#[derive(Debug, Default)]
pub struct TargetGroupRegistry {
    registered: HashMap<ResourceId, ResourceRef>,
}

// === impl TargetGroupBuilder ===

impl<'b> TargetGroupBuilder<'b> {
    pub fn new(config: &'b BuilderConfig, tags: &'b dyn TagHelper) -> Self {
        Self { config, tags }
    }

    /// Returns a reference to the target group for `backend` of `route`,
    /// building and registering the group and its binding if this is the
    /// first time the backend is seen.
    pub fn target_group(
        &self,
        stack: &mut Stack,
        registry: &mut TargetGroupRegistry,
        cx: TargetGroupContext<'_>,
        route: &RouteDescriptor,
        backend: &BackendRef,
    ) -> Result<ResourceRef, Error> {
        let id = target_group_id(cx.gateway, route.kind, backend);
        if let Some(tg) = registry.registered.get(&id) {
            return Ok(tg.clone());
        }

        let output = self.build(cx, route, backend)?;
        registry.register(stack, output)
    }

    /// Builds the target group for `backend` of `route` without registering
    /// it.
    pub fn build(
        &self,
        cx: TargetGroupContext<'_>,
        route: &RouteDescriptor,
        backend: &BackendRef,
    ) -> Result<TargetGroupOutput, Error> {
        let id = target_group_id(cx.gateway, route.kind, backend);

        let target_type = self.config.default_target_type;
        let gates = &self.config.feature_gates;
        if target_type == TargetType::Ip && !gates.enabled(Feature::EnableIpTargetType) {
            return Err(Error::invalid_config(format!(
                "target group {id}: ip targets are disabled by feature gate {}",
                Feature::EnableIpTargetType
            )));
        }

        let ip_address_type = match backend.ip_family {
            IpFamily::Ipv4 => TargetGroupIpAddressType::Ipv4,
            IpFamily::Ipv6 if cx.ip_address_type.is_dual_stack() => TargetGroupIpAddressType::Ipv6,
            IpFamily::Ipv6 => {
                return Err(Error::invalid_config(format!(
                    "target group {id}: IPv6 backends require a dual-stack load balancer"
                )));
            }
        };

        let (protocol, protocol_version) = match self.config.load_balancer_type {
            LoadBalancerType::Application => {
                let version = match route.kind {
                    RouteKind::Grpc => ProtocolVersion::Grpc,
                    _ => ProtocolVersion::Http1,
                };
                (Protocol::Http, Some(version))
            }
            LoadBalancerType::Network => match route.kind {
                RouteKind::Udp => (Protocol::Udp, None),
                _ => (Protocol::Tcp, None),
            },
        };

        let tags = self
            .tags
            .target_group_tags(cx.gateway, cx.config, backend)
            .map_err(|error| Error::collaborator(Component::Tags, error))?;

        let name = name::generate(
            &backend.service.namespace,
            &backend.service.name,
            &[
                &self.config.cluster_name,
                &cx.gateway.to_string(),
                id.as_str(),
            ],
        );

        let target_group = TargetGroupSpec {
            name: name.clone(),
            target_type,
            protocol,
            protocol_version,
            port: backend.port,
            ip_address_type,
            health_check: health_check(self.config.load_balancer_type),
            tags,
        };

        let binding = TargetGroupBindingSpec {
            target_group_arn: StringToken::Unresolved,
            name,
            target_type,
            service: backend.service.clone(),
            service_port: backend.port,
            ip_address_type,
            vpc_id: self.config.vpc_id.clone(),
            networking: self.networking(cx, protocol, backend),
        };

        Ok(TargetGroupOutput {
            id,
            target_group,
            binding,
        })
    }

    fn networking(
        &self,
        cx: TargetGroupContext<'_>,
        protocol: Protocol,
        backend: &BackendRef,
    ) -> Option<Networking> {
        if !self.config.enable_backend_security_group {
            return None;
        }
        let from = cx.backend_sg?.clone();

        let protocol = match protocol {
            Protocol::Udp => Protocol::Udp,
            _ => Protocol::Tcp,
        };
        let port = if self.config.disable_restricted_sg_rules {
            None
        } else {
            Some(backend.port)
        };

        Some(Networking {
            ingress: vec![NetworkingRule {
                from: vec![from],
                ports: vec![NetworkingPort { protocol, port }],
            }],
        })
    }
}

/// Identifies the target group for `backend` as reached through routes of
/// `kind` on `gateway`.
pub fn target_group_id(
    gateway: &NamespacedName,
    kind: RouteKind,
    backend: &BackendRef,
) -> ResourceId {
    ResourceId::new(format!(
        "{gateway}:{kind}:{service}:{port}",
        service = backend.service,
        port = backend.port,
    ))
}

fn health_check(lb_type: LoadBalancerType) -> HealthCheck {
    match lb_type {
        LoadBalancerType::Application => HealthCheck {
            protocol: Protocol::Http,
            path: Some("/".to_string()),
            port: "traffic-port".to_string(),
            interval_seconds: 15,
            timeout_seconds: 5,
            healthy_threshold: 2,
            unhealthy_threshold: 2,
            matcher: Some("200".to_string()),
        },
        LoadBalancerType::Network => HealthCheck {
            protocol: Protocol::Tcp,
            path: None,
            port: "traffic-port".to_string(),
            interval_seconds: 10,
            timeout_seconds: 10,
            healthy_threshold: 3,
            unhealthy_threshold: 3,
            matcher: None,
        },
    }
}

// === impl TargetGroupRegistry ===

impl TargetGroupRegistry {
    /// Registers a target group, then its binding pointed at the registered
    /// group.
    pub fn register(
        &mut self,
        stack: &mut Stack,
        output: TargetGroupOutput,
    ) -> Result<ResourceRef, Error> {
        let TargetGroupOutput {
            id,
            target_group,
            mut binding,
        } = output;

        let tg = stack.add_resource(id.clone(), target_group)?;
        binding.resolve_target_group(&tg);
        stack.add_resource(id.clone(), binding)?;
        debug!(%id, "Registered target group");

        self.registered.insert(id, tg.clone());
        Ok(tg)
    }
}
