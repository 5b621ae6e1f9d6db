use crate::{
    addon::{self, AddonBuilder, StackAddonBuilder},
    defaults,
    lifecycle::Lifecycle,
    listener::{ListenerBuilder, ListenerInput},
    load_balancer::{LoadBalancerInput, LoadBalancerSpecBuilder, LOAD_BALANCER_ID},
    resolvers::{self, SecretResolver, SecurityGroupResolver, SubnetResolver, SubnetSelection},
    tags::{DefaultTagHelper, TagHelper},
    target_group::TargetGroupBuilder,
    BuilderConfig, RoutesByPort,
};
use gateway_model_core::{
    addon::{AddonConfig, AddonMetadata},
    Component, Error, NamespacedName, ResourceRef, Stack,
};
use gateway_model_k8s_api::{gateway::Gateway, LoadBalancerConfigurationSpec, ResourceExt};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

/// Builds the stack of load balancer resources for a gateway.
///
/// A `StackBuilder` holds only immutable configuration and shared
/// collaborators, so builds for different gateways may run concurrently.
#[derive(Clone)]
pub struct StackBuilder {
    config: Arc<BuilderConfig>,
    subnets: Arc<dyn SubnetResolver>,
    security_groups: Arc<dyn SecurityGroupResolver>,
    addons: Arc<dyn AddonBuilder>,
    tags: Arc<dyn TagHelper>,
}

/// Everything a single build reads.
#[derive(Clone, Copy)]
pub struct BuildInput<'i> {
    pub gateway: &'i Gateway,
    pub config: &'i LoadBalancerConfigurationSpec,
    pub routes: &'i RoutesByPort,

    /// The add-on state returned by the previous build.
    pub addons: &'i [AddonMetadata],
    pub secrets: &'i dyn SecretResolver,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutput {
    pub stack: Stack,

    /// The load balancer, unless the gateway is being deleted.
    pub load_balancer: Option<ResourceRef>,

    /// The add-on state to pass to the next build.
    pub addons: Vec<AddonMetadata>,

    pub backend_sg_allocated: bool,

    /// Secrets referenced by the gateway's TLS listeners.
    pub secrets: Vec<NamespacedName>,
}

// === impl StackBuilder ===

impl StackBuilder {
    pub fn new(
        config: BuilderConfig,
        subnets: Arc<dyn SubnetResolver>,
        security_groups: Arc<dyn SecurityGroupResolver>,
    ) -> Self {
        let tags = Arc::new(DefaultTagHelper::new(&config));
        Self {
            config: Arc::new(config),
            subnets,
            security_groups,
            addons: Arc::new(StackAddonBuilder::default()),
            tags,
        }
    }

    pub fn with_addons(self, addons: Arc<dyn AddonBuilder>) -> Self {
        Self { addons, ..self }
    }

    /// Builds the stack for a gateway.
    ///
    /// The build stops at the first error and returns no stack. Collaborator
    /// calls race against `cancel`; if it fires first, the build fails with
    /// [`Error::Cancelled`].
    pub async fn build(
        &self,
        input: BuildInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<BuildOutput, Error> {
        let gateway = gateway_name(input.gateway)?;
        let span = info_span!("build", gateway = %gateway);
        self.build_stack(gateway, input, cancel)
            .instrument(span)
            .await
    }

    async fn build_stack(
        &self,
        gateway: NamespacedName,
        input: BuildInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<BuildOutput, Error> {
        let mut stack = Stack::new(gateway.clone());

        match Lifecycle::evaluate(input.gateway, input.config, input.addons) {
            Lifecycle::Active => {}
            Lifecycle::DeletionProtected => {
                return Err(Error::DeletionProtected { gateway });
            }
            Lifecycle::PreDelete => {
                info!("Detaching add-ons before deletion");
                let addons = self
                    .reconcile_addons(&mut stack, None, &AddonConfig::default(), input, cancel)
                    .await?;
                return Ok(BuildOutput::teardown(stack, addons));
            }
            Lifecycle::TornDown => {
                debug!("Gateway is deleted and nothing remains attached");
                return Ok(BuildOutput::teardown(stack, Vec::new()));
            }
        }

        let scheme = defaults::resolve(input.config.scheme.as_deref(), self.config.default_scheme)?;
        let ip_address_type = defaults::resolve(
            input.config.ip_address_type.as_deref(),
            self.config.default_ip_address_type,
        )?;
        debug!(%scheme, %ip_address_type, "Resolved load balancer addressing");

        let selection = match (
            input.config.load_balancer_subnets.as_deref(),
            input.config.load_balancer_subnets_selector.as_ref(),
        ) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid_config(
                    "loadBalancerSubnets and loadBalancerSubnetsSelector are mutually exclusive",
                ));
            }
            (Some(subnets), None) => SubnetSelection::Explicit(subnets),
            (None, Some(selector)) => SubnetSelection::Selector(selector),
            (None, None) => SubnetSelection::Discover,
        };
        let subnets = resolvers::call(
            cancel,
            Component::Subnets,
            self.subnets.resolve(selection, scheme, ip_address_type, &stack),
        )
        .await?;

        let security_groups = resolvers::call(
            cancel,
            Component::SecurityGroups,
            self.security_groups.resolve(
                &mut stack,
                input.config,
                input.gateway,
                input.routes,
                ip_address_type,
            ),
        )
        .await?;

        let lb_builder = LoadBalancerSpecBuilder::new(&self.config, &*self.tags);
        let lb_spec = lb_builder.build(LoadBalancerInput {
            gateway: &gateway,
            config: input.config,
            scheme,
            ip_address_type,
            subnets,
            security_groups: &security_groups,
        })?;
        let load_balancer = stack.add_resource(LOAD_BALANCER_ID, lb_spec)?;
        debug!(id = %load_balancer.id, "Registered load balancer");

        let target_groups = TargetGroupBuilder::new(&self.config, &*self.tags);
        let listeners = ListenerBuilder::new(&self.config, target_groups)
            .build(
                &mut stack,
                ListenerInput {
                    gateway: input.gateway,
                    gateway_name: &gateway,
                    config: input.config,
                    routes: input.routes,
                    load_balancer: &load_balancer,
                    ip_address_type,
                    backend_sg: security_groups.backend.as_ref(),
                    secrets: input.secrets,
                },
                cancel,
            )
            .await?;

        let desired = addon::desired_config(input.config, &self.config.supported_addons);
        let addons = self
            .reconcile_addons(&mut stack, Some(&load_balancer), &desired, input, cancel)
            .await?;

        info!(
            resources = stack.len(),
            listeners = listeners.listeners.len(),
            "Built stack"
        );
        Ok(BuildOutput {
            stack,
            load_balancer: Some(load_balancer),
            addons,
            backend_sg_allocated: security_groups.backend_allocated,
            secrets: listeners.secrets,
        })
    }

    async fn reconcile_addons(
        &self,
        stack: &mut Stack,
        load_balancer: Option<&ResourceRef>,
        desired: &AddonConfig,
        input: BuildInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<AddonMetadata>, Error> {
        resolvers::call(
            cancel,
            Component::Addons,
            self.addons.build(stack, load_balancer, desired, input.addons),
        )
        .await
    }
}

fn gateway_name(gateway: &Gateway) -> Result<NamespacedName, Error> {
    let namespace = gateway.namespace().ok_or_else(|| {
        Error::invalid_config(format!("gateway {} has no namespace", gateway.name_any()))
    })?;
    Ok(NamespacedName::new(namespace, gateway.name_any()))
}

// === impl BuildOutput ===

impl BuildOutput {
    fn teardown(stack: Stack, addons: Vec<AddonMetadata>) -> Self {
        Self {
            stack,
            load_balancer: None,
            addons,
            backend_sg_allocated: false,
            secrets: Vec::new(),
        }
    }
}
