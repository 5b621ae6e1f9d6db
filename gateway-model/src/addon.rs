use anyhow::Result;
use gateway_model_core::{
    addon::{AddonConfig, AddonKind, AddonMetadata, AddonSpec},
    ResourceRef, Stack, StringToken,
};
use gateway_model_k8s_api::LoadBalancerConfigurationSpec;
use tracing::debug;

/// Reconciles the add-ons attached to a load balancer.
#[async_trait::async_trait]
pub trait AddonBuilder: Send + Sync {
    /// Registers the add-on resources that realize `desired` and returns the
    /// add-on state to feed into the next build.
    ///
    /// `load_balancer` is `None` while the gateway is being deleted; `desired`
    /// is then empty.
    async fn build(
        &self,
        stack: &mut Stack,
        load_balancer: Option<&ResourceRef>,
        desired: &AddonConfig,
        previous: &[AddonMetadata],
    ) -> Result<Vec<AddonMetadata>>;
}

/// Registers add-ons as stack resources.
///
/// Previously enabled add-ons that are no longer desired are registered as
/// disabled so that the reconciler detaches them.
#[derive(Clone, Debug, Default)]
pub struct StackAddonBuilder(());

/// Derives the add-ons a configuration asks for, ignoring kinds that are not
/// `supported`.
pub fn desired_config(
    config: &LoadBalancerConfigurationSpec,
    supported: &[AddonKind],
) -> AddonConfig {
    let mut desired = AddonConfig {
        web_acl: config.waf_v2.as_ref().map(|waf| waf.web_acl.clone()),
        shield: config.shield_configuration.map_or(false, |s| s.enabled),
    };

    for kind in AddonKind::ALL {
        if desired.wants(kind) && !supported.contains(&kind) {
            debug!(%kind, "Ignoring unsupported add-on");
            match kind {
                AddonKind::Wafv2 => desired.web_acl = None,
                AddonKind::Shield => desired.shield = false,
            }
        }
    }
    desired
}

// === impl StackAddonBuilder ===

#[async_trait::async_trait]
impl AddonBuilder for StackAddonBuilder {
    async fn build(
        &self,
        stack: &mut Stack,
        load_balancer: Option<&ResourceRef>,
        desired: &AddonConfig,
        previous: &[AddonMetadata],
    ) -> Result<Vec<AddonMetadata>> {
        let load_balancer =
            load_balancer.map(|lb| StringToken::field(lb, StringToken::LOAD_BALANCER_ARN));

        let mut state = Vec::new();
        for kind in AddonKind::ALL {
            let enabled = load_balancer.is_some() && desired.wants(kind);
            let was_enabled = previous.iter().any(|md| md.kind == kind && md.enabled);
            if !enabled && !was_enabled {
                continue;
            }

            let web_acl = match kind {
                AddonKind::Wafv2 if enabled => desired.web_acl.clone(),
                _ => None,
            };
            stack.add_resource(
                kind.as_str(),
                AddonSpec {
                    kind,
                    load_balancer: load_balancer.clone(),
                    enabled,
                    web_acl,
                },
            )?;
            debug!(%kind, enabled, "Registered add-on");
            state.push(AddonMetadata { kind, enabled });
        }
        Ok(state)
    }
}
