use crate::defaults;
use gateway_model_core::addon::AddonMetadata;
use gateway_model_k8s_api::{gateway::Gateway, LoadBalancerConfigurationSpec};

/// The state of a gateway's load balancer, recomputed on every build.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// The gateway is live; its complete stack is built.
    Active,

    /// The gateway is being deleted but its load balancer may not be.
    DeletionProtected,

    /// The gateway is being deleted and add-ons from a previous build must be
    /// detached before the load balancer goes away.
    PreDelete,

    /// The gateway is being deleted and nothing remains attached. The stack
    /// is empty.
    TornDown,
}

// === impl Lifecycle ===

impl Lifecycle {
    pub fn evaluate(
        gateway: &Gateway,
        config: &LoadBalancerConfigurationSpec,
        previous_addons: &[AddonMetadata],
    ) -> Self {
        if gateway.metadata.deletion_timestamp.is_none() {
            return Self::Active;
        }

        if defaults::deletion_protection_enabled(config) {
            return Self::DeletionProtected;
        }

        if previous_addons.is_empty() {
            Self::TornDown
        } else {
            Self::PreDelete
        }
    }
}
