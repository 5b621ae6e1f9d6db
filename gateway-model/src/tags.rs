use crate::BuilderConfig;
use ahash::AHashSet as HashSet;
use anyhow::{bail, Result};
use gateway_model_core::{route::BackendRef, NamespacedName};
use gateway_model_k8s_api::LoadBalancerConfigurationSpec;
use std::collections::BTreeMap;

/// Computes the tags applied to the resources of a stack.
pub trait TagHelper: Send + Sync {
    fn load_balancer_tags(
        &self,
        gateway: &NamespacedName,
        config: &LoadBalancerConfigurationSpec,
    ) -> Result<BTreeMap<String, String>>;

    fn target_group_tags(
        &self,
        gateway: &NamespacedName,
        config: &LoadBalancerConfigurationSpec,
        backend: &BackendRef,
    ) -> Result<BTreeMap<String, String>>;
}

/// Merges the controller's default tags with the tags a gateway's
/// configuration requests, and labels each resource with the objects it was
/// built from.
#[derive(Clone, Debug, Default)]
pub struct DefaultTagHelper {
    cluster_name: String,
    default_tags: BTreeMap<String, String>,
    external_managed_tags: HashSet<String>,
}

const CLUSTER_TAG: &str = "elbv2.k8s.aws/cluster";
const GATEWAY_NAMESPACE_TAG: &str = "gateway.k8s.aws/namespace";
const GATEWAY_NAME_TAG: &str = "gateway.k8s.aws/name";
const SERVICE_TAG: &str = "gateway.k8s.aws/service";
const SERVICE_PORT_TAG: &str = "gateway.k8s.aws/service-port";

// === impl DefaultTagHelper ===

impl DefaultTagHelper {
    pub fn new(config: &BuilderConfig) -> Self {
        Self {
            cluster_name: config.cluster_name.clone(),
            default_tags: config.default_tags.clone(),
            external_managed_tags: config.external_managed_tags.clone(),
        }
    }

    fn common_tags(
        &self,
        gateway: &NamespacedName,
        config: &LoadBalancerConfigurationSpec,
    ) -> Result<BTreeMap<String, String>> {
        let mut tags = BTreeMap::new();
        for (key, value) in config.tags.iter().flatten() {
            if self.external_managed_tags.contains(key) {
                bail!("tag {key} is managed externally on gateway {gateway}");
            }
            tags.insert(key.clone(), value.clone());
        }

        // Controller defaults take precedence over gateway tags.
        tags.extend(self.default_tags.clone());

        tags.insert(CLUSTER_TAG.to_string(), self.cluster_name.clone());
        tags.insert(
            GATEWAY_NAMESPACE_TAG.to_string(),
            gateway.namespace.clone(),
        );
        tags.insert(GATEWAY_NAME_TAG.to_string(), gateway.name.clone());
        Ok(tags)
    }
}

impl TagHelper for DefaultTagHelper {
    fn load_balancer_tags(
        &self,
        gateway: &NamespacedName,
        config: &LoadBalancerConfigurationSpec,
    ) -> Result<BTreeMap<String, String>> {
        self.common_tags(gateway, config)
    }

    fn target_group_tags(
        &self,
        gateway: &NamespacedName,
        config: &LoadBalancerConfigurationSpec,
        backend: &BackendRef,
    ) -> Result<BTreeMap<String, String>> {
        let mut tags = self.common_tags(gateway, config)?;
        tags.insert(SERVICE_TAG.to_string(), backend.service.to_string());
        tags.insert(SERVICE_PORT_TAG.to_string(), backend.port.to_string());
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;
    use std::num::NonZeroU16;

    fn mk_helper() -> DefaultTagHelper {
        DefaultTagHelper::new(&BuilderConfig {
            cluster_name: "test-cluster".to_string(),
            default_tags: btreemap! { "env".to_string() => "prod".to_string() },
            external_managed_tags: ["owner".to_string()].into_iter().collect(),
            ..Default::default()
        })
    }

    #[test]
    fn merges_default_and_gateway_tags() {
        let config = LoadBalancerConfigurationSpec {
            tags: Some(btreemap! {
                "env".to_string() => "dev".to_string(),
                "team".to_string() => "edge".to_string(),
            }),
            ..Default::default()
        };
        let gateway = NamespacedName::new("ns", "gw1");
        let backend = BackendRef::new(
            NamespacedName::new("ns", "svc"),
            NonZeroU16::new(8080).unwrap(),
        );

        let tags = mk_helper()
            .target_group_tags(&gateway, &config, &backend)
            .unwrap();
        assert_eq!(
            tags,
            btreemap! {
                CLUSTER_TAG.to_string() => "test-cluster".to_string(),
                "env".to_string() => "prod".to_string(),
                GATEWAY_NAME_TAG.to_string() => "gw1".to_string(),
                GATEWAY_NAMESPACE_TAG.to_string() => "ns".to_string(),
                SERVICE_TAG.to_string() => "ns/svc".to_string(),
                SERVICE_PORT_TAG.to_string() => "8080".to_string(),
                "team".to_string() => "edge".to_string(),
            }
        );
    }

    #[test]
    fn rejects_externally_managed_tags() {
        let config = LoadBalancerConfigurationSpec {
            tags: Some(btreemap! { "owner".to_string() => "me".to_string() }),
            ..Default::default()
        };
        let gateway = NamespacedName::new("ns", "gw1");
        assert!(mk_helper().load_balancer_tags(&gateway, &config).is_err());
    }
}
