use crate::{
    addon::AddonSpec,
    elbv2::{
        ListenerSpec, LoadBalancerSpec, SecurityGroupSpec, TargetGroupBindingSpec, TargetGroupSpec,
    },
    Error, NamespacedName,
};
use ahash::AHashMap as HashMap;
use serde::Serialize;
use std::fmt;

/// A graph of load balancer resources built for a single gateway.
///
/// Resources are keyed by `(kind, id)`. Resource IDs are assigned
/// deterministically by the builder that creates them so that the same input
/// always yields the same keys; the reconciler uses these keys to match
/// resources with their live counterparts across builds.
///
/// Resources of each kind iterate in insertion order. The stack does not
/// check references between resources: builders only reference resources
/// they have already registered.
#[derive(Clone, Debug, Serialize)]
pub struct Stack {
    id: NamespacedName,
    resources: Vec<Resource>,

    #[serde(skip)]
    index: HashMap<ResourceRef, usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Resource {
    pub id: ResourceId,
    #[serde(flatten)]
    pub spec: ResourceSpec,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResourceKind {
    LoadBalancer,
    SecurityGroup,
    Listener,
    TargetGroup,
    TargetGroupBinding,
    Addon,
}

/// A resource's identity within its kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourceId(String);

/// A stack-local handle to a registered resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: ResourceId,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "spec")]
pub enum ResourceSpec {
    LoadBalancer(LoadBalancerSpec),
    SecurityGroup(SecurityGroupSpec),
    Listener(ListenerSpec),
    TargetGroup(TargetGroupSpec),
    TargetGroupBinding(TargetGroupBindingSpec),
    Addon(AddonSpec),
}

// === impl Stack ===

impl Stack {
    pub fn new(id: NamespacedName) -> Self {
        Self {
            id,
            resources: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// The identity of the gateway this stack was built for.
    pub fn id(&self) -> &NamespacedName {
        &self.id
    }

    /// Registers a resource, returning a handle that other resources may use
    /// to reference it.
    ///
    /// Fails if a resource of the same kind is already registered with this
    /// ID.
    pub fn add_resource(
        &mut self,
        id: impl Into<ResourceId>,
        spec: impl Into<ResourceSpec>,
    ) -> Result<ResourceRef, Error> {
        use std::collections::hash_map::Entry;

        let spec = spec.into();
        let key = ResourceRef {
            kind: spec.kind(),
            id: id.into(),
        };
        match self.index.entry(key.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateResourceId {
                kind: key.kind,
                id: key.id,
            }),
            Entry::Vacant(entry) => {
                entry.insert(self.resources.len());
                self.resources.push(Resource {
                    id: key.id.clone(),
                    spec,
                });
                Ok(key)
            }
        }
    }

    pub fn get(&self, resource: &ResourceRef) -> Option<&ResourceSpec> {
        let idx = *self.index.get(resource)?;
        Some(&self.resources[idx].spec)
    }

    pub fn contains(&self, resource: &ResourceRef) -> bool {
        self.index.contains_key(resource)
    }

    /// Iterates over all resources of `kind` in the order they were
    /// registered.
    pub fn resources(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> + '_ {
        self.resources.iter().filter(move |r| r.spec.kind() == kind)
    }

    pub fn ids(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceId> + '_ {
        self.resources(kind).map(|r| &r.id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn load_balancer(&self) -> Option<(&ResourceId, &LoadBalancerSpec)> {
        self.resources.iter().find_map(|r| match &r.spec {
            ResourceSpec::LoadBalancer(spec) => Some((&r.id, spec)),
            _ => None,
        })
    }

    pub fn security_groups(&self) -> impl Iterator<Item = (&ResourceId, &SecurityGroupSpec)> + '_ {
        self.resources.iter().filter_map(|r| match &r.spec {
            ResourceSpec::SecurityGroup(spec) => Some((&r.id, spec)),
            _ => None,
        })
    }

    pub fn listeners(&self) -> impl Iterator<Item = (&ResourceId, &ListenerSpec)> + '_ {
        self.resources.iter().filter_map(|r| match &r.spec {
            ResourceSpec::Listener(spec) => Some((&r.id, spec)),
            _ => None,
        })
    }

    pub fn target_groups(&self) -> impl Iterator<Item = (&ResourceId, &TargetGroupSpec)> + '_ {
        self.resources.iter().filter_map(|r| match &r.spec {
            ResourceSpec::TargetGroup(spec) => Some((&r.id, spec)),
            _ => None,
        })
    }

    pub fn target_group_bindings(
        &self,
    ) -> impl Iterator<Item = (&ResourceId, &TargetGroupBindingSpec)> + '_ {
        self.resources.iter().filter_map(|r| match &r.spec {
            ResourceSpec::TargetGroupBinding(spec) => Some((&r.id, spec)),
            _ => None,
        })
    }

    pub fn addons(&self) -> impl Iterator<Item = (&ResourceId, &AddonSpec)> + '_ {
        self.resources.iter().filter_map(|r| match &r.spec {
            ResourceSpec::Addon(spec) => Some((&r.id, spec)),
            _ => None,
        })
    }
}

/// Two stacks are equal when they have the same identity and the same
/// resources registered in the same order.
impl PartialEq for Stack {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.resources == other.resources
    }
}

// === impl ResourceKind ===

impl ResourceKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LoadBalancer => "AWS::ElasticLoadBalancingV2::LoadBalancer",
            Self::SecurityGroup => "AWS::EC2::SecurityGroup",
            Self::Listener => "AWS::ElasticLoadBalancingV2::Listener",
            Self::TargetGroup => "AWS::ElasticLoadBalancingV2::TargetGroup",
            Self::TargetGroupBinding => "K8S::ElasticLoadBalancingV2::TargetGroupBinding",
            Self::Addon => "AWS::ElasticLoadBalancingV2::Addon",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// === impl ResourceId ===

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// === impl ResourceRef ===

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

// === impl ResourceSpec ===

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::LoadBalancer(_) => ResourceKind::LoadBalancer,
            Self::SecurityGroup(_) => ResourceKind::SecurityGroup,
            Self::Listener(_) => ResourceKind::Listener,
            Self::TargetGroup(_) => ResourceKind::TargetGroup,
            Self::TargetGroupBinding(_) => ResourceKind::TargetGroupBinding,
            Self::Addon(_) => ResourceKind::Addon,
        }
    }
}

impl From<LoadBalancerSpec> for ResourceSpec {
    fn from(spec: LoadBalancerSpec) -> Self {
        Self::LoadBalancer(spec)
    }
}

impl From<SecurityGroupSpec> for ResourceSpec {
    fn from(spec: SecurityGroupSpec) -> Self {
        Self::SecurityGroup(spec)
    }
}

impl From<ListenerSpec> for ResourceSpec {
    fn from(spec: ListenerSpec) -> Self {
        Self::Listener(spec)
    }
}

impl From<TargetGroupSpec> for ResourceSpec {
    fn from(spec: TargetGroupSpec) -> Self {
        Self::TargetGroup(spec)
    }
}

impl From<TargetGroupBindingSpec> for ResourceSpec {
    fn from(spec: TargetGroupBindingSpec) -> Self {
        Self::TargetGroupBinding(spec)
    }
}

impl From<AddonSpec> for ResourceSpec {
    fn from(spec: AddonSpec) -> Self {
        Self::Addon(spec)
    }
}
