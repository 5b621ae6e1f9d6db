use ahash::AHashSet as HashSet;
use gateway_model_core::{
    addon::AddonKind,
    elbv2::{IpAddressType, LoadBalancerType, Scheme, TargetType},
};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Controller-wide settings shared by every build.
///
/// A `BuilderConfig` is fixed when the [`StackBuilder`](crate::StackBuilder)
/// is constructed and is never modified afterwards.
#[derive(Clone, Debug)]
pub struct BuilderConfig {
    /// Names the cluster; mixed into generated resource names.
    pub cluster_name: String,

    pub vpc_id: String,

    /// The kind of load balancer this controller provisions.
    pub load_balancer_type: LoadBalancerType,

    pub default_scheme: Scheme,
    pub default_ip_address_type: IpAddressType,
    pub default_target_type: TargetType,

    /// The security policy for TLS listeners without an explicit policy.
    pub default_ssl_policy: String,

    /// Tag keys owned by other controllers. Gateways may not set them.
    pub external_managed_tags: HashSet<String>,

    /// Tags applied to every resource.
    pub default_tags: BTreeMap<String, String>,

    /// Whether target group bindings grant a shared backend security group
    /// access to targets.
    pub enable_backend_security_group: bool,

    /// Opens every port to the backend security group instead of just the
    /// target port.
    pub disable_restricted_sg_rules: bool,

    /// Certificate authorities that resolved TLS certificates must chain to.
    pub allowed_ca_arns: Vec<String>,

    pub feature_gates: FeatureGates,

    /// Add-on kinds this controller may attach. Desired add-ons of other
    /// kinds are ignored.
    pub supported_addons: Vec<AddonKind>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Allows a single rule to forward to several weighted target groups.
    WeightedTargetGroups,

    /// Allows `ip` target groups.
    EnableIpTargetType,
}

/// Toggles features on and off. Every feature is enabled unless explicitly
/// disabled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureGates {
    disabled: HashSet<Feature>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unknown feature gate: {0}")]
    UnknownFeature(String),

    #[error("expected `key=value`, got {0:?}")]
    MissingValue(String),

    #[error("invalid feature gate value {0:?}; expected true or false")]
    InvalidBool(String),
}

/// A `key=value,key=value` list of tags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tags(pub BTreeMap<String, String>);

// === impl BuilderConfig ===

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            cluster_name: "cluster".to_string(),
            vpc_id: String::new(),
            load_balancer_type: LoadBalancerType::Application,
            default_scheme: Scheme::Internal,
            default_ip_address_type: IpAddressType::Ipv4,
            default_target_type: TargetType::Instance,
            default_ssl_policy: "ELBSecurityPolicy-2016-08".to_string(),
            external_managed_tags: HashSet::default(),
            default_tags: BTreeMap::new(),
            enable_backend_security_group: false,
            disable_restricted_sg_rules: false,
            allowed_ca_arns: Vec::new(),
            feature_gates: FeatureGates::default(),
            supported_addons: AddonKind::ALL.to_vec(),
        }
    }
}

// === impl Feature ===

impl Feature {
    pub const ALL: [Feature; 2] = [Self::WeightedTargetGroups, Self::EnableIpTargetType];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WeightedTargetGroups => "WeightedTargetGroups",
            Self::EnableIpTargetType => "EnableIPTargetType",
        }
    }
}

impl FromStr for Feature {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ParseError::UnknownFeature(s.to_string()))
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// === impl FeatureGates ===

impl FeatureGates {
    pub fn enabled(&self, feature: Feature) -> bool {
        !self.disabled.contains(&feature)
    }

    pub fn set(&mut self, feature: Feature, enabled: bool) {
        if enabled {
            self.disabled.remove(&feature);
        } else {
            self.disabled.insert(feature);
        }
    }

    pub fn with(mut self, feature: Feature, enabled: bool) -> Self {
        self.set(feature, enabled);
        self
    }
}

/// Parses `Feature=bool` pairs separated by commas, e.g.
/// `WeightedTargetGroups=false,EnableIPTargetType=true`.
impl FromStr for FeatureGates {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut gates = Self::default();
        for (key, value) in parse_pairs(s)? {
            let enabled = value
                .parse::<bool>()
                .map_err(|_| ParseError::InvalidBool(value.to_string()))?;
            gates.set(key.parse()?, enabled);
        }
        Ok(gates)
    }
}

// === impl Tags ===

impl FromStr for Tags {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tags = parse_pairs(s)?
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ok(Self(tags))
    }
}

fn parse_pairs(s: &str) -> Result<impl Iterator<Item = (&str, &str)>, ParseError> {
    let pairs = s
        .split(',')
        .map(str::trim)
        .filter(|kv| !kv.is_empty())
        .map(|kv| {
            kv.split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| ParseError::MissingValue(kv.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pairs.into_iter())
}
