//! Auxiliary resources attached to a load balancer.

use crate::{Error, StringToken};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddonKind {
    #[serde(rename = "WAFv2")]
    Wafv2,
    #[serde(rename = "Shield")]
    Shield,
}

/// Records an add-on's state after a build. The previous build's metadata is
/// fed into the next one so that add-ons that are no longer desired can be
/// detached.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddonMetadata {
    pub kind: AddonKind,
    pub enabled: bool,
}

/// The add-ons a load balancer should have.
///
/// The default value desires nothing and is used to tear down add-ons while
/// a gateway is being deleted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddonConfig {
    pub web_acl: Option<String>,
    pub shield: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonSpec {
    pub kind: AddonKind,
    pub load_balancer: Option<StringToken>,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_acl: Option<String>,
}

// === impl AddonKind ===

impl AddonKind {
    pub const ALL: [AddonKind; 2] = [AddonKind::Wafv2, AddonKind::Shield];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Wafv2 => "WAFv2",
            Self::Shield => "Shield",
        }
    }
}

impl fmt::Display for AddonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl FromStr for AddonKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::invalid_enum("addon", s))
    }
}

// === impl AddonConfig ===

impl AddonConfig {
    pub fn wants(&self, kind: AddonKind) -> bool {
        match kind {
            AddonKind::Wafv2 => self.web_acl.is_some(),
            AddonKind::Shield => self.shield,
        }
    }
}
