use gateway_model_core::Error;
use gateway_model_k8s_api::LoadBalancerConfigurationSpec;
use std::str::FromStr;
use tracing::warn;

/// Resolves a load balancer property from an optional explicit value.
///
/// Absent values resolve to `default`. Explicit values must name one of the
/// property's recognized values; anything else fails with
/// [`Error::InvalidEnum`].
pub fn resolve<T>(explicit: Option<&str>, default: T) -> Result<T, Error>
where
    T: FromStr<Err = Error>,
{
    explicit.map_or(Ok(default), str::parse)
}

/// Indicates whether the configuration enables load balancer deletion
/// protection.
///
/// Only the exact string `true` enables protection. Values that are not
/// booleans are logged and treated as disabled.
pub fn deletion_protection_enabled(config: &LoadBalancerConfigurationSpec) -> bool {
    let key = LoadBalancerConfigurationSpec::DELETION_PROTECTION_ATTRIBUTE;
    match config.attribute(key).map(str::parse::<bool>) {
        None => false,
        Some(Ok(enabled)) => enabled,
        Some(Err(error)) => {
            warn!(attribute = %key, %error, "Ignoring invalid load balancer attribute");
            false
        }
    }
}
