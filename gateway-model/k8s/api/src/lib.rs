#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cidr;
pub mod lb_config;

pub use self::{
    cidr::Cidr,
    lb_config::{LoadBalancerConfiguration, LoadBalancerConfigurationSpec},
};
pub use k8s_gateway_api as gateway;
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
pub use kube::{Resource, ResourceExt};
