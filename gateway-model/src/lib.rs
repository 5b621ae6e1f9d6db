#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod addon;
mod args;
mod builder;
pub mod config;
pub mod defaults;
pub mod lifecycle;
pub mod listener;
pub mod load_balancer;
mod name;
pub mod precedence;
pub mod resolvers;
pub mod routes;
pub mod tags;
pub mod target_group;

#[cfg(test)]
mod tests;

pub use self::{
    args::Args,
    builder::{BuildInput, BuildOutput, StackBuilder},
    config::BuilderConfig,
};
pub use gateway_model_k8s_api as k8s;

use gateway_model_core::route::RouteDescriptor;
use std::{collections::BTreeMap, num::NonZeroU16};

/// The routes attached to each of a gateway's ports.
pub type RoutesByPort = BTreeMap<NonZeroU16, Vec<RouteDescriptor>>;
