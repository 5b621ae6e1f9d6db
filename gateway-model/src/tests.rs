//! Tests that exercise complete builds.

pub(crate) mod fakes;

mod build;
