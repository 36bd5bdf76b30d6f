#![doc = include_str!("../README.md")]

mod common;

pub use common::*;

/// Generated protocol bindings for the `snowflake` package.
pub mod proto {
    tonic::include_proto!("snowflake");
}

// Public re-export so downstream crates can access `icicle` via
// `icicle_tonic_core::icicle`
pub use icicle;
