#![doc = include_str!("../README.md")]

mod adapter;
mod error;
mod memory;

pub use adapter::*;
pub use error::*;
pub use memory::*;
