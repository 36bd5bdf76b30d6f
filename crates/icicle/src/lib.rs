#![doc = include_str!("../README.md")]

mod clock;
mod error;
mod generator;
mod id;

pub use clock::*;
pub use error::*;
pub use generator::*;
pub use id::*;
