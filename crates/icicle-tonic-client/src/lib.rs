#![doc = include_str!("../README.md")]

mod error;
mod ping;
mod pool;
mod worker;

pub use error::*;
pub use pool::*;
pub use worker::*;
