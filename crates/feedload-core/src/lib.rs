//! Feedload Core - Core abstractions shared by the feed loading crates
//!
//! This crate provides the fundamental traits and types that the driver and
//! interchange crates depend on. It defines:
//!
//! - `Connection` - Trait for an open relational store handle
//! - `Statement` / `Params` / `Value` - Parameterized statements and their scalars
//! - `execute` - The statement executor used by every higher layer
//! - `BatchExecutor` - Runs many statements against one connection and waits for all of them
//! - `Identifier` - Validation and quoting of table/column names taken from feed files

mod batch;
mod connection;
mod error;
mod executor;
mod identifier;
mod types;

#[cfg(test)]
mod test_support;

pub use batch::*;
pub use connection::*;
pub use error::*;
pub use executor::*;
pub use identifier::*;
pub use types::*;
