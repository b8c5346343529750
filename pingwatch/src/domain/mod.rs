//! Domain types.

pub mod host;

pub use host::{Host, HostRegistry};
