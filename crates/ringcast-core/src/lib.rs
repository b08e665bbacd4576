//! ringcast-core — shared types, wire format, and configuration.
//! All other ringcast crates depend on this one.

pub mod config;
pub mod message;
pub mod wire;

pub use message::{Message, NodeId, NodeIdError};
