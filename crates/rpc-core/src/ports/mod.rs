//! Ports the core depends on.

pub mod outbound;

pub use outbound::{InboundHandler, Transport};
