//! End-to-end request/response flows over the in-process broker.

pub mod connection;
pub mod races;
pub mod request_flows;
