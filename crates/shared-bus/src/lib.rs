//! # Shared Bus - In-Process Topic Broker
//!
//! A small publish/subscribe broker that behaves like an MQTT v5 server
//! living inside the process:
//!
//! - Clients `connect()` with an optional username/password and a client id
//! - Topics are `/`-separated levels; filters support `+` and `#` wildcards
//! - Messages carry properties (`correlation_data`, `response_topic`, ...)
//! - Inbound messages are dispatched to per-filter callbacks on the client
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  BusClient A │                    │  BusClient B │
//! │              │    publish()       │              │
//! │              │ ──────┐            │  on_message  │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │InMemoryBroker│          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! The broker gives no delivery guarantee beyond what `tokio::sync::broadcast`
//! provides: a lagging subscriber loses the oldest messages.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod client;
pub mod message;
pub mod subscriber;
pub mod topic;

// Re-export main types
pub use broker::{ConnectError, ConnectOptions, InMemoryBroker, MessagePublisher, ReasonCode};
pub use client::{BusClient, ClientError, MessageHandler};
pub use message::{BusMessage, MessageProperties, QoS};
pub use subscriber::{MessageStream, Subscription};
pub use topic::{validate_topic_name, TopicError, TopicFilter};

/// Maximum messages to buffer per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Topic level separator.
pub const TOPIC_SEPARATOR: char = '/';
