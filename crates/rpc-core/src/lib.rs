//! Correlated request/response over topic-based publish/subscribe.
//!
//! A caller publishes a request and waits for the reply that carries the
//! same correlation id, or for a timeout or cancellation, whichever comes
//! first.
//!
//! # Architecture
//!
//! ```text
//!   caller ──request()──► RequestDispatcher ──publish──► Transport ──► responder
//!                              │    ▲                                     │
//!                      register│    │oneshot                              │
//!                              ▼    │                                     │
//!                       CorrelationRegistry ◄──take_and_remove── ResponseRouter
//!                                                                   ▲
//!                                    "{client_id}/responses" ───────┘
//! ```
//!
//! - The registry maps correlation ids to single-use reply slots.
//! - The dispatcher registers a slot, publishes, and races reply, timeout
//!   and cancellation. Removing the registry entry decides the race.
//! - The router is the inbound callback for the reply topic; it delivers
//!   each reply at most once and drops everything it cannot match.
//!
//! # Usage
//!
//! ```ignore
//! use rpc_core::{RequestHandler, RpcConfig};
//! use shared_bus::InMemoryBroker;
//!
//! let broker = Arc::new(InMemoryBroker::new());
//! let handler = RequestHandler::connect(&broker, &RpcConfig::default()).await?;
//! let reply = handler.request_payload("services/echo", "ping").await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod ipc;
pub mod ports;
pub mod service;

pub use domain::{
    cancel_pair, deadline_after, reply_to, reply_topic_for, CancelCause, CancelSignal,
    CancelSource, ConfigError, ConnectionError, CorrelationId, CorrelationRegistry, Message,
    MessageProperties, QoS, RegistryStats, ReplySlot, RequestConfig, RpcConfig, RpcError, RpcResult, StatsSnapshot,
    TransportConfig, TransportError,
};
pub use ipc::{connect_bus, RequestDispatcher, RequestOptions, ResponseRouter, RouteOutcome};
pub use ports::{InboundHandler, Transport};
pub use service::RequestHandler;
