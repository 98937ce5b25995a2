//! # Reply-Bus Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Broker, handler and responder helpers
//! └── integration/      # End-to-end flows over the in-process broker
//!     ├── request_flows.rs
//!     ├── races.rs
//!     └── connection.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p rpc-tests
//! cargo test -p rpc-tests integration::races
//! cargo bench -p rpc-tests
//! ```

pub mod fixtures;
pub mod integration;
