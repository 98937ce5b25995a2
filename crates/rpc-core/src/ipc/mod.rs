//! Request dispatch and reply routing over a topic transport.

pub mod bus_adapter;
pub mod handler;
pub mod router;

pub use bus_adapter::{connect_bus, connect_options};
pub use handler::{RequestDispatcher, RequestOptions};
pub use router::{ResponseRouter, RouteOutcome};
