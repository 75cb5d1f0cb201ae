//! Swarmgate Broker Core
//!
//! The trust boundary itself: every AE-to-mesh event passes through the emit
//! checkpoint here, and every streaming subscription passes the subscribe
//! gate. The `BrokerContext` is the single explicit state container built at
//! startup and handed to every handler; components never reach back into
//! routes.

pub mod context;
pub mod pipeline;
pub mod subscribe;
pub mod transport;

pub use context::BrokerContext;
pub use pipeline::{emit, EmitReceipt};
pub use subscribe::{authorize_subscribe, SubscribeGrant};
pub use transport::{LocalRelayTransport, MeshTransport, TransportError};
