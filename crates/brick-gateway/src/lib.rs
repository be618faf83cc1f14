//! Brick Gateway - WebSocket chat server
//!
//! Accepts chat channels, binds each to a user via `join`, persists every
//! turn to a [`brick_session::MessageLog`], answers with a delayed
//! assistant reply and evicts channels that stop answering liveness
//! probes.

mod connection;
mod gateway;
mod router;
mod session;

pub use connection::{ConnectionError, ConnectionHandle, ConnectionPool, Outbound};
pub use gateway::{Gateway, GatewayConfig, GatewayError, GatewayStats};
pub use router::{ChatRouter, RouterSettings, SweepReport};
pub use session::{Session, SessionRegistry};
