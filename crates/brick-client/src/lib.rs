//! Brick Client - chat widget channel
//!
//! [`ChannelController`] drives one widget's connection to the gateway and
//! exposes `{connected, messages, typing}` as a watchable [`ChatView`].

pub mod controller;
pub mod error;
pub mod origin;
pub mod transport;

pub use controller::{ChannelController, ChannelPhase, ChatView, ControllerSettings};
pub use error::{ClientError, Result};
pub use origin::{channel_url, CHANNEL_PATH};
pub use transport::{Connector, TransportEvent, TransportPair, WsConnector};
