//! # stomp-relay
//!
//! Bidirectional STOMP bridge between client transport sessions and a
//! message broker.
//!
//! Each client session gets its own TCP leg to the broker. The bridge
//! decodes the client's STOMP stream, opens the broker leg on CONNECT,
//! forwards frames once both sides are up, and ships broker frames back
//! through the client's transport.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): STOMP wire codec with incremental decode
//! - **Sessions** ([`session`]): per-client rendezvous state machine
//! - **Inbound** ([`inbound`]): client frames toward the broker
//! - **Outbound** ([`outbound`]): broker frames toward the client
//! - **Delivery** ([`delivery`]): per-session client-bound queues
//! - **Bridge** ([`bridge`]): builder and runtime facade tying it together
//!
//! ## Example
//!
//! ```ignore
//! use stomp_relay::RelayBridge;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = RelayBridge::builder().build();
//!
//!     bridge.session_started(transport).await;
//!     bridge.on_data("session-1", bytes_from_client).await?;
//!     // ... on disconnect:
//!     bridge.session_ended("session-1").await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod convert;
pub mod delivery;
pub mod error;
pub mod inbound;
pub mod message;
pub mod outbound;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;
pub mod writer;

pub use bridge::{RelayBridge, RelayBridgeBuilder};
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use message::{ClientBound, Payload, SessionMessage};
pub use session::SessionState;
pub use transport::{BrokerConnector, ClientTransport, CloseReason, UserRegistry};
