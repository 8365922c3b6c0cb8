//! # Ackwire
//!
//! WebSocket client and server that exchange typed JSON messages and
//! acknowledge every text message.
//!
//! A connection goes through three stages:
//!
//! 1. **Upgrade**: the HTTP upgrade completes the connection's handshake
//!    gate. No frame is acted on before that.
//! 2. **Dispatch**: every inbound frame is handled by a [`Dispatcher`].
//!    Text frames are decoded into a [`Message`]; a `TextMessage` is
//!    answered with an `AckTextMessage`, and a `DisconnectMessage` closes
//!    the connection.
//! 3. **Close**: either side sends a close frame, or the socket drops.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ackwire::prelude::*;
//!
//! # async fn demo() -> Result<(), AckwireError> {
//! let server = AckwireServer::builder().bind("127.0.0.1:8025").build().await?;
//! tokio::spawn(server.run());
//!
//! let mut client = AckwireClient::builder()
//!     .endpoint(Scheme::Ws, "127.0.0.1", 8025)
//!     .connect()
//!     .await?;
//! client.send(&Message::text("hello")).await?;
//! let ack = client.next_message().await;
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod gate;
mod handler;
pub mod logging;
pub mod registry;
pub mod server;
pub mod session;

pub use client::{AckwireClient, AckwireClientBuilder, ClientTls};
pub use dispatch::{Dispatcher, Inbound, Outcome, Role};
pub use error::AckwireError;
pub use gate::{GateState, HandshakeGate, HandshakeSignal};
pub use registry::{ConnectionInfo, ConnectionRegistry};
pub use server::{AckwireServer, AckwireServerBuilder, ServerTls};
pub use session::{Command, SessionDriver, SessionEnd};

/// Everything needed to run a server or client.
pub mod prelude {
    pub use crate::client::{AckwireClient, AckwireClientBuilder, ClientTls};
    pub use crate::error::AckwireError;
    pub use crate::server::{AckwireServer, AckwireServerBuilder, ServerTls};
    pub use crate::session::{SessionDriver, SessionEnd};

    pub use ackwire_protocol::{
        AckTextMessage, Codec, JsonCodec, Message, MessageKind, TextMessage,
    };
    pub use ackwire_transport::{CloseReason, Connection, Frame, Scheme};
}
