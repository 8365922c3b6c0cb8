//! Transport-level frame kinds.

use std::fmt;

/// Status code and human-readable reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    /// Normal closure (1000).
    pub const NORMAL: u16 = 1000;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// One WebSocket frame, as seen by the protocol core.
///
/// Fragmentation and masking are already handled below this layer, so a
/// `Text` frame always carries a complete UTF-8 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// `None` when the peer closed without a status code.
    Close(Option<CloseReason>),
    /// A frame kind the transport could not classify.
    Unrecognized,
}

impl Frame {
    /// Short name of the frame kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close(_) => "close",
            Frame::Unrecognized => "unrecognized",
        }
    }
}

/// The HTTP answer to a WebSocket upgrade request.
///
/// This is the only handshake artifact the core sees: a status code and,
/// on rejection, the reason the peer gave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeResponse {
    pub status: u16,
    pub reason: Option<String>,
}

impl UpgradeResponse {
    /// 101 Switching Protocols.
    pub const SWITCHING_PROTOCOLS: u16 = 101;

    /// A successful upgrade.
    pub fn switching_protocols() -> Self {
        Self {
            status: Self::SWITCHING_PROTOCOLS,
            reason: None,
        }
    }

    /// A rejected upgrade with the given HTTP status.
    pub fn rejected(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Self::SWITCHING_PROTOCOLS
    }
}

impl fmt::Display for UpgradeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "HTTP {} ({reason})", self.status),
            None => write!(f, "HTTP {}", self.status),
        }
    }
}
