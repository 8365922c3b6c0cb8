//! Command-line arguments for the server and client binaries.
//!
//! Parsing happens before any socket is opened; every problem surfaces as
//! [`AckwireError::Argument`].

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use ackwire_protocol::JsonCodec;
use ackwire_transport::Scheme;
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};

use crate::client::{AckwireClientBuilder, ClientTls};
use crate::server::{AckwireServerBuilder, ServerTls};
use crate::AckwireError;

/// Where the server writes its generated certificate.
pub const DEV_CERT_FILE: &str = "ackwire-dev-cert.pem";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum Protocol {
    Ws,
    Wss,
}

impl From<Protocol> for Scheme {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Ws => Scheme::Ws,
            Protocol::Wss => Scheme::Wss,
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Parser)]
#[command(
    name = "ackwire-client",
    version,
    about = "Connect to an ackwire server and send one message per input line"
)]
pub struct ClientArgs {
    /// WS or WSS (case-insensitive)
    #[arg(value_enum, ignore_case = true)]
    pub protocol: Protocol,
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PEM bundle of certificates to trust (required for WSS)
    #[arg(long, value_name = "PATH", env = "ACKWIRE_CA")]
    pub ca: Option<PathBuf>,
    /// Request path of the WebSocket endpoint
    #[arg(long, default_value = "/")]
    pub path: String,
    /// Seconds to wait for the upgrade to complete
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub handshake_timeout: u64,
    /// Pretty-print outgoing JSON
    #[arg(long)]
    pub pretty: bool,
}

impl ClientArgs {
    pub fn scheme(&self) -> Scheme {
        self.protocol.into()
    }

    /// Validates cross-argument rules and builds the client builder.
    pub fn into_builder(self) -> Result<AckwireClientBuilder, AckwireError> {
        let tls = match (self.protocol, self.ca) {
            (Protocol::Wss, None) => {
                return Err(AckwireError::Argument(
                    "WSS requires --ca <PATH> with the certificates to trust".into(),
                ));
            }
            (Protocol::Wss, Some(ca)) => ClientTls::CaFile(ca),
            (Protocol::Ws, _) => ClientTls::Off,
        };
        if self.handshake_timeout == 0 {
            return Err(AckwireError::Argument(
                "--handshake-timeout must be at least 1 second".into(),
            ));
        }

        let codec = if self.pretty {
            JsonCodec::pretty()
        } else {
            JsonCodec::default()
        };

        Ok(AckwireClientBuilder::new()
            .endpoint(self.protocol.into(), self.host, self.port)
            .path(self.path)
            .tls(tls)
            .handshake_timeout(Duration::from_secs(self.handshake_timeout))
            .codec(codec))
    }
}

// ── Server ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Parser)]
#[command(
    name = "ackwire-server",
    version,
    about = "Accept WebSocket connections and acknowledge every text message"
)]
pub struct ServerArgs {
    /// WS or WSS (case-insensitive)
    #[arg(value_enum, ignore_case = true)]
    pub protocol: Protocol,
    /// Port to listen on
    pub port: u16,
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,
    /// PEM certificate chain (WSS)
    #[arg(long, value_name = "PATH", requires = "key", env = "ACKWIRE_CERT")]
    pub cert: Option<PathBuf>,
    /// PEM private key (WSS)
    #[arg(long, value_name = "PATH", requires = "cert", env = "ACKWIRE_KEY")]
    pub key: Option<PathBuf>,
    /// Request path of the WebSocket endpoint
    #[arg(long, default_value = "/")]
    pub path: String,
    /// Seconds a new connection has to send its upgrade request
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub handshake_timeout: u64,
    /// Pretty-print outgoing JSON
    #[arg(long)]
    pub pretty: bool,
}

impl ServerArgs {
    pub fn scheme(&self) -> Scheme {
        self.protocol.into()
    }

    /// Validates cross-argument rules and builds the server builder.
    ///
    /// `WSS` without `--cert`/`--key` runs on a generated certificate,
    /// written to [`DEV_CERT_FILE`].
    pub fn into_builder(self) -> Result<AckwireServerBuilder, AckwireError> {
        let tls = match (self.protocol, self.cert, self.key) {
            (Protocol::Ws, None, None) => ServerTls::Off,
            (Protocol::Ws, _, _) => {
                return Err(AckwireError::Argument(
                    "--cert/--key only apply to WSS".into(),
                ));
            }
            (Protocol::Wss, Some(cert), Some(key)) => ServerTls::Pem { cert, key },
            (Protocol::Wss, None, None) => ServerTls::SelfSigned {
                export: Some(PathBuf::from(DEV_CERT_FILE)),
            },
            (Protocol::Wss, _, _) => {
                return Err(AckwireError::Argument(
                    "--cert and --key must be given together".into(),
                ));
            }
        };
        if !self.path.starts_with('/') {
            return Err(AckwireError::Argument(format!(
                "--path must start with '/', got {:?}",
                self.path
            )));
        }
        if self.handshake_timeout == 0 {
            return Err(AckwireError::Argument(
                "--handshake-timeout must be at least 1 second".into(),
            ));
        }

        let codec = if self.pretty {
            JsonCodec::pretty()
        } else {
            JsonCodec::default()
        };

        Ok(AckwireServerBuilder::new()
            .bind(format!("{}:{}", self.bind, self.port))
            .path(self.path)
            .tls(tls)
            .handshake_timeout(Duration::from_secs(self.handshake_timeout))
            .codec(codec))
    }
}

/// Parses `args` (program name first) into `A`.
///
/// `--help` and `--version` print and exit the process, as clap does.
pub fn parse<A, I, T>(args: I) -> Result<A, AckwireError>
where
    A: Parser,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    A::try_parse_from(args).map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
        _ => AckwireError::Argument(e.render().to_string().trim_end().to_string()),
    })
}
