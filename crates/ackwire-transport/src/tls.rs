//! TLS material for `wss://` endpoints.
//!
//! Provides:
//! - Server certificate chain and key loading from PEM files
//! - Self-signed certificate generation for local development
//! - Client trust roots loaded from a PEM bundle

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls_pemfile::{certs, private_key};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};

pub use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::TransportError;

/// Hosts covered by a generated development certificate.
pub const DEV_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// A freshly generated self-signed certificate.
pub struct SelfSigned {
    pub acceptor: TlsAcceptor,
    /// PEM of the certificate, to be trusted by clients.
    pub cert_pem: String,
}

fn tls_err(context: &str, err: impl std::fmt::Display) -> TransportError {
    TransportError::Tls(format!("{context}: {err}"))
}

fn read_certs(
    mut reader: impl std::io::BufRead,
    origin: &str,
) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let chain = certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_err(&format!("failed to parse certificates in {origin}"), e))?;
    if chain.is_empty() {
        return Err(TransportError::Tls(format!("no certificates found in {origin}")));
    }
    Ok(chain)
}

fn read_key(
    mut reader: impl std::io::BufRead,
    origin: &str,
) -> Result<PrivateKeyDer<'static>, TransportError> {
    private_key(&mut reader)
        .map_err(|e| tls_err(&format!("failed to parse private key in {origin}"), e))?
        .ok_or_else(|| TransportError::Tls(format!("no private key found in {origin}")))
}

fn open(path: &Path) -> Result<BufReader<File>, TransportError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| tls_err(&format!("failed to open {}", path.display()), e))
}

fn acceptor(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<TlsAcceptor, TransportError> {
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(|e| tls_err("failed to build server TLS configuration", e))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Builds a TLS acceptor from a PEM certificate chain and private key.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TransportError> {
    let chain = read_certs(open(cert_path)?, &cert_path.display().to_string())?;
    let key = read_key(open(key_path)?, &key_path.display().to_string())?;
    acceptor(chain, key)
}

/// Generates a self-signed certificate for [`DEV_HOSTS`].
///
/// Clients will not trust it unless they are handed `cert_pem`.
pub fn self_signed_acceptor() -> Result<SelfSigned, TransportError> {
    let hosts: Vec<String> = DEV_HOSTS.iter().map(|h| h.to_string()).collect();
    let certified = rcgen::generate_simple_self_signed(hosts)
        .map_err(|e| tls_err("failed to generate self-signed certificate", e))?;

    let cert_pem = certified.cert.pem();
    let key_pem = certified.key_pair.serialize_pem();

    let chain = read_certs(cert_pem.as_bytes(), "generated certificate")?;
    let key = read_key(key_pem.as_bytes(), "generated key")?;

    tracing::warn!(
        hosts = ?DEV_HOSTS,
        "using a generated self-signed certificate; clients must trust it explicitly"
    );
    Ok(SelfSigned {
        acceptor: acceptor(chain, key)?,
        cert_pem,
    })
}

/// Builds a TLS connector that trusts exactly the certificates in `pem`.
pub fn connector_from_pem(pem: &[u8]) -> Result<TlsConnector, TransportError> {
    let mut roots = RootCertStore::empty();
    for cert in read_certs(pem, "trust bundle")? {
        roots
            .add(cert)
            .map_err(|e| tls_err("rejected trust anchor", e))?;
    }
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Builds a TLS connector from a PEM trust bundle on disk.
pub fn load_connector(ca_path: &Path) -> Result<TlsConnector, TransportError> {
    let pem = std::fs::read(ca_path)
        .map_err(|e| tls_err(&format!("failed to read {}", ca_path.display()), e))?;
    connector_from_pem(&pem)
}
