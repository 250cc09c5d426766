//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ProtocolVersion, ServerConfig, SupportedProtocolVersion};

use crate::config::TlsProtocol;

/// Error type for TLS configuration.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Certificate file not found: {0:?}")]
    CertificateNotFound(std::path::PathBuf),
    #[error("Private key file not found: {0:?}")]
    KeyNotFound(std::path::PathBuf),
    #[error("No certificates found in {0:?}")]
    EmptyCertificateChain(std::path::PathBuf),
    #[error("No private key found in {0:?}")]
    MissingKey(std::path::PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS error: {0}")]
    Rustls(#[from] rustls::Error),
}

impl TlsProtocol {
    fn supported_version(self) -> &'static SupportedProtocolVersion {
        match self {
            TlsProtocol::Tls12 => &rustls::version::TLS12,
            TlsProtocol::Tls13 => &rustls::version::TLS13,
        }
    }

    /// Map a negotiated rustls version back onto the configured enum.
    pub fn from_negotiated(version: ProtocolVersion) -> Option<Self> {
        match version {
            ProtocolVersion::TLSv1_2 => Some(TlsProtocol::Tls12),
            ProtocolVersion::TLSv1_3 => Some(TlsProtocol::Tls13),
            _ => None,
        }
    }
}

/// Load a rustls server configuration from certificate and key files,
/// restricted to the given protocol versions.
pub fn load_server_config(
    cert_path: &Path,
    key_path: &Path,
    protocols: &[TlsProtocol],
) -> Result<Arc<ServerConfig>, TlsError> {
    // Basic validation
    if !cert_path.exists() {
        return Err(TlsError::CertificateNotFound(cert_path.to_path_buf()));
    }
    if !key_path.exists() {
        return Err(TlsError::KeyNotFound(key_path.to_path_buf()));
    }

    let mut cert_reader = BufReader::new(File::open(cert_path)?);
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut cert_reader).collect::<Result<_, _>>()?;
    if certs.is_empty() {
        return Err(TlsError::EmptyCertificateChain(cert_path.to_path_buf()));
    }

    let mut key_reader = BufReader::new(File::open(key_path)?);
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| TlsError::MissingKey(key_path.to_path_buf()))?;

    build_server_config(certs, key, protocols)
}

/// Build a server configuration from already-parsed material.
pub fn build_server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    protocols: &[TlsProtocol],
) -> Result<Arc<ServerConfig>, TlsError> {
    let versions: Vec<&'static SupportedProtocolVersion> = protocols
        .iter()
        .map(|p| p.supported_version())
        .collect();

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_protocol_versions(&versions)?
    .with_no_client_auth()
    .with_single_cert(certs, key)?;

    Ok(Arc::new(config))
}
