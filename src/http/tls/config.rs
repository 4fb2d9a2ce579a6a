//! TLS configuration
//!
//! This module provides the client-side TLS configuration builder.

use openssl::ssl::{SslContext, SslContextBuilder, SslMethod, SslVerifyMode, SslVersion};

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
}

impl From<TlsError> for crate::http::Error {
    fn from(err: TlsError) -> Self {
        match err {
            TlsError::Io(e) => crate::http::Error::Io(e),
            other => crate::http::Error::Tls(other.to_string()),
        }
    }
}

/// TLS configuration (immutable after building)
#[derive(Clone)]
pub struct TlsConfig {
    pub(crate) ctx: SslContext,
    pub(crate) servername: Option<String>,
    pub(crate) verify_peer: bool,
}

impl TlsConfig {
    /// Create a new client configuration builder
    pub fn client() -> Result<ClientConfigBuilder, TlsError> {
        ClientConfigBuilder::new()
    }

    /// Connect to a server with TLS
    pub fn connect(&self, stream: std::net::TcpStream) -> Result<super::TlsSessionOps, TlsError> {
        super::session::TlsSessionOps::connect(stream, self)
    }
}

/// Client configuration builder
pub struct ClientConfigBuilder {
    ctx_builder: SslContextBuilder,
    servername: Option<String>,
    verify_peer: bool,
}

impl ClientConfigBuilder {
    fn new() -> Result<Self, TlsError> {
        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_client())?;
        ctx_builder.set_min_proto_version(Some(SslVersion::TLS1_2))?;
        ctx_builder.set_default_verify_paths()?;
        ctx_builder.set_verify(SslVerifyMode::PEER);

        Ok(ClientConfigBuilder {
            ctx_builder,
            servername: None,
            verify_peer: true,
        })
    }

    /// Set SNI servername, also checked against the certificate when verifying
    pub fn servername(mut self, name: impl Into<String>) -> Self {
        self.servername = Some(name.into());
        self
    }

    /// Enable/disable peer certificate verification
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        if verify {
            self.ctx_builder.set_verify(SslVerifyMode::PEER);
        } else {
            self.ctx_builder.set_verify(SslVerifyMode::NONE);
        }
        self
    }

    /// Build the TLS configuration
    pub fn build(self) -> TlsConfig {
        TlsConfig {
            ctx: self.ctx_builder.build(),
            servername: self.servername,
            verify_peer: self.verify_peer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builder() {
        let config = TlsConfig::client()
            .unwrap()
            .servername("example.com")
            .verify_peer(false)
            .build();
        assert_eq!(config.servername.as_deref(), Some("example.com"));
        assert!(!config.verify_peer);
    }
}
