//! TLS support for HTTP connections
//!
//! This module implements client-side TLS for the native engine's HTTPS
//! requests.
//!
//! # Architecture
//!
//! The TLS implementation uses the session operations abstraction pattern:
//!
//! 1. `TlsConfig` holds the OpenSSL context, SNI name and verification flag
//! 2. `TlsSessionOps` implements the `SessionOps` trait for encrypted I/O
//! 3. All HTTP code remains unchanged - it transparently uses TLS operations
//!
//! Verification uses the system trust store. With verification on, the
//! certificate must also match the SNI hostname.
//!
//! # Examples
//!
//! ```no_run
//! use hublot::http::tls::TlsConfig;
//! use hublot::http::HttpConnection;
//! use std::net::TcpStream;
//!
//! let tls_config = TlsConfig::client()
//!     .unwrap()
//!     .servername("example.com")
//!     .verify_peer(true)
//!     .build();
//!
//! let tcp_stream = TcpStream::connect("example.com:443").unwrap();
//! let tls_session = tls_config.connect(tcp_stream).unwrap();
//! let mut conn = HttpConnection::new(tls_session, None);
//! ```

pub mod config;
pub mod session;

pub use config::{ClientConfigBuilder, TlsConfig, TlsError};
pub use session::TlsSessionOps;
