//! Service configuration.

use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8080;

/// Configuration for a [`crate::service::Service`].
///
/// Endpoints are derived from what is set: a UNIX socket path adds the
/// local endpoint; a host or port adds the network endpoint, HTTPS when
/// both certificate paths are present, plain HTTP otherwise. The two
/// network schemes are never served at the same time; the UNIX socket can
/// always run alongside either.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Path of the local UNIX socket. Absent means no local endpoint.
    pub unix_socket_path: Option<PathBuf>,
    /// Group name owning the UNIX socket (mode is always 0660).
    pub unix_socket_owner: Option<String>,
    /// PEM server certificate; auto-generated at this path when missing.
    pub server_cert_path: Option<PathBuf>,
    /// PEM server private key; auto-generated at this path when missing.
    pub server_key_path: Option<PathBuf>,
    /// Optional PEM CA bundle. When set, clients must present a
    /// CA-signed certificate.
    pub ca_path: Option<PathBuf>,
    /// Bind address. Empty means all interfaces.
    pub host: String,
    /// TCP port. `None` selects the default (8080); `Some(0)` asks the OS
    /// for an ephemeral port.
    pub port: Option<u16>,
    /// Capacity of the operations queue. Zero with a zero
    /// `max_concurrent_operations` disables the pool entirely; zero with a
    /// pool enabled selects the default (100).
    pub max_queued_operations: usize,
    /// Size of the worker pool. Zero selects the default (10) when the
    /// pool is enabled.
    pub max_concurrent_operations: usize,
}

impl ServiceConfig {
    /// Whether asynchronous work goes through the bounded pool. With the
    /// pool disabled every operation runs on its own task, unbounded.
    #[must_use]
    pub fn pool_enabled(&self) -> bool {
        self.max_queued_operations > 0 || self.max_concurrent_operations > 0
    }

    /// Whether a network (TCP) endpoint is configured at all.
    #[must_use]
    pub fn network_enabled(&self) -> bool {
        !self.host.is_empty() || self.port.is_some()
    }

    /// Whether the network endpoint uses TLS.
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        self.server_cert_path.is_some() && self.server_key_path.is_some()
    }

    /// Bind address for the network endpoint.
    #[must_use]
    pub fn server_address(&self) -> String {
        let host = if self.host.is_empty() {
            "0.0.0.0"
        } else {
            &self.host
        };
        format!("{host}:{}", self.port.unwrap_or(DEFAULT_PORT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_everything() {
        let config = ServiceConfig::default();
        assert!(!config.pool_enabled());
        assert!(!config.network_enabled());
        assert!(!config.tls_enabled());
        assert!(config.unix_socket_path.is_none());
    }

    #[test]
    fn pool_enabled_by_either_limit() {
        let config = ServiceConfig {
            max_queued_operations: 5,
            ..ServiceConfig::default()
        };
        assert!(config.pool_enabled());

        let config = ServiceConfig {
            max_concurrent_operations: 2,
            ..ServiceConfig::default()
        };
        assert!(config.pool_enabled());
    }

    #[test]
    fn server_address_defaults() {
        let config = ServiceConfig {
            port: Some(9000),
            ..ServiceConfig::default()
        };
        assert_eq!(config.server_address(), "0.0.0.0:9000");

        let config = ServiceConfig {
            host: "127.0.0.1".to_string(),
            ..ServiceConfig::default()
        };
        assert_eq!(config.server_address(), "127.0.0.1:8080");
    }

    #[test]
    fn tls_requires_both_cert_and_key() {
        let config = ServiceConfig {
            server_cert_path: Some(PathBuf::from("/tmp/cert.pem")),
            ..ServiceConfig::default()
        };
        assert!(!config.tls_enabled());

        let config = ServiceConfig {
            server_cert_path: Some(PathBuf::from("/tmp/cert.pem")),
            server_key_path: Some(PathBuf::from("/tmp/key.pem")),
            ..ServiceConfig::default()
        };
        assert!(config.tls_enabled());
    }
}
