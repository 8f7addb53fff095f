//! Transport endpoints: local UNIX socket, plain HTTP, and HTTPS.
//!
//! Each endpoint binds in `start_*`, serves on its own task, and is torn
//! down through [`Endpoint::stop`]. The service composes them: the UNIX
//! socket can run alongside exactly one of HTTP or HTTPS.

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[cfg(unix)]
use crate::request::UnixSocketMarker;

/// A running transport endpoint.
#[derive(Debug)]
pub(crate) struct Endpoint {
    name: String,
    local_addr: Option<std::net::SocketAddr>,
    socket_path: Option<PathBuf>,
    shutdown: Shutdown,
    task: JoinHandle<std::io::Result<()>>,
}

#[derive(Debug)]
enum Shutdown {
    Graceful(oneshot::Sender<()>),
    Tls(axum_server::Handle),
}

impl Endpoint {
    /// Bound TCP address; `None` for the UNIX socket endpoint.
    pub(crate) fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.local_addr
    }

    /// Signals shutdown and waits for the serve task to finish.
    pub(crate) async fn stop(self) -> anyhow::Result<()> {
        match self.shutdown {
            Shutdown::Graceful(tx) => {
                let _ = tx.send(());
            }
            Shutdown::Tls(handle) => handle.graceful_shutdown(Some(Duration::from_secs(5))),
        }

        let result = self.task.await;

        if let Some(path) = &self.socket_path {
            let _ = std::fs::remove_file(path);
        }

        debug!("Stopped {} endpoint", self.name);
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(anyhow::Error::new(err).context(format!("{} endpoint", self.name))),
            Err(join) => Err(anyhow::Error::new(join).context(format!("{} endpoint", self.name))),
        }
    }
}

// ---------------------------------------------------------------------------
// Plain HTTP
// ---------------------------------------------------------------------------

/// Binds and serves plain HTTP on `addr`.
pub(crate) async fn start_http(router: Router, addr: &str) -> anyhow::Result<Endpoint> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    let (tx, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await
    });

    info!("HTTP endpoint listening on {local_addr}");
    Ok(Endpoint {
        name: "http".to_string(),
        local_addr: Some(local_addr),
        socket_path: None,
        shutdown: Shutdown::Graceful(tx),
        task,
    })
}

// ---------------------------------------------------------------------------
// HTTPS
// ---------------------------------------------------------------------------

/// Binds and serves HTTPS on `addr`.
///
/// The certificate and key are loaded from PEM files, generated
/// self-signed when missing. With `ca_path` set, clients must present a
/// certificate signed by that CA.
pub(crate) async fn start_https(
    router: Router,
    addr: &str,
    cert_path: &Path,
    key_path: &Path,
    ca_path: Option<&Path>,
) -> anyhow::Result<Endpoint> {
    ensure_server_certificate(cert_path, key_path)?;
    let tls = build_tls_config(cert_path, key_path, ca_path)?;

    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;

    let handle = axum_server::Handle::new();
    let serve_handle = handle.clone();
    let task = tokio::spawn(async move {
        axum_server::from_tcp_rustls(std_listener, RustlsConfig::from_config(Arc::new(tls)))
            .handle(serve_handle)
            .serve(router.into_make_service())
            .await
    });

    info!("HTTPS endpoint listening on {local_addr}");
    Ok(Endpoint {
        name: "https".to_string(),
        local_addr: Some(local_addr),
        socket_path: None,
        shutdown: Shutdown::Tls(handle),
        task,
    })
}

/// Generates a self-signed certificate/key pair at the configured paths
/// when either file is missing.
fn ensure_server_certificate(cert_path: &Path, key_path: &Path) -> anyhow::Result<()> {
    if cert_path.exists() && key_path.exists() {
        return Ok(());
    }

    let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;

    for path in [cert_path, key_path] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(cert_path, generated.cert.pem())?;
    std::fs::write(key_path, generated.key_pair.serialize_pem())?;

    info!("Generated self-signed server certificate at {}", cert_path.display());
    Ok(())
}

fn build_tls_config(
    cert_path: &Path,
    key_path: &Path,
    ca_path: Option<&Path>,
) -> anyhow::Result<rustls::ServerConfig> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(std::fs::File::open(cert_path)?))
        .collect::<Result<_, _>>()?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(std::fs::File::open(key_path)?))?
        .ok_or_else(|| anyhow::anyhow!("No private key found in {}", key_path.display()))?;

    let builder = rustls::ServerConfig::builder();
    let config = match ca_path {
        Some(ca) => {
            let mut roots = rustls::RootCertStore::empty();
            for cert in rustls_pemfile::certs(&mut BufReader::new(std::fs::File::open(ca)?)) {
                roots.add(cert?)?;
            }
            let verifier =
                rustls::server::WebPkiClientVerifier::builder(Arc::new(roots)).build()?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    }
    .with_single_cert(certs, key)?;

    Ok(config)
}

// ---------------------------------------------------------------------------
// UNIX socket
// ---------------------------------------------------------------------------

/// Binds and serves the local UNIX socket endpoint.
///
/// The socket is created mode 0660; `owner` names the group given
/// ownership of it. Requests arriving here carry the UNIX-socket marker so
/// handlers can tell local callers apart.
#[cfg(unix)]
pub(crate) async fn start_unix(
    router: Router,
    path: &Path,
    owner: Option<&str>,
) -> anyhow::Result<Endpoint> {
    use std::os::unix::fs::PermissionsExt;

    cleanup_stale_socket(path)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = tokio::net::UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o660))?;
    if let Some(group) = owner {
        chown_socket_group(path, group)?;
    }

    let router = router.layer(axum::Extension(UnixSocketMarker));

    let (tx, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await
    });

    info!("UNIX socket endpoint listening on {}", path.display());
    Ok(Endpoint {
        name: "unix".to_string(),
        local_addr: None,
        socket_path: Some(path.to_path_buf()),
        shutdown: Shutdown::Graceful(tx),
        task,
    })
}

/// Removes a leftover socket file from a previous run. Refuses to touch a
/// path that exists but is not a socket.
#[cfg(unix)]
fn cleanup_stale_socket(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_socket() => {
            std::fs::remove_file(path)?;
            Ok(())
        }
        Ok(_) => Err(anyhow::anyhow!(
            "{} exists and is not a socket",
            path.display()
        )),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(unix)]
fn chown_socket_group(path: &Path, group: &str) -> anyhow::Result<()> {
    let entry = nix::unistd::Group::from_name(group)?
        .ok_or_else(|| anyhow::anyhow!("Unknown group: {group}"))?;
    nix::unistd::chown(path, None, Some(entry.gid))?;
    Ok(())
}
