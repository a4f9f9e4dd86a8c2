//! TLS client configuration from a PEM certificate bundle.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use rustls::{ClientConfig, RootCertStore};
use tracing::debug;

/// Build a client config that trusts only the certificates in `path`.
pub fn client_config(path: &Path) -> anyhow::Result<Arc<ClientConfig>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open certificate file {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert
            .with_context(|| format!("Failed to read certificate from {}", path.display()))?;
        roots
            .add(cert)
            .with_context(|| format!("Invalid certificate in {}", path.display()))?;
    }

    if roots.is_empty() {
        bail!("No certificates found in {}", path.display());
    }
    debug!(count = roots.len(), "Loaded trusted certificates");

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}
