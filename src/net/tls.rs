use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::digest::{digest, SHA256};
use std::env;
use std::path::Path;
use tracing::info;
use wtransport::Identity;

// Dev certificate paths (generated via scripts/gen-dev-cert)
const DEV_CERT_FILE: &str = "certs/cert.pem";
const DEV_KEY_FILE: &str = "certs/key.pem";

/// TLS identity for the WebTransport endpoint
pub struct TlsConfig {
    pub identity: Identity,
    /// Base64-encoded SHA-256 hash of the certificate, needed by browser
    /// clients using serverCertificateHashes
    pub cert_hash: String,
}

impl TlsConfig {
    /// Load the TLS identity.
    ///
    /// Production: set TLS_CERT_PATH and TLS_KEY_PATH.
    /// Development: generate certs/ with scripts/gen-dev-cert first.
    pub async fn load() -> Result<Self> {
        if let (Ok(cert_path), Ok(key_path)) =
            (env::var("TLS_CERT_PATH"), env::var("TLS_KEY_PATH"))
        {
            info!("Loading TLS certificate from environment paths");
            return Self::load_from_paths(&cert_path, &key_path).await;
        }

        if Path::new(DEV_CERT_FILE).exists() && Path::new(DEV_KEY_FILE).exists() {
            info!("Loading dev certificate from certs/");
            Self::load_from_paths(DEV_CERT_FILE, DEV_KEY_FILE).await
        } else {
            Err(anyhow!(
                "TLS certificate not found.\n\n\
                For development: run the gen-dev-cert script to create certs/.\n\
                For production: set TLS_CERT_PATH and TLS_KEY_PATH environment variables."
            ))
        }
    }

    async fn load_from_paths(cert_path: &str, key_path: &str) -> Result<Self> {
        let identity = Identity::load_pemfiles(cert_path, key_path)
            .await
            .context("Failed to load certificate from PEM files")?;

        let cert_hash = Self::compute_cert_hash(&identity);
        info!("Certificate hash: {}", cert_hash);

        Ok(Self {
            identity,
            cert_hash,
        })
    }

    fn compute_cert_hash(identity: &Identity) -> String {
        identity
            .certificate_chain()
            .as_slice()
            .first()
            .map(|cert| STANDARD.encode(digest(&SHA256, cert.der()).as_ref()))
            .unwrap_or_default()
    }

    pub fn cert_hash(&self) -> &str {
        &self.cert_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires generated dev certificates
    async fn test_load_cert_hash_is_sha256() {
        let config = TlsConfig::load().await.unwrap();
        let decoded = STANDARD.decode(config.cert_hash()).unwrap();
        assert_eq!(decoded.len(), 32);
    }
}
