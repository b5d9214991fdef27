use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use crate::config::SigningMaterial;
use crate::core::{AppError, Result};

/// Produces the base64 CMS SignedData (content attached) of a login ticket request
#[async_trait]
pub trait TicketSigner: Send + Sync {
    async fn sign(&self, payload: &str) -> Result<String>;
}

/// Signs with `openssl smime`; certificate and key live on disk only while it runs
pub struct OpensslSigner {
    material: SigningMaterial,
    openssl_bin: String,
}

impl OpensslSigner {
    pub fn new(material: SigningMaterial, openssl_bin: impl Into<String>) -> Self {
        Self {
            material,
            openssl_bin: openssl_bin.into(),
        }
    }
}

/// Removes the temporary files when dropped, whatever the outcome
struct TempFiles(Vec<PathBuf>);

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in &self.0 {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove signing temp file");
            }
        }
    }
}

async fn write_private(path: &PathBuf, contents: &str) -> Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(path)
        .await
        .map_err(|e| AppError::credential(format!("Cannot write signing material: {}", e)))?;
    file.write_all(contents.as_bytes())
        .await
        .map_err(|e| AppError::credential(format!("Cannot write signing material: {}", e)))?;
    file.flush()
        .await
        .map_err(|e| AppError::credential(format!("Cannot write signing material: {}", e)))?;
    Ok(())
}

#[async_trait]
impl TicketSigner for OpensslSigner {
    async fn sign(&self, payload: &str) -> Result<String> {
        let dir = std::env::temp_dir();
        let id = Uuid::new_v4();
        let cert_path = dir.join(format!("wsaa_{}.crt", id));
        let key_path = dir.join(format!("wsaa_{}.key", id));

        write_private(&cert_path, &self.material.certificate_pem).await?;
        let mut guard = TempFiles(vec![cert_path.clone()]);
        write_private(&key_path, &self.material.private_key_pem).await?;
        guard.0.push(key_path.clone());

        let mut child = Command::new(&self.openssl_bin)
            .arg("smime")
            .arg("-sign")
            .arg("-signer")
            .arg(&cert_path)
            .arg("-inkey")
            .arg(&key_path)
            .arg("-outform")
            .arg("DER")
            .arg("-nodetach")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AppError::credential(format!("Cannot run {}: {}", self.openssl_bin, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| AppError::credential(format!("Cannot feed signer: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AppError::credential(format!("Signer failed: {}", e)))?;

        drop(guard);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first_line = stderr.lines().next().unwrap_or("no diagnostic");
            return Err(AppError::credential(format!(
                "Signing the login request failed: {}",
                first_line
            )));
        }

        if output.stdout.is_empty() {
            return Err(AppError::credential("Signer produced no output"));
        }

        Ok(BASE64.encode(&output.stdout))
    }
}
