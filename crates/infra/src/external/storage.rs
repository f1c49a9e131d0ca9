use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use umrahops_core::AggregateId;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid upload: {0}")]
    Invalid(String),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Allowed proof file extensions.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "pdf"];

/// Upper bound on a single proof file.
pub const MAX_PROOF_BYTES: usize = 10 * 1024 * 1024;

/// Stores payment proof files and returns a reference usable as `proof_file_url`.
#[async_trait]
pub trait ProofStorage: Send + Sync {
    async fn store(&self, invoice_id: AggregateId, file_name: &str, bytes: &[u8]) -> Result<String, StorageError>;
}

/// Local-disk storage under `<root>/payment-proofs/<invoice_id>/`.
#[derive(Debug, Clone)]
pub struct LocalProofStorage {
    root: PathBuf,
}

impl LocalProofStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Lowercased extension of an upload name, if it is one we accept.
pub fn proof_extension(file_name: &str) -> Result<String, StorageError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| StorageError::Invalid(format!("file has no extension: {file_name}")))?;
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(StorageError::Invalid(format!("unsupported file type: .{ext}")));
    }
    Ok(ext)
}

#[async_trait]
impl ProofStorage for LocalProofStorage {
    async fn store(&self, invoice_id: AggregateId, file_name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Invalid("empty file".to_string()));
        }
        if bytes.len() > MAX_PROOF_BYTES {
            return Err(StorageError::Invalid(format!(
                "file exceeds {} bytes",
                MAX_PROOF_BYTES
            )));
        }
        let ext = proof_extension(file_name)?;

        let relative = PathBuf::from("payment-proofs")
            .join(invoice_id.to_string())
            .join(format!("{}.{ext}", Uuid::now_v7()));
        debug_assert!(relative.components().all(|c| matches!(c, Component::Normal(_))));

        let full = self.root.join(&relative);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;

        Ok(relative.to_string_lossy().replace('\\', "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("umrahops-proofs-{}", Uuid::now_v7()))
    }

    #[tokio::test]
    async fn stores_under_invoice_directory() {
        let root = scratch_dir();
        let storage = LocalProofStorage::new(&root);
        let invoice = AggregateId::new();

        let path = storage.store(invoice, "Transfer.PNG", b"img").await.unwrap();
        assert!(path.starts_with(&format!("payment-proofs/{invoice}/")));
        assert!(path.ends_with(".png"));
        assert_eq!(tokio::fs::read(root.join(&path)).await.unwrap(), b"img");

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn rejects_unsupported_files() {
        let storage = LocalProofStorage::new(scratch_dir());
        let err = storage.store(AggregateId::new(), "proof.exe", b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)));
        let err = storage.store(AggregateId::new(), "proof.pdf", b"").await.unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)));
    }
}
