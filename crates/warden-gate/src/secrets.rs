//! Secret store for the approval-link signing key.
//!
//! The secret is fetched on every use so that rotation takes effect without a
//! restart.

use std::path::PathBuf;

use async_trait::async_trait;
use zeroize::Zeroizing;

/// Secret-store errors.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Secret {0} is empty")]
    Empty(String),

    #[error("Failed to read secret {reference}: {source}")]
    Io {
        reference: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves a secret reference to key material.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, reference: &str) -> Result<Zeroizing<Vec<u8>>, SecretError>;
}

/// Reads secrets from files. The reference is a path, optionally relative to
/// `root`.
#[derive(Debug, Clone, Default)]
pub struct FileSecretStore {
    root: Option<PathBuf>,
}

impl FileSecretStore {
    pub const fn new() -> Self {
        Self { root: None }
    }

    /// Resolve relative references against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(reference),
            None => PathBuf::from(reference),
        }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_secret(&self, reference: &str) -> Result<Zeroizing<Vec<u8>>, SecretError> {
        let path = self.resolve(reference);
        let mut bytes = Zeroizing::new(tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SecretError::NotFound(reference.to_string())
            } else {
                SecretError::Io {
                    reference: reference.to_string(),
                    source: e,
                }
            }
        })?);

        while matches!(bytes.last(), Some(b'\n' | b'\r')) {
            bytes.pop();
        }
        if bytes.is_empty() {
            return Err(SecretError::Empty(reference.to_string()));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_and_trims_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("key"), b"s3cret\r\n").unwrap();
        let store = FileSecretStore::with_root(dir.path());
        let secret = store.get_secret("key").await.unwrap();
        assert_eq!(secret.as_slice(), b"s3cret");
    }

    #[tokio::test]
    async fn absolute_reference_without_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, b"abc").unwrap();
        let secret = FileSecretStore::new()
            .get_secret(path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(secret.as_slice(), b"abc");
    }

    #[tokio::test]
    async fn rotation_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::with_root(dir.path());
        std::fs::write(dir.path().join("key"), b"one").unwrap();
        assert_eq!(store.get_secret("key").await.unwrap().as_slice(), b"one");
        std::fs::write(dir.path().join("key"), b"two").unwrap();
        assert_eq!(store.get_secret("key").await.unwrap().as_slice(), b"two");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileSecretStore::with_root(dir.path())
            .get_secret("nope")
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::NotFound(_)));
    }

    #[tokio::test]
    async fn blank_secret_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("key"), b"\n").unwrap();
        let err = FileSecretStore::with_root(dir.path())
            .get_secret("key")
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::Empty(_)));
    }
}
