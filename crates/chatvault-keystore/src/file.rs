//! File-backed key store: `<dir>/<name>.json`, one record per file.
//!
//! Writes go to a uniquely named temp file in the same directory and are
//! renamed into place, so neither a crash nor a concurrent writer leaves a
//! half-written record. Records are created `0600` on Unix.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use chatvault_core::{VaultError, VaultResult};

use crate::KeyStore;

#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, name: &str) -> VaultResult<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(VaultError::Config(format!("invalid key record name: {name:?}")));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

fn unavailable(action: &str, path: &Path, e: std::io::Error) -> VaultError {
    VaultError::StoreUnavailable(format!("{action} {}: {e}", path.display()))
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn get(&self, name: &str) -> VaultResult<Option<SecretString>> {
        let path = self.record_path(name)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(mut content) => {
                let secret = SecretString::from(content.clone());
                content.zeroize();
                Ok(Some(secret))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable("reading", &path, e)),
        }
    }

    async fn put(&self, name: &str, record: SecretString) -> VaultResult<()> {
        let path = self.record_path(name)?;
        let dir = self.dir.clone();
        let prefix = format!(".{name}.");
        let written = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &prefix, &written, &record))
            .await
            .map_err(|e| VaultError::StoreUnavailable(format!("file store task: {e}")))??;

        tracing::debug!(record = name, path = %path.display(), "key record written");
        Ok(())
    }
}

/// Write into a uniquely named temp file next to `path`, then rename over it.
/// Concurrent writers each publish a complete record; the last rename wins.
fn write_atomic(dir: &Path, prefix: &str, path: &Path, record: &SecretString) -> VaultResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| unavailable("creating dir", dir, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| unavailable("creating temp file in", dir, e))?;
    tmp.write_all(record.expose_secret().as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| unavailable("writing", tmp.path(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(|e| unavailable("chmod", tmp.path(), e))?;
    }

    tmp.persist(path)
        .map_err(|e| unavailable("replacing", path, e.error))?;
    Ok(())
}
