use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use super::{validate_key, CacheDriver, Result};

/// Directory under the system temp dir holding volatile caches.
pub const VOLATILE_DIR: &str = "__convoy_cache_volatile__";

/// Filesystem driver whose content lives only as long as the temp dir.
///
/// Layout: `<root>/<key>`
pub struct VolatileDriver {
    root: PathBuf,
}

impl VolatileDriver {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Driver rooted at `<tmp>/__convoy_cache_volatile__/<namespace>`.
    pub fn in_temp_dir(namespace: &str) -> Self {
        Self::new(std::env::temp_dir().join(VOLATILE_DIR).join(namespace))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn storage_file(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl CacheDriver for VolatileDriver {
    fn name(&self) -> &str {
        "volatile"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        match tokio::fs::read(self.storage_file(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, content: &[u8]) -> Result<()> {
        validate_key(key)?;
        let path = self.storage_file(key);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        // Atomic write: write to temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheError;

    fn make_driver() -> (tempfile::TempDir, VolatileDriver) {
        let dir = tempfile::tempdir().unwrap();
        let driver = VolatileDriver::new(dir.path());
        (dir, driver)
    }

    #[tokio::test]
    async fn roundtrip() {
        let (_dir, driver) = make_driver();
        driver.put("coverage/unit.json", b"{\"lines\":42}").await.unwrap();
        let got = driver.get("coverage/unit.json").await.unwrap();
        assert_eq!(got.as_deref(), Some(&b"{\"lines\":42}"[..]));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let (_dir, driver) = make_driver();
        assert_eq!(driver.get("never-written").await.unwrap(), None);
    }

    #[tokio::test]
    async fn overwrite_replaces_content() {
        let (_dir, driver) = make_driver();
        driver.put("k", b"first").await.unwrap();
        driver.put("k", b"second").await.unwrap();
        assert_eq!(driver.get("k").await.unwrap(), Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn escaping_key_rejected() {
        let (_dir, driver) = make_driver();
        match driver.put("../outside", b"x").await {
            Err(CacheError::InvalidKey(k)) => assert_eq!(k, "../outside"),
            other => panic!("expected InvalidKey, got {other:?}"),
        }
    }

    #[test]
    fn temp_dir_layout() {
        let driver = VolatileDriver::in_temp_dir("unit");
        assert!(driver.root().ends_with(Path::new(VOLATILE_DIR).join("unit")));
        assert_eq!(driver.name(), "volatile");
    }
}
