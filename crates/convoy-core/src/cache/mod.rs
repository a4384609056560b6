pub mod fs;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from cache drivers.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Backing store consumed by a caching component. The pipeline is agnostic
/// to which driver is used.
#[async_trait]
pub trait CacheDriver: Send + Sync {
    fn name(&self) -> &str;

    /// Content stored under `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `content` under `key`, replacing any previous content.
    async fn put(&self, key: &str, content: &[u8]) -> Result<()>;
}

/// Keys are relative, `/`-separated and may not escape the driver's root.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(CacheError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// In-process driver, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheDriver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(blobs.get(key).cloned())
    }

    async fn put(&self, key: &str, content: &[u8]) -> Result<()> {
        validate_key(key)?;
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs.insert(key.to_string(), content.to_vec());
        Ok(())
    }
}
