use super::ByteStore;
use async_trait::async_trait;
use std::path::Path;
use tracing::{error, warn};

/// Byte store persisted in a sled database.
///
/// All reads are fail-safe: corruption or I/O failures degrade to cache
/// misses rather than errors, and failed writes are dropped with a
/// warning. The cache can always be rebuilt from sources.
pub struct SledByteStore {
    db: sled::Db,
}

impl SledByteStore {
    pub fn open(path: &Path) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

#[async_trait]
impl ByteStore for SledByteStore {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.db.get(key) {
            Ok(value) => value.map(|ivec| ivec.to_vec()),
            Err(e) => {
                warn!(key, error = %e, "byte store read failed, treating as miss");
                None
            }
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) {
        if let Err(e) = self.db.insert(key, bytes) {
            warn!(key, error = %e, "byte store write failed, dropping blob");
        }
    }
}

impl Drop for SledByteStore {
    fn drop(&mut self) {
        if let Err(e) = self.db.flush() {
            error!(error = %e, "failed to flush byte store on drop");
        }
    }
}
