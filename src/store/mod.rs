//! Content-addressed blob storage.
//!
//! The byte store is the only object that may be shared between
//! drivers. Keys are content-derived, so concurrent writers racing on
//! one key carry semantically equivalent blobs and "last put wins" is
//! safe. The driver assumes put-then-get within a process succeeds and
//! makes no assumptions about eviction.

mod disk;
mod memory;

pub use disk::SledByteStore;
pub use memory::MemoryByteStore;

use crate::hash::{self, ContentHash};
use async_trait::async_trait;

/// A plain content-addressed KV store.
#[async_trait]
pub trait ByteStore: Send + Sync {
    /// Returns the blob stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Stores `bytes` under `key`.
    async fn put(&self, key: &str, bytes: Vec<u8>);
}

/// Key of the unlinked-summary bundle for a file with content hash `hash`.
pub fn unlinked_key(hash: &ContentHash) -> String {
    format!("{hash}.unlinked")
}

/// Key of the linked-summary bundle for a library with the given
/// dependency signature.
pub fn linked_key(signature: &str) -> String {
    format!("{signature}.linked")
}

/// Key of the cached error table for one (dependency signature, content
/// hash) pairing.
pub fn errors_key(signature: &str, hash: &ContentHash) -> String {
    let combined = hash::hex_digest([signature.as_bytes(), hash.as_str().as_bytes()]);
    format!("{combined}.errors")
}
