//! Unlinked and linked summaries and their content-addressed cache.
//!
//! An unlinked summary is the compact, self-contained description of one
//! compilation unit; a linked summary resolves one library against its
//! dependencies' unlinked summaries. Both are persisted in the byte
//! store as single-unit bundles under content-derived keys.

use crate::error::{SummaryError, SummaryResult};
use crate::file::FileHandle;
use crate::host::AnalysisHost;
use crate::store::{self, ByteStore};
use crate::types::{AnalysisError, SourceUri};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Compact description of one compilation unit's declarations and
/// references, independent of any other library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlinkedSummary {
    /// URI the unit was serialized against. Blobs are shared between
    /// files with identical content, so consumers key by the URI the
    /// active traversal resolved, not by this field.
    pub uri: SourceUri,

    /// Digest over the externally visible declaration shape. Body
    /// edits leave it unchanged; that is what makes coarse-grained
    /// invalidation sound.
    pub api_signature: String,

    /// Directive URI texts, unresolved, with implicit platform imports
    /// omitted.
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub parts: Vec<String>,

    /// Host-defined declaration payload.
    pub declarations: Vec<u8>,
}

/// One library resolved against its dependencies' unlinked summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedSummary {
    pub uri: SourceUri,
    pub payload: Vec<u8>,
}

/// Bundle as stored in the byte store. Blobs written by the driver
/// contain exactly one unit.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct SummaryBundle {
    pub unlinked: Vec<UnlinkedSummary>,
    pub linked: Vec<LinkedSummary>,
}

impl SummaryBundle {
    pub fn one_unlinked(summary: UnlinkedSummary) -> Self {
        Self {
            unlinked: vec![summary],
            ..Self::default()
        }
    }

    pub fn one_linked(summary: LinkedSummary) -> Self {
        Self {
            linked: vec![summary],
            ..Self::default()
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(key: &str, bytes: &[u8]) -> SummaryResult<Self> {
        bincode::deserialize(bytes).map_err(|source| SummaryError::MalformedBundle {
            key: key.to_string(),
            source,
        })
    }
}

/// Error table cached per (dependency signature, content hash). Slot 0
/// is the error list.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ErrorsTable {
    pub errors: Vec<AnalysisError>,
}

impl ErrorsTable {
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Pre-linked summaries of the platform core libraries, supplied to the
/// driver at construction. References under the platform pseudo-scheme
/// are served from here and never become graph nodes.
#[derive(Debug, Default)]
pub struct SdkBundle {
    /// Participates in every dependency signature.
    pub api_signature: String,
    pub unlinked: Vec<Arc<UnlinkedSummary>>,
    pub linked: Vec<Arc<LinkedSummary>>,
}

/// In-memory summary store handed to the linker and the diagnostics
/// engine.
///
/// Populated by the library-graph traversal, which knows the correct
/// URI for every blob it decodes; blob-embedded URIs are never used as
/// keys here.
#[derive(Debug, Default, Clone)]
pub struct SummaryDataStore {
    unlinked: HashMap<SourceUri, Arc<UnlinkedSummary>>,
    linked: HashMap<SourceUri, Arc<LinkedSummary>>,
}

impl SummaryDataStore {
    /// A store seeded with the SDK bundle's summaries.
    pub fn with_sdk(sdk: &SdkBundle) -> Self {
        let mut data = Self::default();
        for summary in &sdk.unlinked {
            data.unlinked
                .insert(summary.uri.clone(), Arc::clone(summary));
        }
        for summary in &sdk.linked {
            data.linked.insert(summary.uri.clone(), Arc::clone(summary));
        }
        data
    }

    pub fn add_unlinked(&mut self, uri: SourceUri, summary: Arc<UnlinkedSummary>) {
        self.unlinked.insert(uri, summary);
    }

    pub fn add_linked(&mut self, uri: SourceUri, summary: Arc<LinkedSummary>) {
        self.linked.insert(uri, summary);
    }

    pub fn unlinked(&self, uri: &SourceUri) -> Option<&Arc<UnlinkedSummary>> {
        self.unlinked.get(uri)
    }

    pub fn linked(&self, uri: &SourceUri) -> Option<&Arc<LinkedSummary>> {
        self.linked.get(uri)
    }

    pub fn has_linked(&self, uri: &SourceUri) -> bool {
        self.linked.contains_key(uri)
    }

    /// Fail-fast lookup for the linker's unlinked callback.
    pub fn require_unlinked(&self, uri: &SourceUri) -> SummaryResult<&Arc<UnlinkedSummary>> {
        self.unlinked(uri).ok_or_else(|| SummaryError::MissingUnlinked {
            uri: uri.to_string(),
        })
    }

    /// Fail-fast lookup for the linker's linked callback.
    pub fn require_linked(&self, uri: &SourceUri) -> SummaryResult<&Arc<LinkedSummary>> {
        self.linked(uri).ok_or_else(|| SummaryError::MissingLinked {
            uri: uri.to_string(),
        })
    }
}

/// Derives unlinked summaries through the byte store.
pub(crate) struct SummaryCache<H> {
    store: Arc<dyn ByteStore>,
    host: Arc<H>,
}

impl<H: AnalysisHost> SummaryCache<H> {
    pub fn new(store: Arc<dyn ByteStore>, host: Arc<H>) -> Self {
        Self { store, host }
    }

    pub fn store(&self) -> &Arc<dyn ByteStore> {
        &self.store
    }

    /// Returns the unlinked summary for the file's current content,
    /// computing and persisting it on a miss. Malformed stored bundles
    /// count as misses and are overwritten.
    pub async fn unlinked_for(&self, file: &FileHandle<H>) -> Arc<UnlinkedSummary> {
        let hash = file.content_hash();
        let key = store::unlinked_key(&hash);
        if let Some(bytes) = self.store.get(&key).await {
            match SummaryBundle::decode(&key, &bytes) {
                Ok(mut bundle) if !bundle.unlinked.is_empty() => {
                    return Arc::new(bundle.unlinked.remove(0));
                }
                Ok(_) => warn!(%key, "stored bundle holds no unlinked unit, recomputing"),
                Err(e) => warn!(error = %e, "treating malformed bundle as a miss"),
            }
        }

        debug!(uri = %file.uri(), "computing unlinked summary");
        let unit = file.unit();
        let summary = self.host.summarize(file.uri(), &unit);
        match SummaryBundle::one_unlinked(summary.clone()).encode() {
            Ok(bytes) => self.store.put(&key, bytes).await,
            Err(e) => warn!(%key, error = %e, "failed to encode unlinked bundle"),
        }
        Arc::new(summary)
    }

    /// Returns the summary stored for the file's *cached* content hash
    /// without reading content or computing on a miss. This is how the
    /// old API signature is retrieved before a change is applied.
    pub async fn current_unlinked(&self, file: &FileHandle<H>) -> Option<Arc<UnlinkedSummary>> {
        let hash = file.cached_content_hash()?;
        let key = store::unlinked_key(&hash);
        let bytes = self.store.get(&key).await?;
        match SummaryBundle::decode(&key, &bytes) {
            Ok(mut bundle) if !bundle.unlinked.is_empty() => {
                Some(Arc::new(bundle.unlinked.remove(0)))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unlinked(uri: &str, api: &str) -> UnlinkedSummary {
        UnlinkedSummary {
            uri: SourceUri::new(uri),
            api_signature: api.to_string(),
            imports: vec!["package:dep".into()],
            exports: vec![],
            parts: vec![],
            declarations: b"class A".to_vec(),
        }
    }

    #[test]
    fn bundle_roundtrip() {
        let bundle = SummaryBundle::one_unlinked(unlinked("package:a", "sig-a"));
        let bytes = bundle.encode().unwrap();
        let back = SummaryBundle::decode("abc.unlinked", &bytes).unwrap();
        assert_eq!(back.unlinked.len(), 1);
        assert!(back.linked.is_empty());
        assert_eq!(back.unlinked[0], bundle.unlinked[0]);
    }

    #[test]
    fn bundle_decode_rejects_garbage() {
        let err = SummaryBundle::decode("bad.unlinked", b"not a bundle").unwrap_err();
        assert!(matches!(err, SummaryError::MalformedBundle { .. }));
        assert!(err.to_string().contains("bad.unlinked"));
    }

    #[test]
    fn errors_table_roundtrip() {
        use crate::types::ErrorSeverity;
        let table = ErrorsTable {
            errors: vec![AnalysisError {
                offset: 3,
                length: 5,
                severity: ErrorSeverity::Error,
                code: "undefined_name".into(),
                message: "undefined name".into(),
            }],
        };
        let back = ErrorsTable::decode(&table.encode().unwrap()).unwrap();
        assert_eq!(back.errors, table.errors);
    }

    #[test]
    fn data_store_keyed_by_traversal_uri() {
        // The blob was serialized against its twin's URI; the traversal
        // still files it under the URI it resolved.
        let twin = Arc::new(unlinked("package:twin_a", "sig"));
        let mut data = SummaryDataStore::default();
        data.add_unlinked(SourceUri::new("package:twin_b"), Arc::clone(&twin));

        let found = data.require_unlinked(&SourceUri::new("package:twin_b")).unwrap();
        assert_eq!(found.uri.as_str(), "package:twin_a");
    }

    #[test]
    fn missing_summaries_fail_fast() {
        let data = SummaryDataStore::default();
        let uri = SourceUri::new("package:ghost");
        assert!(matches!(
            data.require_unlinked(&uri),
            Err(SummaryError::MissingUnlinked { .. })
        ));
        assert!(matches!(
            data.require_linked(&uri),
            Err(SummaryError::MissingLinked { .. })
        ));
    }

    #[test]
    fn sdk_seeding() {
        let sdk = SdkBundle {
            api_signature: "sdk-api".into(),
            unlinked: vec![Arc::new(unlinked("platform:core", "core-api"))],
            linked: vec![Arc::new(LinkedSummary {
                uri: SourceUri::new("platform:core"),
                payload: b"linked core".to_vec(),
            })],
        };
        let data = SummaryDataStore::with_sdk(&sdk);
        let core = SourceUri::new("platform:core");
        assert!(data.unlinked(&core).is_some());
        assert!(data.has_linked(&core));
    }
}
