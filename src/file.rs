//! File-state tracking and the per-step file view.
//!
//! `FileTracker` is the process-lived record of what the driver believes
//! about file contents; `FileHandle` is the ephemeral view created
//! inside a single analysis step. Handles must not outlive the result
//! they helped produce, so the resolved trees they materialize can be
//! released.

use crate::config::AnalysisOptions;
use crate::hash::ContentHash;
use crate::host::{AnalysisHost, ContentCache, ResolvedSource, ResourceProvider, SourceFactory};
use crate::types::SourceUri;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Authoritative map of path to last-observed content hash, plus the
/// two-level URI-resolution cache (`library uri -> directive text ->
/// source`).
#[derive(Debug, Default)]
pub struct FileTracker {
    hashes: DashMap<PathBuf, ContentHash>,
    resolutions: DashMap<SourceUri, HashMap<String, ResolvedSource>>,
}

impl FileTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last hash recorded for `path`, if any content was observed.
    pub fn hash_of(&self, path: &Path) -> Option<ContentHash> {
        self.hashes.get(path).map(|h| h.clone())
    }

    pub(crate) fn record_hash(&self, path: &Path, hash: ContentHash) {
        self.hashes.insert(path.to_path_buf(), hash);
    }

    /// Drops the recorded hash so the next observation re-reads content.
    /// Entries leave the map only through this, as part of API-signature
    /// re-verification.
    pub(crate) fn forget_hash(&self, path: &Path) {
        self.hashes.remove(path);
    }

    fn cached_resolution(&self, base: &SourceUri, reference: &str) -> Option<ResolvedSource> {
        self.resolutions
            .get(base)
            .and_then(|by_text| by_text.get(reference).cloned())
    }

    fn record_resolution(&self, base: &SourceUri, reference: &str, source: ResolvedSource) {
        self.resolutions
            .entry(base.clone())
            .or_default()
            .insert(reference.to_string(), source);
    }
}

/// Shared collaborators from which `FileHandle`s are minted.
pub struct FileContext<H: AnalysisHost> {
    pub(crate) resources: Arc<dyn ResourceProvider>,
    pub(crate) overlay: Arc<dyn ContentCache>,
    pub(crate) sources: Arc<dyn SourceFactory>,
    pub(crate) host: Arc<H>,
    pub(crate) tracker: Arc<FileTracker>,
    pub(crate) options: AnalysisOptions,
}

impl<H: AnalysisHost> Clone for FileContext<H> {
    fn clone(&self) -> Self {
        Self {
            resources: Arc::clone(&self.resources),
            overlay: Arc::clone(&self.overlay),
            sources: Arc::clone(&self.sources),
            host: Arc::clone(&self.host),
            tracker: Arc::clone(&self.tracker),
            options: self.options.clone(),
        }
    }
}

impl<H: AnalysisHost> FileContext<H> {
    pub fn tracker(&self) -> &Arc<FileTracker> {
        &self.tracker
    }

    pub(crate) fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn handle(&self, path: PathBuf) -> FileHandle<H> {
        let uri = self
            .sources
            .restore_uri(&path)
            .unwrap_or_else(|| SourceUri::from_path(&path));
        self.handle_for(ResolvedSource { path, uri })
    }

    pub fn handle_for(&self, source: ResolvedSource) -> FileHandle<H> {
        FileHandle {
            ctx: self.clone(),
            path: source.path,
            uri: source.uri,
            content: OnceCell::new(),
        }
    }
}

/// Lazy view over one source file: path, URI, content, content hash,
/// unresolved syntax tree.
///
/// Created inside a single analysis step and never cached across steps.
pub struct FileHandle<H: AnalysisHost> {
    ctx: FileContext<H>,
    path: PathBuf,
    uri: SourceUri,
    content: OnceCell<Observed>,
}

#[derive(Clone)]
struct Observed {
    content: Arc<str>,
    hash: ContentHash,
    exists: bool,
}

impl<H: AnalysisHost> Clone for FileHandle<H> {
    fn clone(&self) -> Self {
        let content = OnceCell::new();
        if let Some(observed) = self.content.get() {
            let _ = content.set(observed.clone());
        }
        Self {
            ctx: self.ctx.clone(),
            path: self.path.clone(),
            uri: self.uri.clone(),
            content,
        }
    }
}

impl<H: AnalysisHost> FileHandle<H> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn uri(&self) -> &SourceUri {
        &self.uri
    }

    pub(crate) fn context(&self) -> &FileContext<H> {
        &self.ctx
    }

    fn read(&self) -> &Observed {
        self.content.get_or_init(|| {
            let text = self
                .ctx
                .overlay
                .contents(&self.path)
                .or_else(|| self.ctx.resources.read(&self.path).ok());
            // Unreadable files coerce to empty content; `exists` is the
            // only trace, and whether it deserves a diagnostic is the
            // engine's decision.
            let exists = text.is_some();
            let text = text.unwrap_or_default();
            let hash = ContentHash::new(&text);
            self.ctx.tracker.record_hash(&self.path, hash.clone());
            Observed {
                content: Arc::from(text),
                hash,
                exists,
            }
        })
    }

    /// Current content: overlay first, then file system. Reading
    /// recomputes the hash and records it in the tracker.
    pub fn content(&self) -> Arc<str> {
        Arc::clone(&self.read().content)
    }

    /// Whether the last content observation found the file (or an
    /// overlay for it).
    pub fn exists(&self) -> bool {
        self.read().exists
    }

    /// The content hash. Once content has been observed through this
    /// handle, hash and content always correspond; before that, a
    /// previously tracked hash may be returned without a read.
    pub fn content_hash(&self) -> ContentHash {
        if let Some(observed) = self.content.get() {
            return observed.hash.clone();
        }
        match self.ctx.tracker.hash_of(&self.path) {
            Some(hash) => hash,
            None => self.read().hash.clone(),
        }
    }

    /// The tracked hash only; `None` forces callers that need the old
    /// summary to give up rather than read fresh content.
    pub(crate) fn cached_content_hash(&self) -> Option<ContentHash> {
        self.ctx.tracker.hash_of(&self.path)
    }

    /// Scans and parses the current content. Recomputed on every access;
    /// the tree is too large to keep.
    pub fn unit(&self) -> H::Unit {
        self.ctx
            .host
            .parse(&self.uri, &self.content(), &self.ctx.options)
    }

    /// Resolves a directive URI text against this file's library URI,
    /// consulting the tracker's resolution cache first.
    pub fn resolve_uri(&self, reference: &str) -> Option<FileHandle<H>> {
        let source = match self.ctx.tracker.cached_resolution(&self.uri, reference) {
            Some(source) => source,
            None => {
                let source = self.ctx.sources.resolve_uri(&self.uri, reference)?;
                self.ctx
                    .tracker
                    .record_resolution(&self.uri, reference, source.clone());
                source
            }
        };
        Some(self.ctx.handle_for(source))
    }
}
