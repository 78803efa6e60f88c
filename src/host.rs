//! Interfaces of the external collaborators the driver orchestrates.
//!
//! The driver itself never parses, links, or computes diagnostics; it
//! drives implementations of these traits and caches their products.

use crate::config::AnalysisOptions;
use crate::summary::{LinkedSummary, SdkBundle, SummaryDataStore, UnlinkedSummary};
use crate::types::{AnalysisError, SourceUri};
use anyhow::Result;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read access to the underlying file system.
pub trait ResourceProvider: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<String>;
}

/// Overlay of unsaved buffer contents, consulted before the file system.
pub trait ContentCache: Send + Sync {
    fn contents(&self, path: &Path) -> Option<String>;
}

/// A URI resolved to its backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub path: PathBuf,
    pub uri: SourceUri,
}

/// Resolves directive URI texts to sources and restores canonical URIs
/// for paths. Also owns the pre-linked SDK bundle for the platform
/// pseudo-scheme.
pub trait SourceFactory: Send + Sync {
    /// Resolves `reference` (a relative or package URI text) against the
    /// library at `base`. `None` means the reference does not map to a
    /// file; the caller skips it.
    fn resolve_uri(&self, base: &SourceUri, reference: &str) -> Option<ResolvedSource>;

    /// Restores the canonical URI for an absolute path, if any.
    fn restore_uri(&self, path: &Path) -> Option<SourceUri>;

    fn sdk_bundle(&self) -> Arc<SdkBundle>;
}

/// Everything the engine needs to compute diagnostics for one file.
pub struct AnalysisRequest<'a> {
    pub path: &'a Path,
    pub uri: &'a SourceUri,
    pub content: &'a str,
    /// `false` when neither an overlay nor the file system had the
    /// file. The content is then empty; the engine decides whether an
    /// absent file deserves a diagnostic.
    pub exists: bool,
    /// In-memory summaries of the file's full transitive closure,
    /// including the SDK bundle.
    pub summaries: &'a SummaryDataStore,
    pub options: &'a AnalysisOptions,
}

/// Resolved unit plus diagnostics, as produced by the engine.
pub struct AnalysisOutcome<R> {
    pub resolved: R,
    pub errors: Vec<AnalysisError>,
}

/// The language frontend: scanner/parser, summary serializer, linker,
/// and diagnostics engine behind one seam.
///
/// Any per-call state (analysis contexts, resolvers) is internal to the
/// implementation and released when the call returns.
pub trait AnalysisHost: Send + Sync + 'static {
    /// Unresolved syntax tree of a single compilation unit.
    type Unit: Send;
    /// Fully resolved unit delivered inside an `AnalysisResult`.
    type Resolved: Send + Sync;

    /// Scans and parses `content`, attaching line info.
    ///
    /// Scan/parse errors go nowhere here; the engine reproduces them
    /// when diagnostics are computed.
    fn parse(&self, uri: &SourceUri, content: &str, options: &AnalysisOptions) -> Self::Unit;

    /// Serializes the unresolved unit into an unlinked summary whose
    /// `api_signature` depends only on externally visible declaration
    /// shape, never on bodies.
    fn summarize(&self, uri: &SourceUri, unit: &Self::Unit) -> UnlinkedSummary;

    /// Links `roots` against the unlinked summaries in `summaries`,
    /// producing one linked summary per root. Missing store entries are
    /// an internal-consistency failure, not a recoverable condition.
    fn link(
        &self,
        roots: &[SourceUri],
        summaries: &SummaryDataStore,
        options: &AnalysisOptions,
    ) -> Result<HashMap<SourceUri, LinkedSummary>>;

    /// Resolves one file against the summary snapshot and computes its
    /// diagnostics.
    fn analyze(&self, request: AnalysisRequest<'_>) -> Result<AnalysisOutcome<Self::Resolved>>;
}

/// `ResourceProvider` reading straight from the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsResourceProvider;

impl ResourceProvider for FsResourceProvider {
    fn read(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// `ContentCache` with no overlays.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullContentCache;

impl ContentCache for NullContentCache {
    fn contents(&self, _path: &Path) -> Option<String> {
        None
    }
}
