//! # analysis-driver
//!
//! The incremental-analysis driver at the heart of a source-code
//! analyzer for a statically-typed, modular language. It maintains an
//! eventually consistent view of analysis results (diagnostics and an
//! addressable resolved unit) for a dynamically changing set of source
//! files, backed by a content-addressed byte store so that unchanged
//! work is never redone, even across process restarts.
//!
//! The driver orchestrates; it does not parse, link, or compute
//! diagnostics itself. Those collaborators plug in through the traits
//! in [`host`].
//!
//! ## Core pieces
//!
//! - [`file`]: file-state tracking and the lazy per-step file view
//! - [`store`]: the content-addressed byte store and its key schema
//! - [`summary`]: unlinked/linked summaries and their persistent cache
//! - [`graph`]: the library dependency graph and dependency signatures
//! - [`driver`]: scheduling, the work loop, and the client API
//!
//! ## Quick start
//!
//! ```no_run
//! use analysis_driver::{AnalysisOptions, Driver, FsResourceProvider, NullContentCache, PerfLog};
//! use std::sync::Arc;
//!
//! # async fn example<H: analysis_driver::AnalysisHost>(
//! #     host: Arc<H>,
//! #     factory: Arc<dyn analysis_driver::SourceFactory>,
//! # ) {
//! let store = Arc::new(analysis_driver::MemoryByteStore::new());
//! let mut driver = Driver::new(
//!     PerfLog::disabled(),
//!     host,
//!     Arc::new(FsResourceProvider),
//!     store,
//!     Arc::new(NullContentCache),
//!     factory,
//!     AnalysisOptions::default(),
//! );
//! let mut results = driver.results().expect("first subscription");
//! driver.add_file("/workspace/lib/main.lang").await;
//! while let Some(result) = results.next().await {
//!     println!("{}: {} errors", result.path.display(), result.errors.len());
//! }
//! # }
//! ```

/// Analysis options forwarded to the host collaborators.
pub mod config;
/// The driver: scheduling, the work loop, and the client API.
pub mod driver;
/// Error types surfaced to clients and raised internally.
pub mod error;
/// File-state tracking and the per-step file view.
pub mod file;
/// The library dependency graph and dependency signatures.
pub mod graph;
/// Content hashing.
pub mod hash;
/// Interfaces of the external collaborators.
pub mod host;
/// Hierarchical timed phase logging.
pub mod perf;
/// Content-addressed blob storage.
pub mod store;
/// Unlinked/linked summaries and their persistent cache.
pub mod summary;
/// Core data model: URIs, diagnostics, results.
pub mod types;

pub use config::AnalysisOptions;
pub use driver::{AnalysisStatus, Driver, ResultStream};
pub use error::{DriverError, DriverResult, SummaryError, SummaryResult};
pub use file::{FileHandle, FileTracker};
pub use graph::{LibraryContext, LibraryNode};
pub use hash::ContentHash;
pub use host::{
    AnalysisHost, AnalysisOutcome, AnalysisRequest, ContentCache, FsResourceProvider,
    NullContentCache, ResolvedSource, ResourceProvider, SourceFactory,
};
pub use perf::PerfLog;
pub use store::{ByteStore, MemoryByteStore, SledByteStore};
pub use summary::{LinkedSummary, SdkBundle, SummaryDataStore, UnlinkedSummary};
pub use types::{AnalysisError, AnalysisResult, ErrorSeverity, SourceUri, PLATFORM_SCHEME};
