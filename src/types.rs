use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Pseudo-scheme of the platform core libraries.
///
/// References under this scheme are served by the pre-linked SDK bundle
/// supplied at driver construction and never become graph nodes.
pub const PLATFORM_SCHEME: &str = "platform";

/// Canonical URI of a source file (`package:` or `file:` scheme, or the
/// platform pseudo-scheme).
///
/// The path-to-URI mapping is owned by the external [`SourceFactory`]
/// and is not assumed stable across time.
///
/// [`SourceFactory`]: crate::host::SourceFactory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceUri(String);

impl SourceUri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Fallback `file:` URI for paths the source factory cannot restore.
    pub fn from_path(path: &Path) -> Self {
        Self(format!("file://{}", path.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> Option<&str> {
        self.0.split_once(':').map(|(scheme, _)| scheme)
    }

    pub fn is_platform(&self) -> bool {
        self.scheme() == Some(PLATFORM_SCHEME)
    }
}

impl fmt::Display for SourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a directive's URI text targets the platform pseudo-scheme.
pub fn is_platform_reference(reference: &str) -> bool {
    reference
        .split_once(':')
        .is_some_and(|(scheme, _)| scheme == PLATFORM_SCHEME)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
    /// Task-marker diagnostics; filtered from reported results.
    Todo,
}

/// One diagnostic produced by the host analysis engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisError {
    pub offset: u32,
    pub length: u32,
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
}

impl AnalysisError {
    pub fn is_todo(&self) -> bool {
        self.severity == ErrorSeverity::Todo
    }
}

/// A self-consistent analysis result for one file.
///
/// The content hashes the content, the resolved unit (when present) was
/// produced from that content, and every external reference was linked
/// against the same snapshot. `resolved` is `None` when the error list
/// was served from the byte store without running the engine.
#[derive(Debug)]
pub struct AnalysisResult<R> {
    pub path: PathBuf,
    pub uri: SourceUri,
    pub content: Arc<str>,
    pub content_hash: ContentHash,
    pub resolved: Option<Arc<R>>,
    pub errors: Vec<AnalysisError>,
}

impl<R> Clone for AnalysisResult<R> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            uri: self.uri.clone(),
            content: Arc::clone(&self.content),
            content_hash: self.content_hash.clone(),
            resolved: self.resolved.clone(),
            errors: self.errors.clone(),
        }
    }
}
