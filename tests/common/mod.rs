//! Shared fixtures: a deliberately small toy language implementing the
//! collaborator traits, and an instrumented byte store for observing
//! cache behavior.
//!
//! The toy syntax is line-based:
//!
//! ```text
//! import pkg:b;
//! export pkg:c;
//! part pkg:a_part;
//! class A { ... }
//! error: some message
//! todo: finish this later
//! ```
//!
//! Declarations contribute their header (`class A`) to the API
//! signature; `error:`/`todo:` lines only produce diagnostics, so
//! editing them is a body-level change.

#![allow(dead_code)]

use analysis_driver::{
    AnalysisError, AnalysisHost, AnalysisOptions, AnalysisOutcome, AnalysisRequest, ByteStore,
    ContentCache, ContentHash, Driver, ErrorSeverity, LinkedSummary, PerfLog, ResolvedSource,
    ResourceProvider, SdkBundle, SourceFactory, SourceUri, SummaryDataStore, UnlinkedSummary,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Unresolved syntax tree of one toy compilation unit.
#[derive(Debug, Clone, Default)]
pub struct ToyUnit {
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub parts: Vec<String>,
    pub decls: Vec<String>,
}

/// Resolved unit delivered in analysis results.
#[derive(Debug, Clone)]
pub struct ToyResolved {
    pub uri: SourceUri,
    pub decls: Vec<String>,
}

fn parse_unit(content: &str) -> ToyUnit {
    let mut unit = ToyUnit::default();
    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("import ") {
            unit.imports.push(directive_uri(rest));
        } else if let Some(rest) = line.strip_prefix("export ") {
            unit.exports.push(directive_uri(rest));
        } else if let Some(rest) = line.strip_prefix("part ") {
            unit.parts.push(directive_uri(rest));
        } else if let Some(rest) = line.strip_prefix("class ") {
            let name: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            unit.decls.push(format!("class {name}"));
        }
    }
    unit
}

fn directive_uri(rest: &str) -> String {
    rest.trim_end_matches(';').trim().to_string()
}

/// The externally visible shape: declarations and directives, never
/// bodies and never the file's own URI.
fn api_text(unit: &ToyUnit) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.extend(unit.imports.iter().map(|u| format!("import {u}")));
    parts.extend(unit.exports.iter().map(|u| format!("export {u}")));
    parts.extend(unit.parts.iter().map(|u| format!("part {u}")));
    parts.extend(unit.decls.iter().cloned());
    parts.join(";")
}

/// Toy frontend: parser, summarizer, linker, and diagnostics engine,
/// with call counters for cache-behavior assertions.
#[derive(Default)]
pub struct ToyHost {
    link_calls: AtomicUsize,
    analyze_calls: AtomicUsize,
}

impl ToyHost {
    pub fn link_calls(&self) -> usize {
        self.link_calls.load(Ordering::SeqCst)
    }

    pub fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }
}

impl AnalysisHost for ToyHost {
    type Unit = ToyUnit;
    type Resolved = ToyResolved;

    fn parse(&self, _uri: &SourceUri, content: &str, _options: &AnalysisOptions) -> ToyUnit {
        parse_unit(content)
    }

    fn summarize(&self, uri: &SourceUri, unit: &ToyUnit) -> UnlinkedSummary {
        let shape = api_text(unit);
        UnlinkedSummary {
            uri: uri.clone(),
            api_signature: ContentHash::new(&shape).as_str().to_string(),
            imports: unit.imports.clone(),
            exports: unit.exports.clone(),
            parts: unit.parts.clone(),
            declarations: shape.into_bytes(),
        }
    }

    fn link(
        &self,
        roots: &[SourceUri],
        summaries: &SummaryDataStore,
        _options: &AnalysisOptions,
    ) -> Result<HashMap<SourceUri, LinkedSummary>> {
        self.link_calls.fetch_add(1, Ordering::SeqCst);
        let mut linked = HashMap::new();
        for root in roots {
            let unlinked = summaries.require_unlinked(root)?;
            let mut payload = format!("linked {root}");
            for dep in unlinked.imports.iter().chain(&unlinked.exports) {
                let dep_summary = summaries.require_unlinked(&SourceUri::new(dep.clone()))?;
                payload.push(' ');
                payload.push_str(&dep_summary.api_signature);
            }
            linked.insert(
                root.clone(),
                LinkedSummary {
                    uri: root.clone(),
                    payload: payload.into_bytes(),
                },
            );
        }
        Ok(linked)
    }

    fn analyze(&self, request: AnalysisRequest<'_>) -> Result<AnalysisOutcome<ToyResolved>> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        let unit = parse_unit(request.content);
        let mut errors = Vec::new();
        let mut offset = 0u32;
        for line in request.content.lines() {
            let trimmed = line.trim();
            if let Some(message) = trimmed.strip_prefix("error: ") {
                errors.push(AnalysisError {
                    offset,
                    length: line.len() as u32,
                    severity: ErrorSeverity::Error,
                    code: "toy_error".into(),
                    message: message.to_string(),
                });
            } else if let Some(message) = trimmed.strip_prefix("todo: ") {
                errors.push(AnalysisError {
                    offset,
                    length: line.len() as u32,
                    severity: ErrorSeverity::Todo,
                    code: "toy_todo".into(),
                    message: message.to_string(),
                });
            }
            offset += line.len() as u32 + 1;
        }
        Ok(AnalysisOutcome {
            resolved: ToyResolved {
                uri: request.uri.clone(),
                decls: unit.decls,
            },
            errors,
        })
    }
}

/// Pre-linked platform bundle for the toy language.
pub fn toy_sdk() -> Arc<SdkBundle> {
    let core = SourceUri::new("platform:core");
    Arc::new(SdkBundle {
        api_signature: "toy-sdk-api".to_string(),
        unlinked: vec![Arc::new(UnlinkedSummary {
            uri: core.clone(),
            api_signature: "toy-core-api".to_string(),
            imports: vec![],
            exports: vec![],
            parts: vec![],
            declarations: b"class Object".to_vec(),
        })],
        linked: vec![Arc::new(LinkedSummary {
            uri: core,
            payload: b"linked platform core".to_vec(),
        })],
    })
}

/// Maps `pkg:<name>` to `<root>/<name>.toy` and back.
pub struct ToySourceFactory {
    root: PathBuf,
    sdk: Arc<SdkBundle>,
}

impl ToySourceFactory {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            sdk: toy_sdk(),
        }
    }
}

impl SourceFactory for ToySourceFactory {
    fn resolve_uri(&self, _base: &SourceUri, reference: &str) -> Option<ResolvedSource> {
        let name = reference.strip_prefix("pkg:")?;
        Some(ResolvedSource {
            path: self.root.join(format!("{name}.toy")),
            uri: SourceUri::new(reference),
        })
    }

    fn restore_uri(&self, path: &Path) -> Option<SourceUri> {
        if path.extension()? != "toy" || !path.starts_with(&self.root) {
            return None;
        }
        Some(SourceUri::new(format!("pkg:{}", path.file_stem()?.to_str()?)))
    }

    fn sdk_bundle(&self) -> Arc<SdkBundle> {
        Arc::clone(&self.sdk)
    }
}

/// Byte store wrapper that records every key touched.
pub struct InstrumentedStore {
    inner: Arc<dyn ByteStore>,
    gets: Mutex<Vec<String>>,
    puts: Mutex<Vec<String>>,
}

impl InstrumentedStore {
    pub fn wrapping(inner: Arc<dyn ByteStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gets: Mutex::new(Vec::new()),
            puts: Mutex::new(Vec::new()),
        })
    }

    pub fn puts_with_suffix(&self, suffix: &str) -> usize {
        self.puts
            .lock()
            .unwrap()
            .iter()
            .filter(|key| key.ends_with(suffix))
            .count()
    }

    pub fn gets_with_suffix(&self, suffix: &str) -> usize {
        self.gets
            .lock()
            .unwrap()
            .iter()
            .filter(|key| key.ends_with(suffix))
            .count()
    }

    pub fn put_keys(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ByteStore for InstrumentedStore {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.gets.lock().unwrap().push(key.to_string());
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) {
        self.puts.lock().unwrap().push(key.to_string());
        self.inner.put(key, bytes).await
    }
}

/// Overlay cache backed by a map, for unsaved-buffer tests.
#[derive(Default)]
pub struct OverlayCache {
    contents: Mutex<HashMap<PathBuf, String>>,
}

impl OverlayCache {
    pub fn set(&self, path: PathBuf, content: String) {
        self.contents.lock().unwrap().insert(path, content);
    }
}

impl ContentCache for OverlayCache {
    fn contents(&self, path: &Path) -> Option<String> {
        self.contents.lock().unwrap().get(path).cloned()
    }
}

/// `ResourceProvider` over the real file system, reading whatever the
/// test wrote into the workspace root.
pub struct FsReader;

impl ResourceProvider for FsReader {
    fn read(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// A driver wired to the toy language over `root`, with observable host
/// and store.
pub struct ToyWorkspace {
    pub root: PathBuf,
    pub host: Arc<ToyHost>,
    pub store: Arc<InstrumentedStore>,
    pub driver: Driver<ToyHost>,
}

impl ToyWorkspace {
    /// Fresh workspace over `root` sharing `backing` as the byte store.
    /// Reusing the same `backing` across workspaces is how restarts are
    /// simulated.
    pub fn over(root: &Path, backing: Arc<dyn ByteStore>) -> Self {
        Self::with_overlay(root, backing, Arc::new(analysis_driver::NullContentCache))
    }

    pub fn with_overlay(
        root: &Path,
        backing: Arc<dyn ByteStore>,
        overlay: Arc<dyn ContentCache>,
    ) -> Self {
        let host = Arc::new(ToyHost::default());
        let store = InstrumentedStore::wrapping(backing);
        let driver = Driver::new(
            PerfLog::disabled(),
            Arc::clone(&host),
            Arc::new(FsReader),
            Arc::clone(&store) as Arc<dyn ByteStore>,
            overlay,
            Arc::new(ToySourceFactory::new(root.to_path_buf())),
            AnalysisOptions::default(),
        );
        Self {
            root: root.to_path_buf(),
            host,
            store,
            driver,
        }
    }

    /// Writes `<name>.toy` under the workspace root.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.toy"))
    }
}
