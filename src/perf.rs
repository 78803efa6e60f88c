use std::future::Future;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

/// Hierarchical, timed log of analysis phases.
///
/// `run` records entry and exit of a labeled phase with elapsed
/// milliseconds; nested phases indent. Phases are mirrored onto
/// `tracing` at debug level, and optionally written to a pluggable
/// writer. A disabled log costs one branch per phase.
#[derive(Clone, Default)]
pub struct PerfLog {
    inner: Option<Arc<Mutex<Inner>>>,
}

struct Inner {
    out: Box<dyn Write + Send>,
    depth: usize,
}

impl PerfLog {
    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn to_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Some(Arc::new(Mutex::new(Inner { out, depth: 0 }))),
        }
    }

    pub fn stderr() -> Self {
        Self::to_writer(Box::new(std::io::stderr()))
    }

    /// Runs `f` as a named phase.
    pub fn run<T>(&self, label: &str, f: impl FnOnce() -> T) -> T {
        let Some(inner) = &self.inner else {
            return f();
        };
        Self::enter(inner, label);
        let start = Instant::now();
        let value = f();
        Self::exit(inner, label, start);
        value
    }

    /// Runs `fut` as a named phase. Wall-clock time, including await
    /// suspensions, is what gets recorded.
    pub async fn run_async<T>(&self, label: &str, fut: impl Future<Output = T>) -> T {
        let Some(inner) = &self.inner else {
            return fut.await;
        };
        Self::enter(inner, label);
        let start = Instant::now();
        let value = fut.await;
        Self::exit(inner, label, start);
        value
    }

    fn enter(inner: &Arc<Mutex<Inner>>, label: &str) {
        if let Ok(mut inner) = inner.lock() {
            let indent = "  ".repeat(inner.depth);
            let _ = writeln!(inner.out, "{indent}+{label}");
            inner.depth += 1;
        }
    }

    fn exit(inner: &Arc<Mutex<Inner>>, label: &str, start: Instant) {
        let elapsed_ms = start.elapsed().as_millis();
        debug!(target: "analysis_driver::perf", %label, elapsed_ms, "phase finished");
        if let Ok(mut inner) = inner.lock() {
            inner.depth = inner.depth.saturating_sub(1);
            let indent = "  ".repeat(inner.depth);
            let _ = writeln!(inner.out, "{indent}-{label}: {elapsed_ms}ms");
        }
    }
}
