//! The incremental-analysis driver.
//!
//! The driver owns all mutable analysis state and serves three kinds of
//! client requests: the added file set, per-file result futures, and
//! change notifications. It is eventually consistent: it never watches
//! the file system, only reacts to notifications, and promises that
//! once clients stop calling, every explicit file gets a result that
//! reflects the most recent snapshot it was told about.

use crate::config::AnalysisOptions;
use crate::error::{DriverError, DriverResult};
use crate::file::{FileContext, FileTracker};
use crate::graph::LibraryContext;
use crate::host::{AnalysisHost, AnalysisRequest, ContentCache, ResourceProvider, SourceFactory};
use crate::perf::PerfLog;
use crate::store::{self, ByteStore};
use crate::summary::{ErrorsTable, SdkBundle, SummaryCache};
use crate::types::{AnalysisError, AnalysisResult, SourceUri};
use dashmap::DashMap;
use futures::Stream;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, error, warn};

/// Global driver activity state, observable through [`Driver::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    Analyzing,
    Idle,
}

/// Hot stream of analysis results. Single consumer; dropping it stops
/// the work loop after the current step.
pub struct ResultStream<R> {
    rx: mpsc::UnboundedReceiver<AnalysisResult<R>>,
}

impl<R> ResultStream<R> {
    pub async fn next(&mut self) -> Option<AnalysisResult<R>> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`next`](Self::next) for draining results
    /// already buffered.
    pub fn try_next(&mut self) -> Option<AnalysisResult<R>> {
        self.rx.try_recv().ok()
    }
}

impl<R> Stream for ResultStream<R> {
    type Item = AnalysisResult<R>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

type Waiter<R> = oneshot::Sender<DriverResult<AnalysisResult<R>>>;

/// Queues and sets the work loop drains. All mutations are simple
/// insertions the loop inspects on each iteration.
struct Scheduler<R> {
    /// Files clients have added.
    explicit: HashSet<PathBuf>,
    /// Pending analysis, insertion-ordered.
    queue: VecDeque<PathBuf>,
    queued: HashSet<PathBuf>,
    /// Files whose API signature must be revalidated before the next
    /// analysis pass.
    verify: HashSet<PathBuf>,
    /// Pending `get_result` promises, serviced before queued files.
    requested: HashMap<PathBuf, Vec<Waiter<R>>>,
    request_order: VecDeque<PathBuf>,
    /// Reorder hint only; no strict ordering contract.
    priority: Vec<PathBuf>,
}

impl<R> Default for Scheduler<R> {
    fn default() -> Self {
        Self {
            explicit: HashSet::new(),
            queue: VecDeque::new(),
            queued: HashSet::new(),
            verify: HashSet::new(),
            requested: HashMap::new(),
            request_order: VecDeque::new(),
            priority: Vec::new(),
        }
    }
}

impl<R> Scheduler<R> {
    fn enqueue(&mut self, path: PathBuf) {
        if self.queued.insert(path.clone()) {
            self.queue.push_back(path);
        }
    }

    fn dequeue(&mut self, path: &Path) {
        if self.queued.remove(path) {
            if let Some(index) = self.queue.iter().position(|queued| queued == path) {
                self.queue.remove(index);
            }
        }
    }

    fn pop(&mut self) -> Option<PathBuf> {
        let index = self
            .priority
            .iter()
            .find_map(|p| self.queue.iter().position(|queued| queued == p))
            .unwrap_or(0);
        let path = self.queue.remove(index)?;
        self.queued.remove(&path);
        Some(path)
    }

    fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.requested.is_empty() && self.verify.is_empty()
    }
}

struct Work<R> {
    path: PathBuf,
    waiters: Vec<Waiter<R>>,
}

struct Shared<H: AnalysisHost> {
    log: PerfLog,
    files: FileContext<H>,
    store: Arc<dyn ByteStore>,
    summaries: SummaryCache<H>,
    sdk: Arc<SdkBundle>,
    scheduler: Mutex<Scheduler<H::Resolved>>,
    /// Memoized dependency signatures per library URI. Cleared as a
    /// whole on any API-signature mismatch.
    signatures: DashMap<SourceUri, String>,
    status: watch::Sender<AnalysisStatus>,
    status_rx: watch::Receiver<AnalysisStatus>,
    shut_down: AtomicBool,
}

/// The incremental-analysis driver.
///
/// Construction spawns the work loop on the current tokio runtime. The
/// loop blocks on a wake channel; every client operation writes to it.
/// Results are delivered on the stream returned by [`Driver::results`]
/// and through [`Driver::get_result`] futures.
pub struct Driver<H: AnalysisHost> {
    shared: Arc<Shared<H>>,
    wake: mpsc::UnboundedSender<String>,
    results_rx: Option<mpsc::UnboundedReceiver<AnalysisResult<H::Resolved>>>,
}

impl<H: AnalysisHost> Driver<H> {
    /// Creates a driver over the given collaborators and starts its
    /// work loop. Must be called inside a tokio runtime.
    pub fn new(
        log: PerfLog,
        host: Arc<H>,
        resources: Arc<dyn ResourceProvider>,
        byte_store: Arc<dyn ByteStore>,
        content_cache: Arc<dyn ContentCache>,
        source_factory: Arc<dyn SourceFactory>,
        options: AnalysisOptions,
    ) -> Self {
        let sdk = source_factory.sdk_bundle();
        let files = FileContext {
            resources,
            overlay: content_cache,
            sources: source_factory,
            host: Arc::clone(&host),
            tracker: Arc::new(FileTracker::new()),
            options,
        };
        let summaries = SummaryCache::new(Arc::clone(&byte_store), host);
        let (status, status_rx) = watch::channel(AnalysisStatus::Idle);
        let shared = Arc::new(Shared {
            log,
            files,
            store: byte_store,
            summaries,
            sdk,
            scheduler: Mutex::new(Scheduler::default()),
            signatures: DashMap::new(),
            status,
            status_rx,
            shut_down: AtomicBool::new(false),
        });

        let (wake, wake_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        tokio::spawn(work_loop(Arc::clone(&shared), wake_rx, results_tx));

        Self {
            shared,
            wake,
            results_rx: Some(results_rx),
        }
    }

    /// Adds `path` to the set of explicitly analyzed files and schedules
    /// it.
    pub async fn add_file(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        {
            let mut scheduler = self.shared.scheduler.lock().await;
            scheduler.explicit.insert(path.clone());
            scheduler.enqueue(path);
            self.shared.mark_analyzing();
        }
        self.wake("add");
    }

    /// Removes `path` from the explicit set and the pending queue.
    /// Content-addressed artifacts stay; an in-flight result for the
    /// file may still be delivered.
    pub async fn remove_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        {
            let mut scheduler = self.shared.scheduler.lock().await;
            scheduler.explicit.remove(path);
            scheduler.dequeue(path);
        }
        self.wake("remove");
    }

    /// Notifies the driver that `path` may have changed. The file's API
    /// signature is revalidated before the next analysis pass; the path
    /// need not be explicit.
    pub async fn change_file(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        {
            let mut scheduler = self.shared.scheduler.lock().await;
            scheduler.verify.insert(path.clone());
            scheduler.enqueue(path);
            self.shared.mark_analyzing();
        }
        self.wake("change");
    }

    /// Computes one up-to-date result for `path`. Exactly one result
    /// resolves this future; further unsolicited results may still
    /// appear on the results stream.
    pub async fn get_result(
        &self,
        path: impl Into<PathBuf>,
    ) -> DriverResult<AnalysisResult<H::Resolved>> {
        let path = path.into();
        let (tx, rx) = oneshot::channel();
        {
            let mut scheduler = self.shared.scheduler.lock().await;
            if self.shared.shut_down.load(Ordering::SeqCst) {
                return Err(DriverError::ShutDown);
            }
            scheduler.request_order.push_back(path.clone());
            scheduler.requested.entry(path).or_default().push(tx);
            self.shared.mark_analyzing();
        }
        self.wake("request");
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(DriverError::ShutDown),
        }
    }

    /// Hints that `paths` should be processed before other pending
    /// files. Best effort; no strict ordering is promised.
    pub async fn set_priority_files(&self, paths: Vec<PathBuf>) {
        {
            let mut scheduler = self.shared.scheduler.lock().await;
            scheduler.priority = paths;
        }
        self.wake("priority");
    }

    /// Takes the results stream. `None` after the first call: the
    /// stream has a single consumer.
    pub fn results(&mut self) -> Option<ResultStream<H::Resolved>> {
        self.results_rx.take().map(|rx| ResultStream { rx })
    }

    /// Watches the analyzing/idle flag.
    pub fn status(&self) -> watch::Receiver<AnalysisStatus> {
        self.shared.status_rx.clone()
    }

    /// Resolves once the driver has drained all pending work.
    pub async fn idle(&self) {
        let mut status = self.shared.status_rx.clone();
        let _ = status.wait_for(|s| *s == AnalysisStatus::Idle).await;
    }

    fn wake(&self, reason: &str) {
        // Payload is advisory; a dead loop just means shutdown.
        let _ = self.wake.send(reason.to_string());
    }
}

async fn work_loop<H: AnalysisHost>(
    shared: Arc<Shared<H>>,
    mut wake: mpsc::UnboundedReceiver<String>,
    results: mpsc::UnboundedSender<AnalysisResult<H::Resolved>>,
) {
    debug!("analysis loop started");
    'outer: while let Some(_reason) = wake.recv().await {
        loop {
            shared.verify_changed_files().await;
            let Some(work) = shared.next_work().await else {
                break;
            };
            match shared.analyze(&work.path).await {
                Ok(result) => {
                    if results.send(result.clone()).is_err() {
                        // Subscriber tore the stream down; stop after
                        // the current step.
                        for waiter in work.waiters {
                            let _ = waiter.send(Err(DriverError::ShutDown));
                        }
                        break 'outer;
                    }
                    for waiter in work.waiters {
                        let _ = waiter.send(Ok(result.clone()));
                    }
                }
                Err(failure) => {
                    error!(path = %work.path.display(), error = %failure, "analysis failed");
                    for waiter in work.waiters {
                        let _ = waiter.send(Err(failure.clone()));
                    }
                }
            }
        }
        shared.mark_idle_if_drained().await;
    }
    shared.fail_pending().await;
    debug!("analysis loop stopped");
}

impl<H: AnalysisHost> Shared<H> {
    fn mark_analyzing(&self) {
        self.status.send_if_modified(|status| {
            let changed = *status != AnalysisStatus::Analyzing;
            *status = AnalysisStatus::Analyzing;
            changed
        });
    }

    async fn mark_idle_if_drained(&self) {
        let scheduler = self.scheduler.lock().await;
        if scheduler.is_drained() {
            self.status.send_if_modified(|status| {
                let changed = *status != AnalysisStatus::Idle;
                *status = AnalysisStatus::Idle;
                changed
            });
        }
    }

    /// Revalidates the API signature of every changed file.
    ///
    /// A single mismatch is coarse but sound: the memoized dependency
    /// signatures all die and every explicit file is re-analyzed.
    /// Without a mismatch only the changed files themselves (already
    /// queued by `change_file`) are re-analyzed.
    async fn verify_changed_files(&self) {
        let mut paths: Vec<PathBuf> = {
            let scheduler = self.scheduler.lock().await;
            if scheduler.verify.is_empty() {
                return;
            }
            scheduler.verify.iter().cloned().collect()
        };
        paths.sort_unstable();

        self.log
            .run_async("verify API signatures of changed files", async {
                for path in &paths {
                    let file = self.files.handle(path.clone());
                    let previous = self.summaries.current_unlinked(&file).await;
                    // Force a fresh content read, rehash, and reparse.
                    self.files.tracker().forget_hash(path);
                    let current = self.summaries.unlinked_for(&file).await;

                    let api_changed = previous
                        .as_ref()
                        .is_some_and(|p| p.api_signature != current.api_signature);
                    if api_changed {
                        debug!(
                            path = %path.display(),
                            "API signature changed, re-analyzing every explicit file"
                        );
                        self.signatures.clear();
                        let mut scheduler = self.scheduler.lock().await;
                        let mut explicit: Vec<PathBuf> =
                            scheduler.explicit.iter().cloned().collect();
                        explicit.sort_unstable();
                        for explicit_path in explicit {
                            scheduler.enqueue(explicit_path);
                        }
                        break;
                    }
                }
            })
            .await;

        // Only the snapshot taken for this pass leaves the set, mismatch
        // or not. A change notification that raced in while verification
        // awaited store reads keeps its entry for the next pass.
        let mut scheduler = self.scheduler.lock().await;
        for path in &paths {
            scheduler.verify.remove(path);
        }
    }

    async fn next_work(&self) -> Option<Work<H::Resolved>> {
        let mut scheduler = self.scheduler.lock().await;

        // Requested files first: someone is awaiting them.
        while let Some(path) = scheduler.request_order.pop_front() {
            if let Some(waiters) = scheduler.requested.remove(&path) {
                scheduler.dequeue(&path);
                return Some(Work { path, waiters });
            }
        }

        scheduler.pop().map(|path| Work {
            path,
            waiters: Vec::new(),
        })
    }

    async fn analyze(&self, path: &Path) -> DriverResult<AnalysisResult<H::Resolved>> {
        let label = format!("analyze {}", path.display());
        self.log.run_async(&label, self.analyze_uncached(path)).await
    }

    async fn analyze_uncached(&self, path: &Path) -> DriverResult<AnalysisResult<H::Resolved>> {
        let file = self.files.handle(path.to_path_buf());
        // Content first: everything derived below must describe this
        // exact snapshot, and reading refreshes the tracked hash.
        let content = file.content();
        let content_hash = file.content_hash();

        let context = LibraryContext::create(
            &file,
            &self.summaries,
            &self.sdk,
            &self.signatures,
            &self.log,
        )
        .await
        .map_err(|e| DriverError::Analysis {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })?;

        let key = store::errors_key(context.target_signature(), &content_hash);
        if let Some(bytes) = self.store.get(&key).await {
            match ErrorsTable::decode(&bytes) {
                Ok(table) => {
                    debug!(path = %path.display(), "errors served from the byte store");
                    return Ok(AnalysisResult {
                        path: path.to_path_buf(),
                        uri: file.uri().clone(),
                        content,
                        content_hash,
                        resolved: None,
                        errors: table.errors,
                    });
                }
                Err(_) => warn!(%key, "malformed errors table, recomputing"),
            }
        }

        let outcome = self
            .files
            .host()
            .analyze(AnalysisRequest {
                path,
                uri: file.uri(),
                content: &content,
                exists: file.exists(),
                summaries: &context.summaries,
                options: &self.files.options,
            })
            .map_err(|e| DriverError::Analysis {
                path: path.to_path_buf(),
                reason: format!("{e:#}"),
            })?;

        let errors: Vec<AnalysisError> = outcome
            .errors
            .into_iter()
            .filter(|e| !e.is_todo())
            .collect();
        match (ErrorsTable {
            errors: errors.clone(),
        })
        .encode()
        {
            Ok(bytes) => self.store.put(&key, bytes).await,
            Err(e) => warn!(%key, error = %e, "failed to encode errors table"),
        }

        Ok(AnalysisResult {
            path: path.to_path_buf(),
            uri: file.uri().clone(),
            content,
            content_hash,
            resolved: Some(Arc::new(outcome.resolved)),
            errors,
        })
        // `file` and `context` die here, releasing the resolved trees
        // and the per-step summary store.
    }

    async fn fail_pending(&self) {
        let mut scheduler = self.scheduler.lock().await;
        self.shut_down.store(true, Ordering::SeqCst);
        scheduler.request_order.clear();
        for (_, waiters) in scheduler.requested.drain() {
            for waiter in waiters {
                let _ = waiter.send(Err(DriverError::ShutDown));
            }
        }
        self.status.send_if_modified(|status| {
            let changed = *status != AnalysisStatus::Idle;
            *status = AnalysisStatus::Idle;
            changed
        });
    }
}
