//! Library dependency graph and dependency signatures.
//!
//! A `LibraryContext` is built fresh for every analysis step: a node
//! arena keyed by URI, an in-memory summary store covering the target's
//! transitive closure, and the signatures that key linked bundles and
//! error tables in the byte store. Child links are URI keys into the
//! arena, never owning references, so import cycles cannot leak.

use crate::file::FileHandle;
use crate::host::AnalysisHost;
use crate::perf::PerfLog;
use crate::store;
use crate::summary::{SdkBundle, SummaryBundle, SummaryCache, SummaryDataStore, UnlinkedSummary};
use crate::types::{is_platform_reference, SourceUri};
use anyhow::Result;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// One library in the import/export graph.
///
/// Nodes are equated by URI; they live only as long as the context that
/// built them, while their dependency signature is memoized globally
/// until an API-signature mismatch invalidates it.
pub struct LibraryNode {
    pub uri: SourceUri,
    /// Unlinked summaries of the defining unit and its parts, in
    /// traversal order.
    pub unlinked: Vec<Arc<UnlinkedSummary>>,
    /// Imported and exported library URIs. Platform references are
    /// excluded; the SDK bundle serves those.
    pub dependencies: Vec<SourceUri>,
    signature: OnceCell<String>,
}

impl PartialEq for LibraryNode {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for LibraryNode {}

impl LibraryNode {
    /// The signature computed for this node, if the context has resolved
    /// it already.
    pub fn dependency_signature(&self) -> Option<&str> {
        self.signature.get().map(String::as_str)
    }
}

/// The populated library graph and summary store for one analysis step.
pub struct LibraryContext {
    target: SourceUri,
    target_signature: String,
    nodes: HashMap<SourceUri, LibraryNode>,
    pub summaries: SummaryDataStore,
}

impl LibraryContext {
    pub fn target(&self) -> &SourceUri {
        &self.target
    }

    /// Dependency signature of the target library; combined with the
    /// content hash it keys the cached error table.
    pub fn target_signature(&self) -> &str {
        &self.target_signature
    }

    pub fn node(&self, uri: &SourceUri) -> Option<&LibraryNode> {
        self.nodes.get(uri)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Builds the context for `file`'s library.
    ///
    /// Walks the import/export graph from the target, resolving every
    /// unlinked summary through the byte store, then loads or produces
    /// linked summaries: misses across the whole graph are collected and
    /// handed to the host linker as one batch.
    pub(crate) async fn create<H: AnalysisHost>(
        file: &FileHandle<H>,
        cache: &SummaryCache<H>,
        sdk: &SdkBundle,
        signatures: &DashMap<SourceUri, String>,
        log: &PerfLog,
    ) -> Result<LibraryContext> {
        log.run_async(&format!("createLibraryContext {}", file.uri()), async {
            let mut nodes: HashMap<SourceUri, LibraryNode> = HashMap::new();
            let mut summaries = SummaryDataStore::with_sdk(sdk);

            // Walk the graph. A node enters the arena before its
            // dependencies are explored, which is what terminates
            // import cycles.
            let mut worklist: Vec<FileHandle<H>> = vec![file.clone()];
            while let Some(lib) = worklist.pop() {
                let uri = lib.uri().clone();
                if uri.is_platform() || nodes.contains_key(&uri) {
                    continue;
                }

                let unlinked = cache.unlinked_for(&lib).await;
                summaries.add_unlinked(uri.clone(), Arc::clone(&unlinked));

                let mut bundles = vec![Arc::clone(&unlinked)];
                for part in &unlinked.parts {
                    if let Some(part_file) = lib.resolve_uri(part) {
                        let part_summary = cache.unlinked_for(&part_file).await;
                        summaries.add_unlinked(part_file.uri().clone(), Arc::clone(&part_summary));
                        bundles.push(part_summary);
                    }
                }

                let mut dependencies = Vec::new();
                let mut dep_uris = HashSet::new();
                for reference in unlinked.imports.iter().chain(&unlinked.exports) {
                    if is_platform_reference(reference) {
                        continue;
                    }
                    let Some(dep) = lib.resolve_uri(reference) else {
                        continue;
                    };
                    if dep_uris.insert(dep.uri().clone()) {
                        dependencies.push(dep.uri().clone());
                        if !nodes.contains_key(dep.uri()) {
                            worklist.push(dep);
                        }
                    }
                }

                nodes.insert(
                    uri.clone(),
                    LibraryNode {
                        uri,
                        unlinked: bundles,
                        dependencies,
                        signature: OnceCell::new(),
                    },
                );
            }

            // Resolve linked summaries: byte-store hits load directly,
            // misses are linked in one batch against the in-memory store.
            let mut uris: Vec<SourceUri> = nodes.keys().cloned().collect();
            uris.sort_unstable();

            let mut misses: Vec<(SourceUri, String)> = Vec::new();
            for uri in &uris {
                let Some(node) = nodes.get(uri) else { continue };
                let signature = node_signature(&nodes, node, &sdk.api_signature, signatures);
                if summaries.has_linked(uri) {
                    continue;
                }
                let key = store::linked_key(&signature);
                if let Some(bytes) = cache.store().get(&key).await {
                    match SummaryBundle::decode(&key, &bytes) {
                        Ok(mut bundle) if !bundle.linked.is_empty() => {
                            summaries.add_linked(uri.clone(), Arc::new(bundle.linked.remove(0)));
                            continue;
                        }
                        Ok(_) => warn!(%key, "stored bundle holds no linked library, relinking"),
                        Err(e) => warn!(error = %e, "treating malformed bundle as a miss"),
                    }
                }
                misses.push((uri.clone(), signature));
            }

            if !misses.is_empty() {
                let roots: Vec<SourceUri> = misses.iter().map(|(uri, _)| uri.clone()).collect();
                debug!(count = roots.len(), "linking libraries not found in the byte store");
                let ctx = file.context();
                let produced = ctx.host().link(&roots, &summaries, &ctx.options)?;
                for (uri, signature) in &misses {
                    let Some(linked) = produced.get(uri) else {
                        warn!(uri = %uri, "linker produced no bundle for root");
                        continue;
                    };
                    match SummaryBundle::one_linked(linked.clone()).encode() {
                        Ok(bytes) => cache.store().put(&store::linked_key(signature), bytes).await,
                        Err(e) => warn!(uri = %uri, error = %e, "failed to encode linked bundle"),
                    }
                    summaries.add_linked(uri.clone(), Arc::new(linked.clone()));
                }
            }

            let target = file.uri().clone();
            let target_signature = match nodes.get(&target) {
                Some(node) => node_signature(&nodes, node, &sdk.api_signature, signatures),
                // The target itself is a platform library; its signature
                // is just the SDK's.
                None => sdk.api_signature.clone(),
            };

            Ok(LibraryContext {
                target,
                target_signature,
                nodes,
                summaries,
            })
        })
        .await
    }
}

/// Computes (or recalls) the dependency signature of `node`.
///
/// The digest covers, in order: the node's own URI, then the *sorted*
/// API signatures of every unlinked summary in the node's transitive
/// closure plus the SDK bundle's. Sorting makes the signature
/// independent of traversal order, which is what keeps it reproducible
/// across runs.
fn node_signature(
    nodes: &HashMap<SourceUri, LibraryNode>,
    node: &LibraryNode,
    sdk_api_signature: &str,
    memo: &DashMap<SourceUri, String>,
) -> String {
    if let Some(signature) = memo.get(&node.uri) {
        return signature.clone();
    }

    let signature = node
        .signature
        .get_or_init(|| {
            let mut closure: Vec<&LibraryNode> = Vec::new();
            let mut seen: HashSet<&SourceUri> = HashSet::new();
            let mut stack = vec![node];
            seen.insert(&node.uri);
            while let Some(current) = stack.pop() {
                closure.push(current);
                for dep in &current.dependencies {
                    if let Some(dep_node) = nodes.get(dep) {
                        if seen.insert(&dep_node.uri) {
                            stack.push(dep_node);
                        }
                    }
                }
            }

            let mut api_signatures: Vec<&str> = closure
                .iter()
                .flat_map(|n| n.unlinked.iter().map(|u| u.api_signature.as_str()))
                .collect();
            api_signatures.push(sdk_api_signature);
            api_signatures.sort_unstable();

            let parts = std::iter::once(node.uri.as_str().as_bytes())
                .chain(api_signatures.iter().map(|s| s.as_bytes()));
            crate::hash::hex_digest(parts)
        })
        .clone();

    memo.insert(node.uri.clone(), signature.clone());
    signature
}
