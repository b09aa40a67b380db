// ─── Sync Pipeline ───
// Catalog → probe → staleness → batched fetch → normalize → links + keys.

pub mod guard;

use std::collections::HashSet;
use std::path::Path;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::core::catalog::CatalogSource;
use crate::core::config::{LinkStrategy, ServerPaths, ServerSettings};
use crate::core::downloader::DocumentSource;
use crate::core::error::{ServerError, ServerResult};
use crate::core::fs::{normalize_tree, KeyStore, LinkReconciler};
use crate::core::launch::discover_mods;
use crate::core::report::{IntegrityWarning, SyncReport};
use crate::core::workshop::{
    evaluate, ChangelogProbe, FetchOptions, ModCacheEntry, ModFetcher, ModMetadata, ModRegistry,
};

pub use guard::ensure_server_stopped;

/// What a sync run leaves behind for the launch phase and the operator.
#[derive(Debug)]
pub struct SyncOutcome {
    pub registry: ModRegistry,
    pub report: SyncReport,
}

pub struct SyncPipeline<'a> {
    settings: &'a ServerSettings,
    paths: ServerPaths,
    documents: &'a dyn DocumentSource,
    fetcher: &'a dyn ModFetcher,
}

impl<'a> SyncPipeline<'a> {
    pub fn new(
        settings: &'a ServerSettings,
        documents: &'a dyn DocumentSource,
        fetcher: &'a dyn ModFetcher,
    ) -> Self {
        Self {
            paths: ServerPaths::new(settings),
            settings,
            documents,
            fetcher,
        }
    }

    /// Runs the workshop synchronization.
    ///
    /// Only configuration problems and an unreachable remote catalog abort the
    /// run; everything else is isolated per mod and lands in the report.
    pub async fn run(&self) -> ServerResult<SyncOutcome> {
        let strategy = self.settings.link_strategy;
        let links = LinkReconciler::new(self.paths.presentation(), strategy);
        let mut keys = KeyStore::new(self.paths.keys(), strategy.into());

        let source = CatalogSource::from_setting(self.settings.workshop_mods.as_deref());
        let ids = match source.load(self.documents, &self.paths.preset_file()).await? {
            Some(catalog) => dedupe(catalog.ids()),
            None => Vec::new(),
        };

        links.prepare()?;
        match strategy {
            LinkStrategy::Rebuild => keys.reset()?,
            LinkStrategy::Incremental => keys.ensure_dir()?,
        }

        let mut report = SyncReport::default();
        info!("Checking {} workshop mod(s) for updates", ids.len());
        let probed = self.probe_all(ids).await;
        let (registry, known, pending) = self.plan_fetches(probed, &mut report);

        self.fetch(&pending, &mut report).await;

        info!("Create links for workshop mods in {:?}", self.paths.presentation());
        let reconciled = links.reconcile(&registry, self.paths.workshop_content())?;
        report.extend_warnings(reconciled.warnings);
        for (id, error) in reconciled.conflicts {
            report.fail(Some(&id), error);
        }
        // Every cached mod contributes keys, including ids displaced by a
        // display-name collision.
        for id in &known {
            let cache = self.paths.cache_dir(id);
            if cache.is_dir() {
                self.propagate_keys(&mut keys, &cache, &mut report);
            }
        }

        for dir in [self.paths.local_mods(), self.paths.server_mods()] {
            match discover_mods(dir) {
                Ok(mods) => {
                    for mod_dir in mods {
                        self.propagate_keys(&mut keys, &mod_dir, &mut report);
                    }
                }
                Err(e) => report.fail(None, e),
            }
        }

        report.log_summary();
        Ok(SyncOutcome { registry, report })
    }

    /// Probes every id with bounded concurrency, keeping catalog order.
    async fn probe_all(&self, ids: Vec<String>) -> Vec<(String, ServerResult<ModMetadata>)> {
        let probe = ChangelogProbe::new(self.documents);
        let probe = &probe;
        stream::iter(ids)
            .map(|id| async move {
                let result = probe.probe(&id).await;
                (id, result)
            })
            .buffered(self.settings.network.probe_concurrency.max(1))
            .collect()
            .await
    }

    /// Registers names and decides which ids need downloading. Stale caches
    /// are removed here, before the batched fetch.
    ///
    /// Returns the registry, every successfully probed id in catalog order,
    /// and the ids to fetch.
    fn plan_fetches(
        &self,
        probed: Vec<(String, ServerResult<ModMetadata>)>,
        report: &mut SyncReport,
    ) -> (ModRegistry, Vec<String>, Vec<String>) {
        let mut registry = ModRegistry::new();
        let mut known = Vec::new();
        let mut pending = Vec::new();

        for (id, result) in probed {
            let metadata = match result {
                Ok(metadata) => metadata,
                Err(e) => {
                    report.fail(Some(&id), e);
                    continue;
                }
            };

            known.push(id.clone());
            if let Some(previous_id) = registry.register(&metadata.display_name, &id) {
                report.warn(IntegrityWarning::NameCollision {
                    display_name: metadata.display_name.clone(),
                    previous_id,
                    id: id.clone(),
                });
            }

            let cache = match ModCacheEntry::inspect(self.paths.workshop_content(), &id) {
                Ok(cache) => cache,
                Err(e) => {
                    report.fail(Some(&id), e);
                    continue;
                }
            };

            let staleness = evaluate(&metadata, cache.as_ref(), self.settings.force_download);
            debug!("{} ({}): {:?}", metadata.display_name, id, staleness);

            if staleness.invalidates_cache() {
                if let Some(cache) = &cache {
                    info!("Removing outdated cache of {} ({})", metadata.display_name, id);
                    if let Err(e) = cache.invalidate() {
                        report.fail(Some(&id), e);
                        continue;
                    }
                }
            }
            if staleness.requires_fetch() {
                pending.push(id);
            }
        }

        (registry, known, pending)
    }

    async fn fetch(&self, pending: &[String], report: &mut SyncReport) {
        if pending.is_empty() {
            debug!("All workshop mods are up to date");
            return;
        }

        let options = FetchOptions {
            install_dir: self.paths.server_dir().to_path_buf(),
            app_id: self.settings.workshop_app_id.clone(),
            validate: self.settings.steam.validate,
        };

        let failed: HashSet<String> = match self.fetcher.fetch(pending, &options).await {
            Ok(()) => HashSet::new(),
            Err(ServerError::FetchTool { ids, reason }) => {
                let failed = ids.iter().cloned().collect();
                report.fail(None, ServerError::FetchTool { ids, reason });
                failed
            }
            Err(e) => {
                report.fail(None, e);
                pending.iter().cloned().collect()
            }
        };

        for id in pending.iter().filter(|id| !failed.contains(*id)) {
            report.fetched.push(id.clone());
            let dir = self.paths.cache_dir(id);
            match normalize_tree(&dir) {
                Ok(outcome) => {
                    report.renamed += outcome.renamed;
                    for conflict in outcome.conflicts {
                        report.fail(Some(id), conflict);
                    }
                }
                Err(e) => report.fail(Some(id), e),
            }
        }
    }

    fn propagate_keys(&self, keys: &mut KeyStore, mod_dir: &Path, report: &mut SyncReport) {
        match keys.propagate(mod_dir) {
            Ok(warnings) => report.extend_warnings(warnings),
            Err(e) => report.fail(None, e),
        }
    }
}

/// Ids in first-occurrence order.
fn dedupe<'c>(ids: impl Iterator<Item = &'c str>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}
