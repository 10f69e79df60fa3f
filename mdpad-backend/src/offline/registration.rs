//! Registration: owns the worker that currently serves requests
//!
//! A new version installs next to the active one and only takes over once it
//! has activated. Until then, and when it fails, the old worker keeps serving.

use mdpad_types::OfflineStatus;
use parking_lot::RwLock;
use std::sync::Arc;

use super::fetcher::Fetcher;
use super::storage::CacheStorage;
use super::types::{AssetRequest, OfflineError};
use super::worker::{Intercepted, OfflineWorker, PurgeReport};
use crate::logging::Logger;

pub struct Registration {
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    active: RwLock<Option<Arc<OfflineWorker>>>,
    log: Logger,
}

impl Registration {
    /// Resume the version recorded by an earlier activation, if any
    pub fn new(
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        log: Logger,
    ) -> Result<Self, OfflineError> {
        let active = match storage.active_version()? {
            Some(version) => {
                log.info(format_args!("Resuming cache version {}", version));
                Some(Arc::new(OfflineWorker::resume(
                    version,
                    Arc::clone(&storage),
                    Arc::clone(&fetcher),
                    log.clone(),
                )))
            }
            None => None,
        };

        Ok(Self {
            storage,
            fetcher,
            active: RwLock::new(active),
            log,
        })
    }

    /// Install and activate `version`, then route requests to it.
    ///
    /// Registering the version that is already active does nothing.
    pub async fn register(
        &self,
        version: &str,
        assets: &[&str],
    ) -> Result<Option<PurgeReport>, OfflineError> {
        if self.active().is_some_and(|w| w.version() == version) {
            self.log
                .trace(format_args!("Version {} already active", version));
            return Ok(None);
        }

        let worker = Arc::new(OfflineWorker::new(
            version,
            Arc::clone(&self.storage),
            Arc::clone(&self.fetcher),
            self.log.clone(),
        ));
        worker.install(assets).await?;
        worker.promote()?;

        let previous = self.active.write().replace(Arc::clone(&worker));
        if let Some(previous) = previous {
            previous.retire();
            previous.settle().await;
        }

        // Only after the old worker's refreshes have drained
        let report = worker.purge_stale_regions()?;
        Ok(Some(report))
    }

    pub fn active(&self) -> Option<Arc<OfflineWorker>> {
        self.active.read().clone()
    }

    /// Route a request to the active worker; without one, pass it through
    pub async fn handle(&self, request: &AssetRequest) -> Intercepted {
        match self.active() {
            Some(worker) => worker.handle(request).await,
            None => Intercepted::Passthrough,
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub fn status(&self) -> Result<OfflineStatus, OfflineError> {
        let active = self.active();
        Ok(OfflineStatus {
            active_version: active.as_ref().map(|w| w.version().to_string()),
            worker_state: active.map(|w| w.state().to_string()),
            regions: self.storage.region_names()?,
        })
    }

    /// Drain background fetches of the active worker
    pub async fn settle(&self) {
        if let Some(worker) = self.active() {
            worker.settle().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::types::CachedResponse;
    use crate::offline::worker::tests::StubFetcher;
    use crate::offline::worker::{Served, WorkerState};
    use std::time::Duration;

    const ASSETS: &[&str] = &["/", "/pad"];

    fn registration(storage: &Arc<CacheStorage>, fetcher: &Arc<StubFetcher>) -> Registration {
        Registration::new(
            Arc::clone(storage),
            fetcher.clone(),
            Logger::quiet("OFFLINE"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_no_worker_passes_through() {
        let storage = Arc::new(CacheStorage::open_in_memory().unwrap());
        let fetcher = Arc::new(StubFetcher::serving(ASSETS, ""));
        let reg = registration(&storage, &fetcher);

        assert!(matches!(
            reg.handle(&AssetRequest::get("/pad")).await,
            Intercepted::Passthrough
        ));
        assert_eq!(reg.status().unwrap().active_version, None);
    }

    #[tokio::test]
    async fn test_register_then_serve_from_cache() {
        let storage = Arc::new(CacheStorage::open_in_memory().unwrap());
        let fetcher = Arc::new(StubFetcher::serving(ASSETS, "v1"));
        let reg = registration(&storage, &fetcher);

        reg.register("v1", ASSETS).await.unwrap();
        fetcher.go_offline();

        match reg.handle(&AssetRequest::get("/pad")).await {
            Intercepted::Respond { response, source } => {
                assert_eq!(response.body, b"v1/pad");
                assert_eq!(source, Served::Cache);
            }
            Intercepted::Passthrough => panic!("expected a cached response"),
        }
        let status = reg.status().unwrap();
        assert_eq!(status.active_version.as_deref(), Some("v1"));
        assert_eq!(status.worker_state.as_deref(), Some("active"));
    }

    #[tokio::test]
    async fn test_same_version_is_not_reinstalled() {
        let storage = Arc::new(CacheStorage::open_in_memory().unwrap());
        let fetcher = Arc::new(StubFetcher::serving(ASSETS, "v1"));
        let reg = registration(&storage, &fetcher);

        reg.register("v1", ASSETS).await.unwrap();
        let calls = fetcher.calls();
        assert!(reg.register("v1", ASSETS).await.unwrap().is_none());
        assert_eq!(fetcher.calls(), calls);
    }

    #[tokio::test]
    async fn test_failed_upgrade_keeps_old_version() {
        let storage = Arc::new(CacheStorage::open_in_memory().unwrap());
        let fetcher = Arc::new(StubFetcher::serving(ASSETS, "v1"));
        let reg = registration(&storage, &fetcher);
        reg.register("v1", ASSETS).await.unwrap();

        fetcher.respond("/pad", 500, "broken deploy");
        assert!(reg.register("v2", ASSETS).await.is_err());

        let active = reg.active().unwrap();
        assert_eq!(active.version(), "v1");
        assert_eq!(storage.active_version().unwrap().as_deref(), Some("v1"));
        assert!(storage.region_names().unwrap().contains(&"v1::fundamentals".to_string()));
    }

    #[tokio::test]
    async fn test_upgrade_swaps_worker_and_purges() {
        let storage = Arc::new(CacheStorage::open_in_memory().unwrap());
        let fetcher = Arc::new(StubFetcher::serving(ASSETS, "v1"));
        let reg = registration(&storage, &fetcher);
        reg.register("v1", ASSETS).await.unwrap();
        let old = reg.active().unwrap();

        for path in ASSETS {
            fetcher.respond(path, 200, &format!("v2{}", path));
        }
        let report = reg.register("v2", ASSETS).await.unwrap().unwrap();

        assert_eq!(report.deleted, vec!["v1::fundamentals"]);
        assert_eq!(old.state(), WorkerState::Redundant);
        assert_eq!(reg.active().unwrap().version(), "v2");
        assert_eq!(
            storage.match_request("GET /").unwrap(),
            Some(CachedResponse::new(200, "text/plain", "v2/"))
        );
    }

    #[tokio::test]
    async fn test_upgrade_during_slow_refresh_leaves_no_old_region() {
        let storage = Arc::new(CacheStorage::open_in_memory().unwrap());
        let fetcher = Arc::new(StubFetcher::serving(ASSETS, "v1"));
        let reg = Arc::new(registration(&storage, &fetcher));
        reg.register("v1", ASSETS).await.unwrap();

        fetcher.respond("/slow", 200, "slow body");
        fetcher.delay("/slow", Duration::from_millis(200));
        let pending = {
            let reg = Arc::clone(&reg);
            tokio::spawn(async move { reg.handle(&AssetRequest::get("/slow")).await })
        };
        // Let the v1 worker start its network fetch
        tokio::time::sleep(Duration::from_millis(20)).await;

        let report = reg.register("v2", ASSETS).await.unwrap().unwrap();

        match pending.await.unwrap() {
            Intercepted::Respond { response, source } => {
                assert_eq!(response.body, b"slow body");
                assert_eq!(source, Served::Network);
            }
            Intercepted::Passthrough => panic!("expected a network response"),
        }
        assert_eq!(report.deleted, vec!["v1::fundamentals"]);
        reg.settle().await;
        let regions = storage.region_names().unwrap();
        assert!(
            regions.iter().all(|r| !r.starts_with("v1::")),
            "stale regions left: {:?}",
            regions
        );
        assert_eq!(reg.active().unwrap().version(), "v2");
    }

    #[tokio::test]
    async fn test_restart_resumes_active_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let fetcher = Arc::new(StubFetcher::serving(ASSETS, "v1"));
        {
            let storage = Arc::new(CacheStorage::open(&path).unwrap());
            registration(&storage, &fetcher)
                .register("v1", ASSETS)
                .await
                .unwrap();
        }

        let storage = Arc::new(CacheStorage::open(&path).unwrap());
        let reg = registration(&storage, &fetcher);
        let active = reg.active().unwrap();
        assert_eq!(active.version(), "v1");
        assert_eq!(active.state(), WorkerState::Active);
    }
}
