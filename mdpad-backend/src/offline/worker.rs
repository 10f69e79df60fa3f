//! OfflineWorker: one cache version through install, activation and serving
//!
//! Lifecycle: `Installing -> Installed -> Active -> Redundant`. A failed install
//! goes straight to `Redundant` and never activates.

use futures_util::future::try_join_all;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;

use super::fetcher::Fetcher;
use super::manifest::{self, FUNDAMENTALS, PAGES};
use super::storage::CacheStorage;
use super::types::{AssetRequest, CachedResponse, OfflineError};
use crate::logging::Logger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Installed,
    Active,
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        };
        write!(f, "{}", s)
    }
}

/// Where an intercepted response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    Cache,
    Network,
    /// Cache miss and network failure
    Unavailable,
}

#[derive(Debug)]
pub enum Intercepted {
    /// Not handled by the cache; the caller talks to the network itself
    Passthrough,
    Respond {
        response: CachedResponse,
        source: Served,
    },
}

/// Outcome of purging stale regions on activation
#[derive(Debug, Default, PartialEq)]
pub struct PurgeReport {
    pub deleted: Vec<String>,
    /// Regions that could not be deleted, with the reason
    pub failed: Vec<(String, String)>,
}

pub struct OfflineWorker {
    version: String,
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    state: Arc<Mutex<WorkerState>>,
    tracker: TaskTracker,
    log: Logger,
}

impl OfflineWorker {
    /// A fresh worker that still has to install
    pub fn new(
        version: impl Into<String>,
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        log: Logger,
    ) -> Self {
        Self::with_state(version.into(), storage, fetcher, WorkerState::Installing, log)
    }

    /// A worker for a version that was activated by an earlier run
    pub fn resume(
        version: impl Into<String>,
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        log: Logger,
    ) -> Self {
        Self::with_state(version.into(), storage, fetcher, WorkerState::Active, log)
    }

    fn with_state(
        version: String,
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        state: WorkerState,
        log: Logger,
    ) -> Self {
        Self {
            version,
            storage,
            fetcher,
            state: Arc::new(Mutex::new(state)),
            tracker: TaskTracker::new(),
            log,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    pub(crate) fn retire(&self) {
        *self.state.lock() = WorkerState::Redundant;
    }

    /// Fetch every manifest asset and store them in this version's
    /// fundamentals region. All or nothing.
    pub async fn install(&self, assets: &[&str]) -> Result<(), OfflineError> {
        self.log.info(format_args!("Install of {} in progress", self.version));

        match self.fetch_all(assets).await {
            Ok(entries) => {
                let region = manifest::region_name(&self.version, FUNDAMENTALS);
                if let Err(e) = self.storage.put_all(&region, &entries) {
                    self.retire();
                    return Err(e);
                }
                *self.state.lock() = WorkerState::Installed;
                self.log.info(format_args!(
                    "Install of {} complete ({} assets)",
                    self.version,
                    entries.len()
                ));
                Ok(())
            }
            Err(e) => {
                self.retire();
                self.log.error(format_args!("Install of {} failed: {}", self.version, e));
                Err(e)
            }
        }
    }

    async fn fetch_all(&self, assets: &[&str]) -> Result<Vec<(String, CachedResponse)>, OfflineError> {
        try_join_all(assets.iter().map(|path| async move {
            let request = AssetRequest::get(*path);
            let response = self.fetcher.fetch(&request).await?;
            if !response.is_success() {
                return Err(OfflineError::Install {
                    version: self.version.clone(),
                    reason: format!("{} answered {}", path, response.status),
                });
            }
            Ok((request.cache_key(), response))
        }))
        .await
    }

    /// Record this version as active, then purge every region of other versions
    pub fn activate(&self) -> Result<PurgeReport, OfflineError> {
        self.promote()?;
        self.purge_stale_regions()
    }

    /// `Installed -> Active` and persist the version, without purging.
    ///
    /// A caller replacing a running worker purges once that worker is retired
    /// and settled, so none of its refreshes land after the purge.
    pub(crate) fn promote(&self) -> Result<(), OfflineError> {
        if self.state() != WorkerState::Installed {
            return Err(OfflineError::NotInstalled(self.version.clone()));
        }
        self.log.info(format_args!("Activating {}", self.version));

        self.storage.set_active_version(&self.version)?;
        *self.state.lock() = WorkerState::Active;
        Ok(())
    }

    pub(crate) fn purge_stale_regions(&self) -> Result<PurgeReport, OfflineError> {
        let mut report = PurgeReport::default();

        for name in self.storage.region_names()? {
            if manifest::region_version(&name) == Some(self.version.as_str()) {
                continue;
            }
            match self.storage.delete_region(&name) {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    self.log
                        .warn(format_args!("Failed to delete region {}: {}", name, e));
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        self.log.info(format_args!(
            "Activation of {} complete, purged {} regions",
            self.version,
            report.deleted.len()
        ));
        Ok(report)
    }

    /// Cache-first with a concurrent network fetch.
    ///
    /// The network copy of a successful response is stored in this version's
    /// pages region after the response has been handed back, even when the
    /// cache already answered.
    pub async fn handle(&self, request: &AssetRequest) -> Intercepted {
        if !request.is_get() {
            self.log.trace(format_args!(
                "Fetch ignored: {} {}",
                request.method, request.path
            ));
            return Intercepted::Passthrough;
        }

        let key = request.cache_key();
        let cached = match self.storage.match_request(&key) {
            Ok(hit) => hit,
            Err(e) => {
                self.log.warn(format_args!("Cache lookup failed for {}: {}", key, e));
                None
            }
        };

        let networked = self.spawn_network_fetch(request.clone());

        if let Some(response) = cached {
            self.log.trace(format_args!("Fetch (cached) {}", request.path));
            return Intercepted::Respond {
                response,
                source: Served::Cache,
            };
        }

        self.log.trace(format_args!("Fetch (network) {}", request.path));
        match networked.await {
            Ok(Ok(response)) => Intercepted::Respond {
                response,
                source: Served::Network,
            },
            Ok(Err(e)) => {
                self.log.error(format_args!(
                    "Request failed in both cache and network: {}",
                    e
                ));
                Intercepted::Respond {
                    response: CachedResponse::service_unavailable(),
                    source: Served::Unavailable,
                }
            }
            Err(_) => Intercepted::Respond {
                response: CachedResponse::service_unavailable(),
                source: Served::Unavailable,
            },
        }
    }

    fn spawn_network_fetch(
        &self,
        request: AssetRequest,
    ) -> oneshot::Receiver<Result<CachedResponse, OfflineError>> {
        let (tx, rx) = oneshot::channel();
        let fetcher = Arc::clone(&self.fetcher);
        let storage = Arc::clone(&self.storage);
        let region = manifest::region_name(&self.version, PAGES);
        let log = self.log.clone();
        let state = Arc::clone(&self.state);

        self.tracker.spawn(async move {
            let result = fetcher.fetch(&request).await;
            let copy = match &result {
                Ok(response) if response.is_success() => Some(response.clone()),
                _ => None,
            };
            // The receiver is gone when the cache already answered
            let _ = tx.send(result);

            if let Some(copy) = copy {
                // A retired worker's regions are being purged
                if *state.lock() == WorkerState::Redundant {
                    log.trace(format_args!("Not storing {}: {} retired", request.path, region));
                    return;
                }
                match storage.put(&region, &request.cache_key(), &copy) {
                    Ok(()) => log.trace(format_args!("Stored {} in {}", request.path, region)),
                    Err(e) => log.warn(format_args!("Failed to store {}: {}", request.path, e)),
                }
            }
        });
        rx
    }

    /// Wait for background network fetches to finish
    pub async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
