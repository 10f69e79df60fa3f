//! Offline cache manager
//!
//! Keeps a versioned snapshot of the editor's static assets so they can be
//! served when the asset origin is unreachable. Requests are answered
//! cache-first while a network fetch refreshes the copy in the background.

pub mod fetcher;
pub mod manifest;
pub mod registration;
pub mod storage;
pub mod types;
pub mod worker;

pub use fetcher::{Fetcher, HttpFetcher};
pub use registration::Registration;
pub use storage::CacheStorage;
pub use types::{AssetRequest, CachedResponse, OfflineError};
pub use worker::{Intercepted, OfflineWorker, PurgeReport, Served, WorkerState};
