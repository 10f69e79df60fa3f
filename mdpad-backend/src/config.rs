use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::offline::manifest;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    /// SQLite file holding the offline cache regions
    pub const OFFLINE_CACHE_DB: &str = "OFFLINE_CACHE_DB";
    /// Where the static editor assets are fetched from (e.g. "http://127.0.0.1:8000")
    pub const ASSET_ORIGIN: &str = "ASSET_ORIGIN";
    /// Overrides the built-in cache version tag
    pub const CACHE_VERSION: &str = "CACHE_VERSION";
    pub const AUTOSAVE_INTERVAL_SECS: &str = "AUTOSAVE_INTERVAL_SECS";
    /// JSON object file holding the pre-database flat storage, migrated once on boot
    pub const LEGACY_STORAGE_PATH: &str = "LEGACY_STORAGE_PATH";
    pub const PAD_PREFIX: &str = "PAD_PREFIX";
    pub const PAD_LIST_KEY: &str = "PAD_LIST_KEY";
    /// Set to "true" or "1" to log every store operation at info level
    pub const VERBOSE: &str = "MDPAD_VERBOSE";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 8080;
    pub const DATABASE_URL: &str = "./.db/mdpad.db";
    pub const OFFLINE_CACHE_DB: &str = "./.db/offline-cache.db";
    pub const ASSET_ORIGIN: &str = "http://127.0.0.1:8000";
    pub const AUTOSAVE_INTERVAL_SECS: u64 = 10;
    pub const LEGACY_STORAGE_PATH: &str = "./.db/legacy-local-storage.json";
    pub const PAD_PREFIX: &str = "mdp_pad_";
    pub const PAD_LIST_KEY: &str = "mdp_list";
    pub const HOME_PAD: &str = "home";
}

/// Store key layout for pads
#[derive(Debug, Clone)]
pub struct PadKeys {
    /// Prepended to a pad name to form its content key
    pub pad_prefix: String,
    /// Key of the JSON-encoded pad name list
    pub list_key: String,
    /// Pad that always exists when the list would otherwise be empty
    pub home_pad: String,
}

impl Default for PadKeys {
    fn default() -> Self {
        Self {
            pad_prefix: defaults::PAD_PREFIX.to_string(),
            list_key: defaults::PAD_LIST_KEY.to_string(),
            home_pad: defaults::HOME_PAD.to_string(),
        }
    }
}

impl PadKeys {
    pub fn content_key(&self, pad: &str) -> String {
        format!("{}{}", self.pad_prefix, pad)
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub offline_cache_db: String,
    pub asset_origin: String,
    pub cache_version: String,
    pub autosave_interval: Duration,
    pub legacy_storage_path: PathBuf,
    pub pad_keys: PadKeys,
    pub verbose: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let pad_defaults = PadKeys::default();

        Self {
            port: env::var(env_vars::PORT)
                .unwrap_or_else(|_| defaults::PORT.to_string())
                .parse()
                .expect("PORT must be a valid number"),
            database_url: env::var(env_vars::DATABASE_URL)
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),
            offline_cache_db: env::var(env_vars::OFFLINE_CACHE_DB)
                .unwrap_or_else(|_| defaults::OFFLINE_CACHE_DB.to_string()),
            asset_origin: asset_origin_from_env(),
            cache_version: env::var(env_vars::CACHE_VERSION)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| manifest::VERSION.to_string()),
            autosave_interval: Duration::from_secs(
                env::var(env_vars::AUTOSAVE_INTERVAL_SECS)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(defaults::AUTOSAVE_INTERVAL_SECS),
            ),
            legacy_storage_path: PathBuf::from(
                env::var(env_vars::LEGACY_STORAGE_PATH)
                    .unwrap_or_else(|_| defaults::LEGACY_STORAGE_PATH.to_string()),
            ),
            pad_keys: PadKeys {
                pad_prefix: env::var(env_vars::PAD_PREFIX).unwrap_or(pad_defaults.pad_prefix),
                list_key: env::var(env_vars::PAD_LIST_KEY).unwrap_or(pad_defaults.list_key),
                home_pad: pad_defaults.home_pad,
            },
            verbose: env::var(env_vars::VERBOSE)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

fn asset_origin_from_env() -> String {
    let Ok(raw) = env::var(env_vars::ASSET_ORIGIN) else {
        return defaults::ASSET_ORIGIN.to_string();
    };
    normalize_origin(&raw).unwrap_or_else(|| {
        log::warn!(
            "[CONFIG] {} is not an http(s) URL: {:?}, using {}",
            env_vars::ASSET_ORIGIN,
            raw,
            defaults::ASSET_ORIGIN
        );
        defaults::ASSET_ORIGIN.to_string()
    })
}

/// `scheme://host[:port][/base]` without a trailing slash, or `None` when `raw`
/// is not an absolute http(s) URL
fn normalize_origin(raw: &str) -> Option<String> {
    let url = url::Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return None;
    }
    Some(url.as_str().trim_end_matches('/').to_string())
}
