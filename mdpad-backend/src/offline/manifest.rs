//! Offline asset manifest and cache region naming

/// Bumped by hand on every release that changes a cached asset
pub const VERSION: &str = "md-1.0.0";

/// Assets installed before the editor may be served offline
pub const MANIFEST: &[&str] = &[
    "/",
    "/pad",
    "/pad/md.js",
    "/pad/md.css",
    "/pad/sidb.js",
    "/pad/lib/CascadiaCode.ttf",
    "/pad/lib/easymde.min.js",
    "/pad/lib/easymde.min.css",
    "/pad/lib/vue-2.6.11.js",
    "/pad/lib/highlight.min.js",
    "/pad/lib/atom-one-light.css",
    "/pad/lib/fa/css/font-awesome.min.css",
    "/pad/lib/fa/fonts/fontawesome-webfont.woff2",
    "/pad/icon/mdp-512.png",
];

/// Region filled at install time from [`MANIFEST`]
pub const FUNDAMENTALS: &str = "fundamentals";
/// Region filled at runtime with copies of network responses
pub const PAGES: &str = "pages";

const SEPARATOR: &str = "::";

pub fn region_name(version: &str, region: &str) -> String {
    format!("{}{}{}", version, SEPARATOR, region)
}

/// Version part of a region name; names without a separator have none
pub fn region_version(name: &str) -> Option<&str> {
    name.split_once(SEPARATOR).map(|(version, _)| version)
}
