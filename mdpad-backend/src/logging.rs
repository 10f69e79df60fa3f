//! Per-component log handle.
//!
//! Every component receives a `Logger` at construction instead of reading a
//! global verbose flag. Operation traces ("Saving pad", "Loading list") are
//! promoted to `info` when the component was built verbose and stay at `debug`
//! otherwise. Warnings and errors are always emitted.

use std::fmt;

#[derive(Debug, Clone)]
pub struct Logger {
    tag: &'static str,
    verbose: bool,
}

impl Logger {
    pub fn new(tag: &'static str, verbose: bool) -> Self {
        Self { tag, verbose }
    }

    /// A logger whose traces only show up at debug level
    pub fn quiet(tag: &'static str) -> Self {
        Self::new(tag, false)
    }

    /// Same verbosity, different component tag
    pub fn with_tag(&self, tag: &'static str) -> Self {
        Self::new(tag, self.verbose)
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn trace(&self, args: fmt::Arguments<'_>) {
        if self.verbose {
            log::info!("[{}] {}", self.tag, args);
        } else {
            log::debug!("[{}] {}", self.tag, args);
        }
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        log::info!("[{}] {}", self.tag, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        log::warn!("[{}] {}", self.tag, args);
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        log::error!("[{}] {}", self.tag, args);
    }
}
