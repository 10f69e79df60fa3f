//! Pads: named markdown documents persisted in the key/value store
//!
//! `PadStore` owns the key layout, `PadSession` tracks the pad list and the
//! editor buffer, and `Autosaver` flushes the session on a timer.

pub mod autosave;
pub mod export;
pub mod legacy;
pub mod session;
pub mod store;

pub use autosave::Autosaver;
pub use export::PadExport;
pub use legacy::{LegacyStorage, MigrationError};
pub use session::{switch_pad, ActiveBuffer, PadSession};
pub use store::{PadError, PadStore};
