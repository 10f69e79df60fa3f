pub mod error;
pub mod kv;

pub use error::{Result, StoreError};
pub use kv::{Action, KvStore, KvTable};
