//! Mapping store
//!
//! Durable path-keyed table linking a logical file to its primary copy and
//! its secondary anchor, plus the per-path lock table guarding creation.

pub mod locks;
pub mod model;
pub mod paths;
pub mod store;

pub use locks::PathLocks;
pub use model::{now_secs, Mapping};
pub use store::{MappingStore, StoreError};
