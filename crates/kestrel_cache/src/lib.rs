//! Change-tracking cache for derived geometry properties.
//!
//! Raw buffers live in a [`DataStore`] of [`TrackedArray`]s that flag
//! themselves dirty on every in-place write. A [`Cache`] memoizes values
//! derived from those buffers and drops them as soon as the store's composite
//! fingerprint moves, except for entries a caller explicitly retains across a
//! declared mutation.

#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod store;
pub mod tracked;

pub use cache::{Cache, CacheState, Watched};
pub use config::{load_config, load_config_from_str, EngineConfig, StoreConfig};
pub use error::{CacheError, ConfigError};
pub use store::DataStore;
pub use tracked::{TrackedArray, TrackedBuffer};

pub use kestrel_common::{Fingerprint, HashStrategy};
