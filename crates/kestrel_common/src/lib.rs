//! Shared buffer primitives used across the Kestrel change-tracking engine.
//!
//! This crate provides element types, strided layouts, read-only array views,
//! and the fingerprint strategies used to detect when buffer contents change.

#![warn(missing_docs)]

pub mod dtype;
pub mod error;
pub mod hash;
pub mod layout;
pub mod view;

pub use dtype::{DType, Element, Field, Numeric};
pub use error::ShapeError;
pub use hash::{fingerprint, hash_fallback, hash_fast, sha256, Combiner, Fingerprint, HashStrategy};
pub use layout::{Layout, Offsets};
pub use view::ArrayView;
