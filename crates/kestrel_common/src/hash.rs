//! Buffer fingerprinting for change detection and content addressing.
//!
//! Every strategy digests the same canonical byte stream: the dtype
//! descriptor, the rank, each dimension as a little-endian `u64`, then every
//! element's little-endian bytes in logical row-major order. Because the
//! stream does not depend on memory layout, the fast and fallback variants
//! agree whenever both apply, and fingerprints are stable across processes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

use crate::dtype::Element;
use crate::view::ArrayView;

/// Bytes buffered by the fallback variant before each hasher update.
const CHUNK_BYTES: usize = 8 * 1024;

/// Which digest a container or store uses for its fingerprints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashStrategy {
    /// XXH3-64 straight from memory, falling back to the layout-agnostic
    /// variant when the buffer is not contiguous or not of a flat dtype.
    #[default]
    Fast,
    /// XXH3-64 over the canonical stream, element by element.
    Fallback,
    /// SHA-256 over the canonical stream.
    Sha256,
}

/// A deterministic digest of a buffer's contents, shape and element type.
///
/// `Short` values come from the XXH3 strategies and `Wide` values from
/// SHA-256. Two buffers with equal fingerprints under the same strategy are
/// assumed to hold identical data.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Fingerprint {
    /// 64-bit XXH3 digest.
    Short(u64),
    /// 256-bit SHA-256 digest.
    Wide([u8; 32]),
}

impl Fingerprint {
    /// Returns the digest as a 64-bit integer.
    ///
    /// Wide digests are truncated to their first eight bytes.
    pub fn to_u64(&self) -> u64 {
        match self {
            Fingerprint::Short(v) => *v,
            Fingerprint::Wide(bytes) => {
                let mut head = [0u8; 8];
                head.copy_from_slice(&bytes[..8]);
                u64::from_le_bytes(head)
            }
        }
    }

    /// Returns `true` for a SHA-256 digest.
    pub fn is_wide(&self) -> bool {
        matches!(self, Fingerprint::Wide(_))
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Fingerprint::Short(v) => {
                out.push(8);
                out.extend_from_slice(&v.to_le_bytes());
            }
            Fingerprint::Wide(bytes) => {
                out.push(32);
                out.extend_from_slice(bytes);
            }
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Short(v) => write!(f, "{v:016x}"),
            Fingerprint::Wide(bytes) => {
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Short(v) => write!(f, "Fingerprint({v:016x})"),
            Fingerprint::Wide(bytes) => {
                write!(f, "Fingerprint({:02x}{:02x}..)", bytes[0], bytes[1])
            }
        }
    }
}

/// Receives canonical bytes. Lets one stream producer feed either hasher.
trait Sink {
    fn feed(&mut self, bytes: &[u8]);
}

impl Sink for Xxh3 {
    fn feed(&mut self, bytes: &[u8]) {
        self.update(bytes);
    }
}

impl Sink for Sha256 {
    fn feed(&mut self, bytes: &[u8]) {
        self.update(bytes);
    }
}

fn header<T: Element>(view: &ArrayView<'_, T>) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + 8 * view.ndim());
    T::DTYPE.write_descriptor(&mut out);
    out.extend_from_slice(&(view.ndim() as u64).to_le_bytes());
    for &dim in view.shape() {
        out.extend_from_slice(&(dim as u64).to_le_bytes());
    }
    out
}

/// Returns the view's storage as raw bytes when they already equal the
/// canonical element stream.
fn raw_bytes<'a, T: Element>(view: &ArrayView<'a, T>) -> Option<&'a [u8]> {
    if !cfg!(target_endian = "little") || !T::DTYPE.is_flat() {
        return None;
    }
    view.as_standard_slice().map(bytemuck::cast_slice)
}

fn feed_elements<T: Element, S: Sink>(view: &ArrayView<'_, T>, sink: &mut S) {
    let mut chunk = Vec::with_capacity(CHUNK_BYTES + T::DTYPE.itemsize());
    for value in view.iter() {
        value.write_le(&mut chunk);
        if chunk.len() >= CHUNK_BYTES {
            sink.feed(&chunk);
            chunk.clear();
        }
    }
    if !chunk.is_empty() {
        sink.feed(&chunk);
    }
}

/// Digests a view straight from memory.
///
/// Returns `None` when the view is not standard-layout, the dtype is a
/// record, or the target is big-endian; callers then use
/// [`hash_fallback`], which yields the same value for the same contents.
pub fn hash_fast<T: Element>(view: &ArrayView<'_, T>) -> Option<Fingerprint> {
    let body = raw_bytes(view)?;
    let mut hasher = Xxh3::new();
    hasher.update(&header(view));
    hasher.update(body);
    Some(Fingerprint::Short(hasher.digest()))
}

/// Digests a view of any layout and dtype, one element at a time.
pub fn hash_fallback<T: Element>(view: &ArrayView<'_, T>) -> Fingerprint {
    let mut hasher = Xxh3::new();
    hasher.update(&header(view));
    feed_elements(view, &mut hasher);
    Fingerprint::Short(hasher.digest())
}

/// Computes a SHA-256 digest of the canonical stream.
///
/// Use this when fingerprints double as content addresses shared between
/// independently built objects.
pub fn sha256<T: Element>(view: &ArrayView<'_, T>) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(header(view));
    match raw_bytes(view) {
        Some(body) => hasher.update(body),
        None => feed_elements(view, &mut hasher),
    }
    Fingerprint::Wide(hasher.finalize().into())
}

/// Digests a view with the given strategy.
///
/// [`HashStrategy::Fast`] tries [`hash_fast`] and silently falls back to
/// [`hash_fallback`]; the choice depends only on the view's current layout
/// and dtype.
pub fn fingerprint<T: Element>(view: &ArrayView<'_, T>, strategy: HashStrategy) -> Fingerprint {
    match strategy {
        HashStrategy::Fast => hash_fast(view).unwrap_or_else(|| {
            tracing::trace!(
                dtype = %T::DTYPE,
                shape = ?view.shape(),
                "fast digest inapplicable, using layout-agnostic fallback"
            );
            hash_fallback(view)
        }),
        HashStrategy::Fallback => hash_fallback(view),
        HashStrategy::Sha256 => sha256(view),
    }
}

/// Order-dependent mixer for combining named fingerprints into one.
///
/// Each part is keyed by its name, so the same buffers stored under
/// different names combine to different results.
pub struct Combiner {
    state: CombinerState,
    scratch: Vec<u8>,
}

enum CombinerState {
    Xxh3(Box<Xxh3>),
    Sha256(Sha256),
}

impl Combiner {
    /// Creates a combiner producing digests of the given strategy's width.
    pub fn new(strategy: HashStrategy) -> Self {
        let state = match strategy {
            HashStrategy::Fast | HashStrategy::Fallback => CombinerState::Xxh3(Box::new(Xxh3::new())),
            HashStrategy::Sha256 => CombinerState::Sha256(Sha256::new()),
        };
        Self {
            state,
            scratch: Vec::with_capacity(64),
        }
    }

    /// Mixes in one named fingerprint.
    pub fn mix(&mut self, name: &str, part: Fingerprint) {
        self.scratch.clear();
        self.scratch
            .extend_from_slice(&(name.len() as u64).to_le_bytes());
        self.scratch.extend_from_slice(name.as_bytes());
        part.write_bytes(&mut self.scratch);
        match &mut self.state {
            CombinerState::Xxh3(h) => h.update(&self.scratch),
            CombinerState::Sha256(h) => h.update(&self.scratch),
        }
    }

    /// Returns the combined fingerprint.
    pub fn finish(self) -> Fingerprint {
        match self.state {
            CombinerState::Xxh3(h) => Fingerprint::Short(h.digest()),
            CombinerState::Sha256(h) => Fingerprint::Wide(h.finalize().into()),
        }
    }
}
