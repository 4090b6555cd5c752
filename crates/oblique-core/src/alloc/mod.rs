//! Optimized allocation and collection types for the oblique pipeline.
//!
//! This module provides:
//! - Re-exports of optimized hash collections using AHash
//! - The frame-scoped [`ScratchPool`](scratch::ScratchPool) used by the sorter

pub mod scratch;

// Re-export optimized hash collections
pub use ahash::{AHashMap as HashMap, AHashSet as HashSet, RandomState};

/// Type alias for the standard HashMap with AHash for better performance.
pub type AHashMap<K, V> = ahash::AHashMap<K, V>;

/// Type alias for the standard HashSet with AHash for better performance.
pub type AHashSet<T> = ahash::AHashSet<T>;
