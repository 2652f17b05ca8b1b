//! qasmbench build cache
//!
//! Parsers served out of process often need an expensive one-time build
//! before they can be benchmarked. This crate caches those artifacts:
//!
//! - **[`BuildCache`]**: bounded LRU keyed by [`CacheKey`], at most one build
//!   per key in flight, optional persistent index
//! - **[`CacheKey::derive`]**: deterministic key from sources, profile,
//!   binary, features and toolchain
//! - **[`CargoBuild`]**: builds a cargo binary target into a cache-owned
//!   target directory
//!
//! # Example
//!
//! ```ignore
//! use qasmbench_cache::{BuildCache, CacheKey, CargoBuild, toolchain_version};
//!
//! let cache = BuildCache::open(".qasmbench-cache", 8).await?;
//! let build = CargoBuild::new("crates/qasmbench-parsers", "qasm-parse-server");
//! let key = CacheKey::derive(&build.inputs("oq3", &toolchain_version("rustc").await?).await?);
//! let target_dir = cache.build_dir(&key);
//! let exe = cache.get_or_build(&key, || build.run(&target_dir)).await?;
//! ```

pub mod builder;
pub mod cache;
pub mod error;
pub mod key;

pub use builder::{CargoBuild, resolve_package_graph, toolchain_version};
pub use cache::{BuildCache, CacheEntry, CacheStats, INDEX_FILE};
pub use error::{BuildError, CacheError, CacheResult};
pub use key::{
    BuildInputs, CacheKey, Fingerprint, PackageGraph, content_fingerprint, graph_fingerprint,
    source_fingerprint,
};
