//! Cache keys.
//!
//! A key covers everything that affects a built artifact: the sources, the
//! build profile, the binary name, enabled features, the toolchain, and any
//! caller-supplied extras. Keys are stable across processes and platforms.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Content-derived cache key, safe to use as a directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a set of build inputs.
    pub fn derive(inputs: &BuildInputs) -> Self {
        let mut fp = Fingerprint::new();
        fp.field("source", &inputs.source_fingerprint);
        fp.field("profile", &inputs.profile);
        fp.field("bin", &inputs.bin);

        let mut features = inputs.features.clone();
        features.sort();
        features.dedup();
        for feature in &features {
            fp.field("feature", feature);
        }
        fp.field("toolchain", &inputs.toolchain);
        for (k, v) in &inputs.extra {
            fp.field(k, v);
        }

        CacheKey(format!("{}-{}", sanitize(&inputs.label), fp.finish()))
    }

    /// Wrap an already derived key (for example one read from disk).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        CacheKey(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything that goes into a [`CacheKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInputs {
    /// Human-readable prefix of the key (usually the adapter id).
    pub label: String,
    /// Fingerprint of the source tree, see [`source_fingerprint`].
    pub source_fingerprint: String,
    /// Cargo profile name.
    pub profile: String,
    /// Binary target name.
    pub bin: String,
    /// Enabled cargo features; order does not matter.
    pub features: Vec<String>,
    /// Toolchain version string.
    pub toolchain: String,
    /// Additional inputs.
    pub extra: BTreeMap<String, String>,
}

/// Incremental DJB2a + FNV-1a fingerprint.
///
/// Not cryptographic; used only to address cache entries.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprint {
    djb: u64,
    fnv: u64,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self {
            djb: 5381,
            fnv: 0xcbf2_9ce4_8422_2325,
        }
    }

    /// Feed raw bytes.
    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.djb = self.djb.wrapping_mul(33) ^ u64::from(b);
            self.fnv ^= u64::from(b);
            self.fnv = self.fnv.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }

    /// Feed a named, length-delimited field so adjacent fields cannot alias.
    pub fn field(&mut self, name: &str, value: &str) {
        self.update(name.as_bytes());
        self.update(&[0]);
        self.update(&(value.len() as u64).to_le_bytes());
        self.update(value.as_bytes());
    }

    /// 32 lowercase hex digits.
    pub fn finish(&self) -> String {
        format!("{:016x}{:016x}", self.djb, self.fnv)
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprint of a single byte string.
pub fn content_fingerprint(bytes: &[u8]) -> String {
    let mut fp = Fingerprint::new();
    fp.update(bytes);
    fp.finish()
}

/// Local packages a binary is built from.
///
/// Produced by [`crate::resolve_package_graph`]; covers the package itself,
/// every path or workspace package it depends on, and the workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageGraph {
    pub workspace_root: PathBuf,
    /// Directory of every local package, sorted and deduplicated.
    pub package_dirs: Vec<PathBuf>,
}

/// Fingerprint a cargo package: every file under `src/`, its `build.rs` and
/// `Cargo.toml`, and the nearest `Cargo.lock` found walking up from
/// `crate_dir`.
pub fn source_fingerprint(crate_dir: &Path) -> Result<String, BuildError> {
    let mut files = package_files(crate_dir)?;
    if let Some(lock) = find_lockfile(crate_dir) {
        files.push(lock);
    }
    hash_files(crate_dir, &files)
}

/// Fingerprint every package of `graph` plus the workspace manifest and
/// lockfile.
///
/// Blocking; async callers run it on the blocking pool.
pub fn graph_fingerprint(graph: &PackageGraph) -> Result<String, BuildError> {
    let mut files = Vec::new();
    for dir in &graph.package_dirs {
        files.extend(package_files(dir)?);
    }
    let root_manifest = graph.workspace_root.join("Cargo.toml");
    if !files.contains(&root_manifest) {
        files.push(root_manifest);
    }
    let lock = graph.workspace_root.join("Cargo.lock");
    if lock.is_file() {
        files.push(lock);
    }
    hash_files(&graph.workspace_root, &files)
}

fn package_files(crate_dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut files = Vec::new();
    collect_files(&crate_dir.join("src"), &mut files)?;
    files.sort();
    let build_script = crate_dir.join("build.rs");
    if build_script.is_file() {
        files.push(build_script);
    }
    files.push(crate_dir.join("Cargo.toml"));
    Ok(files)
}

fn hash_files(base: &Path, files: &[PathBuf]) -> Result<String, BuildError> {
    let mut fp = Fingerprint::new();
    for path in files {
        let contents = fs::read(path).map_err(|source| BuildError::Fingerprint {
            path: path.clone(),
            source,
        })?;
        let rel = path.strip_prefix(base).unwrap_or(path);
        fp.field(&rel.to_string_lossy().replace('\\', "/"), "");
        fp.update(&contents);
    }
    Ok(fp.finish())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), BuildError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(BuildError::Fingerprint {
                path: dir.to_path_buf(),
                source,
            });
        }
    };
    for entry in entries {
        let path = entry
            .map_err(|source| BuildError::Fingerprint {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn find_lockfile(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join("Cargo.lock"))
        .find(|p| p.is_file())
}

fn sanitize(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "artifact".to_string()
    } else {
        cleaned
    }
}
