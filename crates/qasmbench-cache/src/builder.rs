//! Cargo artifact builder.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::BuildError;
use crate::key::{BuildInputs, PackageGraph, graph_fingerprint};

/// How much of the build tool's stderr to keep in an error.
const STDERR_TAIL_LINES: usize = 20;

/// Builds one binary target of a cargo package.
#[derive(Debug, Clone)]
pub struct CargoBuild {
    /// Package directory (holds `Cargo.toml`).
    pub crate_dir: PathBuf,
    /// Binary target name.
    pub bin: String,
    /// Cargo profile (`dev`, `release`, ...).
    pub profile: String,
    pub features: Vec<String>,
    /// Cargo executable.
    pub cargo: String,
}

impl CargoBuild {
    pub fn new(crate_dir: impl Into<PathBuf>, bin: impl Into<String>) -> Self {
        Self {
            crate_dir: crate_dir.into(),
            bin: bin.into(),
            profile: "release".to_string(),
            features: Vec::new(),
            cargo: "cargo".to_string(),
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    pub fn with_cargo(mut self, cargo: impl Into<String>) -> Self {
        self.cargo = cargo.into();
        self
    }

    /// Collect the inputs that determine this build's cache key.
    ///
    /// The source fingerprint spans every local package the binary depends
    /// on, so editing a path dependency or the workspace manifest changes the
    /// key.
    pub async fn inputs(&self, label: &str, toolchain: &str) -> Result<BuildInputs, BuildError> {
        let graph = resolve_package_graph(&self.cargo, &self.crate_dir).await?;
        debug!(
            workspace_root = %graph.workspace_root.display(),
            packages = graph.package_dirs.len(),
            "resolved package graph"
        );
        let source_fingerprint = tokio::task::spawn_blocking(move || graph_fingerprint(&graph))
            .await
            .map_err(|e| BuildError::Other(format!("Fingerprint task failed: {e}")))??;
        Ok(BuildInputs {
            label: label.to_string(),
            source_fingerprint,
            profile: self.profile.clone(),
            bin: self.bin.clone(),
            features: self.features.clone(),
            toolchain: toolchain.to_string(),
            extra: BTreeMap::from([("cargo".to_string(), self.cargo.clone())]),
        })
    }

    /// Where cargo places the binary for `target_dir`.
    pub fn artifact_path(&self, target_dir: &Path) -> PathBuf {
        let profile_dir = match self.profile.as_str() {
            "dev" | "test" => "debug",
            "bench" => "release",
            other => other,
        };
        target_dir
            .join(profile_dir)
            .join(format!("{}{}", self.bin, std::env::consts::EXE_SUFFIX))
    }

    /// Run `cargo build` into `target_dir` and return the executable path.
    pub async fn run(&self, target_dir: &Path) -> Result<PathBuf, BuildError> {
        let mut cmd = Command::new(&self.cargo);
        cmd.current_dir(&self.crate_dir)
            .arg("build")
            .args(["--profile", &self.profile])
            .args(["--bin", &self.bin])
            .arg("--target-dir")
            .arg(target_dir);
        if !self.features.is_empty() {
            cmd.args(["--features", &self.features.join(",")]);
        }
        cmd.stdout(Stdio::null()).stderr(Stdio::piped());

        info!(
            crate_dir = %self.crate_dir.display(),
            bin = %self.bin,
            profile = %self.profile,
            "building artifact"
        );
        let output = cmd.output().await.map_err(|source| BuildError::Spawn {
            program: self.cargo.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(BuildError::Failed {
                program: format!("{} build", self.cargo),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        let artifact = self.artifact_path(target_dir);
        if !artifact.is_file() {
            return Err(BuildError::MissingArtifact(artifact));
        }
        debug!(artifact = %artifact.display(), "build finished");
        Ok(artifact)
    }
}

#[derive(Debug, Deserialize)]
struct Metadata {
    packages: Vec<MetadataPackage>,
    resolve: Option<MetadataResolve>,
    workspace_root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct MetadataPackage {
    id: String,
    /// `None` for path and workspace packages.
    source: Option<String>,
    manifest_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct MetadataResolve {
    root: Option<String>,
    nodes: Vec<MetadataNode>,
}

#[derive(Debug, Deserialize)]
struct MetadataNode {
    id: String,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Ask cargo for the local packages `crate_dir` builds from.
pub async fn resolve_package_graph(cargo: &str, crate_dir: &Path) -> Result<PackageGraph, BuildError> {
    let output = Command::new(cargo)
        .current_dir(crate_dir)
        .args(["metadata", "--format-version", "1"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| BuildError::Spawn {
            program: cargo.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(BuildError::Failed {
            program: format!("{cargo} metadata"),
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr),
        });
    }
    parse_package_graph(&output.stdout)
}

/// Reduce `cargo metadata` output to the local packages reachable from the
/// resolve root. A virtual manifest has no root; then every local package
/// counts.
fn parse_package_graph(json: &[u8]) -> Result<PackageGraph, BuildError> {
    let metadata: Metadata = serde_json::from_slice(json)
        .map_err(|e| BuildError::Other(format!("unreadable cargo metadata: {e}")))?;

    let local: FxHashMap<&str, &Path> = metadata
        .packages
        .iter()
        .filter(|p| p.source.is_none())
        .filter_map(|p| p.manifest_path.parent().map(|dir| (p.id.as_str(), dir)))
        .collect();

    let root = metadata.resolve.as_ref().and_then(|r| r.root.as_deref());
    let dirs: BTreeSet<PathBuf> = match (root, &metadata.resolve) {
        (Some(root), Some(resolve)) => {
            let edges: FxHashMap<&str, &[String]> = resolve
                .nodes
                .iter()
                .map(|n| (n.id.as_str(), n.dependencies.as_slice()))
                .collect();
            let mut seen = BTreeSet::new();
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                if !seen.insert(id) {
                    continue;
                }
                if let Some(deps) = edges.get(id) {
                    stack.extend(deps.iter().map(String::as_str));
                }
            }
            seen.iter()
                .filter_map(|id| local.get(id).map(|dir| dir.to_path_buf()))
                .collect()
        }
        _ => local.values().map(|dir| dir.to_path_buf()).collect(),
    };

    Ok(PackageGraph {
        workspace_root: metadata.workspace_root,
        package_dirs: dirs.into_iter().collect(),
    })
}

/// Version string of the active toolchain (`rustc -V`).
pub async fn toolchain_version(rustc: &str) -> Result<String, BuildError> {
    let output = Command::new(rustc)
        .arg("-V")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| BuildError::Spawn {
            program: rustc.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(BuildError::Failed {
            program: format!("{rustc} -V"),
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path_maps_profiles() {
        let build = CargoBuild::new("/src/p", "server");
        let exe = format!("server{}", std::env::consts::EXE_SUFFIX);
        assert_eq!(
            build.artifact_path(Path::new("/t")),
            Path::new("/t/release").join(&exe)
        );
        let build = build.with_profile("dev");
        assert_eq!(
            build.artifact_path(Path::new("/t")),
            Path::new("/t/debug").join(&exe)
        );
    }

    #[tokio::test]
    async fn test_missing_cargo_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let build = CargoBuild::new(dir.path(), "server").with_cargo("qasmbench-no-such-cargo");
        let err = build.run(&dir.path().join("target")).await.unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }

    #[test]
    fn test_package_graph_follows_local_deps_only() {
        let json = br#"{
            "workspace_root": "/ws",
            "packages": [
                {"id": "server 0.1.0 (path+file:///ws/server)", "source": null,
                 "manifest_path": "/ws/server/Cargo.toml"},
                {"id": "proto 0.1.0 (path+file:///ws/proto)", "source": null,
                 "manifest_path": "/ws/proto/Cargo.toml"},
                {"id": "cli 0.1.0 (path+file:///ws/cli)", "source": null,
                 "manifest_path": "/ws/cli/Cargo.toml"},
                {"id": "serde 1.0.0 (registry+https://github.com/rust-lang/crates.io-index)",
                 "source": "registry+https://github.com/rust-lang/crates.io-index",
                 "manifest_path": "/home/.cargo/registry/serde/Cargo.toml"}
            ],
            "resolve": {
                "root": "server 0.1.0 (path+file:///ws/server)",
                "nodes": [
                    {"id": "server 0.1.0 (path+file:///ws/server)",
                     "dependencies": ["proto 0.1.0 (path+file:///ws/proto)"]},
                    {"id": "proto 0.1.0 (path+file:///ws/proto)",
                     "dependencies": ["serde 1.0.0 (registry+https://github.com/rust-lang/crates.io-index)"]},
                    {"id": "cli 0.1.0 (path+file:///ws/cli)",
                     "dependencies": ["server 0.1.0 (path+file:///ws/server)"]},
                    {"id": "serde 1.0.0 (registry+https://github.com/rust-lang/crates.io-index)",
                     "dependencies": []}
                ]
            }
        }"#;
        let graph = parse_package_graph(json).unwrap();
        assert_eq!(graph.workspace_root, PathBuf::from("/ws"));
        assert_eq!(
            graph.package_dirs,
            vec![PathBuf::from("/ws/proto"), PathBuf::from("/ws/server")]
        );
    }

    #[test]
    fn test_virtual_manifest_takes_every_local_package() {
        let json = br#"{
            "workspace_root": "/ws",
            "packages": [
                {"id": "b", "source": null, "manifest_path": "/ws/b/Cargo.toml"},
                {"id": "a", "source": null, "manifest_path": "/ws/a/Cargo.toml"}
            ],
            "resolve": {"root": null, "nodes": []}
        }"#;
        let graph = parse_package_graph(json).unwrap();
        assert_eq!(
            graph.package_dirs,
            vec![PathBuf::from("/ws/a"), PathBuf::from("/ws/b")]
        );
    }

    #[test]
    fn test_garbage_metadata_is_an_error() {
        assert!(matches!(
            parse_package_graph(b"not json"),
            Err(BuildError::Other(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_cargo_fails_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let build = CargoBuild::new(dir.path(), "server").with_cargo("qasmbench-no-such-cargo");
        let err = build.inputs("oq3", "rustc 1.85.0").await.unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let text: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(text.as_bytes());
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }
}
