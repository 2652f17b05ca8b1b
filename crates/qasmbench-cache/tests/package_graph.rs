//! Cache keys of cargo builds against a real cargo workspace.

use std::fs;
use std::path::Path;

use qasmbench_cache::{CacheKey, CargoBuild};

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Workspace where `server` depends on `proto` by path and `tool` is an
/// unrelated member.
fn workspace(root: &Path, profile: &str) {
    write(
        &root.join("Cargo.toml"),
        &format!("[workspace]\nmembers = [\"server\", \"proto\", \"tool\"]\nresolver = \"2\"\n{profile}"),
    );
    write(
        &root.join("server/Cargo.toml"),
        "[package]\nname = \"server\"\nversion = \"0.1.0\"\nedition = \"2021\"\n\n\
         [dependencies]\nproto = { path = \"../proto\" }\n",
    );
    write(&root.join("server/src/main.rs"), "fn main() { proto::f(); }\n");
    write(
        &root.join("proto/Cargo.toml"),
        "[package]\nname = \"proto\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
    );
    write(&root.join("proto/src/lib.rs"), "pub fn f() {}\n");
    write(
        &root.join("tool/Cargo.toml"),
        "[package]\nname = \"tool\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
    );
    write(&root.join("tool/src/main.rs"), "fn main() {}\n");
}

async fn key(build: &CargoBuild) -> CacheKey {
    CacheKey::derive(&build.inputs("server", "rustc 1.85.0").await.unwrap())
}

#[tokio::test]
async fn test_path_dependency_edit_changes_key() {
    let dir = tempfile::tempdir().unwrap();
    workspace(dir.path(), "");
    let build = CargoBuild::new(dir.path().join("server"), "server");

    let before = key(&build).await;
    assert_eq!(before, key(&build).await);

    write(&dir.path().join("proto/src/lib.rs"), "pub fn f() { let _ = 1; }\n");
    assert_ne!(before, key(&build).await, "editing a path dependency must change the key");
}

#[tokio::test]
async fn test_workspace_profile_edit_changes_key() {
    let dir = tempfile::tempdir().unwrap();
    workspace(dir.path(), "");
    let build = CargoBuild::new(dir.path().join("server"), "server");
    let before = key(&build).await;

    workspace(dir.path(), "\n[profile.release]\nopt-level = 2\n");
    assert_ne!(before, key(&build).await, "editing the workspace manifest must change the key");
}

#[tokio::test]
async fn test_unrelated_member_edit_keeps_key() {
    let dir = tempfile::tempdir().unwrap();
    workspace(dir.path(), "");
    let build = CargoBuild::new(dir.path().join("server"), "server");
    let before = key(&build).await;

    write(&dir.path().join("tool/src/main.rs"), "fn main() { println!(); }\n");
    assert_eq!(before, key(&build).await);
}
