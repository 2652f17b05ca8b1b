//! Corpus loading.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::sample::SampleInput;

/// File extensions recognised as QASM sources.
pub const QASM_EXTENSIONS: &[&str] = &["qasm", "qasm3"];

/// Ordered, immutable set of samples shared by every adapter.
#[derive(Debug, Clone)]
pub struct Corpus {
    source: Option<PathBuf>,
    samples: Vec<SampleInput>,
}

impl Corpus {
    /// Load every `*.qasm` / `*.qasm3` file in `dir`, ordered by file name.
    ///
    /// Unreadable files are logged and skipped. A missing directory or one
    /// without any readable sample is an orchestration fault.
    pub fn load(dir: &Path) -> HarnessResult<Self> {
        if !dir.is_dir() {
            return Err(HarnessError::Orchestration(format!(
                "corpus directory not found: {}",
                dir.display()
            )));
        }

        let mut paths = Vec::new();
        let entries = std::fs::read_dir(dir).map_err(|e| HarnessError::io(dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| HarnessError::io(dir, e))?.path();
            let is_qasm = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| QASM_EXTENSIONS.contains(&ext));
            if is_qasm && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut samples = Vec::with_capacity(paths.len());
        for path in paths {
            let id = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            match std::fs::read_to_string(&path) {
                Ok(source) => {
                    debug!(sample = %id, bytes = source.len(), "loaded sample");
                    samples.push(SampleInput::new(id, source));
                }
                Err(e) => warn!("Failed to read sample {:?}: {}", path, e),
            }
        }

        if samples.is_empty() {
            return Err(HarnessError::Orchestration(format!(
                "no readable .qasm files in {}",
                dir.display()
            )));
        }
        info!(dir = %dir.display(), samples = samples.len(), "loaded corpus");
        Ok(Self {
            source: Some(dir.to_path_buf()),
            samples,
        })
    }

    /// Build a corpus from samples already in memory.
    pub fn from_samples(samples: Vec<SampleInput>) -> HarnessResult<Self> {
        if samples.is_empty() {
            return Err(HarnessError::Orchestration("corpus is empty".into()));
        }
        Ok(Self {
            source: None,
            samples,
        })
    }

    /// Directory the corpus was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[SampleInput] {
        &self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleInput> {
        self.samples.iter()
    }

    /// Sample ids in corpus order.
    pub fn ids(&self) -> Vec<String> {
        self.samples.iter().map(|s| s.id.clone()).collect()
    }
}
