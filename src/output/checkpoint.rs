//! Checkpoint and final output persistence
//!
//! Checkpoints are best-effort snapshots written next to the output file
//! (`<output><suffix>`) while a run is in progress. The final output is
//! written exactly once at the end of the run and supersedes the checkpoint.
//! Both hold the same shape: a JSON array of outcomes.
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! reader never observes a half-written array. A checkpoint older than the
//! one already on disk is never written over it.

use crate::state::Outcome;
use crate::HarvestError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors that can occur while writing or reading a checkpoint
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persists snapshots of the outcome sequence
#[derive(Debug)]
pub struct CheckpointManager {
    output_path: Option<PathBuf>,
    checkpoint_path: Option<PathBuf>,
    interval: u64,
    /// Serializes writes; holds the success count of the newest checkpoint
    latest: Mutex<u64>,
    writes: AtomicU64,
}

impl CheckpointManager {
    /// Creates a checkpoint manager
    ///
    /// # Arguments
    ///
    /// * `output_path` - Final output file; `None` writes the output to stdout
    ///   and disables checkpointing
    /// * `suffix` - Appended to the output path to name the checkpoint file
    /// * `interval` - Checkpoint every `interval` successes (0 disables)
    pub fn new(output_path: Option<PathBuf>, suffix: &str, interval: u64) -> Self {
        let checkpoint_path = output_path
            .as_deref()
            .filter(|_| interval > 0)
            .map(|path| with_suffix(path, suffix));

        Self {
            output_path,
            checkpoint_path,
            interval,
            latest: Mutex::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// A manager writing to the same files, carrying over the write history
    pub fn detached(&self) -> Self {
        Self {
            output_path: self.output_path.clone(),
            checkpoint_path: self.checkpoint_path.clone(),
            interval: self.interval,
            latest: Mutex::new(*self.lock_latest()),
            writes: AtomicU64::new(self.checkpoints_written()),
        }
    }

    fn lock_latest(&self) -> MutexGuard<'_, u64> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn checkpoint_path(&self) -> Option<&Path> {
        self.checkpoint_path.as_deref()
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    /// Number of checkpoint files successfully written so far
    pub fn checkpoints_written(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns true when `success_count` sits on a checkpoint boundary
    pub fn is_due(&self, success_count: u64) -> bool {
        self.checkpoint_path.is_some() && success_count > 0 && success_count % self.interval == 0
    }

    /// Writes `outcomes` to the checkpoint file if `success_count` is due
    ///
    /// Failures are logged and swallowed; a checkpoint is a resumption aid
    /// and never aborts the run. Writes are serialized with each other, and
    /// a snapshot taken at or below the success count already on disk is
    /// skipped.
    ///
    /// # Returns
    ///
    /// `true` if a checkpoint file was written
    pub fn maybe_checkpoint<R: Serialize>(
        &self,
        success_count: u64,
        outcomes: &[Outcome<R>],
    ) -> bool {
        if !self.is_due(success_count) {
            return false;
        }
        let Some(path) = self.checkpoint_path.as_deref() else {
            return false;
        };

        let mut latest = self.lock_latest();
        if success_count <= *latest {
            tracing::debug!(
                "Skipping stale checkpoint at {} successes ({} already written)",
                success_count,
                *latest
            );
            return false;
        }

        match write_json_atomic(path, outcomes) {
            Ok(()) => {
                *latest = success_count;
                self.writes.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "Checkpoint written to {} ({} entries)",
                    path.display(),
                    outcomes.len()
                );
                true
            }
            Err(e) => {
                tracing::warn!("Checkpoint save failed: {}", e);
                false
            }
        }
    }

    /// Writes the complete outcome sequence to the final destination
    ///
    /// Consumes the manager so that the final write happens exactly once.
    /// Unlike checkpoints, a failure here is fatal to the run.
    pub fn finalize_output<R: Serialize>(
        self,
        outcomes: &[Outcome<R>],
    ) -> Result<(), HarvestError> {
        let _guard = self.lock_latest();

        match self.output_path.as_deref() {
            Some(path) => write_json_atomic(path, outcomes).map_err(|e| match e {
                CheckpointError::Io { path, source } => HarvestError::Output { path, source },
                CheckpointError::Serialization(e) => HarvestError::Serialization(e),
            }),
            None => {
                let stdout = io::stdout();
                let mut writer = BufWriter::new(stdout.lock());
                serde_json::to_writer_pretty(&mut writer, outcomes)?;
                writer.write_all(b"\n")?;
                writer.flush()?;
                Ok(())
            }
        }
    }
}

/// Reads a checkpoint (or final output) file back into outcomes
pub fn load_checkpoint<R: DeserializeOwned>(
    path: &Path,
) -> Result<Vec<Outcome<R>>, CheckpointError> {
    let file = File::open(path).map_err(|source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Serializes to `<path>.tmp` and renames it over `path`
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CheckpointError> {
    let io_error = |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let tmp_path = with_suffix(path, ".tmp");
    {
        let file = File::create(&tmp_path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n").map_err(io_error)?;
        writer.flush().map_err(io_error)?;
    }

    fs::rename(&tmp_path, path).map_err(io_error)
}
