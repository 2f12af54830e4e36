//! Filesystem capabilities injected into a run.
//!
//! Two seams: [`LocalProbe`] answers whether an inventory path is present
//! under the music root, and [`MoveExecutor`] performs (or only records)
//! renames and directory creation. Whether a run touches the disk is decided
//! once, by picking the executor; no stage branches on a commit flag.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::pool::WorkerPool;
use crate::progress::{Phase, PhaseProgress};

// ============================================================================
// Existence Probe
// ============================================================================

pub trait LocalProbe: Sync {
    fn exists(&self, file: &str) -> bool;
}

/// Looks files up as `<music_root>/<inventory path>`.
pub struct MusicDirProbe {
    root: PathBuf,
}

impl MusicDirProbe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LocalProbe for MusicDirProbe {
    fn exists(&self, file: &str) -> bool {
        self.root.join(file).exists()
    }
}

/// Keep the inventory paths present locally, in inventory order.
pub fn find_local_files(pool: &WorkerPool, probe: &dyn LocalProbe, files: &[String]) -> Vec<String> {
    let progress = PhaseProgress::new(Phase::Probe, files.len() as u64);
    let local = pool.filter_map(files.iter().collect(), |file: &String| {
        let found = probe.exists(file);
        progress.tick();
        found.then(|| file.clone())
    });
    progress.finish(&format!("Found {} of {} inventory files locally", local.len(), files.len()));
    local
}

// ============================================================================
// Move Executor
// ============================================================================

/// A filesystem mutation requested by a stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FsOp {
    CreateDir(PathBuf),
    Rename { from: PathBuf, to: PathBuf },
}

pub trait MoveExecutor: Send + Sync {
    /// True when operations reach the disk.
    fn is_commit(&self) -> bool;

    /// Create `dir` and any missing parents.
    fn ensure_dir(&self, dir: &Path) -> Result<()>;

    /// Rename `from` to `to`. An existing destination is an error.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
}

/// Records every requested operation, touches nothing.
#[derive(Debug, Default)]
pub struct DryRun {
    ops: Mutex<Vec<FsOp>>,
}

impl DryRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations requested so far, in request order.
    pub fn operations(&self) -> Vec<FsOp> {
        self.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    fn record(&self, op: FsOp) {
        debug!("[dry-run] {:?}", op);
        if let Ok(mut ops) = self.ops.lock() {
            ops.push(op);
        }
    }
}

impl MoveExecutor for DryRun {
    fn is_commit(&self) -> bool {
        false
    }

    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            self.record(FsOp::CreateDir(dir.to_path_buf()));
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.record(FsOp::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });
        Ok(())
    }
}

/// Performs renames and directory creation on disk.
#[derive(Debug, Default)]
pub struct Commit;

impl MoveExecutor for Commit {
    fn is_commit(&self) -> bool {
        true
    }

    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if to.exists() {
            return Err(Error::io(
                to,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "destination exists"),
            ));
        }
        std::fs::rename(from, to).map_err(|e| Error::io(from, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_find_local_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("House")).unwrap();
        fs::write(dir.path().join("House/a.mp3"), b"").unwrap();
        fs::write(dir.path().join("b.mp3"), b"").unwrap();

        let pool = WorkerPool::new(2).unwrap();
        let probe = MusicDirProbe::new(dir.path());
        let files = vec![
            "House/a.mp3".to_string(),
            "House/missing.mp3".to_string(),
            "b.mp3".to_string(),
        ];
        let local = find_local_files(&pool, &probe, &files);
        assert_eq!(local, vec!["House/a.mp3".to_string(), "b.mp3".to_string()]);
    }

    #[test]
    fn test_dry_run_records_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.mp3");
        fs::write(&src, b"x").unwrap();
        let dest_dir = dir.path().join("alice/House/old");

        let dry = DryRun::new();
        dry.ensure_dir(&dest_dir).unwrap();
        dry.rename(&src, &dest_dir.join("a.mp3")).unwrap();

        assert!(src.exists());
        assert!(!dest_dir.exists());
        assert_eq!(
            dry.operations(),
            vec![
                FsOp::CreateDir(dest_dir.clone()),
                FsOp::Rename {
                    from: src,
                    to: dest_dir.join("a.mp3")
                },
            ]
        );
        assert!(!dry.is_commit());
    }

    #[test]
    fn test_commit_moves_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.mp3");
        let other = dir.path().join("b.mp3");
        fs::write(&src, b"x").unwrap();
        fs::write(&other, b"y").unwrap();
        let dest_dir = dir.path().join("alice/House/old");

        let commit = Commit;
        commit.ensure_dir(&dest_dir).unwrap();
        commit.rename(&src, &dest_dir.join("a.mp3")).unwrap();
        assert!(!src.exists());
        assert!(dest_dir.join("a.mp3").exists());

        let err = commit.rename(&other, &dest_dir.join("a.mp3")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(other.exists());
    }
}
