// THEORY:
// Only one run may touch the frame, the diagnostic crop and the archive at a
// time. `RunLock` claims an exclusive lock file for the length of a run and
// removes it when dropped. A lock left by a crashed run would block every
// later run, so a lock file older than `stale_after` is taken over once.
//
// Each acquisition writes its own stamp (pid plus a per-process sequence
// number). After a takeover the previous holder may still be alive; its drop
// sees a foreign stamp and leaves the file to the new owner.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use crate::error::MeterError;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    stamp: String,
}

impl RunLock {
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Self, MeterError> {
        match create(path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !is_stale(path, stale_after) {
                    return Err(MeterError::AlreadyRunning(path.to_path_buf()));
                }
                tracing::warn!(path = %path.display(), "removing stale lock file");
                fs::remove_file(path).map_err(|source| lock_error(path, source))?;
                create(path).map_err(|e| match e.kind() {
                    io::ErrorKind::AlreadyExists => MeterError::AlreadyRunning(path.to_path_buf()),
                    _ => lock_error(path, e),
                })
            }
            Err(e) => Err(lock_error(path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents == self.stamp => {
                if let Err(e) = fs::remove_file(&self.path) {
                    tracing::warn!(path = %self.path.display(), error = %e, "could not remove lock file");
                }
            }
            Ok(_) => tracing::warn!(path = %self.path.display(), "lock was taken over by another run, leaving it"),
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "lock file vanished before release"),
        }
    }
}

fn create(path: &Path) -> io::Result<RunLock> {
    let stamp = format!("{} {}\n", std::process::id(), SEQUENCE.fetch_add(1, Ordering::Relaxed));
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(e) = file.write_all(stamp.as_bytes()).and_then(|()| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(RunLock {
        path: path.to_path_buf(),
        stamp,
    })
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > stale_after)
}

fn lock_error(path: &Path, source: io::Error) -> MeterError {
    MeterError::Lock {
        path: path.to_path_buf(),
        source,
    }
}
