// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Advisory, PID-aware file lock guarding the control-signal artifact
//! (spec §4.K, §5). A sibling `<artifact>.lock` file holds the owning
//! process's PID; staleness is detected by liveness-checking that PID
//! rather than trusting the lock file's mere existence.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::sys::signal::kill;
use nix::unistd::{Pid, getpid};

use crate::error::Error;

/// How long to sleep between lock-acquisition retries.
const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// A held advisory lock; dropping or calling [`FileLock::release`] removes
/// the lock file.
pub struct FileLock {
    path: PathBuf,
    released: bool,
}

impl FileLock {
    /// Attempt to acquire the lock at `lock_path`, retrying every
    /// [`RETRY_INTERVAL`] until `timeout` elapses. A lock file whose
    /// recorded PID is no longer alive is treated as stale and removed
    /// before retrying.
    pub fn acquire(lock_path: &Path, timeout: Duration) -> Result<Self, Error> {
        let deadline = Instant::now() + timeout;
        let own_pid = getpid();

        loop {
            match try_create(lock_path, own_pid) {
                Ok(()) => return Ok(Self { path: lock_path.to_path_buf(), released: false }),
                Err(CreateError::Exists) => {
                    if is_stale(lock_path) {
                        let _ = std::fs::remove_file(lock_path);
                        continue;
                    }
                }
                Err(CreateError::Io(source)) => return Err(Error::io("creating lock file", &source)),
            }

            if Instant::now() >= deadline {
                return Err(Error::LockTimeout { waited_ms: timeout.as_millis() as u64 });
            }
            std::thread::sleep(RETRY_INTERVAL);
        }
    }

    /// Release the lock, removing the lock file. Idempotent.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
            self.released = true;
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

enum CreateError {
    Exists,
    Io(std::io::Error),
}

fn try_create(path: &Path, pid: Pid) -> Result<(), CreateError> {
    use std::io::Write;

    match std::fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            let _ = write!(file, "{pid}");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(CreateError::Exists),
        Err(e) => Err(CreateError::Io(e)),
    }
}

/// Whether the PID recorded in `lock_path` is no longer a live process
/// (or the file is unreadable/malformed, which we also treat as stale so
/// a crashed writer can never wedge the artifact forever).
fn is_stale(lock_path: &Path) -> bool {
    let Ok(contents) = std::fs::read_to_string(lock_path) else {
        return true;
    };
    let Ok(pid) = contents.trim().parse::<i32>() else {
        return true;
    };
    // Signal 0 performs no-op liveness checking without sending a signal.
    kill(Pid::from_raw(pid), None).is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn acquires_and_releases_lock() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock_path = dir.path().join("artifact.lock");
        let lock = FileLock::acquire(&lock_path, Duration::from_millis(100)).expect("acquires");
        assert!(lock_path.exists());
        lock.release();
        assert!(!lock_path.exists());
    }

    #[test]
    fn second_acquire_times_out_while_first_is_held() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock_path = dir.path().join("artifact.lock");
        let _held = FileLock::acquire(&lock_path, Duration::from_millis(100)).expect("acquires");
        let result = FileLock::acquire(&lock_path, Duration::from_millis(60));
        assert!(matches!(result, Err(Error::LockTimeout { .. })));
    }

    #[test]
    fn stale_lock_from_dead_pid_is_reclaimed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock_path = dir.path().join("artifact.lock");
        // A PID essentially guaranteed not to be alive in this process's
        // namespace: write it directly rather than going through a real
        // crashed writer.
        std::fs::write(&lock_path, "999999999").expect("write stale lock");
        let lock = FileLock::acquire(&lock_path, Duration::from_millis(200)).expect("reclaims stale lock");
        lock.release();
    }
}
