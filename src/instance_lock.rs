//! Single instance lock using Unix socket.
//!
//! Prevents two dashboards from driving the same devices at once.
//! Uses a Unix socket which is automatically cleaned up by the OS when the
//! process dies, avoiding stale lock files.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use thiserror::Error;

const SOCKET_NAME: &str = "device-dashboard.sock";

/// Error types for instance lock operations.
#[derive(Debug, Error)]
pub enum InstanceLockError {
    /// Another instance is already running.
    #[error("another instance is already running")]
    AlreadyRunning,

    /// I/O error during lock acquisition.
    #[error("failed to acquire instance lock: {0}")]
    Io(#[from] io::Error),
}

/// Held for the lifetime of the dashboard process; the socket file is
/// removed on drop.
pub struct InstanceLock {
    _listener: UnixListener,
    path: PathBuf,
}

impl InstanceLock {
    /// Fails with [`InstanceLockError::AlreadyRunning`] while another
    /// dashboard holds the lock.
    pub fn acquire() -> Result<Self, InstanceLockError> {
        Self::acquire_at(Self::socket_path())
    }

    fn acquire_at(path: PathBuf) -> Result<Self, InstanceLockError> {
        // A socket file nobody answers on was left by a killed process
        if path.exists() {
            if UnixStream::connect(&path).is_ok() {
                return Err(InstanceLockError::AlreadyRunning);
            }
            let _ = std::fs::remove_file(&path);
        }

        match UnixListener::bind(&path) {
            Ok(listener) => Ok(Self {
                _listener: listener,
                path,
            }),
            // Lost the race against another instance starting up
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(InstanceLockError::AlreadyRunning),
            Err(e) => Err(InstanceLockError::Io(e)),
        }
    }

    /// Get the path to the socket file.
    pub fn socket_path() -> PathBuf {
        // Use XDG_RUNTIME_DIR if available (auto-cleaned on logout)
        socket_path_in(std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from))
    }
}

fn socket_path_in(runtime_dir: Option<PathBuf>) -> PathBuf {
    runtime_dir
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(SOCKET_NAME)
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        // Clean up the socket file on normal exit
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path_uses_runtime_dir() {
        let path = socket_path_in(Some(PathBuf::from("/run/user/1000")));
        assert_eq!(path, PathBuf::from("/run/user/1000/device-dashboard.sock"));
    }

    #[test]
    fn test_socket_path_fallback_to_tmp() {
        assert_eq!(
            socket_path_in(None),
            PathBuf::from("/tmp/device-dashboard.sock")
        );
    }

    #[test]
    fn test_second_acquire_in_same_dir_fails() {
        let dir = std::env::temp_dir().join(format!("dashboard-lock-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = socket_path_in(Some(dir.clone()));

        let first = InstanceLock::acquire_at(path.clone()).unwrap();
        assert!(matches!(
            InstanceLock::acquire_at(path.clone()),
            Err(InstanceLockError::AlreadyRunning)
        ));
        drop(first);
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
