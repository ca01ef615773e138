//! Unified error handling for dexdump
//!
//! Structural rejections (out-of-bounds offsets, implausible map tables) are not
//! errors: the verifier reports them as `false`. The variants here cover what a
//! caller can actually act on.

use std::io;
use thiserror::Error;

/// Main error type for dexdump operations
#[derive(Debug, Error)]
pub enum DumperError {
    /// Process with given package name or pid was not found
    #[error("Process '{0}' not found")]
    ProcessNotFound(String),

    /// Failed to ptrace-attach to the target
    #[error("Failed to attach to PID {pid}: {source}")]
    AttachFailed {
        pid: i32,
        #[source]
        source: nix::Error,
    },

    /// The collaborator could not read `len` bytes at `addr`
    #[error("Memory at {addr:#x} ({len} bytes) is not readable: {source}")]
    UnreadableMemory {
        addr: u64,
        len: usize,
        #[source]
        source: io::Error,
    },

    /// Malformed request from a remote or CLI caller
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// File I/O error
    #[error("File I/O error for '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Permission denied (e.g., not running as root)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Generic error for cases not covered above
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for dexdump operations
pub type Result<T> = std::result::Result<T, DumperError>;

impl DumperError {
    /// Check if this error indicates a permission issue
    pub fn is_permission_error(&self) -> bool {
        match self {
            DumperError::PermissionDenied(_) => true,
            DumperError::UnreadableMemory { source, .. } | DumperError::IoError { source, .. } => {
                source.kind() == io::ErrorKind::PermissionDenied
            }
            DumperError::AttachFailed { source, .. } => *source == nix::Error::EPERM,
            _ => false,
        }
    }

    /// Check if this error is transient, so re-running the operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DumperError::UnreadableMemory { .. } | DumperError::ProcessNotFound(_)
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            DumperError::PermissionDenied(_) => {
                "This operation requires root privileges. Try running with 'su'.".to_string()
            }
            DumperError::ProcessNotFound(target) => {
                format!("Process '{}' not running. Start the app first.", target)
            }
            DumperError::UnreadableMemory { addr, .. } => format!(
                "Memory at {addr:#x} could not be read; the mapping may have changed. Re-scan and retry."
            ),
            _ => self.to_string(),
        }
    }

    pub fn from_io_error(path: impl Into<String>, error: io::Error) -> Self {
        DumperError::IoError {
            path: path.into(),
            source: error,
        }
    }

    pub(crate) fn unreadable(addr: u64, len: usize, source: io::Error) -> Self {
        DumperError::UnreadableMemory { addr, len, source }
    }
}
