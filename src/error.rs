//! Runtime error types
//!
//! Resolution failures (a module or capability that cannot be found) are not
//! errors: they surface as `None`. Everything in this module describes
//! failures that must reach a caller.

use std::ffi::CStr;
use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Result type used throughout the runtime.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors raised by the runtime and its subsystems.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A native call reported an error code.
    #[error(transparent)]
    System(#[from] SystemError),

    /// A foundational capability could not be loaded.
    #[error("required capability '{0}' is not available")]
    MissingCapability(String),

    /// A capability loaded but does not have the expected shape.
    #[error("capability '{name}' is not a {expected}")]
    CapabilityType { name: String, expected: &'static str },

    /// An optional subsystem was requested but is unavailable.
    #[error("{0}")]
    Config(String),

    /// The script engine rejected a source text.
    #[error("failed to compile {name}: {message}")]
    Compile { name: String, message: String },

    /// A script raised while running.
    #[error("{name}: {message}")]
    Script { name: String, message: String },

    /// A JSON module could not be parsed.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Settings(#[from] ConfigError),
}

impl RuntimeError {
    /// Build a script error attributed to `name`.
    pub fn script(name: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError::Script {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// A failed system call, carrying the operation name, errno and its text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{syscall} ({errno}) {message}")]
pub struct SystemError {
    pub syscall: String,
    pub errno: i32,
    pub message: String,
}

impl SystemError {
    /// Capture `errno` for a call that just failed.
    pub fn last(syscall: &str) -> Self {
        let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
        Self::from_errno(syscall, errno)
    }

    pub fn from_errno(syscall: &str, errno: i32) -> Self {
        Self {
            syscall: syscall.to_string(),
            errno,
            message: strerror(errno),
        }
    }

    /// True when the call would have blocked on a non-blocking descriptor.
    pub fn would_block(&self) -> bool {
        self.errno == libc::EAGAIN || self.errno == libc::EWOULDBLOCK
    }
}

/// Human readable description of an errno value.
pub fn strerror(errno: i32) -> String {
    // Safety: strerror returns a pointer to a static or thread-local
    // NUL-terminated string which we copy out immediately.
    unsafe {
        let ptr = libc::strerror(errno);
        if ptr.is_null() {
            return format!("errno {}", errno);
        }
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}
