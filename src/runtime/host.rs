//! Foundational host capabilities
//!
//! The objects behind the `epoll`, `fs`, `net` and `sys` capabilities.
//! Each is a small typed facade over the system calls the runtime needs.

use std::collections::HashMap;
use std::fs;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{Result, SystemError};

use super::event_loop::EventLoop;

/// Standard descriptors.
pub const STDIN_FILENO: RawFd = libc::STDIN_FILENO;
pub const STDOUT_FILENO: RawFd = libc::STDOUT_FILENO;

/// `epoll`: readiness loop factory.
#[derive(Debug, Default)]
pub struct Epoll;

impl Epoll {
    pub fn create_loop(&self, capacity: usize) -> Result<Rc<EventLoop>> {
        Ok(Rc::new(EventLoop::new(capacity)?))
    }
}

/// `fs`: synchronous file access.
#[derive(Debug, Default)]
pub struct FileSystem;

impl FileSystem {
    /// True when `path` names a regular file (following symlinks).
    pub fn is_file(&self, path: &Path) -> bool {
        fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
    }

    pub fn read_file(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }
}

/// `net`: raw descriptor I/O.
#[derive(Debug, Default)]
pub struct Net;

impl Net {
    /// One `read(2)`. Zero means end of input.
    pub fn read(&self, fd: RawFd, buf: &mut [u8]) -> std::result::Result<usize, SystemError> {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(SystemError::last("read"));
        }
        Ok(n as usize)
    }

    /// One `write(2)`.
    pub fn write(&self, fd: RawFd, buf: &[u8]) -> std::result::Result<usize, SystemError> {
        let n = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(SystemError::last("write"));
        }
        Ok(n as usize)
    }

    /// Read until end of input in `chunk`-sized pieces. Interrupted reads
    /// are retried.
    pub fn read_to_end(&self, fd: RawFd, chunk: usize) -> std::result::Result<Vec<u8>, SystemError> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk.max(1)];
        loop {
            let n = match self.read(fd, &mut buf) {
                Ok(n) => n,
                Err(err) if err.errno == libc::EINTR => continue,
                Err(err) => return Err(err),
            };
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    /// Set `O_NONBLOCK`, keeping the other status flags.
    pub fn set_nonblocking(&self, fd: RawFd) -> std::result::Result<(), SystemError> {
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
        if flags < 0 {
            return Err(SystemError::last("fcntl"));
        }
        let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if rc < 0 {
            return Err(SystemError::last("fcntl"));
        }
        Ok(())
    }
}

/// `sys`: process level queries.
#[derive(Debug, Default)]
pub struct Sys;

impl Sys {
    /// Environment as a map. Entries are split on the first `=`.
    pub fn env(&self) -> HashMap<String, String> {
        std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect()
    }

    pub fn cwd(&self) -> Result<PathBuf> {
        Ok(std::env::current_dir()?)
    }

    pub fn pid(&self) -> u32 {
        std::process::id()
    }
}
