//! epoll readiness poller
//!
//! Thin wrapper over `epoll_create1` / `epoll_ctl` / `epoll_wait`.
//! Registrations are level-triggered: a descriptor that is not drained is
//! reported again on the next wait.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use crate::error::SystemError;

/// Identifier attached to a registration, returned with its events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub u64);

/// Interest / readiness flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest(pub u8);

impl Interest {
    pub const READABLE: Interest = Interest(0b0001);
    pub const WRITABLE: Interest = Interest(0b0010);
    pub const ERROR: Interest = Interest(0b0100);
    pub const HUP: Interest = Interest(0b1000);

    pub fn is_readable(&self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    pub fn is_writable(&self) -> bool {
        self.0 & Self::WRITABLE.0 != 0
    }

    pub fn is_error(&self) -> bool {
        self.0 & Self::ERROR.0 != 0
    }

    pub fn is_hup(&self) -> bool {
        self.0 & Self::HUP.0 != 0
    }
}

impl std::ops::BitOr for Interest {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Interest(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A readiness event
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub token: Token,
    pub interest: Interest,
}

pub struct Poller {
    epoll_fd: OwnedFd,
    events: Vec<libc::epoll_event>,
}

impl Poller {
    /// Create a poller reporting at most `capacity` events per wait.
    pub fn new(capacity: usize) -> Result<Self, SystemError> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(SystemError::last("epoll_create1"));
        }
        // Safety: epoll_create1 returned a fresh descriptor we now own.
        let epoll_fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self {
            epoll_fd,
            events: vec![libc::epoll_event { events: 0, u64: 0 }; capacity.max(1)],
        })
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn register(&mut self, fd: RawFd, token: Token, interest: Interest) -> Result<(), SystemError> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, token, interest)
    }

    pub fn modify(&mut self, fd: RawFd, token: Token, interest: Interest) -> Result<(), SystemError> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, token, interest)
    }

    pub fn deregister(&mut self, fd: RawFd) -> Result<(), SystemError> {
        let result = unsafe {
            libc::epoll_ctl(
                self.epoll_fd.as_raw_fd(),
                libc::EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut(),
            )
        };
        if result < 0 {
            return Err(SystemError::last("epoll_ctl"));
        }
        Ok(())
    }

    fn ctl(
        &mut self,
        op: libc::c_int,
        fd: RawFd,
        token: Token,
        interest: Interest,
    ) -> Result<(), SystemError> {
        let mut event = libc::epoll_event {
            events: interest_to_epoll(interest),
            u64: token.0,
        };
        let result = unsafe { libc::epoll_ctl(self.epoll_fd.as_raw_fd(), op, fd, &mut event) };
        if result < 0 {
            return Err(SystemError::last("epoll_ctl"));
        }
        Ok(())
    }

    /// Wait for readiness and append what was reported to `events`.
    /// `None` blocks until something is ready. An interrupted wait reports
    /// zero events.
    pub fn poll(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> Result<usize, SystemError> {
        let timeout_ms = timeout
            .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
            .unwrap_or(-1);

        let count = unsafe {
            libc::epoll_wait(
                self.epoll_fd.as_raw_fd(),
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                timeout_ms,
            )
        };

        if count < 0 {
            let err = SystemError::last("epoll_wait");
            if err.errno == libc::EINTR {
                return Ok(0);
            }
            return Err(err);
        }

        for raw in &self.events[..count as usize] {
            events.push(Event {
                token: Token(raw.u64),
                interest: epoll_to_interest(raw.events),
            });
        }
        Ok(count as usize)
    }
}

fn interest_to_epoll(interest: Interest) -> u32 {
    let mut events = 0u32;
    if interest.is_readable() {
        events |= libc::EPOLLIN as u32;
    }
    if interest.is_writable() {
        events |= libc::EPOLLOUT as u32;
    }
    events
}

fn epoll_to_interest(events: u32) -> Interest {
    let mut interest = Interest(0);
    if events & libc::EPOLLIN as u32 != 0 {
        interest |= Interest::READABLE;
    }
    if events & libc::EPOLLOUT as u32 != 0 {
        interest |= Interest::WRITABLE;
    }
    if events & libc::EPOLLERR as u32 != 0 {
        interest |= Interest::ERROR;
    }
    if events & libc::EPOLLHUP as u32 != 0 {
        interest |= Interest::HUP;
    }
    interest
}
