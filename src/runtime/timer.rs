//! Timer bridge
//!
//! Each logical timer is a `timerfd` registered with the readiness loop for
//! read readiness. When it fires the callback runs first, then the 8-byte
//! expiration count is drained so the level-triggered registration quiets
//! down. One-shot timers are deregistered and closed in the same turn, even
//! when the callback failed.
//!
//! ```text
//! Scheduled ──fire──▶ Fired ──one-shot──▶ Released
//!     │                 └──repeating──▶ Scheduled
//!     └──cancel──▶ Released
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, trace};

use super::event_loop::EventLoop;
use super::poller::Interest;
use crate::error::{Result, SystemError};

/// Identity of a scheduled timer.
///
/// The descriptor number alone is not unique over time, since the kernel
/// hands out released numbers again; the generation id tells a stale handle
/// from a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    fd: RawFd,
    id: u64,
}

impl TimerHandle {
    /// Descriptor, also the registration key in the readiness loop.
    pub fn descriptor(&self) -> RawFd {
        self.fd
    }
}

struct TimerEntry {
    id: u64,
    repeat: bool,
    fd: OwnedFd,
}

type Live = Rc<RefCell<HashMap<RawFd, TimerEntry>>>;

pub struct Timers {
    event_loop: Rc<EventLoop>,
    live: Live,
    next_id: Cell<u64>,
}

impl Timers {
    pub fn new(event_loop: Rc<EventLoop>) -> Self {
        Self {
            event_loop,
            live: Rc::new(RefCell::new(HashMap::new())),
            next_id: Cell::new(1),
        }
    }

    /// Arm a timer that calls `callback` after `delay`, and every `delay`
    /// thereafter when `repeat` is set.
    pub fn schedule(
        &self,
        mut callback: impl FnMut() -> Result<()> + 'static,
        delay: Duration,
        repeat: bool,
    ) -> Result<TimerHandle> {
        let fd = create_timerfd()?;
        arm(&fd, delay, repeat)?;

        let raw = fd.as_raw_fd();
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let handle = TimerHandle { fd: raw, id };

        self.live
            .borrow_mut()
            .insert(raw, TimerEntry { id, repeat, fd });

        let live = Rc::clone(&self.live);
        let registered = self.event_loop.add(raw, Interest::READABLE, move |lp, _, _| {
            trace!(fd = raw, id, "timer fired");
            let outcome = callback();
            // The callback may have cancelled this timer.
            if !is_live(&live, handle) {
                return outcome;
            }
            settle(lp, &live, handle, repeat, outcome, drain(raw))
        });

        if let Err(err) = registered {
            self.live.borrow_mut().remove(&raw);
            return Err(err);
        }

        debug!(fd = raw, id, delay_ms = delay.as_millis() as u64, repeat, "timer scheduled");
        Ok(handle)
    }

    /// One-shot timer, delay in milliseconds.
    pub fn set_timeout(
        &self,
        callback: impl FnMut() -> Result<()> + 'static,
        delay_ms: u64,
    ) -> Result<TimerHandle> {
        self.schedule(callback, Duration::from_millis(delay_ms), false)
    }

    /// Repeating timer, period in milliseconds.
    pub fn set_interval(
        &self,
        callback: impl FnMut() -> Result<()> + 'static,
        delay_ms: u64,
    ) -> Result<TimerHandle> {
        self.schedule(callback, Duration::from_millis(delay_ms), true)
    }

    /// Deregister and close. Cancelling a released handle is a no-op that
    /// returns `false`.
    pub fn cancel(&self, handle: TimerHandle) -> Result<bool> {
        release(&self.event_loop, &self.live, handle)
    }

    pub fn clear_timeout(&self, handle: TimerHandle) -> Result<bool> {
        self.cancel(handle)
    }

    pub fn clear_interval(&self, handle: TimerHandle) -> Result<bool> {
        self.cancel(handle)
    }

    pub fn is_active(&self, handle: TimerHandle) -> bool {
        is_live(&self.live, handle)
    }

    pub fn is_repeating(&self, handle: TimerHandle) -> Option<bool> {
        self.live
            .borrow()
            .get(&handle.fd)
            .filter(|entry| entry.id == handle.id)
            .map(|entry| entry.repeat)
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.borrow().is_empty()
    }
}

fn is_live(live: &Live, handle: TimerHandle) -> bool {
    live.borrow()
        .get(&handle.fd)
        .map_or(false, |entry| entry.id == handle.id)
}

fn release(event_loop: &EventLoop, live: &Live, handle: TimerHandle) -> Result<bool> {
    let entry = {
        let mut live = live.borrow_mut();
        match live.get(&handle.fd) {
            Some(entry) if entry.id == handle.id => live.remove(&handle.fd),
            _ => None,
        }
    };
    let Some(entry) = entry else {
        return Ok(false);
    };
    // Deregister while the descriptor is still open; dropping the entry
    // closes it.
    event_loop.remove(handle.fd)?;
    drop(entry);
    debug!(fd = handle.fd, id = handle.id, "timer released");
    Ok(true)
}

/// Finish a fire: one-shot timers are released whatever the callback or the
/// drain reported, then the first error is returned.
fn settle(
    event_loop: &EventLoop,
    live: &Live,
    handle: TimerHandle,
    repeat: bool,
    outcome: Result<()>,
    drained: Result<u64>,
) -> Result<()> {
    let released = if repeat {
        Ok(())
    } else {
        release(event_loop, live, handle).map(|_| ())
    };
    outcome.and(drained.map(|_| ())).and(released)
}

fn create_timerfd() -> Result<OwnedFd> {
    let fd = unsafe {
        libc::timerfd_create(
            libc::CLOCK_MONOTONIC,
            libc::TFD_NONBLOCK | libc::TFD_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(SystemError::last("timerfd_create").into());
    }
    // Safety: timerfd_create returned a fresh descriptor we now own.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn arm(fd: &OwnedFd, delay: Duration, repeat: bool) -> Result<()> {
    // A zero it_value disarms a timerfd.
    let delay = delay.max(Duration::from_nanos(1));
    let value = timespec(delay);
    let spec = libc::itimerspec {
        it_interval: if repeat { value } else { timespec(Duration::ZERO) },
        it_value: value,
    };
    let result =
        unsafe { libc::timerfd_settime(fd.as_raw_fd(), 0, &spec, std::ptr::null_mut()) };
    if result < 0 {
        return Err(SystemError::last("timerfd_settime").into());
    }
    Ok(())
}

fn timespec(d: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    }
}

/// Read and discard the pending expiration count.
fn drain(fd: RawFd) -> Result<u64> {
    let mut expirations = [0u8; 8];
    let n = unsafe { libc::read(fd, expirations.as_mut_ptr().cast(), expirations.len()) };
    if n < 0 {
        let err = SystemError::last("read");
        if err.would_block() {
            return Ok(0);
        }
        return Err(err.into());
    }
    Ok(u64::from_ne_bytes(expirations))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timers() -> Timers {
        Timers::new(Rc::new(EventLoop::new(16).unwrap()))
    }

    #[test]
    fn test_zero_delay_still_fires() {
        let timers = timers();
        let fired = Rc::new(Cell::new(0));
        let count = Rc::clone(&fired);
        timers
            .set_timeout(
                move || {
                    count.set(count.get() + 1);
                    Ok(())
                },
                0,
            )
            .unwrap();
        timers.event_loop.run().unwrap();
        assert_eq!(fired.get(), 1);
        assert!(timers.is_empty());
    }

    #[test]
    fn test_cancel_before_fire() {
        let timers = timers();
        let handle = timers.set_timeout(|| Ok(()), 10_000).unwrap();
        assert!(timers.is_active(handle));
        assert_eq!(timers.is_repeating(handle), Some(false));
        assert!(timers.cancel(handle).unwrap());
        assert!(!timers.is_active(handle));
        assert!(!timers.cancel(handle).unwrap());
        assert!(timers.event_loop.is_empty());
    }

    #[test]
    fn test_one_shot_released_when_drain_fails() {
        let timers = timers();
        let handle = timers.set_timeout(|| Ok(()), 10_000).unwrap();
        let drained = Err(SystemError::from_errno("read", libc::EIO).into());

        let err = settle(&timers.event_loop, &timers.live, handle, false, Ok(()), drained)
            .unwrap_err();
        assert!(err.to_string().contains("read"));
        assert!(!timers.is_active(handle));
        assert!(timers.event_loop.is_empty());
    }

    #[test]
    fn test_callback_error_reported_before_drain_error() {
        let timers = timers();
        let handle = timers.set_interval(|| Ok(()), 10_000).unwrap();
        let outcome = Err(crate::error::RuntimeError::script("tick", "boom"));
        let drained = Err(SystemError::from_errno("read", libc::EIO).into());

        let err = settle(&timers.event_loop, &timers.live, handle, true, outcome, drained)
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(timers.is_active(handle));
        assert!(timers.cancel(handle).unwrap());
    }

    #[test]
    fn test_stale_handle_does_not_cancel_reused_descriptor() {
        let timers = timers();
        let first = timers.set_timeout(|| Ok(()), 10_000).unwrap();
        assert!(timers.cancel(first).unwrap());

        // The kernel usually hands back the same number.
        let second = timers.set_timeout(|| Ok(()), 10_000).unwrap();
        assert!(!timers.cancel(first).unwrap());
        assert!(timers.is_active(second));
        assert!(timers.cancel(second).unwrap());
    }
}
