//! Readiness loop
//!
//! Maps registered descriptors to handlers and dispatches them as the
//! poller reports readiness. The wait inside [`EventLoop::poll`] is the only
//! place the process blocks.
//!
//! A handler that returns an error does not stop the loop: the error goes to
//! the uncaught-error hook (logged by default) and dispatch continues.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

use tracing::{error, trace};

use super::poller::{Event, Interest, Poller, Token};
use crate::error::{Result, RuntimeError, SystemError};

/// Callback invoked when its descriptor becomes ready.
pub type Handler = Box<dyn FnMut(&EventLoop, RawFd, Interest) -> Result<()>>;

/// Receives errors raised outside any synchronous caller.
pub type ErrorHook = Rc<dyn Fn(&RuntimeError)>;

/// A live registration. The token carries a generation in its high bits so
/// events queued for an earlier owner of the same descriptor number are
/// recognised as stale.
struct Registration {
    token: Token,
    handler: Rc<RefCell<Handler>>,
}

pub struct EventLoop {
    poller: RefCell<Poller>,
    handlers: RefCell<HashMap<RawFd, Registration>>,
    next_generation: Cell<u32>,
    on_error: RefCell<ErrorHook>,
}

impl EventLoop {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            poller: RefCell::new(Poller::new(capacity)?),
            handlers: RefCell::new(HashMap::new()),
            next_generation: Cell::new(1),
            on_error: RefCell::new(Rc::new(report_uncaught)),
        })
    }

    /// Watch `fd` and call `handler` whenever it is ready.
    pub fn add(
        &self,
        fd: RawFd,
        interest: Interest,
        handler: impl FnMut(&EventLoop, RawFd, Interest) -> Result<()> + 'static,
    ) -> Result<()> {
        let generation = self.next_generation.get();
        self.next_generation.set(generation.wrapping_add(1));
        let token = token_for(fd, generation);

        self.poller.borrow_mut().register(fd, token, interest)?;
        let handler: Handler = Box::new(handler);
        self.handlers.borrow_mut().insert(
            fd,
            Registration {
                token,
                handler: Rc::new(RefCell::new(handler)),
            },
        );
        trace!(fd, generation, "descriptor registered");
        Ok(())
    }

    /// Change the interest set of a registered descriptor.
    pub fn modify(&self, fd: RawFd, interest: Interest) -> Result<()> {
        let Some(token) = self.handlers.borrow().get(&fd).map(|r| r.token) else {
            return Err(SystemError::from_errno("epoll_ctl", libc::ENOENT).into());
        };
        self.poller.borrow_mut().modify(fd, token, interest)?;
        Ok(())
    }

    /// Stop watching `fd`. Returns `false` if it was not registered.
    pub fn remove(&self, fd: RawFd) -> Result<bool> {
        if self.handlers.borrow_mut().remove(&fd).is_none() {
            return Ok(false);
        }
        self.poller.borrow_mut().deregister(fd)?;
        trace!(fd, "descriptor deregistered");
        Ok(true)
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.handlers.borrow().contains_key(&fd)
    }

    pub fn len(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.borrow().is_empty()
    }

    /// Replace the uncaught-error hook.
    pub fn set_error_handler(&self, hook: impl Fn(&RuntimeError) + 'static) {
        *self.on_error.borrow_mut() = Rc::new(hook);
    }

    /// Wait once and dispatch every ready handler. Returns the number of
    /// handlers invoked.
    pub fn poll(&self, timeout: Option<Duration>) -> Result<usize> {
        let mut events: Vec<Event> = Vec::new();
        self.poller.borrow_mut().poll(&mut events, timeout)?;

        let mut dispatched = 0;
        for event in events {
            let fd = fd_of(event.token);
            // An earlier handler in this batch may have removed it, or
            // removed it and registered a new owner of the same number.
            let handler = match self.handlers.borrow().get(&fd) {
                Some(registration) if registration.token == event.token => {
                    Rc::clone(&registration.handler)
                }
                _ => continue,
            };
            let Ok(mut guard) = handler.try_borrow_mut() else {
                continue;
            };
            dispatched += 1;
            if let Err(err) = (*guard)(self, fd, event.interest) {
                let hook = Rc::clone(&self.on_error.borrow());
                hook(&err);
            }
        }
        Ok(dispatched)
    }

    /// Dispatch until no descriptors remain registered.
    pub fn run(&self) -> Result<()> {
        while !self.is_empty() {
            self.poll(None)?;
        }
        Ok(())
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("registered", &self.len())
            .finish()
    }
}

fn token_for(fd: RawFd, generation: u32) -> Token {
    Token((u64::from(generation) << 32) | u64::from(fd as u32))
}

fn fd_of(token: Token) -> RawFd {
    (token.0 & 0xffff_ffff) as u32 as RawFd
}

fn report_uncaught(err: &RuntimeError) {
    error!(error = %err, "uncaught error in event handler");
}
