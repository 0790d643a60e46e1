//! Runtime services
//!
//! - [`Poller`]: epoll wrapper (Linux)
//! - [`EventLoop`]: descriptor → handler dispatch, the single blocking point
//! - [`Timers`]: timerfd backed timeouts and intervals
//! - host capabilities: [`Epoll`], [`FileSystem`], [`Net`], [`Sys`]
//!
//! # Example
//!
//! ```no_run
//! use std::rc::Rc;
//! use ember::runtime::{EventLoop, Timers};
//!
//! let event_loop = Rc::new(EventLoop::new(128)?);
//! let timers = Timers::new(Rc::clone(&event_loop));
//! timers.set_timeout(|| { println!("tick"); Ok(()) }, 10)?;
//! event_loop.run()?;
//! # Ok::<(), ember::RuntimeError>(())
//! ```

mod event_loop;
mod host;
mod poller;
mod timer;

pub use event_loop::{ErrorHook, EventLoop, Handler};
pub use host::{Epoll, FileSystem, Net, Sys, STDIN_FILENO, STDOUT_FILENO};
pub use poller::{Event, Interest, Poller, Token};
pub use timer::{TimerHandle, Timers};
