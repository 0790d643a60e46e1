//! Ember - a minimal embeddable script runtime
//!
//! Ember turns a handful of native primitives (raw descriptors, epoll,
//! dynamic library loading and an external script engine) into a runtime
//! with module loading, native extension loading and timers.
//!
//! # Subsystems
//!
//! - **Native extensions** ([`ffi`]): capabilities by name, either built into
//!   the host or opened from `<name>.so` through its `_register_<name>`
//!   symbol, cached first-load-wins
//! - **Modules** ([`modules`]): `require` with a path keyed record cache,
//!   filesystem → embedded resources → install dir fallback, and circular
//!   require support
//! - **Timers** ([`runtime::Timers`]): timeouts and intervals backed by
//!   `timerfd`, dispatched by the epoll [`runtime::EventLoop`]
//! - **Bootstrap** ([`bootstrap`]): builds the [`Runtime`] context and picks
//!   the startup mode from the argument vector
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use ember::{Host, Runtime, Options};
//!
//! let host = Host::new()
//!     .with_engine(Rc::new(MyEngine::new()))
//!     .with_resource("lib/path.js", PATH_JS);
//! let runtime = Runtime::bootstrap(host, Options::parse(std::env::args()))?;
//! let path = runtime.require("path")?;
//! runtime.run()?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   Bootstrap          │  options, startup mode
//! └──────────┬───────────┘
//!            │
//!     ┌──────┴───────┐
//!     ▼              ▼
//! ┌────────┐   ┌────────────┐
//! │  ffi   │◀──│  modules   │  require()
//! └────────┘   └─────┬──────┘
//!                    │ compile / run
//!                    ▼
//!             ┌────────────┐     ┌──────────┐
//!             │ ScriptEngine│    │  Timers  │──▶ EventLoop (epoll)
//!             └────────────┘     └──────────┘
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod modules;
pub mod options;
pub mod runtime;
pub mod value;

pub use bootstrap::{boot, run_bare, Host, Runtime, StartupMode};
pub use buffer::{buffer_from_string, byte_length, BufferExt};
pub use config::{ConfigError, EmberConfig, ModulePaths};
pub use engine::{CompiledModule, ScriptEngine, Vm, MODULE_PARAMS};
pub use error::{Result, RuntimeError, SystemError};
pub use ffi::{
    export_capability, BuiltinTable, Capability, CapabilityKind, CapabilityObject,
    CapabilityRegistry, FfiError, LibraryHandle, LibraryLoader,
};
pub use modules::{Module, ModuleKind, ModuleLoader, ModuleOrigin, Require, ResourceStore};
pub use options::Options;
pub use runtime::{EventLoop, TimerHandle, Timers};
pub use value::{Exports, NativeFunction, Value};
