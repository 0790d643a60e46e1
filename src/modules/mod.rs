//! Module system
//!
//! Resolves, loads and caches script, JSON and native library modules.
//!
//! # Calling convention
//!
//! Script and native module bodies are compiled as functions of
//! `(exports, require, module)`. Their return value is ignored; a module
//! publishes its surface by mutating `exports` or replacing `module.exports`.
//!
//! # Example
//!
//! ```ignore
//! let loader = ModuleLoader::new(engine, fs, resources, paths);
//! let config = loader.require("./config.json", None)?;
//! let http = loader.require("@http", None)?;      // lib/http/http.js
//! let path = loader.require("path", None)?;       // embedded lib/path.js
//! ```

mod loader;
pub mod path;
mod record;
mod resources;

pub use loader::{ModuleLoader, Require};
pub use record::{Module, ModuleKind, ModuleOrigin};
pub use resources::ResourceStore;
