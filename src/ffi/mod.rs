//! Native extension loading
//!
//! Turns a capability name into a capability object.
//!
//! # Architecture
//!
//! ```text
//! registry.load("zlib", None)
//!       │
//!       ▼
//! Capability cache ── hit ──▶ cached capability
//!       │ miss
//!       ▼
//! BuiltinTable (compiled into the host)
//!       │ miss
//!       ▼
//! LibraryLoader::open("zlib.so")        (libloading)
//!       │
//!       ▼
//! _register_zlib() ──▶ boxed payload ──▶ Capability { Dynamic }
//! ```
//!
//! # Example
//!
//! ```ignore
//! let registry = CapabilityRegistry::default();
//! if let Some(zlib) = registry.load("zlib", None) {
//!     let codec = zlib.downcast::<Zlib>();
//! }
//! ```

mod loader;
mod registry;
mod types;

pub use loader::{
    library_filename, register_symbol, DynamicLibrary, LibraryHandle, LibraryLoader,
    NoDynamicLoading, RegisterFn, SystemLoader, REGISTER_PREFIX,
};
pub use registry::{BuiltinTable, CapabilityFactory, CapabilityRegistry, FfiError};
pub use types::{export_capability, Capability, CapabilityKind, CapabilityObject};
