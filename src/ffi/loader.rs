//! Dynamic Library Loader
//!
//! Platform abstraction over shared-object loading. The registry only talks
//! to the `LibraryLoader` / `LibraryHandle` traits so hosts without dynamic
//! loading, and tests, can substitute their own.

use std::ffi::{c_void, CString};
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use super::FfiError;

/// Signature of a capability registration function.
///
/// The returned pointer must come from [`export_capability`](super::export_capability)
/// or be null.
pub type RegisterFn = unsafe extern "C" fn() -> *mut c_void;

/// Prefix of the registration symbol exported by every capability library.
pub const REGISTER_PREFIX: &str = "_register_";

/// Registration symbol for a capability name.
pub fn register_symbol(name: &str) -> String {
    format!("{}{}", REGISTER_PREFIX, name)
}

/// An open shared library. Dropping the handle closes the library.
pub trait LibraryHandle {
    /// Path the library was opened from
    fn path(&self) -> &Path;

    /// Resolve a registration function by symbol name.
    fn register_fn(&self, symbol: &str) -> Result<RegisterFn, FfiError>;
}

/// Opens shared libraries.
pub trait LibraryLoader {
    /// Whether this host can load libraries at all.
    fn supported(&self) -> bool {
        true
    }

    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, FfiError>;
}

/// A dynamically loaded library
pub struct DynamicLibrary {
    /// Path to the library
    path: PathBuf,
    /// The loaded library handle
    library: Library,
}

impl DynamicLibrary {
    /// Load a library from the given path
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FfiError> {
        let path = path.as_ref().to_path_buf();

        // Safety: loading a library runs its initializers. Capability
        // libraries are trusted the same way the runtime binary is.
        let library = unsafe {
            Library::new(&path).map_err(|e| {
                FfiError::LoadError(format!(
                    "Failed to load library '{}': {}",
                    path.display(),
                    e
                ))
            })?
        };

        Ok(Self { path, library })
    }
}

impl LibraryHandle for DynamicLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn register_fn(&self, symbol: &str) -> Result<RegisterFn, FfiError> {
        let c_name = CString::new(symbol)
            .map_err(|_| FfiError::InvalidSymbol(format!("Invalid symbol name: {}", symbol)))?;

        // Safety: the registration convention fixes the symbol's type to
        // `RegisterFn`. The pointer is only used while `self` is alive,
        // which the owning capability guarantees.
        let func: Symbol<RegisterFn> = unsafe {
            self.library.get(c_name.as_bytes_with_nul()).map_err(|e| {
                FfiError::SymbolNotFound(format!(
                    "Symbol '{}' not found in '{}': {}",
                    symbol,
                    self.path.display(),
                    e
                ))
            })?
        };

        Ok(*func)
    }
}

/// Loader backed by the platform dynamic linker.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLoader;

impl LibraryLoader for SystemLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, FfiError> {
        Ok(Box::new(DynamicLibrary::load(path)?))
    }
}

/// Loader for hosts built without dynamic loading.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDynamicLoading;

impl LibraryLoader for NoDynamicLoading {
    fn supported(&self) -> bool {
        false
    }

    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, FfiError> {
        Err(FfiError::Unsupported(path.display().to_string()))
    }
}

/// Default file name for a capability library, `<name>.<platform ext>`.
pub fn library_filename(name: &str) -> String {
    #[cfg(target_os = "macos")]
    {
        format!("{}.dylib", name)
    }

    #[cfg(target_os = "windows")]
    {
        format!("{}.dll", name)
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        format!("{}.so", name)
    }
}
