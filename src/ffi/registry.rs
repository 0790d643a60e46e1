//! Capability Registry
//!
//! Central cache of loaded capabilities. A name is resolved once: first
//! against the host's built-in table, then by opening a shared library and
//! calling its `_register_<name>` symbol. Whatever loads first is kept for
//! the life of the process.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, warn};

use super::loader::{library_filename, register_symbol, LibraryLoader, SystemLoader};
use super::types::{take_capability, Capability, CapabilityObject};
use crate::error::{Result, RuntimeError};

/// Error type for FFI operations
#[derive(Debug, Clone)]
pub enum FfiError {
    /// Failed to load a library
    LoadError(String),
    /// Symbol not found in library
    SymbolNotFound(String),
    /// Invalid symbol name
    InvalidSymbol(String),
    /// Dynamic loading is not available on this host
    Unsupported(String),
    /// Registration function returned nothing
    NullCapability(String),
}

impl fmt::Display for FfiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FfiError::LoadError(msg) => write!(f, "Load error: {}", msg),
            FfiError::SymbolNotFound(msg) => write!(f, "Symbol not found: {}", msg),
            FfiError::InvalidSymbol(msg) => write!(f, "Invalid symbol: {}", msg),
            FfiError::Unsupported(path) => {
                write!(f, "Dynamic loading unsupported, cannot open {}", path)
            }
            FfiError::NullCapability(name) => {
                write!(f, "Registration of '{}' returned no capability", name)
            }
        }
    }
}

impl std::error::Error for FfiError {}

/// Factory for a capability compiled into the host.
pub type CapabilityFactory = Box<dyn Fn() -> Result<CapabilityObject>>;

/// Capabilities statically embedded in the host.
#[derive(Default)]
pub struct BuiltinTable {
    factories: HashMap<String, CapabilityFactory>,
}

impl BuiltinTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory; a later registration under the same name wins.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Result<CapabilityObject> + 'static,
    ) {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    fn instantiate(&self, name: &str) -> Option<Result<CapabilityObject>> {
        self.factories.get(name).map(|factory| factory())
    }
}

/// Native extension loader and its cache.
pub struct CapabilityRegistry {
    builtins: BuiltinTable,
    loader: Box<dyn LibraryLoader>,
    cache: RefCell<HashMap<String, Rc<Capability>>>,
}

impl CapabilityRegistry {
    pub fn new(builtins: BuiltinTable, loader: Box<dyn LibraryLoader>) -> Self {
        Self {
            builtins,
            loader,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Load a capability by name, opening `path` (default `<name>.so`) if it
    /// is neither cached nor built in. Failures are logged and yield `None`.
    ///
    /// A cached capability is returned as is, even when `path` differs from
    /// the one it was first loaded from.
    pub fn load(&self, name: &str, path: Option<&Path>) -> Option<Rc<Capability>> {
        if let Some(capability) = self.get(name) {
            return Some(capability);
        }

        let capability = match self.builtins.instantiate(name) {
            Some(Ok(object)) => Capability::embedded(name, object),
            Some(Err(err)) => {
                warn!(capability = name, error = %err, "built-in capability failed to initialize");
                return None;
            }
            None => {
                if !self.loader.supported() {
                    debug!(capability = name, "dynamic loading unsupported");
                    return None;
                }
                let path = path
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from(library_filename(name)));
                match self.open(name, &path) {
                    Ok(capability) => capability,
                    Err(err) => {
                        debug!(capability = name, path = %path.display(), error = %err, "capability not loaded");
                        return None;
                    }
                }
            }
        };

        debug!(capability = name, kind = %capability.kind(), "capability loaded");
        let capability = Rc::new(capability);
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&capability));
        Some(capability)
    }

    fn open(&self, name: &str, path: &Path) -> std::result::Result<Capability, FfiError> {
        let handle = self.loader.open(path)?;
        let register = handle.register_fn(&register_symbol(name))?;

        // Safety: `register` follows the registration convention and the
        // library stays open for as long as `handle` lives.
        let raw = unsafe { register() };
        if raw.is_null() {
            return Err(FfiError::NullCapability(name.to_string()));
        }

        // Safety: non-null pointers from a registration function are
        // produced by `export_capability` and are taken exactly once here.
        let object = unsafe { take_capability(raw) };
        Ok(Capability::dynamic(name, object, handle))
    }

    /// Load a capability that must be present, downcast to `T`.
    pub fn require<T: Any>(&self, name: &str) -> Result<Rc<T>> {
        let capability = self
            .load(name, None)
            .ok_or_else(|| RuntimeError::MissingCapability(name.to_string()))?;
        capability
            .downcast::<T>()
            .ok_or_else(|| RuntimeError::CapabilityType {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// A cached capability, without trying to load it.
    pub fn get(&self, name: &str) -> Option<Rc<Capability>> {
        self.cache.borrow().get(name).cloned()
    }

    /// Names of all loaded capabilities.
    pub fn loaded(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cache.borrow().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new(BuiltinTable::new(), Box::new(SystemLoader))
    }
}
