//! Module records

use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::engine::CompiledModule;
use crate::value::{new_exports, Exports};

/// How a module's source is turned into exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// `.js`: compiled and executed once
    Script,
    /// `.json`: parsed straight into the exports
    Json,
    /// Embedded library module addressed by bare name
    Native,
}

impl ModuleKind {
    /// Kind for a file extension, `None` when the specifier is not a file.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "js" => Some(ModuleKind::Script),
            "json" => Some(ModuleKind::Json),
            _ => None,
        }
    }
}

/// Backing store a module's source was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    Filesystem(PathBuf),
    Embedded(String),
    Installed(PathBuf),
}

/// One loaded unit of source.
pub struct Module {
    path: PathBuf,
    dir: PathBuf,
    kind: ModuleKind,
    origin: ModuleOrigin,
    source: String,
    compiled: OnceCell<Rc<dyn CompiledModule>>,
    exports: RefCell<Exports>,
}

impl Module {
    pub fn new(
        path: PathBuf,
        dir: PathBuf,
        kind: ModuleKind,
        origin: ModuleOrigin,
        source: String,
    ) -> Self {
        Self {
            path,
            dir,
            kind,
            origin,
            source,
            compiled: OnceCell::new(),
            exports: RefCell::new(new_exports()),
        }
    }

    /// Cache key: absolute path for files, `lib/<name>.js` for native modules.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory relative requires from this module resolve against.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn origin(&self) -> &ModuleOrigin {
        &self.origin
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Current `module.exports`.
    pub fn exports(&self) -> Exports {
        Rc::clone(&self.exports.borrow())
    }

    /// Replace `module.exports`. Importers that already hold the previous
    /// container keep it.
    pub fn set_exports(&self, exports: Exports) {
        *self.exports.borrow_mut() = exports;
    }

    pub fn compiled(&self) -> Option<Rc<dyn CompiledModule>> {
        self.compiled.get().cloned()
    }

    pub(crate) fn set_compiled(&self, compiled: Rc<dyn CompiledModule>) {
        // A record is compiled at most once; a second value is dropped.
        let _ = self.compiled.set(compiled);
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("origin", &self.origin)
            .field("compiled", &self.compiled.get().is_some())
            .finish()
    }
}
