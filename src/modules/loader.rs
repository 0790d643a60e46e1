//! Module loader (`require`)
//!
//! Resolution order for `.js` / `.json` specifiers, first hit wins:
//!
//! 1. record cache, keyed by normalized absolute path (checked before any I/O)
//! 2. live filesystem
//! 3. embedded resource store, by application-relative name
//! 4. secondary installation directory
//!
//! Any other specifier names a native library module, served only from the
//! embedded store under `lib/<name>.js`.
//!
//! A record enters the cache before its body runs, so a circular require
//! observes the partially populated exports instead of running the body a
//! second time.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, trace, warn};

use super::path;
use super::record::{Module, ModuleKind, ModuleOrigin};
use super::resources::ResourceStore;
use crate::config::ModulePaths;
use crate::engine::{ScriptEngine, MODULE_PARAMS};
use crate::error::{Result, RuntimeError};
use crate::runtime::FileSystem;
use crate::value::{Exports, Value};

pub struct ModuleLoader {
    engine: Rc<dyn ScriptEngine>,
    fs: Rc<FileSystem>,
    resources: Rc<ResourceStore>,
    paths: ModulePaths,
    cache: RefCell<HashMap<PathBuf, Rc<Module>>>,
}

impl ModuleLoader {
    pub fn new(
        engine: Rc<dyn ScriptEngine>,
        fs: Rc<FileSystem>,
        resources: Rc<ResourceStore>,
        paths: ModulePaths,
    ) -> Rc<Self> {
        Rc::new(Self {
            engine,
            fs,
            resources,
            paths,
            cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn paths(&self) -> &ModulePaths {
        &self.paths
    }

    /// Resolve and load `specifier` on behalf of `parent` (the application
    /// root when `None`). `Ok(None)` means nothing matched.
    pub fn require(
        self: &Rc<Self>,
        specifier: &str,
        parent: Option<&Rc<Module>>,
    ) -> Result<Option<Exports>> {
        let specifier = match path::expand_alias(specifier, &self.paths.app_root) {
            Some(expanded) => Cow::Owned(expanded),
            None => Cow::Borrowed(specifier),
        };

        match ModuleKind::from_extension(path::extension(&specifier)) {
            Some(kind) => self.require_file(&specifier, kind, parent),
            None => self.require_native(&specifier),
        }
    }

    /// Load an embedded library module by bare name.
    pub fn require_native(self: &Rc<Self>, name: &str) -> Result<Option<Exports>> {
        let key = format!("{}/{}.js", path::LIB_DIR, name);
        let key_path = PathBuf::from(&key);
        if let Some(module) = self.lookup(&key_path) {
            trace!(module = %key, "native module cache hit");
            return Ok(Some(module.exports()));
        }

        let Some(text) = self.resources.get(&key) else {
            debug!(module = %key, "native module not found");
            return Ok(None);
        };

        let module = Rc::new(Module::new(
            key_path,
            self.paths.app_root.clone(),
            ModuleKind::Native,
            ModuleOrigin::Embedded(key.clone()),
            text.to_string(),
        ));
        self.instantiate(module).map(Some)
    }

    fn require_file(
        self: &Rc<Self>,
        specifier: &str,
        kind: ModuleKind,
        parent: Option<&Rc<Module>>,
    ) -> Result<Option<Exports>> {
        let base = parent
            .map(|m| m.dir())
            .unwrap_or(self.paths.app_root.as_path());
        let resolved = path::join(base, specifier);

        if let Some(module) = self.lookup(&resolved) {
            trace!(module = %resolved.display(), "module cache hit");
            return Ok(Some(module.exports()));
        }

        let Some((source, origin)) = self.locate(&resolved)? else {
            debug!(module = %resolved.display(), "module not found");
            return Ok(None);
        };

        let dir = resolved
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.paths.app_root.clone());
        let module = Rc::new(Module::new(resolved, dir, kind, origin, source));
        self.instantiate(module).map(Some)
    }

    fn locate(&self, resolved: &Path) -> Result<Option<(String, ModuleOrigin)>> {
        if self.fs.is_file(resolved) {
            let text = self.fs.read_file(resolved)?;
            return Ok(Some((text, ModuleOrigin::Filesystem(resolved.to_path_buf()))));
        }

        // An empty payload counts as a miss in both fallbacks.
        let name = path::resource_name(resolved, &self.paths.app_root);
        if let Some(text) = self.resources.get(&name).filter(|text| !text.is_empty()) {
            return Ok(Some((text.to_string(), ModuleOrigin::Embedded(name))));
        }

        let installed = self.paths.install_dir.join(&name);
        if !self.fs.is_file(&installed) {
            return Ok(None);
        }
        match self.fs.read_file(&installed) {
            Ok(text) if text.is_empty() => Ok(None),
            Ok(text) => Ok(Some((text, ModuleOrigin::Installed(installed)))),
            Err(err) => {
                warn!(path = %installed.display(), error = %err, "unreadable installed module");
                Ok(None)
            }
        }
    }

    /// Cache, then evaluate. The record is evicted if evaluation fails.
    fn instantiate(self: &Rc<Self>, module: Rc<Module>) -> Result<Exports> {
        debug!(module = %module.path().display(), kind = ?module.kind(), origin = ?module.origin(), "loading module");
        self.cache
            .borrow_mut()
            .insert(module.path().to_path_buf(), Rc::clone(&module));

        let result = match module.kind() {
            ModuleKind::Json => self.evaluate_json(&module),
            ModuleKind::Script | ModuleKind::Native => self.evaluate(&module),
        };

        if let Err(err) = result {
            self.cache.borrow_mut().remove(module.path());
            return Err(err);
        }
        Ok(module.exports())
    }

    fn evaluate(self: &Rc<Self>, module: &Rc<Module>) -> Result<()> {
        let name = module.path().display().to_string();
        let compiled = self
            .engine
            .compile(module.source(), &name, &MODULE_PARAMS)?;
        module.set_compiled(Rc::clone(&compiled));

        let require = Require::new(Rc::clone(self), Rc::clone(module));
        let exports = module.exports();
        compiled.call(&exports, &require, module)
    }

    fn evaluate_json(&self, module: &Module) -> Result<()> {
        let json: serde_json::Value =
            serde_json::from_str(module.source()).map_err(|source| RuntimeError::Json {
                path: module.path().display().to_string(),
                source,
            })?;
        *module.exports().borrow_mut() = Value::from(json);
        Ok(())
    }

    /// Cached record for a resolved path or native key.
    pub fn lookup(&self, path: &Path) -> Option<Rc<Module>> {
        self.cache.borrow().get(path).cloned()
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }

    /// Cache keys, sorted.
    pub fn cached_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.cache.borrow().keys().cloned().collect();
        paths.sort();
        paths
    }
}

/// The `require` handed to a module body, bound to that module.
#[derive(Clone)]
pub struct Require {
    loader: Rc<ModuleLoader>,
    parent: Rc<Module>,
}

impl Require {
    pub fn new(loader: Rc<ModuleLoader>, parent: Rc<Module>) -> Self {
        Self { loader, parent }
    }

    /// Resolve `specifier` relative to the bound module.
    pub fn require(&self, specifier: &str) -> Result<Option<Exports>> {
        self.loader.require(specifier, Some(&self.parent))
    }

    /// The module this function was bound to.
    pub fn parent(&self) -> &Rc<Module> {
        &self.parent
    }

    pub fn loader(&self) -> &Rc<ModuleLoader> {
        &self.loader
    }
}
