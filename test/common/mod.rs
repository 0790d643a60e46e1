//! Shared test doubles
//!
//! `ScriptedEngine` stands in for the external script engine: module bodies
//! are Rust closures keyed by the exact source text they are compiled from,
//! and every compile and script run is recorded.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use ember::config::ModulePaths;
use ember::runtime::FileSystem;
use ember::{
    CompiledModule, Exports, Module, ModuleLoader, Require, ResourceStore, Result, RuntimeError,
    ScriptEngine, Value,
};

/// Source text the engine refuses to compile.
pub const SYNTAX_ERROR: &str = "!syntax error";

/// Source text that raises when run as a script.
pub const THROWS: &str = "throw";

pub type Body = Rc<dyn Fn(&Exports, &Require, &Rc<Module>) -> Result<()>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub name: String,
    pub source: String,
    pub esm: bool,
}

#[derive(Default)]
pub struct ScriptedEngine {
    bodies: RefCell<HashMap<String, Body>>,
    compiles: RefCell<Vec<String>>,
    runs: RefCell<Vec<Run>>,
}

impl ScriptedEngine {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Body to run for modules whose source is exactly `source`.
    pub fn on(
        &self,
        source: &str,
        body: impl Fn(&Exports, &Require, &Rc<Module>) -> Result<()> + 'static,
    ) {
        self.bodies
            .borrow_mut()
            .insert(source.to_string(), Rc::new(body));
    }

    /// Names passed to `compile`, in order.
    pub fn compiles(&self) -> Vec<String> {
        self.compiles.borrow().clone()
    }

    pub fn compile_count(&self, name_suffix: &str) -> usize {
        self.compiles
            .borrow()
            .iter()
            .filter(|name| name.ends_with(name_suffix))
            .count()
    }

    /// Scripts and ES modules run, in order.
    pub fn runs(&self) -> Vec<Run> {
        self.runs.borrow().clone()
    }
}

struct ScriptedModule {
    body: Option<Body>,
}

impl CompiledModule for ScriptedModule {
    fn call(&self, exports: &Exports, require: &Require, module: &Rc<Module>) -> Result<()> {
        match &self.body {
            Some(body) => body(exports, require, module),
            None => Ok(()),
        }
    }
}

impl ScriptEngine for ScriptedEngine {
    fn compile(&self, source: &str, name: &str, params: &[&str]) -> Result<Rc<dyn CompiledModule>> {
        assert_eq!(params, ["exports", "require", "module"]);
        self.compiles.borrow_mut().push(name.to_string());
        if source == SYNTAX_ERROR {
            return Err(RuntimeError::Compile {
                name: name.to_string(),
                message: "unexpected token".to_string(),
            });
        }
        let body = self.bodies.borrow().get(source).cloned();
        Ok(Rc::new(ScriptedModule { body }))
    }

    fn run_script(&self, source: &str, name: &str) -> Result<Value> {
        self.record(source, name, false)
    }

    fn run_module(&self, source: &str, name: &str) -> Result<Value> {
        self.record(source, name, true)
    }
}

impl ScriptedEngine {
    fn record(&self, source: &str, name: &str, esm: bool) -> Result<Value> {
        self.runs.borrow_mut().push(Run {
            name: name.to_string(),
            source: source.to_string(),
            esm,
        });
        if source == THROWS {
            return Err(RuntimeError::script(name, "thrown"));
        }
        Ok(Value::Null)
    }
}

/// Loader over a real filesystem root, an embedded store and an install dir.
pub fn loader(
    engine: &Rc<ScriptedEngine>,
    app_root: &Path,
    install_dir: &Path,
    resources: ResourceStore,
) -> Rc<ModuleLoader> {
    ModuleLoader::new(
        Rc::clone(engine) as Rc<dyn ScriptEngine>,
        Rc::new(FileSystem),
        Rc::new(resources),
        ModulePaths::new(app_root, install_dir),
    )
}

/// Write `text` to `root/rel`, creating directories.
pub fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, text).unwrap();
}

/// Shared invocation counter.
#[derive(Clone, Default)]
pub struct Counter(Rc<Cell<usize>>);

impl Counter {
    pub fn bump(&self) {
        self.0.set(self.0.get() + 1);
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }
}

/// Member of an exports object, cloned out.
pub fn member(exports: &Exports, key: &str) -> Option<Value> {
    exports.borrow().get(key).cloned()
}
