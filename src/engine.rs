//! Script engine seam
//!
//! Compiling and executing script text is the job of an external engine
//! (the `vm` capability). The runtime only needs the handful of entry points
//! below.

use std::rc::Rc;

use crate::error::Result;
use crate::modules::{Module, Require};
use crate::value::{Exports, Value};

/// Parameter list every module body is compiled with, in calling order.
pub const MODULE_PARAMS: [&str; 3] = ["exports", "require", "module"];

/// A compiled module body.
pub trait CompiledModule {
    /// Run the body once. The return value of the body is ignored; exports
    /// travel through `exports` or `module.set_exports`.
    fn call(&self, exports: &Exports, require: &Require, module: &Rc<Module>) -> Result<()>;
}

/// Compiler/executor provided by the host.
pub trait ScriptEngine {
    /// Compile `source` as a function taking `params`.
    fn compile(&self, source: &str, name: &str, params: &[&str]) -> Result<Rc<dyn CompiledModule>>;

    /// Run `source` as a classic script.
    fn run_script(&self, source: &str, name: &str) -> Result<Value>;

    /// Run `source` as an ES module.
    fn run_module(&self, source: &str, name: &str) -> Result<Value>;
}

impl<E: ScriptEngine + ?Sized> ScriptEngine for Rc<E> {
    fn compile(&self, source: &str, name: &str, params: &[&str]) -> Result<Rc<dyn CompiledModule>> {
        (**self).compile(source, name, params)
    }

    fn run_script(&self, source: &str, name: &str) -> Result<Value> {
        (**self).run_script(source, name)
    }

    fn run_module(&self, source: &str, name: &str) -> Result<Value> {
        (**self).run_module(source, name)
    }
}

/// The object carried by the `vm` capability.
pub struct Vm {
    engine: Rc<dyn ScriptEngine>,
}

impl Vm {
    pub fn new(engine: Rc<dyn ScriptEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> Rc<dyn ScriptEngine> {
        Rc::clone(&self.engine)
    }
}
