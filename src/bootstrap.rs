//! Bootstrap
//!
//! Turns a [`Host`] (built-in capabilities, embedded resources, a library
//! loader) and an argument vector into a running [`Runtime`]:
//!
//! 1. parse the argument vector into [`Options`]
//! 2. load the foundational capabilities `vm`, `epoll`, `fs`, `net`, `sys`;
//!    any of them missing is fatal
//! 3. read `ember.toml` and derive the module search paths
//! 4. build the readiness loop, timers and module loader
//! 5. dispatch on the startup mode, then run the loop until it drains
//!
//! Everything that the process shares lives in the `Runtime` value; nothing
//! is global.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, info};

use crate::config::{EmberConfig, ModulePaths};
use crate::engine::{ScriptEngine, Vm};
use crate::error::{Result, RuntimeError};
use crate::ffi::{
    BuiltinTable, Capability, CapabilityObject, CapabilityRegistry, LibraryLoader, SystemLoader,
};
use crate::modules::{path, ModuleLoader, ResourceStore};
use crate::options::Options;
use crate::runtime::{Epoll, EventLoop, FileSystem, Net, Sys, Timers, STDIN_FILENO};
use crate::value::{Exports, Value};

/// Read size used when slurping standard input.
pub const STDIN_CHUNK: usize = 4096;

/// Script name used for a worker payload when the argument vector is empty.
const WORKER_NAME: &str = "thread";

/// Project name passed to `init` when none is given.
const DEFAULT_INIT_NAME: &str = "hello";

/// What the embedding process provides before bootstrap.
pub struct Host {
    builtins: BuiltinTable,
    resources: ResourceStore,
    library_loader: Box<dyn LibraryLoader>,
    worker_source: Option<String>,
}

impl Host {
    /// A host with the `epoll`, `fs`, `net` and `sys` capabilities built in.
    /// The `vm` capability comes from [`Host::with_engine`] or from a
    /// `vm` shared library.
    pub fn new() -> Self {
        let mut builtins = BuiltinTable::new();
        builtins.register("epoll", || Ok(Rc::new(Epoll) as CapabilityObject));
        builtins.register("fs", || Ok(Rc::new(FileSystem) as CapabilityObject));
        builtins.register("net", || Ok(Rc::new(Net) as CapabilityObject));
        builtins.register("sys", || Ok(Rc::new(Sys) as CapabilityObject));
        Self {
            builtins,
            resources: ResourceStore::new(),
            library_loader: Box::new(SystemLoader),
            worker_source: None,
        }
    }

    /// Provide the script engine as the built-in `vm` capability.
    pub fn with_engine(mut self, engine: Rc<dyn ScriptEngine>) -> Self {
        self.builtins.register("vm", move || {
            Ok(Rc::new(Vm::new(Rc::clone(&engine))) as CapabilityObject)
        });
        self
    }

    pub fn with_builtin(
        mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Result<CapabilityObject> + 'static,
    ) -> Self {
        self.builtins.register(name, factory);
        self
    }

    /// Embed a script payload under an application-relative name.
    pub fn with_resource(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.resources.insert(name, text.into());
        self
    }

    pub fn with_resources(mut self, resources: ResourceStore) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_library_loader(mut self, loader: impl LibraryLoader + 'static) -> Self {
        self.library_loader = Box::new(loader);
        self
    }

    /// Source handed to a worker thread; run instead of any other mode.
    pub fn with_worker_source(mut self, source: impl Into<String>) -> Self {
        self.worker_source = Some(source.into());
        self
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

/// Startup mode selected from the positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupMode {
    /// Empty argument vector: nothing runs, the loop is not entered
    Idle,
    /// Pending worker payload
    Worker,
    /// Program name only
    Repl,
    /// `--`: script on standard input
    Stdin,
    /// `eval <source>`
    Eval(String),
    /// `build [target]`
    Build(Option<String>),
    /// `init [name]`
    Init(String),
    /// `clean`
    Clean,
    /// `<file>`
    File(String),
}

impl StartupMode {
    pub fn select(options: &Options, has_worker: bool) -> Result<Self> {
        let args = options.args();
        if args.is_empty() {
            return Ok(StartupMode::Idle);
        }
        if has_worker {
            return Ok(StartupMode::Worker);
        }
        let Some(command) = options.arg(1) else {
            return Ok(StartupMode::Repl);
        };
        let operand = options.arg(2).map(str::to_string);
        let mode = match command {
            "--" => StartupMode::Stdin,
            "eval" => StartupMode::Eval(
                operand.ok_or_else(|| RuntimeError::Config("eval requires a script".into()))?,
            ),
            "build" => StartupMode::Build(operand),
            "init" => StartupMode::Init(operand.unwrap_or_else(|| DEFAULT_INIT_NAME.to_string())),
            "clean" => StartupMode::Clean,
            file => StartupMode::File(file.to_string()),
        };
        Ok(mode)
    }
}

/// Process-wide runtime context.
pub struct Runtime {
    options: Options,
    config: EmberConfig,
    capabilities: Rc<CapabilityRegistry>,
    engine: Rc<dyn ScriptEngine>,
    fs: Rc<FileSystem>,
    net: Rc<Net>,
    sys: Rc<Sys>,
    env: HashMap<String, String>,
    event_loop: Rc<EventLoop>,
    timers: Timers,
    modules: Rc<ModuleLoader>,
    worker_source: RefCell<Option<String>>,
}

impl Runtime {
    /// Load the foundational capabilities and wire the subsystems.
    pub fn bootstrap(host: Host, options: Options) -> Result<Self> {
        let capabilities = Rc::new(CapabilityRegistry::new(host.builtins, host.library_loader));

        let vm = capabilities.require::<Vm>("vm")?;
        let epoll = capabilities.require::<Epoll>("epoll")?;
        let fs = capabilities.require::<FileSystem>("fs")?;
        let net = capabilities.require::<Net>("net")?;
        let sys = capabilities.require::<Sys>("sys")?;

        let env = sys.env();
        let app_root = sys.cwd()?;
        let config = EmberConfig::find_and_load(&app_root)?;
        let paths = ModulePaths::resolve(app_root, &env, &config);
        debug!(app_root = %paths.app_root.display(), install_dir = %paths.install_dir.display(), "module paths");

        let event_loop = epoll.create_loop(config.runtime.loop_capacity)?;
        let timers = Timers::new(Rc::clone(&event_loop));
        let engine = vm.engine();
        let modules = ModuleLoader::new(
            Rc::clone(&engine),
            Rc::clone(&fs),
            Rc::new(host.resources),
            paths,
        );

        Ok(Self {
            options,
            config,
            capabilities,
            engine,
            fs,
            net,
            sys,
            env,
            event_loop,
            timers,
            modules,
            worker_source: RefCell::new(host.worker_source),
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn config(&self) -> &EmberConfig {
        &self.config
    }

    pub fn app_root(&self) -> &Path {
        &self.modules.paths().app_root
    }

    /// Environment captured at bootstrap.
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn engine(&self) -> &Rc<dyn ScriptEngine> {
        &self.engine
    }

    pub fn fs(&self) -> &Rc<FileSystem> {
        &self.fs
    }

    pub fn net(&self) -> &Rc<Net> {
        &self.net
    }

    pub fn sys(&self) -> &Rc<Sys> {
        &self.sys
    }

    pub fn capabilities(&self) -> &Rc<CapabilityRegistry> {
        &self.capabilities
    }

    /// Load a capability, see [`CapabilityRegistry::load`].
    pub fn library(&self, name: &str, path: Option<&Path>) -> Option<Rc<Capability>> {
        self.capabilities.load(name, path)
    }

    /// Top-level `require`, resolved against the application root.
    pub fn require(&self, specifier: &str) -> Result<Option<Exports>> {
        self.modules.require(specifier, None)
    }

    pub fn require_native(&self, name: &str) -> Result<Option<Exports>> {
        self.modules.require_native(name)
    }

    pub fn modules(&self) -> &Rc<ModuleLoader> {
        &self.modules
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn event_loop(&self) -> &Rc<EventLoop> {
        &self.event_loop
    }

    pub fn has_worker(&self) -> bool {
        self.worker_source.borrow().is_some()
    }

    pub fn startup_mode(&self) -> Result<StartupMode> {
        StartupMode::select(&self.options, self.has_worker())
    }

    /// Run the selected startup mode, then the readiness loop until no
    /// descriptors remain.
    pub fn run(&self) -> Result<()> {
        if self.options.flag("inspector") {
            return Err(self.inspector_unavailable());
        }

        let mode = self.startup_mode()?;
        info!(?mode, "starting");
        if mode == StartupMode::Idle {
            return Ok(());
        }
        self.dispatch(mode)?;
        self.event_loop.run()
    }

    fn dispatch(&self, mode: StartupMode) -> Result<()> {
        match mode {
            StartupMode::Idle => Ok(()),
            StartupMode::Worker => self.run_worker(),
            StartupMode::Repl => {
                let repl = self.optional_module("repl", "REPL not enabled")?;
                repl.call_method("repl", &[])?;
                Ok(())
            }
            StartupMode::Stdin => self.run_stdin(),
            StartupMode::Eval(source) => {
                self.engine.run_script(&source, "eval")?;
                Ok(())
            }
            StartupMode::Build(target) => self.run_build(target.as_deref()),
            StartupMode::Init(name) => {
                let build = self.optional_module("build", "Build not available")?;
                build.call_method("init", &[Value::from(name)])?;
                Ok(())
            }
            StartupMode::Clean => {
                let build = self.optional_module("build", "Build not available")?;
                build.call_method("clean", &[])?;
                Ok(())
            }
            StartupMode::File(file) => self.run_file(&file),
        }
    }

    fn run_worker(&self) -> Result<()> {
        let Some(source) = self.worker_source.borrow_mut().take() else {
            return Ok(());
        };
        let name = self
            .app_root()
            .join(self.options.arg(0).unwrap_or(WORKER_NAME));
        self.engine
            .run_script(&source, &name.display().to_string())?;
        Ok(())
    }

    fn run_stdin(&self) -> Result<()> {
        let bytes = self.net.read_to_end(STDIN_FILENO, STDIN_CHUNK)?;
        let source = String::from_utf8_lossy(&bytes);
        self.engine.run_script(&source, "stdin")?;
        Ok(())
    }

    fn run_file(&self, file: &str) -> Result<()> {
        let script: PathBuf = path::join(self.app_root(), file);
        let source = self.fs.read_file(&script)?;
        let name = script.display().to_string();
        if self.options.esm() {
            self.engine.run_module(&source, &name)?;
        } else {
            self.engine.run_script(&source, &name)?;
        }
        Ok(())
    }

    fn run_build(&self, target: Option<&str>) -> Result<()> {
        let build = self.optional_module("build", "Build not available")?;
        let opts = self.options.to_value();

        let config = if self.options.flag("config") {
            match target {
                Some(target) => self.require_value(target)?,
                None => None,
            }
            .unwrap_or_else(Value::object)
        } else if let Some(target) = target {
            let configure = self.optional_module("configure", "configure module not available")?;
            configure.call_method("run", &[Value::from(target), opts.clone()])?
        } else {
            match self.require_value("config.json")? {
                Some(config) => config,
                None => self.require_value("config.js")?.unwrap_or_else(Value::object),
            }
        };

        let result = build.call_method("run", &[config, opts])?;
        if self.options.flag("dump") {
            let text = serde_json::to_string_pretty(&result.to_json()).map_err(|source| {
                RuntimeError::Json {
                    path: "build result".to_string(),
                    source,
                }
            })?;
            println!("{}", text);
        }
        Ok(())
    }

    /// Snapshot of a module's exports. The borrow is released before any
    /// function inside is called.
    fn require_value(&self, specifier: &str) -> Result<Option<Value>> {
        Ok(self
            .require(specifier)?
            .map(|exports| exports.borrow().clone()))
    }

    fn optional_module(&self, name: &str, missing: &str) -> Result<Value> {
        self.require_value(name)?
            .ok_or_else(|| RuntimeError::Config(missing.to_string()))
    }

    fn inspector_unavailable(&self) -> RuntimeError {
        match self.library("inspector", None) {
            None => RuntimeError::Config("inspector module is not enabled".into()),
            Some(_) => RuntimeError::Config("inspector integration is not supported".into()),
        }
    }
}

/// `--bare`: only the `vm` capability, positional argument 1 run as `eval`.
pub fn run_bare(host: Host, options: &Options) -> Result<()> {
    let capabilities = CapabilityRegistry::new(host.builtins, host.library_loader);
    let vm = capabilities.require::<Vm>("vm")?;
    let source = options
        .arg(1)
        .ok_or_else(|| RuntimeError::Config("bare mode requires a script".into()))?;
    vm.engine().run_script(source, "eval")?;
    Ok(())
}

/// Process entry point.
pub fn boot<I, S>(host: Host, argv: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let options = Options::parse(argv);
    if options.bare() {
        return run_bare(host, &options);
    }
    Runtime::bootstrap(host, options)?.run()
}
