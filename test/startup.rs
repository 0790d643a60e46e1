//! Startup dispatch tests
//!
//! The runtime is bootstrapped in the test process working directory with a
//! scripted engine; optional modules (repl, build, configure) are provided
//! as embedded resources when a test needs them.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{write, Counter, ScriptedEngine, THROWS};
use ember::ffi::NoDynamicLoading;
use ember::{boot, Host, NativeFunction, Options, Runtime, RuntimeError, ScriptEngine, Value};

fn host(engine: &Rc<ScriptedEngine>) -> Host {
    Host::new()
        .with_engine(Rc::clone(engine) as Rc<dyn ScriptEngine>)
        .with_library_loader(NoDynamicLoading)
}

fn runtime(host: Host, argv: &[&str]) -> Runtime {
    Runtime::bootstrap(host, Options::parse(argv.iter().copied())).unwrap()
}

/// Calls to a native function, with their arguments.
type Calls = Rc<RefCell<Vec<Vec<Value>>>>;

fn recording(name: &str, calls: &Calls, result: Value) -> Value {
    let calls = Rc::clone(calls);
    Value::Function(NativeFunction::new(name, move |args| {
        calls.borrow_mut().push(args.to_vec());
        Ok(result.clone())
    }))
}

/// Engine body for an embedded module exporting the given functions.
fn exporting(engine: &ScriptedEngine, source: &str, functions: Vec<(&'static str, Value)>) {
    engine.on(source, move |exports, _, _| {
        let mut exports = exports.borrow_mut();
        for (name, func) in &functions {
            exports.set(*name, func.clone());
        }
        Ok(())
    });
}

#[test]
fn test_eval_runs_source_as_eval() {
    let engine = ScriptedEngine::new();
    runtime(host(&engine), &["ember", "eval", "1 + 1"]).run().unwrap();

    let runs = engine.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].name, "eval");
    assert_eq!(runs[0].source, "1 + 1");
    assert!(!runs[0].esm);
}

#[test]
fn test_script_error_propagates() {
    let engine = ScriptedEngine::new();
    let err = runtime(host(&engine), &["ember", "eval", THROWS]).run().unwrap_err();
    assert!(matches!(err, RuntimeError::Script { name, .. } if name == "eval"));
}

#[test]
fn test_file_mode_script_and_module() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app.js", "APP");
    let file = dir.path().join("app.js");
    let file_arg = file.to_str().unwrap();

    let engine = ScriptedEngine::new();
    runtime(host(&engine), &["ember", file_arg]).run().unwrap();
    runtime(host(&engine), &["ember", "--esm", file_arg]).run().unwrap();

    let runs = engine.runs();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].name, file.display().to_string());
    assert_eq!(runs[0].source, "APP");
    assert!(!runs[0].esm);
    assert!(runs[1].esm);
}

#[test]
fn test_missing_file_is_an_error() {
    let engine = ScriptedEngine::new();
    let err = runtime(host(&engine), &["ember", "/nonexistent/ember/app.js"])
        .run()
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Io(_)));
}

#[test]
fn test_repl_missing_is_config_error() {
    let engine = ScriptedEngine::new();
    let err = runtime(host(&engine), &["ember"]).run().unwrap_err();
    assert!(matches!(err, RuntimeError::Config(ref msg) if msg == "REPL not enabled"));
}

#[test]
fn test_repl_present() {
    let engine = ScriptedEngine::new();
    let calls: Calls = Rc::default();
    exporting(&engine, "REPL", vec![("repl", recording("repl", &calls, Value::Null))]);

    let host = host(&engine).with_resource("lib/repl.js", "REPL");
    runtime(host, &["ember"]).run().unwrap();
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn test_build_missing_is_config_error() {
    let engine = ScriptedEngine::new();
    for argv in [
        &["ember", "build"][..],
        &["ember", "init"][..],
        &["ember", "clean"][..],
    ] {
        let err = runtime(host(&engine), argv).run().unwrap_err();
        assert!(matches!(err, RuntimeError::Config(ref msg) if msg == "Build not available"));
    }
}

fn build_host(engine: &Rc<ScriptedEngine>, run: &Calls, init: &Calls, clean: &Calls) -> Host {
    let result = Value::from(serde_json::json!({ "target": "app" }));
    exporting(
        engine,
        "BUILD",
        vec![
            ("run", recording("run", run, result)),
            ("init", recording("init", init, Value::Null)),
            ("clean", recording("clean", clean, Value::Null)),
        ],
    );
    host(engine).with_resource("lib/build.js", "BUILD")
}

#[test]
fn test_build_defaults_to_empty_config() {
    let engine = ScriptedEngine::new();
    let (run, init, clean): (Calls, Calls, Calls) = Default::default();
    let host = build_host(&engine, &run, &init, &clean);

    runtime(host, &["ember", "build", "--dump"]).run().unwrap();

    let run = run.borrow();
    assert_eq!(run.len(), 1);
    assert_eq!(run[0][0], Value::object());
    assert_eq!(run[0][1].get("dump"), Some(&Value::Bool(true)));
}

#[test]
fn test_build_with_config_flag_requires_target() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "build.json", r#"{"name":"demo"}"#);
    let target = dir.path().join("build.json");

    let engine = ScriptedEngine::new();
    let (run, init, clean): (Calls, Calls, Calls) = Default::default();
    let host = build_host(&engine, &run, &init, &clean);

    runtime(host, &["ember", "build", target.to_str().unwrap(), "--config"])
        .run()
        .unwrap();

    let run = run.borrow();
    assert_eq!(run[0][0], Value::from(serde_json::json!({ "name": "demo" })));
}

#[test]
fn test_build_with_target_uses_configure() {
    let engine = ScriptedEngine::new();
    let (run, init, clean): (Calls, Calls, Calls) = Default::default();
    let configured: Calls = Rc::default();
    let config = Value::from(serde_json::json!({ "configured": true }));
    exporting(
        &engine,
        "CONFIGURE",
        vec![("run", recording("run", &configured, config.clone()))],
    );
    let host = build_host(&engine, &run, &init, &clean).with_resource("lib/configure.js", "CONFIGURE");

    runtime(host, &["ember", "build", "app"]).run().unwrap();

    assert_eq!(configured.borrow()[0][0], Value::from("app"));
    assert_eq!(run.borrow()[0][0], config);
}

#[test]
fn test_init_and_clean() {
    let engine = ScriptedEngine::new();
    let (run, init, clean): (Calls, Calls, Calls) = Default::default();

    let host = build_host(&engine, &run, &init, &clean);
    runtime(host, &["ember", "init"]).run().unwrap();
    let host = build_host(&engine, &run, &init, &clean);
    runtime(host, &["ember", "init", "demo"]).run().unwrap();
    let host = build_host(&engine, &run, &init, &clean);
    runtime(host, &["ember", "clean"]).run().unwrap();

    assert_eq!(init.borrow()[0], vec![Value::from("hello")]);
    assert_eq!(init.borrow()[1], vec![Value::from("demo")]);
    assert_eq!(clean.borrow().len(), 1);
    assert!(run.borrow().is_empty());
}

#[test]
fn test_worker_payload_runs_once() {
    let engine = ScriptedEngine::new();
    let host = host(&engine).with_worker_source("WORKER");
    let runtime = runtime(host, &["ember", "ignored.js"]);
    assert!(runtime.has_worker());

    runtime.run().unwrap();
    assert!(!runtime.has_worker());

    let runs = engine.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].source, "WORKER");
    assert_eq!(runs[0].name, runtime.app_root().join("ember").display().to_string());
}

#[test]
fn test_idle_with_empty_argv() {
    let engine = ScriptedEngine::new();
    boot(host(&engine), Vec::<String>::new()).unwrap();
    assert!(engine.runs().is_empty());
}

#[test]
fn test_bare_mode_only_needs_vm() {
    let engine = ScriptedEngine::new();
    let host = Host::new()
        .with_engine(Rc::clone(&engine) as Rc<dyn ScriptEngine>)
        .with_library_loader(NoDynamicLoading);
    boot(host, ["ember", "--bare", "print(1)"]).unwrap();

    let runs = engine.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].name, "eval");
    assert_eq!(runs[0].source, "print(1)");
}

#[test]
fn test_missing_vm_is_fatal() {
    let host = Host::new().with_library_loader(NoDynamicLoading);
    let err = boot(host, ["ember", "eval", "1"]).unwrap_err();
    assert!(matches!(err, RuntimeError::MissingCapability(ref name) if name == "vm"));
}

#[test]
fn test_inspector_not_enabled() {
    let engine = ScriptedEngine::new();
    let err = runtime(host(&engine), &["ember", "--inspector", "eval", "1"])
        .run()
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Config(ref msg) if msg == "inspector module is not enabled"));
    assert!(engine.runs().is_empty());
}

#[test]
fn test_loop_runs_after_startup() {
    let engine = ScriptedEngine::new();
    let runtime = runtime(host(&engine), &["ember", "eval", "0"]);
    let fired = Counter::default();
    let count = fired.clone();
    runtime
        .timers()
        .set_timeout(
            move || {
                count.bump();
                Ok(())
            },
            1,
        )
        .unwrap();

    runtime.run().unwrap();
    assert_eq!(fired.get(), 1);
    assert!(runtime.event_loop().is_empty());
}

#[test]
fn test_runtime_context() {
    std::env::set_var("EMBER_STARTUP_TEST", "on");
    let engine = ScriptedEngine::new();
    let runtime = runtime(
        host(&engine).with_resource("lib/path.js", "PATH"),
        &["ember", "--esm", "main.js"],
    );

    assert!(runtime.options().esm());
    assert_eq!(runtime.config().runtime.loop_capacity, 128);
    assert_eq!(runtime.app_root(), std::env::current_dir().unwrap());
    assert_eq!(
        runtime.env().get("EMBER_STARTUP_TEST").map(String::as_str),
        Some("on")
    );

    let path = runtime.require("path").unwrap().unwrap();
    let again = runtime.require_native("path").unwrap().unwrap();
    assert!(Rc::ptr_eq(&path, &again));
    assert_eq!(runtime.modules().len(), 1);
}
