//! # Rhai Runtime
//!
//! Reference [`ScriptRuntime`] backed by the Rhai engine.
//!
//! A script defines:
//! - `fn update(world, frame)` - required, called once per frame
//! - `fn produce(world, frame)` - optional, called after `update`
//!
//! Top-level statements run once at load. Callbacks passed to
//! `world.request` are invoked with the command result as a map:
//! `#{ status: "success", result_id: "..." }` or
//! `#{ status: "error", kind: "not_found", message: "..." }`.

mod diagnostics;
mod world;

use std::path::Path;

use rhai::{CallFnOptions, Dynamic, Engine, FuncArgs, Scope, AST, INT};
use twinframe_core::{RuntimeConfig, TwinframeError, TwinframeResult};
use twinframe_dispatch::PendingCallback;

pub use world::{ScriptBuffer, ScriptWorld};

use crate::fault::{FaultKind, FaultPhase, ScriptFault};
use crate::runtime::{FrameContext, ScriptRuntime};
use diagnostics::fault_from_eval;

/// Rhai-backed scripting runtime.
pub struct RhaiRuntime {
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    world: ScriptWorld,
    source_name: Option<String>,
    has_produce: bool,
}

impl RhaiRuntime {
    /// Compiles `source` and runs its top-level statements.
    ///
    /// # Errors
    ///
    /// Returns [`TwinframeError::ScriptLoad`] if the script does not parse,
    /// lacks `update(world, frame)`, or fails while running top-level code.
    pub fn compile(source: &str, world: ScriptWorld, config: &RuntimeConfig) -> TwinframeResult<Self> {
        Self::compile_named(source, None, world, config)
    }

    /// Reads and compiles a script file.
    ///
    /// # Errors
    ///
    /// Returns [`TwinframeError::ScriptLoad`] if the file cannot be read or
    /// compiled.
    pub fn from_file(
        path: impl AsRef<Path>,
        world: ScriptWorld,
        config: &RuntimeConfig,
    ) -> TwinframeResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            TwinframeError::ScriptLoad(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::compile_named(&source, Some(path.display().to_string()), world, config)
    }

    fn compile_named(
        source: &str,
        name: Option<String>,
        world: ScriptWorld,
        config: &RuntimeConfig,
    ) -> TwinframeResult<Self> {
        let label = name.as_deref().unwrap_or("<script>");
        let engine = build_engine(config.max_script_operations);

        let ast = engine.compile(source).map_err(|e| {
            let pos = e.position();
            TwinframeError::ScriptLoad(format!(
                "{label}:{}:{}: {e}",
                pos.line().unwrap_or(0),
                pos.position().unwrap_or(0)
            ))
        })?;

        let has_fn = |fn_name: &str| {
            ast.iter_functions()
                .any(|f| f.name == fn_name && f.params.len() == 2)
        };
        if !has_fn("update") {
            return Err(TwinframeError::ScriptLoad(format!(
                "{label}: missing fn update(world, frame)"
            )));
        }
        let has_produce = has_fn("produce");

        let mut scope = Scope::new();
        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| TwinframeError::ScriptLoad(format!("{label}: {e}")))?;

        tracing::debug!(script = label, has_produce, "script loaded");
        Ok(Self {
            engine,
            ast,
            scope,
            world,
            source_name: name,
            has_produce,
        })
    }

    /// The host API handle shared with the script.
    #[must_use]
    pub fn world(&self) -> &ScriptWorld {
        &self.world
    }

    fn call(&mut self, phase: FaultPhase, name: &str, args: impl FuncArgs) -> Result<(), ScriptFault> {
        let options = CallFnOptions::new().eval_ast(false);
        self.engine
            .call_fn_with_options::<Dynamic>(options, &mut self.scope, &self.ast, name, args)
            .map(drop)
            .map_err(|err| fault_from_eval(phase, &err, self.source_name.as_deref()))
    }
}

impl ScriptRuntime for RhaiRuntime {
    fn update(&mut self, frame: &FrameContext) -> Result<(), ScriptFault> {
        let args = (self.world.clone(), frame_number(frame));
        self.call(FaultPhase::Update, "update", args)
    }

    fn produce_commands(&mut self, frame: &FrameContext) -> Result<(), ScriptFault> {
        if !self.has_produce {
            return Ok(());
        }
        let args = (self.world.clone(), frame_number(frame));
        self.call(FaultPhase::Produce, "produce", args)
    }

    fn invoke_callback(&mut self, callback: &PendingCallback) -> Result<(), ScriptFault> {
        let Some(fn_ptr) = self.world.take_callback(callback.handle) else {
            return Err(ScriptFault::new(
                FaultPhase::Callback,
                FaultKind::HostApiMisuse,
                format!("no script callback waiting on handle {}", callback.handle.0),
            ));
        };
        let Some(result) = &callback.result else {
            return Err(ScriptFault::runtime(
                FaultPhase::Callback,
                format!("callback {} delivered before its result", callback.handle.0),
            ));
        };

        let source = self.source_name.as_deref();
        let arg = rhai::serde::to_dynamic(result)
            .map_err(|e| fault_from_eval(FaultPhase::Callback, &e, source))?;
        fn_ptr
            .call::<Dynamic>(&self.engine, &self.ast, (arg,))
            .map(drop)
            .map_err(|e| fault_from_eval(FaultPhase::Callback, &e, source))
    }
}

impl std::fmt::Debug for RhaiRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiRuntime")
            .field("source", &self.source_name)
            .field("has_produce", &self.has_produce)
            .field("world", &self.world)
            .finish_non_exhaustive()
    }
}

fn build_engine(max_operations: u64) -> Engine {
    let mut engine = Engine::new();

    // Sandbox limits
    engine.set_max_operations(max_operations);
    engine.set_max_call_levels(64);
    engine.set_max_expr_depths(64, 64);

    engine.on_print(|text| tracing::info!(target: "twinframe::script", "{text}"));
    engine.on_debug(|text, source, pos| {
        tracing::debug!(target: "twinframe::script", source, position = %pos, "{text}");
    });

    world::register(&mut engine);
    engine
}

fn frame_number(frame: &FrameContext) -> INT {
    INT::try_from(frame.frame).unwrap_or(INT::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use twinframe_dispatch::{
        AgentId, CallbackHandle, CommandQueue, ErrorKind, HandlerResult, Outcome,
    };

    struct Fixture {
        entities: Arc<ScriptBuffer>,
        commands: Arc<CommandQueue>,
        world: ScriptWorld,
    }

    fn fixture() -> Fixture {
        let entities = Arc::new(ScriptBuffer::new("entities"));
        let commands = Arc::new(CommandQueue::new(8));
        let world = ScriptWorld::new(Arc::clone(&commands), AgentId(1), [Arc::clone(&entities)]);
        Fixture {
            entities,
            commands,
            world,
        }
    }

    fn ctx(frame: u64) -> FrameContext {
        FrameContext {
            frame,
            delta: Duration::ZERO,
        }
    }

    fn load(source: &str, fx: &Fixture) -> RhaiRuntime {
        RhaiRuntime::compile(source, fx.world.clone(), &RuntimeConfig::default()).unwrap()
    }

    #[test]
    fn test_update_writes_back_buffer() {
        let fx = fixture();
        let mut rt = load(
            r#"
            fn update(world, frame) {
                world.set("entities", "player", #{ x: frame * 2 });
            }
            "#,
            &fx,
        );
        rt.update(&ctx(3)).unwrap();
        assert_eq!(fx.entities.back().get("player"), Some(&json!({"x": 6})));
        assert!(fx.entities.front().is_empty());
        // No produce fn: nothing to do.
        rt.produce_commands(&ctx(3)).unwrap();
    }

    #[test]
    fn test_produce_submits_commands() {
        let fx = fixture();
        let mut rt = load(
            r#"
            fn update(world, frame) {}
            fn produce(world, frame) {
                world.submit("tick", #{ frame: frame });
            }
            "#,
            &fx,
        );
        rt.produce_commands(&ctx(5)).unwrap();
        let mut seen = Vec::new();
        fx.commands.consume_all(|cmd| seen.push((cmd.name, cmd.payload)));
        assert_eq!(seen, vec![("tick".to_string(), json!({"frame": 5}))]);
    }

    #[test]
    fn test_load_errors() {
        let fx = fixture();
        let config = RuntimeConfig::default();

        let parse = RhaiRuntime::compile("fn update(world, frame) { let x = ; }", fx.world.clone(), &config)
            .unwrap_err();
        assert!(matches!(parse, TwinframeError::ScriptLoad(msg) if msg.starts_with("<script>:1:")));

        let missing = RhaiRuntime::compile("fn tick(world) {}", fx.world.clone(), &config).unwrap_err();
        assert!(matches!(missing, TwinframeError::ScriptLoad(msg) if msg.contains("update")));

        let top_level = RhaiRuntime::compile(
            "fn update(world, frame) {} throw \"bad init\";",
            fx.world.clone(),
            &config,
        )
        .unwrap_err();
        assert!(matches!(top_level, TwinframeError::ScriptLoad(_)));
    }

    #[test]
    fn test_runtime_fault_has_location_and_stack() {
        let fx = fixture();
        let mut rt = load(
            "fn helper(n) {\n    throw \"bad \" + n;\n}\nfn update(world, frame) {\n    helper(frame);\n}\n",
            &fx,
        );
        let fault = rt.update(&ctx(1)).unwrap_err();
        assert_eq!(fault.phase, FaultPhase::Update);
        assert_eq!(fault.kind, FaultKind::Runtime);
        assert_eq!(fault.message, "bad 1");
        assert!(fault.stack.iter().any(|f| f.starts_with("helper")));
        assert_eq!(fault.location.map(|l| l.line), Some(2));
    }

    #[test]
    fn test_host_api_misuse() {
        let fx = fixture();
        let mut rt = load(
            r#"fn update(world, frame) { world.set("missing", 1, 2); }"#,
            &fx,
        );
        let fault = rt.update(&ctx(1)).unwrap_err();
        assert_eq!(fault.kind, FaultKind::HostApiMisuse);
        assert!(fault.message.contains("unknown buffer 'missing'"));
    }

    #[test]
    fn test_operation_budget() {
        let fx = fixture();
        let config = RuntimeConfig {
            max_script_operations: 1_000,
            ..RuntimeConfig::default()
        };
        let mut rt = RhaiRuntime::compile(
            "fn update(world, frame) { loop { } }",
            fx.world.clone(),
            &config,
        )
        .unwrap();
        let fault = rt.update(&ctx(1)).unwrap_err();
        assert_eq!(fault.kind, FaultKind::Timeout);
    }

    #[test]
    fn test_callback_invoked_once_with_result() {
        let fx = fixture();
        let mut rt = load(
            r#"
            fn update(world, frame) {
                world.request("spawn", #{ kind: "orc" }, Fn("on_spawned").curry(world));
            }
            fn on_spawned(world, result) {
                if result.status == "success" {
                    world.set("entities", result.result_id, #{ kind: "orc" });
                } else {
                    world.set("entities", "error", result.kind);
                }
            }
            "#,
            &fx,
        );
        rt.update(&ctx(1)).unwrap();
        rt.update(&ctx(2)).unwrap();
        assert_eq!(fx.world.pending_callbacks(), 2);

        let ok = PendingCallback::ready(
            CallbackHandle(1),
            HandlerResult::Success(Outcome::with_result_id("e-17")),
        );
        rt.invoke_callback(&ok).unwrap();
        assert_eq!(fx.entities.back().get("e-17"), Some(&json!({"kind": "orc"})));

        let err = PendingCallback::ready(
            CallbackHandle(2),
            HandlerResult::error(ErrorKind::NotFound, "no spawner"),
        );
        rt.invoke_callback(&err).unwrap();
        assert_eq!(fx.entities.back().get("error"), Some(&json!("not_found")));

        // Same handle again: already consumed.
        let again = rt.invoke_callback(&ok).unwrap_err();
        assert_eq!(again.kind, FaultKind::HostApiMisuse);
        assert_eq!(fx.world.pending_callbacks(), 0);
    }
}
