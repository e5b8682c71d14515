//! Script-facing host API.
//!
//! Registered under the type name `World`. A script receives it as the
//! first argument of `update` and `produce`:
//!
//! ```rhai
//! fn update(world, frame) {
//!     world.set("entities", "player", #{ x: frame, y: 0 });
//!     world.request("spawn", #{ kind: "orc" }, Fn("on_spawned").curry(world));
//! }
//!
//! fn on_spawned(world, result) {
//!     if result.status == "success" { world.set("entities", result.result_id, #{}); }
//! }
//! ```
//!
//! Writes go to back buffers; `get` reads the back buffer so a script sees
//! its own writes within a frame.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, Position, INT};
use serde_json::Value;
use twinframe_core::StateBuffer;
use twinframe_dispatch::{AgentId, CallbackHandle, Command, CommandQueue};

/// Buffer type shared with scripts: string keys, JSON values.
pub type ScriptBuffer = StateBuffer<String, Value>;

/// Message prefix marking host API misuse.
pub(crate) const HOST_API_MISUSE: &str = "host api misuse";

type HostResult<T> = Result<T, Box<EvalAltResult>>;

/// Callback function pointers waiting for their command result.
#[derive(Default)]
struct CallbackTable {
    next: u64,
    pending: HashMap<CallbackHandle, FnPtr>,
}

struct WorldInner {
    buffers: HashMap<String, Arc<ScriptBuffer>>,
    commands: Arc<CommandQueue>,
    agent: AgentId,
    callbacks: Mutex<CallbackTable>,
}

/// Handle scripts use to reach state buffers and the command queue.
#[derive(Clone)]
pub struct ScriptWorld {
    inner: Arc<WorldInner>,
}

impl ScriptWorld {
    /// Creates a world exposing `buffers` (by name) and submitting as `agent`.
    #[must_use]
    pub fn new(
        commands: Arc<CommandQueue>,
        agent: AgentId,
        buffers: impl IntoIterator<Item = Arc<ScriptBuffer>>,
    ) -> Self {
        let buffers = buffers
            .into_iter()
            .map(|buffer| (buffer.name().to_string(), buffer))
            .collect();
        Self {
            inner: Arc::new(WorldInner {
                buffers,
                commands,
                agent,
                callbacks: Mutex::new(CallbackTable::default()),
            }),
        }
    }

    /// Looks up a buffer by name.
    #[must_use]
    pub fn buffer(&self, name: &str) -> Option<&Arc<ScriptBuffer>> {
        self.inner.buffers.get(name)
    }

    /// Agent identity used for submitted commands.
    #[must_use]
    pub fn agent(&self) -> AgentId {
        self.inner.agent
    }

    /// Callbacks registered and not yet delivered.
    #[must_use]
    pub fn pending_callbacks(&self) -> usize {
        self.inner.callbacks.lock().pending.len()
    }

    /// Removes and returns the callback for `handle`.
    pub(crate) fn take_callback(&self, handle: CallbackHandle) -> Option<FnPtr> {
        self.inner.callbacks.lock().pending.remove(&handle)
    }

    fn script_buffer(&self, op: &str, name: &str) -> HostResult<&Arc<ScriptBuffer>> {
        self.buffer(name)
            .ok_or_else(|| misuse(format!("{op}: unknown buffer '{name}'")))
    }

    // =========================================================================
    // Script API
    // =========================================================================

    fn set(&mut self, buffer: &str, key: Dynamic, value: Dynamic) -> HostResult<()> {
        let value = to_json("set", &value)?;
        self.script_buffer("set", buffer)?
            .back()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, buffer: &str, key: Dynamic) -> HostResult<Dynamic> {
        let removed = self
            .script_buffer("remove", buffer)?
            .back()
            .remove(&key.to_string());
        removed.map_or(Ok(Dynamic::UNIT), |v| from_json("remove", &v))
    }

    fn get(&mut self, buffer: &str, key: Dynamic) -> HostResult<Dynamic> {
        self.script_buffer("get", buffer)?
            .back()
            .get(&key.to_string())
            .map_or(Ok(Dynamic::UNIT), |v| from_json("get", v))
    }

    fn submit(&mut self, name: &str, payload: Dynamic) -> HostResult<bool> {
        let payload = to_json("submit", &payload)?;
        Ok(self
            .inner
            .commands
            .submit(Command::new(name, payload, self.inner.agent)))
    }

    /// Returns the callback handle, or -1 if the queue rejected the command.
    fn request(&mut self, name: &str, payload: Dynamic, callback: FnPtr) -> HostResult<INT> {
        let payload = to_json("request", &payload)?;
        let handle = {
            let mut table = self.inner.callbacks.lock();
            table.next += 1;
            let handle = CallbackHandle(table.next);
            table.pending.insert(handle, callback);
            handle
        };

        let command = Command::new(name, payload, self.inner.agent).with_callback(handle);
        if self.inner.commands.submit(command) {
            Ok(INT::try_from(handle.0).unwrap_or(INT::MAX))
        } else {
            self.inner.callbacks.lock().pending.remove(&handle);
            Ok(-1)
        }
    }

    fn log(&mut self, message: &str) {
        tracing::info!(target: "twinframe::script", agent = self.inner.agent.0, "{message}");
    }
}

impl std::fmt::Debug for ScriptWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.inner.buffers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ScriptWorld")
            .field("agent", &self.inner.agent)
            .field("buffers", &names)
            .field("pending_callbacks", &self.pending_callbacks())
            .finish()
    }
}

/// Registers `World` and its methods.
pub(crate) fn register(engine: &mut Engine) {
    engine.register_type_with_name::<ScriptWorld>("World");
    engine.register_fn("set", ScriptWorld::set);
    engine.register_fn("remove", ScriptWorld::remove);
    engine.register_fn("get", ScriptWorld::get);
    engine.register_fn("submit", ScriptWorld::submit);
    engine.register_fn("request", ScriptWorld::request);
    engine.register_fn("log", ScriptWorld::log);
}

fn misuse(message: String) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(format!("{HOST_API_MISUSE}: {message}").into(), Position::NONE)
        .into()
}

fn to_json(op: &str, value: &Dynamic) -> HostResult<Value> {
    rhai::serde::from_dynamic(value)
        .map_err(|e| misuse(format!("{op}: value has no JSON form: {e}")))
}

fn from_json(op: &str, value: &Value) -> HostResult<Dynamic> {
    rhai::serde::to_dynamic(value)
        .map_err(|e| misuse(format!("{op}: stored value has no script form: {e}")))
}
