//! Demo command handlers served by the host.
//!
//! These stand in for engine-side systems: they validate payloads and write
//! straight into back buffers from the main thread. Results flow back to the
//! requesting script through the callback queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use twinframe_dispatch::{
    CommandError, CommandExecutor, HandlerResult, Invocation, Outcome,
};
use twinframe_script::ScriptBuffer;

/// Buffers the demo handlers write into.
#[derive(Clone)]
pub struct HostBuffers {
    /// Spawned entities keyed by generated id.
    pub entities: Arc<ScriptBuffer>,
    /// Active sound clips.
    pub audio: Arc<ScriptBuffer>,
}

#[derive(Debug, Deserialize)]
struct Spawn {
    kind: String,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
}

#[derive(Debug, Deserialize)]
struct Despawn {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PlaySound {
    clip: String,
    #[serde(default = "full_volume")]
    volume: f64,
}

fn full_volume() -> f64 {
    1.0
}

/// Registers `spawn`, `despawn`, `play_sound` and `echo`.
pub fn register_all(executor: &mut CommandExecutor, buffers: &HostBuffers) {
    let next_id = Arc::new(AtomicU64::new(0));

    {
        let entities = Arc::clone(&buffers.entities);
        let next_id = Arc::clone(&next_id);
        executor.register_typed("spawn", move |p: Spawn, inv: &Invocation<'_>| {
            if p.kind.is_empty() {
                return Err(CommandError::invalid_param("spawn: kind must not be empty"));
            }
            let id = format!("{}-{}", p.kind, next_id.fetch_add(1, Ordering::Relaxed) + 1);
            entities.back().insert(
                id.clone(),
                json!({ "kind": p.kind, "x": p.x, "y": p.y, "owner": inv.agent.0 }),
            );
            tracing::debug!(entity = %id, agent = inv.agent.0, "spawned");
            Ok(Outcome::with_result_id(id))
        });
    }

    {
        let entities = Arc::clone(&buffers.entities);
        executor.register_typed("despawn", move |p: Despawn, _inv: &Invocation<'_>| {
            match entities.back().remove(&p.id) {
                Some(_) => Ok(Outcome::with_result_id(p.id)),
                None => Err(CommandError::not_found(format!("despawn: no entity '{}'", p.id))),
            }
        });
    }

    {
        let audio = Arc::clone(&buffers.audio);
        executor.register_typed("play_sound", move |p: PlaySound, _inv: &Invocation<'_>| {
            if !(0.0..=1.0).contains(&p.volume) {
                return Err(CommandError::invalid_param(format!(
                    "play_sound: volume {} outside 0..=1",
                    p.volume
                )));
            }
            audio
                .back()
                .insert(p.clip.clone(), json!({ "volume": p.volume }));
            Ok(Outcome::with_result_id(p.clip).field("volume", p.volume))
        });
    }

    executor.register_handler("echo", |inv: &Invocation<'_>| {
        let text = match inv.payload {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        HandlerResult::Success(Outcome::with_result_id(text))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinframe_dispatch::{AgentId, Command, ErrorKind};

    fn setup() -> (CommandExecutor, HostBuffers) {
        let buffers = HostBuffers {
            entities: Arc::new(ScriptBuffer::new("entities")),
            audio: Arc::new(ScriptBuffer::new("audio")),
        };
        let mut executor = CommandExecutor::new();
        register_all(&mut executor, &buffers);
        (executor, buffers)
    }

    fn run(executor: &mut CommandExecutor, name: &str, payload: serde_json::Value) -> HandlerResult {
        executor.execute_command(&Command::new(name, payload, AgentId(1)))
    }

    #[test]
    fn test_spawn_allocates_ids_into_back_buffer() {
        let (mut executor, buffers) = setup();
        let first = run(&mut executor, "spawn", json!({"kind": "orc", "x": 2.0}));
        let second = run(&mut executor, "spawn", json!({"kind": "orc"}));

        assert_eq!(first.result_id(), Some("orc-1"));
        assert_eq!(second.result_id(), Some("orc-2"));
        assert_eq!(buffers.entities.back().get("orc-1").map(|e| e["x"].clone()), Some(json!(2.0)));
        assert!(buffers.entities.front().is_empty());
    }

    #[test]
    fn test_despawn_missing_is_not_found() {
        let (mut executor, _) = setup();
        run(&mut executor, "spawn", json!({"kind": "bat"}));

        let ok = run(&mut executor, "despawn", json!({"id": "bat-1"}));
        assert!(ok.is_success());
        let missing = run(&mut executor, "despawn", json!({"id": "bat-1"}));
        assert_eq!(missing.error_kind(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_play_sound_validates_volume() {
        let (mut executor, buffers) = setup();
        let loud = run(&mut executor, "play_sound", json!({"clip": "boom", "volume": 3.0}));
        assert_eq!(loud.error_kind(), Some(ErrorKind::InvalidParam));

        let ok = run(&mut executor, "play_sound", json!({"clip": "boom"}));
        assert_eq!(ok.outcome().and_then(|o| o.get("volume")), Some(&json!(1.0)));
        assert!(buffers.audio.back().contains_key("boom"));

        let bad = run(&mut executor, "play_sound", json!({"volume": 0.5}));
        assert_eq!(bad.error_kind(), Some(ErrorKind::InvalidPayload));
    }

    #[test]
    fn test_echo() {
        let (mut executor, _) = setup();
        assert_eq!(run(&mut executor, "echo", json!("42")).result_id(), Some("42"));
        assert_eq!(run(&mut executor, "echo", json!(7)).result_id(), Some("7"));
    }
}
