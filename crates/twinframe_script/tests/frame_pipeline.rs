//! End-to-end: Rhai script on the worker, orchestrator on the test thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use twinframe_core::{BufferSet, RuntimeConfig, SwapPolicy};
use twinframe_dispatch::{
    AgentId, AuditOutcome, CallbackQueue, CommandExecutor, CommandQueue, ErrorKind,
    HandlerResult, Invocation, Outcome,
};
use twinframe_script::{
    FaultKind, FaultPhase, FrameOrchestrator, RhaiRuntime, ScriptBuffer, ScriptWorld,
    WorkerFrameJob,
};

const WAIT: Duration = Duration::from_secs(10);

const GAME: &str = r#"
fn update(world, frame) {
    world.set("entities", "player", #{ x: frame, y: 0 });
    world.set("camera", "fov", 60 + frame);
}

fn produce(world, frame) {
    if frame == 1 {
        world.request("spawn", #{ kind: "orc", hp: 10 }, Fn("on_spawned").curry(world));
    }
    world.submit("heartbeat", frame);
}

fn on_spawned(world, result) {
    world.set("entities", result.result_id, #{ kind: "orc" });
}
"#;

struct Pipeline {
    entities: Arc<ScriptBuffer>,
    camera: Arc<ScriptBuffer>,
    orchestrator: FrameOrchestrator,
}

fn pipeline(source: &str, config: &RuntimeConfig, executor: CommandExecutor) -> Pipeline {
    let entities = Arc::new(ScriptBuffer::with_policy("entities", SwapPolicy::DirtyTracked));
    let camera = Arc::new(ScriptBuffer::new("camera"));
    let commands = Arc::new(CommandQueue::new(config.queue_capacity));
    let callbacks = Arc::new(CallbackQueue::new());

    let world = ScriptWorld::new(
        Arc::clone(&commands),
        AgentId(1),
        [Arc::clone(&entities), Arc::clone(&camera)],
    );
    let runtime = RhaiRuntime::compile(source, world, config).unwrap();
    let worker = WorkerFrameJob::spawn(
        Arc::new(Mutex::new(runtime)),
        Arc::clone(&callbacks),
        config.shutdown_timeout(),
    )
    .unwrap();
    let buffers = BufferSet::new()
        .with(entities.clone())
        .with(camera.clone());

    Pipeline {
        entities,
        camera,
        orchestrator: FrameOrchestrator::new(commands, executor, callbacks, buffers, worker),
    }
}

/// Ticks until `done` holds or the deadline passes.
fn tick_until(orchestrator: &mut FrameOrchestrator, mut done: impl FnMut(&mut FrameOrchestrator) -> bool) {
    let deadline = Instant::now() + WAIT;
    while !done(orchestrator) {
        assert!(Instant::now() < deadline, "pipeline did not converge");
        orchestrator.tick();
        thread::sleep(Duration::from_millis(1));
    }
}

#[derive(Deserialize)]
struct Spawn {
    kind: String,
    hp: u32,
}

#[test]
fn test_script_state_commands_and_callbacks() {
    let heartbeats = Arc::new(AtomicU64::new(0));
    let mut executor = CommandExecutor::new();
    executor.register_typed("spawn", |p: Spawn, _inv: &Invocation<'_>| {
        assert_eq!(p.hp, 10);
        Ok(Outcome::with_result_id(format!("{}-1", p.kind)))
    });
    {
        let heartbeats = Arc::clone(&heartbeats);
        executor.register_handler("heartbeat", move |_: &Invocation<'_>| {
            heartbeats.fetch_add(1, Ordering::Relaxed);
            HandlerResult::Success(Outcome::empty())
        });
    }

    let config = RuntimeConfig::default();
    let Pipeline {
        entities,
        camera,
        mut orchestrator,
    } = pipeline(GAME, &config, executor);

    tick_until(&mut orchestrator, |_| entities.front().contains_key("orc-1"));

    assert_eq!(entities.front().get("orc-1"), Some(&json!({"kind": "orc"})));
    let x = entities.front().get("player").and_then(|p| p["x"].as_u64()).unwrap();
    let fov = camera.front().get("fov").and_then(serde_json::Value::as_u64).unwrap();
    assert_eq!(fov, 60 + x);

    orchestrator.shutdown(WAIT).unwrap();
    assert!(heartbeats.load(Ordering::Relaxed) >= 2);
    assert!(orchestrator.worker().stats().faults == 0);
    assert_eq!(orchestrator.executor().stats().failed, 0);
}

#[test]
fn test_faulting_frame_does_not_stall_pipeline() {
    let source = r#"
        fn update(world, frame) {
            if frame == 2 { throw "frame two is cursed"; }
            world.set("entities", "last", frame);
        }
    "#;
    let Pipeline {
        entities,
        mut orchestrator,
        ..
    } = pipeline(source, &RuntimeConfig::default(), CommandExecutor::new());

    tick_until(&mut orchestrator, |o| o.worker().stats().frames_completed >= 4);
    orchestrator.tick();

    let stats = orchestrator.worker().stats();
    assert_eq!(stats.faults, 1);
    assert!(entities.front().get("last").and_then(serde_json::Value::as_u64) >= Some(3));
    orchestrator.shutdown(WAIT).unwrap();
}

#[test]
fn test_script_callback_fault_is_reported() {
    let source = r#"
        fn update(world, frame) {
            if frame == 1 { world.request("ping", (), |r| { throw "callback failed"; }); }
        }
    "#;
    let mut executor = CommandExecutor::new();
    executor.register_handler("ping", |_: &Invocation<'_>| {
        HandlerResult::Success(Outcome::empty())
    });
    let Pipeline {
        mut orchestrator, ..
    } = pipeline(source, &RuntimeConfig::default(), executor);

    let mut callback_fault = None;
    tick_until(&mut orchestrator, |o| {
        if let Some(report) = o.worker().last_report() {
            if let Some(fault) = report.faults.iter().find(|f| f.phase == FaultPhase::Callback) {
                callback_fault = Some(fault.clone());
            }
        }
        callback_fault.is_some()
    });
    let fault = callback_fault.unwrap();
    assert_eq!(fault.kind, FaultKind::Runtime);
    assert_eq!(fault.message, "callback failed");
    orchestrator.shutdown(WAIT).unwrap();
}

#[test]
fn test_rate_limit_and_audit_through_pipeline() {
    let source = r#"
        fn update(world, frame) {}
        fn produce(world, frame) {
            if frame == 1 {
                for i in 0..5 { world.submit("noop", i); }
            }
        }
    "#;
    let config = RuntimeConfig {
        rate_limit_per_agent: 2,
        audit_logging: true,
        ..RuntimeConfig::default()
    };
    let mut executor = CommandExecutor::from_config(&config);
    executor.register_handler("noop", |_: &Invocation<'_>| {
        HandlerResult::Success(Outcome::empty())
    });
    let Pipeline {
        mut orchestrator, ..
    } = pipeline(source, &config, executor);

    tick_until(&mut orchestrator, |o| o.executor().stats().executed >= 5);

    let stats = orchestrator.executor().stats();
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.rate_limited, 3);

    let audit = orchestrator.executor_mut().drain_audit_log();
    assert_eq!(audit.len(), 5);
    assert!(audit.iter().all(|r| r.agent == AgentId(1) && r.name == "noop"));
    assert_eq!(
        audit
            .iter()
            .filter(|r| r.outcome == AuditOutcome::Error(ErrorKind::RateLimited))
            .count(),
        3
    );
    orchestrator.shutdown(WAIT).unwrap();
}
