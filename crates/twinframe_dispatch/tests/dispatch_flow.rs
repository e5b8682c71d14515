//! Queue → executor → callback flow across a real producer thread.

use std::sync::Arc;
use std::thread;

use serde::Deserialize;
use serde_json::json;
use twinframe_dispatch::{
    AgentId, CallbackHandle, CallbackQueue, Command, CommandError, CommandExecutor, CommandQueue,
    ErrorKind, HandlerResult, Invocation, Outcome,
};

#[derive(Deserialize)]
struct Damage {
    target: u32,
    amount: i32,
}

fn executor() -> CommandExecutor {
    let mut executor = CommandExecutor::new();
    executor.register_handler("echo", |inv: &Invocation<'_>| match inv.payload.as_str() {
        Some(s) => HandlerResult::Success(Outcome::with_result_id(s)),
        None => CommandError::invalid_payload("expected string").into(),
    });
    executor.register_typed("damage", |d: Damage, _inv: &Invocation<'_>| {
        if d.target == 0 {
            return Err(CommandError::not_found("entity 0"));
        }
        Ok(Outcome::empty().field("remaining", 100 - d.amount))
    });
    executor
}

#[test]
fn test_commands_from_worker_reach_callbacks_in_order() {
    let queue = Arc::new(CommandQueue::new(64));
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for i in 0..10u64 {
                let cmd = Command::new("echo", json!(i.to_string()), AgentId(1))
                    .with_callback(CallbackHandle(i));
                assert!(queue.submit(cmd));
            }
            assert!(queue.submit(Command::new(
                "damage",
                json!({"target": 0, "amount": 5}),
                AgentId(1)
            )
            .with_callback(CallbackHandle(99))));
        })
    };
    producer.join().unwrap();

    let mut executor = executor();
    let callbacks = CallbackQueue::new();
    let consumed = queue.consume_all(|cmd| {
        executor.execute_command(&cmd);
    });
    assert_eq!(consumed, 11);
    assert!(queue.is_empty());
    assert_eq!(executor.execute_pending_callbacks(&callbacks), 11);

    let mut delivered = Vec::new();
    let report = callbacks.drain(|cb| {
        delivered.push((cb.handle.0, cb.result_id().map(str::to_string)));
        Ok::<(), String>(())
    });
    assert_eq!(report.delivered, 11);

    let expected: Vec<_> = (0..10u64)
        .map(|i| (i, Some(i.to_string())))
        .chain(std::iter::once((99, None)))
        .collect();
    assert_eq!(delivered, expected);
    assert_eq!(executor.stats().failed, 1);
}

#[test]
fn test_backpressure_does_not_reach_executor() {
    let queue = CommandQueue::new(2);
    assert!(queue.submit(Command::new("echo", json!("a"), AgentId(1))));
    assert!(queue.submit(Command::new("echo", json!("b"), AgentId(1))));
    assert!(!queue.submit(Command::new("echo", json!("c"), AgentId(1))));

    let mut executor = executor();
    let mut ids = Vec::new();
    queue.consume_all(|cmd| {
        ids.push(executor.execute_command(&cmd).result_id().map(str::to_string));
    });
    assert_eq!(ids, vec![Some("a".into()), Some("b".into())]);
    assert_eq!(queue.stats().rejected, 1);
    assert_eq!(executor.stats().executed, 2);
}

#[test]
fn test_handler_resubmission_waits_for_next_drain() {
    let queue = Arc::new(CommandQueue::new(8));
    let mut executor = CommandExecutor::new();
    {
        let queue = Arc::clone(&queue);
        executor.register_handler("chain", move |inv: &Invocation<'_>| {
            let depth = inv.payload.as_u64().unwrap_or(0);
            if depth < 3 {
                queue.submit(Command::new("chain", json!(depth + 1), inv.agent));
            }
            HandlerResult::Success(Outcome::with_result_id(depth.to_string()))
        });
    }

    queue.submit(Command::new("chain", json!(0), AgentId(4)));
    let mut passes = 0;
    while !queue.is_empty() {
        passes += 1;
        assert_eq!(queue.consume_all(|cmd| {
            executor.execute_command(&cmd);
        }), 1);
    }
    assert_eq!(passes, 4);
}

#[test]
fn test_typed_payload_errors() {
    let mut executor = executor();
    let bad = executor.execute_command(&Command::new("damage", json!({"target": 1}), AgentId(1)));
    assert_eq!(bad.error_kind(), Some(ErrorKind::InvalidPayload));
    let ok = executor.execute_command(&Command::new(
        "damage",
        json!({"target": 1, "amount": 30}),
        AgentId(1),
    ));
    assert_eq!(ok.outcome().and_then(|o| o.get("remaining")), Some(&json!(70)));
}
