mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use lockstep::checkpointers::{Checkpointer, InMemoryCheckpointer};
use lockstep::errors::EngineError;
use lockstep::graph::Graph;
use lockstep::relay::{
    Bus, ExecutorWorker, InMemoryBus, MessageToExecutor, MessageToOrchestrator, Orchestrator,
    TaskDescriptor, Topic,
};
use lockstep::runtime::{RunConfigSnapshot, RunStatus};
use serde_json::json;

struct Cluster {
    bus: Arc<InMemoryBus>,
    checkpointer: Arc<InMemoryCheckpointer>,
    orchestrator: Orchestrator,
    executor: ExecutorWorker,
}

fn cluster(graph: Graph) -> Cluster {
    let graph = Arc::new(graph);
    let bus = Arc::new(InMemoryBus::new());
    let checkpointer = Arc::new(InMemoryCheckpointer::new());
    let orchestrator = Orchestrator::new(
        graph.clone(),
        checkpointer.clone(),
        bus.clone(),
    )
    .with_batch(10, Duration::from_millis(20));
    let executor = ExecutorWorker::new(graph, checkpointer.clone(), bus.clone())
        .with_batch(10, Duration::from_millis(20));
    Cluster {
        bus,
        checkpointer,
        orchestrator,
        executor,
    }
}

async fn seed_input(bus: &InMemoryBus, thread_id: &str, input: serde_json::Value) {
    let message = MessageToOrchestrator {
        input: Some(input),
        config: RunConfigSnapshot::new(thread_id),
        finally_: None,
    };
    bus.produce(Topic::Orchestrator, serde_json::to_vec(&message).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn distributed_fanout_message_counts() {
    let Cluster {
        bus,
        checkpointer,
        orchestrator,
        executor,
    } = cluster(relay_fanout_graph());

    seed_input(&bus, "1", json!("x")).await;

    let orchestrator_side = tokio::spawn(async move {
        let mut consumed = 0;
        let mut terminal = Vec::new();
        while consumed < 13 {
            let batch = orchestrator.run_batch().await.unwrap();
            consumed += batch.consumed;
            terminal.extend(batch.terminal);
        }
        (consumed, terminal)
    });
    let executor_side = tokio::spawn(async move {
        let mut consumed = 0;
        while consumed < 12 {
            consumed += executor.run_batch().await.unwrap();
        }
        consumed
    });

    let ((orch_consumed, terminal), exec_consumed) =
        tokio::time::timeout(Duration::from_secs(15), async {
            (
                orchestrator_side.await.unwrap(),
                executor_side.await.unwrap(),
            )
        })
        .await
        .expect("distributed run should converge");

    assert_eq!(orch_consumed, 13);
    assert_eq!(exec_consumed, 12);
    assert_eq!(bus.len(Topic::Orchestrator), 13);
    assert_eq!(bus.len(Topic::Executor), 12);
    assert!(terminal.contains(&("1".to_string(), RunStatus::Done)));

    // two rounds through the fanout, then the final answer
    let tuple = checkpointer
        .get_tuple(&RunConfigSnapshot::new("1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        tuple.checkpoint.channel_values["answer"],
        json!("answer: complete")
    );
}

#[tokio::test]
async fn failed_task_terminates_the_run_with_error() {
    let Cluster {
        bus,
        orchestrator,
        executor,
        ..
    } = cluster(failing_graph());

    seed_input(&bus, "t-err", json!(1)).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let mut terminal = Vec::new();
    while terminal.is_empty() && tokio::time::Instant::now() < deadline {
        terminal.extend(orchestrator.run_batch().await.unwrap().terminal);
        executor.run_batch().await.unwrap();
    }
    assert_eq!(terminal, vec![("t-err".to_string(), RunStatus::Error)]);
}

#[tokio::test]
async fn stale_task_is_recorded_as_error_not_a_crash() {
    let Cluster {
        bus,
        checkpointer,
        orchestrator,
        executor,
    } = cluster(identity_graph());

    // run a thread to completion first so a checkpoint exists
    seed_input(&bus, "t-stale", json!(2)).await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let mut done = false;
    while !done && tokio::time::Instant::now() < deadline {
        done = orchestrator
            .run_batch()
            .await
            .unwrap()
            .terminal
            .iter()
            .any(|(_, status)| *status == RunStatus::Done);
        executor.run_batch().await.unwrap();
    }
    assert!(done);

    // a stale dispatch for that thread must not crash the worker
    let config = checkpointer
        .get_tuple(&RunConfigSnapshot::new("t-stale"))
        .await
        .unwrap()
        .unwrap()
        .config;
    let stale = MessageToExecutor {
        config: config.clone(),
        task: TaskDescriptor {
            path: vec!["pull".to_string(), "one".to_string()],
            id: "0000-stale".to_string(),
            step: 99,
            resuming: true,
        },
        finally_: None,
    };
    bus.produce(Topic::Executor, serde_json::to_vec(&stale).unwrap())
        .await
        .unwrap();
    assert_eq!(executor.run_batch().await.unwrap(), 1);

    // the worker recorded the failure and woke the orchestrator, which
    // terminates the run
    let terminal = orchestrator.run_batch().await.unwrap().terminal;
    assert_eq!(
        terminal,
        vec![("t-stale".to_string(), RunStatus::Error)]
    );
}

#[tokio::test]
async fn missing_checkpoint_surfaces_checkpoint_not_found() {
    let Cluster { bus, executor, .. } = cluster(identity_graph());

    let message = MessageToExecutor {
        config: RunConfigSnapshot::new("ghost"),
        task: TaskDescriptor {
            path: vec!["pull".to_string(), "one".to_string()],
            id: "never-prepared".to_string(),
            step: 0,
            resuming: false,
        },
        finally_: None,
    };
    bus.produce(Topic::Executor, serde_json::to_vec(&message).unwrap())
        .await
        .unwrap();

    let err = executor.run_batch().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::CheckpointNotFound { thread_id } if thread_id == "ghost"
    ));
}

#[tokio::test]
async fn uncommitted_records_are_redelivered_after_restart() {
    let bus = InMemoryBus::new();
    for n in 0..3u8 {
        bus.produce(Topic::Orchestrator, vec![n]).await.unwrap();
    }

    let batch = bus
        .consume(Topic::Orchestrator, "g", 2, Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(batch.len(), 2);
    // only the first record is committed before the "crash"
    bus.commit(Topic::Orchestrator, "g", batch[0].offset)
        .await
        .unwrap();
    bus.reset_group(Topic::Orchestrator, "g");

    let redelivered = bus
        .consume(Topic::Orchestrator, "g", 10, Duration::from_millis(10))
        .await
        .unwrap();
    let payloads: Vec<u8> = redelivered.iter().map(|r| r.payload[0]).collect();
    assert_eq!(payloads, vec![1, 2]);
}

#[tokio::test]
async fn consume_returns_empty_when_the_wait_elapses() {
    let bus = InMemoryBus::new();
    let batch = bus
        .consume(Topic::Executor, "g", 10, Duration::from_millis(20))
        .await
        .unwrap();
    assert!(batch.is_empty());
}
