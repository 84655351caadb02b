use lockstep::checkpoint::{
    create_checkpoint, empty_checkpoint, CheckpointMetadata, CheckpointSource,
};
use lockstep::channels::{ChannelSpec, Channels};
use lockstep::checkpointers::{Checkpointer, InMemoryCheckpointer};
use lockstep::runtime::RunConfigSnapshot;
use serde_json::{json, Value};

fn metadata(step: i64) -> CheckpointMetadata {
    CheckpointMetadata::new(CheckpointSource::Loop, step, Value::Null)
}

#[tokio::test]
async fn get_tuple_returns_latest_or_pinned() {
    let checkpointer = InMemoryCheckpointer::new();
    let base = RunConfigSnapshot::new("t1");

    assert!(checkpointer.get_tuple(&base).await.unwrap().is_none());

    let first = empty_checkpoint();
    let config1 = checkpointer
        .put(&base, first.clone(), metadata(0))
        .await
        .unwrap();
    assert_eq!(config1.thread_ts.as_deref(), Some(first.id.as_str()));

    let second = empty_checkpoint();
    let config2 = checkpointer
        .put(&config1, second.clone(), metadata(1))
        .await
        .unwrap();

    // latest wins when no checkpoint is pinned
    let latest = checkpointer.get_tuple(&base).await.unwrap().unwrap();
    assert_eq!(latest.checkpoint.id, second.id);
    assert_eq!(latest.metadata.step, 1);
    // the parent link threads back to the first checkpoint
    assert_eq!(
        latest.parent_config.unwrap().thread_ts.as_deref(),
        Some(first.id.as_str())
    );

    // pinning selects the named checkpoint
    let pinned = checkpointer
        .get_tuple(&base.clone().at_checkpoint(first.id.clone()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pinned.checkpoint.id, first.id);
    assert!(pinned.parent_config.is_none());

    let _ = config2;
}

#[tokio::test]
async fn put_writes_replaces_by_task_id() {
    let checkpointer = InMemoryCheckpointer::new();
    let base = RunConfigSnapshot::new("t2");
    let checkpoint = empty_checkpoint();
    let config = checkpointer
        .put(&base, checkpoint, metadata(0))
        .await
        .unwrap();

    checkpointer
        .put_writes(
            &config,
            vec![("a".to_string(), json!(1)), ("b".to_string(), json!(2))],
            "task-1".to_string(),
        )
        .await
        .unwrap();
    checkpointer
        .put_writes(
            &config,
            vec![("c".to_string(), json!(3))],
            "task-2".to_string(),
        )
        .await
        .unwrap();
    // a replay for task-1 replaces its earlier record
    checkpointer
        .put_writes(
            &config,
            vec![("a".to_string(), json!(9))],
            "task-1".to_string(),
        )
        .await
        .unwrap();

    let tuple = checkpointer.get_tuple(&base).await.unwrap().unwrap();
    let mut task1: Vec<&str> = tuple
        .pending_writes
        .iter()
        .filter(|w| w.task_id == "task-1")
        .map(|w| w.channel.as_str())
        .collect();
    task1.sort_unstable();
    assert_eq!(task1, vec!["a"]);
    assert_eq!(
        tuple
            .pending_writes
            .iter()
            .filter(|w| w.task_id == "task-2")
            .count(),
        1
    );
}

#[tokio::test]
async fn put_writes_requires_a_pinned_config() {
    let checkpointer = InMemoryCheckpointer::new();
    let base = RunConfigSnapshot::new("t3");
    let result = checkpointer
        .put_writes(&base, vec![("a".to_string(), json!(1))], "task".to_string())
        .await;
    assert!(result.is_err());
}

#[test]
fn next_version_is_strictly_monotone() {
    let checkpointer = InMemoryCheckpointer::new();
    let mut version = None;
    for _ in 0..5 {
        let next = checkpointer.get_next_version(version);
        assert!(version.is_none_or(|v| next > v));
        version = Some(next);
    }
    assert_eq!(version, Some(5));
}

#[test]
fn create_checkpoint_snapshots_live_channels() {
    let specs = vec![
        ("a".to_string(), ChannelSpec::LastValue),
        ("b".to_string(), ChannelSpec::Stream),
    ];
    let previous = empty_checkpoint();
    let mut channels = Channels::materialize(&specs, &previous).unwrap();
    channels
        .get_mut("a")
        .unwrap()
        .update(vec![json!("latest")])
        .unwrap();
    channels
        .get_mut("b")
        .unwrap()
        .update(vec![json!(1), json!(2)])
        .unwrap();

    let snapshot = create_checkpoint(&previous, &channels);
    assert_ne!(snapshot.id, previous.id);
    assert_eq!(snapshot.channel_values["a"], json!("latest"));
    assert_eq!(snapshot.channel_values["b"], json!([1, 2]));

    // restoring from the snapshot reproduces the same observable state
    let restored = Channels::materialize(&specs, &snapshot).unwrap();
    assert_eq!(restored.read("a").unwrap(), json!("latest"));
    assert_eq!(restored.read("b").unwrap(), json!([1, 2]));
}
