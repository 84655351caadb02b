mod common;

use common::*;
use lockstep::algo::{
    apply_writes, derive_task_id, increment, prepare_next_tasks, prepare_single_task,
    should_interrupt,
};
use lockstep::channels::Channels;
use lockstep::checkpoint::empty_checkpoint;
use lockstep::constants::{ERROR, INTERRUPT, IS_LAST_STEP};
use lockstep::errors::EngineError;
use serde_json::json;

#[test]
fn apply_writes_rejects_reserved_channels() {
    let graph = identity_graph();
    let mut checkpoint = empty_checkpoint();
    let mut channels = Channels::materialize(graph.specs(), &checkpoint).unwrap();
    let writes = vec![(ERROR.to_string(), json!("nope"))];
    let err = apply_writes(&mut checkpoint, &mut channels, &writes, &increment, None).unwrap_err();
    assert!(matches!(err, EngineError::ReservedChannelWrite { .. }));
}

#[test]
fn apply_writes_advances_versions_and_notifies_boundaries() {
    let graph = pipeline_graph();
    let mut checkpoint = empty_checkpoint();
    let mut channels = Channels::materialize(graph.specs(), &checkpoint).unwrap();

    let writes = vec![
        ("inbox".to_string(), json!(1)),
        ("inbox".to_string(), json!(2)),
    ];
    let updated =
        apply_writes(&mut checkpoint, &mut channels, &writes, &increment, Some(false)).unwrap();
    assert_eq!(updated, vec!["inbox".to_string(), IS_LAST_STEP.to_string()]);
    assert_eq!(checkpoint.channel_versions["inbox"], 1);
    assert_eq!(channels.read("inbox").unwrap(), json!([1, 2]));
    assert_eq!(channels.read(IS_LAST_STEP).unwrap(), json!(false));

    // no writes for the inbox this time: the boundary clears it and its
    // version does not move
    let updated =
        apply_writes(&mut checkpoint, &mut channels, &[], &increment, Some(true)).unwrap();
    assert_eq!(updated, vec![IS_LAST_STEP.to_string()]);
    assert_eq!(checkpoint.channel_versions["inbox"], 1);
    assert!(channels.read("inbox").is_err());
    assert_eq!(channels.read(IS_LAST_STEP).unwrap(), json!(true));
}

#[test]
fn apply_writes_skips_undeclared_channels() {
    let graph = identity_graph();
    let mut checkpoint = empty_checkpoint();
    let mut channels = Channels::materialize(graph.specs(), &checkpoint).unwrap();
    let writes = vec![("nobody_listens".to_string(), json!(1))];
    let updated =
        apply_writes(&mut checkpoint, &mut channels, &writes, &increment, None).unwrap();
    assert!(updated.is_empty());
    assert!(!checkpoint.channel_versions.contains_key("nobody_listens"));
}

#[test]
fn prepare_gates_on_seen_versions() {
    let graph = identity_graph();
    let mut checkpoint = empty_checkpoint();
    let mut channels = Channels::materialize(graph.specs(), &checkpoint).unwrap();

    // nothing written yet: nothing triggered
    assert!(prepare_next_tasks(&mut checkpoint, &graph, &channels, 0, true).is_empty());

    let writes = vec![("input".to_string(), json!(2))];
    apply_writes(&mut checkpoint, &mut channels, &writes, &increment, None).unwrap();

    let tasks = prepare_next_tasks(&mut checkpoint, &graph, &channels, 0, true);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].name, "one");
    assert_eq!(tasks[0].input, json!(2));
    assert_eq!(tasks[0].path, vec!["pull".to_string(), "one".to_string()]);

    // the seen bump stops a re-fire on the same version
    assert!(prepare_next_tasks(&mut checkpoint, &graph, &channels, 0, true).is_empty());
}

#[test]
fn prepare_without_execution_leaves_seen_untouched() {
    let graph = identity_graph();
    let mut checkpoint = empty_checkpoint();
    let mut channels = Channels::materialize(graph.specs(), &checkpoint).unwrap();
    let writes = vec![("input".to_string(), json!(2))];
    apply_writes(&mut checkpoint, &mut channels, &writes, &increment, None).unwrap();

    assert_eq!(
        prepare_next_tasks(&mut checkpoint, &graph, &channels, 0, false).len(),
        1
    );
    // still triggered: the inspection pass did not consume the version
    assert_eq!(
        prepare_next_tasks(&mut checkpoint, &graph, &channels, 0, true).len(),
        1
    );
}

#[test]
fn tasks_come_back_in_registry_order() {
    let graph = fanout_join_graph();
    let mut checkpoint = empty_checkpoint();
    let mut channels = Channels::materialize(graph.specs(), &checkpoint).unwrap();
    let writes = vec![("input".to_string(), json!(2))];
    apply_writes(&mut checkpoint, &mut channels, &writes, &increment, None).unwrap();

    let tasks = prepare_next_tasks(&mut checkpoint, &graph, &channels, 0, true);
    let names: Vec<&str> = tasks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["p1", "p2"]);
}

#[test]
fn task_ids_are_deterministic() {
    let path = vec!["pull".to_string(), "one".to_string()];
    let a = derive_task_id("3d1f9b04-c6a5-4b2a-bb4e-111111111111", 3, "one", &path);
    let b = derive_task_id("3d1f9b04-c6a5-4b2a-bb4e-111111111111", 3, "one", &path);
    let c = derive_task_id("3d1f9b04-c6a5-4b2a-bb4e-111111111111", 4, "one", &path);
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn single_task_rederivation_matches_or_bails() {
    let graph = identity_graph();
    let mut checkpoint = empty_checkpoint();
    let mut channels = Channels::materialize(graph.specs(), &checkpoint).unwrap();
    let writes = vec![("input".to_string(), json!(2))];
    apply_writes(&mut checkpoint, &mut channels, &writes, &increment, None).unwrap();

    let tasks = prepare_next_tasks(&mut checkpoint, &graph, &channels, 2, false);
    let task = &tasks[0];

    let mut fresh = checkpoint.clone();
    let again = prepare_single_task(&task.path, &task.id, &mut fresh, &graph, &channels, 2);
    assert_eq!(again.unwrap().id, task.id);

    // a stale id (from a different step) is not resurrected
    let mut fresh = checkpoint.clone();
    assert!(prepare_single_task(&task.path, &task.id, &mut fresh, &graph, &channels, 3).is_none());

    // an unknown path is not resurrected either
    let mut fresh = checkpoint.clone();
    let bogus = vec!["pull".to_string(), "ghost".to_string()];
    assert!(prepare_single_task(&bogus, &task.id, &mut fresh, &graph, &channels, 2).is_none());
}

#[test]
fn interrupt_fires_only_for_named_processes_with_new_versions() {
    let graph = identity_graph();
    let mut checkpoint = empty_checkpoint();
    let mut channels = Channels::materialize(graph.specs(), &checkpoint).unwrap();
    let writes = vec![("input".to_string(), json!(2))];
    apply_writes(&mut checkpoint, &mut channels, &writes, &increment, None).unwrap();
    let tasks = prepare_next_tasks(&mut checkpoint, &graph, &channels, 0, false);

    assert!(should_interrupt(
        &checkpoint,
        &["one".to_string()],
        &tasks
    ));
    assert!(!should_interrupt(
        &checkpoint,
        &["other".to_string()],
        &tasks
    ));

    // once the interrupt gate has seen the current versions, it stays
    // quiet until something advances
    let cleared = checkpoint.channel_versions.clone();
    checkpoint
        .versions_seen
        .insert(INTERRUPT.to_string(), cleared);
    assert!(!should_interrupt(
        &checkpoint,
        &["one".to_string()],
        &tasks
    ));
}
