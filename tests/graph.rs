use lockstep::channels::ChannelSpec;
use lockstep::constants::{ERROR, IS_LAST_STEP};
use lockstep::graph::{Graph, GraphError};
use lockstep::process::Process;

fn noop() -> Process {
    Process::subscribe_to("input").run(|_, _| async move { Ok(()) })
}

#[test]
fn build_validates_declared_channels() {
    let err = Graph::builder()
        .add_channel("input", ChannelSpec::LastValue)
        .add_process(
            "writer",
            Process::subscribe_to("missing").run(|_, _| async move { Ok(()) }),
        )
        .with_input(["input"])
        .build()
        .unwrap_err();
    assert!(matches!(err, GraphError::UnknownChannel { channel, .. } if channel == "missing"));
}

#[test]
fn build_rejects_reserved_channel_names() {
    let err = Graph::builder()
        .add_channel(ERROR, ChannelSpec::LastValue)
        .with_input([ERROR])
        .build()
        .unwrap_err();
    assert!(matches!(err, GraphError::ReservedChannel { .. }));
}

#[test]
fn build_rejects_duplicates() {
    let err = Graph::builder()
        .add_channel("input", ChannelSpec::LastValue)
        .add_process("p", noop())
        .add_process("p", noop())
        .with_input(["input"])
        .build()
        .unwrap_err();
    assert!(matches!(err, GraphError::DuplicateProcess { .. }));

    let err = Graph::builder()
        .add_channel("input", ChannelSpec::LastValue)
        .add_channel("input", ChannelSpec::Inbox)
        .with_input(["input"])
        .build()
        .unwrap_err();
    assert!(matches!(err, GraphError::DuplicateChannel { .. }));
}

#[test]
fn build_requires_an_input_declaration() {
    let err = Graph::builder()
        .add_channel("input", ChannelSpec::LastValue)
        .add_process("p", noop())
        .build()
        .unwrap_err();
    assert!(matches!(err, GraphError::NoInput));
}

#[test]
fn is_last_step_is_auto_declared() {
    let graph = Graph::builder()
        .add_channel("input", ChannelSpec::LastValue)
        .add_process("p", noop())
        .with_input(["input"])
        .build()
        .unwrap();
    assert!(graph.specs().iter().any(|(name, _)| name == IS_LAST_STEP));
}

#[test]
fn processes_keep_registry_order() {
    let graph = Graph::builder()
        .add_channel("input", ChannelSpec::LastValue)
        .add_process("zebra", noop())
        .add_process("aardvark", noop())
        .with_input(["input"])
        .build()
        .unwrap();
    let names: Vec<&str> = graph.processes().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["zebra", "aardvark"]);
}
