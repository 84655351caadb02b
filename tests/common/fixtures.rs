use lockstep::channels::ChannelSpec;
use lockstep::graph::Graph;
use lockstep::process::{Process, ProcessError};
use serde_json::{json, Value};

pub fn as_i64(value: &Value) -> i64 {
    value.as_i64().unwrap_or_default()
}

/// One process: `input` -> `output`, x + 1.
pub fn identity_graph() -> Graph {
    Graph::builder()
        .add_channel("input", ChannelSpec::LastValue)
        .add_channel("output", ChannelSpec::LastValue)
        .add_process(
            "one",
            Process::subscribe_to("input").run(|value, ctx| async move {
                ctx.write("output", json!(as_i64(&value) + 1));
                Ok(())
            }),
        )
        .with_input(["input"])
        .with_output(["output"])
        .build()
        .expect("valid graph")
}

/// Two stages through an inbox: `a` increments into `inbox`, `b` maps
/// each inbox element + 1 into `output`.
pub fn pipeline_graph() -> Graph {
    Graph::builder()
        .add_channel("input", ChannelSpec::LastValue)
        .add_channel("inbox", ChannelSpec::Inbox)
        .add_channel("output", ChannelSpec::LastValue)
        .add_process(
            "a",
            Process::subscribe_to("input").run(|value, ctx| async move {
                ctx.write("inbox", json!(as_i64(&value) + 1));
                Ok(())
            }),
        )
        .add_process(
            "b",
            Process::subscribe_to_each("inbox", None).run(|value, ctx| async move {
                for item in value.as_array().cloned().unwrap_or_default() {
                    ctx.write("output", json!(as_i64(&item) + 1));
                }
                Ok(())
            }),
        )
        .with_input(["input"])
        .with_output(["output"])
        .build()
        .expect("valid graph")
}

/// Two producers fan out into an inbox; one consumer joins the batch.
pub fn fanout_join_graph() -> Graph {
    let producer = |_: ()| {
        Process::subscribe_to("input").run(|value, ctx| async move {
            ctx.write("inbox", json!(as_i64(&value) + 1));
            Ok(())
        })
    };
    Graph::builder()
        .add_channel("input", ChannelSpec::LastValue)
        .add_channel("inbox", ChannelSpec::Inbox)
        .add_channel("output", ChannelSpec::LastValue)
        .add_process("p1", producer(()))
        .add_process("p2", producer(()))
        .add_process(
            "join",
            Process::subscribe_to("inbox").run(|value, ctx| async move {
                let summed: Vec<Value> = value
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .iter()
                    .map(|v| json!(as_i64(v) + 10))
                    .collect();
                ctx.write("output", Value::Array(summed));
                Ok(())
            }),
        )
        .with_input(["input"])
        .with_output(["output"])
        .build()
        .expect("valid graph")
}

/// Two producers both write a `LastValue` output in the same step.
pub fn double_write_graph() -> Graph {
    let producer = |_: ()| {
        Process::subscribe_to("input").run(|value, ctx| async move {
            ctx.write("output", json!(as_i64(&value) + 1));
            Ok(())
        })
    };
    Graph::builder()
        .add_channel("input", ChannelSpec::LastValue)
        .add_channel("output", ChannelSpec::LastValue)
        .add_process("p1", producer(()))
        .add_process("p2", producer(()))
        .with_input(["input"])
        .with_output(["output"])
        .build()
        .expect("valid graph")
}

/// Three-stage chain `a` -> `b` -> `c`, each incrementing.
pub fn chain_graph() -> Graph {
    Graph::builder()
        .add_channel("input", ChannelSpec::LastValue)
        .add_channel("m1", ChannelSpec::LastValue)
        .add_channel("m2", ChannelSpec::LastValue)
        .add_channel("output", ChannelSpec::LastValue)
        .add_process(
            "a",
            Process::subscribe_to("input").run(|value, ctx| async move {
                ctx.write("m1", json!(as_i64(&value) + 1));
                Ok(())
            }),
        )
        .add_process(
            "b",
            Process::subscribe_to("m1").run(|value, ctx| async move {
                ctx.write("m2", json!(as_i64(&value) + 1));
                Ok(())
            }),
        )
        .add_process(
            "c",
            Process::subscribe_to("m2").run(|value, ctx| async move {
                ctx.write("output", json!(as_i64(&value) + 1));
                Ok(())
            }),
        )
        .with_input(["input"])
        .with_output(["output"])
        .build()
        .expect("valid graph")
}

/// A process that re-triggers itself forever.
pub fn looping_graph() -> Graph {
    Graph::builder()
        .add_channel("spin", ChannelSpec::LastValue)
        .add_process(
            "spinner",
            Process::subscribe_to("spin").run(|value, ctx| async move {
                ctx.write("spin", json!(as_i64(&value) + 1));
                Ok(())
            }),
        )
        .with_input(["spin"])
        .with_output(["spin"])
        .build()
        .expect("valid graph")
}

/// A single process that always fails.
pub fn failing_graph() -> Graph {
    Graph::builder()
        .add_channel("input", ChannelSpec::LastValue)
        .add_channel("output", ChannelSpec::LastValue)
        .add_process(
            "boom",
            Process::subscribe_to("input").run(|_, _| async move {
                Err(ProcessError::Message("exploded".into()))
            }),
        )
        .with_input(["input"])
        .with_output(["output"])
        .build()
        .expect("valid graph")
}

/// Six processes, two rounds through a retriever fanout, then a final
/// answer. Executes exactly twelve tasks for one input.
pub fn relay_fanout_graph() -> Graph {
    Graph::builder()
        .add_channel("query", ChannelSpec::LastValue)
        .add_channel("rewritten", ChannelSpec::LastValue)
        .add_channel("analyzed", ChannelSpec::LastValue)
        .add_channel("docs", ChannelSpec::Inbox)
        .add_channel(
            "round",
            ChannelSpec::binary_operator(
                |a, b| json!(as_i64(&a) + as_i64(&b)),
                json!(0),
            ),
        )
        .add_channel("ready", ChannelSpec::LastValue)
        .add_channel("answer", ChannelSpec::LastValue)
        .add_process(
            "rewrite_query",
            Process::subscribe_to("query").run(|value, ctx| async move {
                ctx.write("rewritten", json!(format!("query: {}", value.as_str().unwrap_or(""))));
                ctx.write("round", json!(1));
                Ok(())
            }),
        )
        .add_process(
            "analyzer_one",
            Process::subscribe_to("rewritten").run(|value, ctx| async move {
                ctx.write(
                    "analyzed",
                    json!(format!("analyzed: {}", value.as_str().unwrap_or(""))),
                );
                Ok(())
            }),
        )
        .add_process(
            "retriever_one",
            Process::subscribe_to("analyzed").run(|_, ctx| async move {
                ctx.write("docs", json!("doc1"));
                ctx.write("docs", json!("doc2"));
                Ok(())
            }),
        )
        .add_process(
            "retriever_two",
            Process::subscribe_to("analyzed").run(|_, ctx| async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                ctx.write("docs", json!("doc3"));
                ctx.write("docs", json!("doc4"));
                Ok(())
            }),
        )
        .add_process(
            "decider",
            Process::subscribe_to("docs")
                .read_also("round", "round")
                .run(|value, ctx| async move {
                    let round = as_i64(value.get("round").unwrap_or(&Value::Null));
                    if round < 2 {
                        ctx.write("query", json!("again"));
                        ctx.write("ready", json!("pending"));
                    } else {
                        ctx.write("ready", json!("complete"));
                    }
                    Ok(())
                }),
        )
        .add_process(
            "qa",
            Process::subscribe_to("ready").run(|value, ctx| async move {
                ctx.write(
                    "answer",
                    json!(format!("answer: {}", value.as_str().unwrap_or(""))),
                );
                Ok(())
            }),
        )
        .with_input(["query"])
        .with_output(["answer"])
        .build()
        .expect("valid graph")
}
