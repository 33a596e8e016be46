// crates/fbpnodes/tests/components.rs

use fbpcore::{ComponentError, ComponentEvent, ComponentState, ExecutionEvent, FaultKind, FlowError, Value};
use fbpnodes::{
    Collector, CollectorHandle, Delay, Filter, JsonParse, JsonStringify, Logger, Map, Merge,
    Source,
};
use fbpruntime::Network;
use std::future::IntoFuture;
use std::time::{Duration, Instant};
use tokio::time::timeout;

const LIMIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

async fn run(network: &mut Network) -> Result<(), FlowError> {
    network.run().unwrap();
    timeout(LIMIT, network.wait().into_future())
        .await
        .expect("network did not complete in time")
}

fn collector(name: &str) -> (Collector, CollectorHandle) {
    let collector = Collector::new(name);
    let handle = collector.handle();
    (collector, handle)
}

fn numbers(values: &[Value]) -> Vec<f64> {
    values.iter().filter_map(Value::as_f64).collect()
}

fn double(value: Value) -> Value {
    Value::from(value.as_f64().unwrap_or_default() * 2.0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn source_map_collector_pipeline() {
    init_tracing();
    let mut network = Network::new();
    let (sink, handle) = collector("sink");
    network.add(Source::new("numbers", [1, 2, 3])).unwrap();
    network.add(Map::new("double", double)).unwrap();
    network.add(sink).unwrap();
    network.connect("numbers", "double").unwrap();
    network.connect("double", "sink").unwrap();

    run(&mut network).await.unwrap();
    assert_eq!(numbers(&handle.values().await), vec![2.0, 4.0, 6.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn filter_drops_non_matching_values() {
    let mut network = Network::new();
    let (sink, handle) = collector("sink");
    network.add(Source::new("numbers", 1..=10)).unwrap();
    network
        .add(Filter::new("even", |value: &Value| {
            value.as_f64().is_some_and(|n| n % 2.0 == 0.0)
        }))
        .unwrap();
    network.add(sink).unwrap();
    network.connect("numbers", "even").unwrap();
    network.connect("even", "sink").unwrap();

    run(&mut network).await.unwrap();
    assert_eq!(
        numbers(&handle.values().await),
        vec![2.0, 4.0, 6.0, 8.0, 10.0]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn merge_fans_in_and_keeps_per_input_order() {
    let mut network = Network::new();
    let (sink, handle) = collector("sink");
    network.add(Source::new("low", 0..50)).unwrap();
    network.add(Source::new("high", 100..150)).unwrap();
    network.add(Merge::new("merge", 2)).unwrap();
    network.add(sink).unwrap();
    network
        .connect_ports("low", "out", "merge", &Merge::input(0))
        .unwrap();
    network
        .connect_ports("high", "out", "merge", &Merge::input(1))
        .unwrap();
    network.connect("merge", "sink").unwrap();

    run(&mut network).await.unwrap();
    let received = numbers(&handle.values().await);
    assert_eq!(received.len(), 100);

    let low: Vec<f64> = received.iter().copied().filter(|n| *n < 100.0).collect();
    let high: Vec<f64> = received.iter().copied().filter(|n| *n >= 100.0).collect();
    assert_eq!(low, (0..50).map(f64::from).collect::<Vec<_>>());
    assert_eq!(high, (100..150).map(f64::from).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn merge_with_unbound_input_still_completes() {
    let mut network = Network::new();
    let (sink, handle) = collector("sink");
    network.add(Source::new("only", [7])).unwrap();
    network.add(Merge::new("merge", 3)).unwrap();
    network.add(sink).unwrap();
    network.connect("only", "merge").unwrap();
    network.connect("merge", "sink").unwrap();

    run(&mut network).await.unwrap();
    assert_eq!(numbers(&handle.values().await), vec![7.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn json_parse_then_stringify() {
    let mut network = Network::new();
    let (sink, handle) = collector("sink");
    network
        .add(Source::new("text", [r#"{"a": 1}"#, "[true, null]"]))
        .unwrap();
    network.add(JsonParse::new("parse")).unwrap();
    network.add(JsonStringify::new("stringify")).unwrap();
    network.add(sink).unwrap();
    network.connect("text", "parse").unwrap();
    network.connect("parse", "stringify").unwrap();
    network.connect("stringify", "sink").unwrap();

    run(&mut network).await.unwrap();
    let received: Vec<String> = handle
        .values()
        .await
        .iter()
        .filter_map(|value| value.as_str().map(str::to_string))
        .collect();
    assert_eq!(received, vec![r#"{"a":1}"#, "[true,null]"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn json_parse_faults_on_non_string() {
    let mut network = Network::new();
    let (sink, handle) = collector("sink");
    network.add(Source::new("numbers", [1])).unwrap();
    network.add(JsonParse::new("parse")).unwrap();
    network.add(sink).unwrap();
    network.connect("numbers", "parse").unwrap();
    network.connect("parse", "sink").unwrap();

    let Err(FlowError::Faulted(faults)) = run(&mut network).await else {
        panic!("expected a component fault");
    };
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].component, "parse");
    assert!(matches!(
        &faults[0].kind,
        FaultKind::Failed(ComponentError::InvalidMessage { actual, .. }) if actual == "number"
    ));
    assert!(handle.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_map_faults_without_hanging_neighbours() {
    let mut network = Network::new();
    let (sink, handle) = collector("sink");
    network.add(Source::new("numbers", [1, 2, 3])).unwrap();
    network
        .add(Map::try_new("picky", |value: Value| match value.as_f64() {
            Some(n) if n < 2.0 => Ok(value),
            _ => Err(ComponentError::ExecutionFailed("too large".to_string())),
        }))
        .unwrap();
    network.add(sink).unwrap();
    network.connect("numbers", "picky").unwrap();
    network.connect("picky", "sink").unwrap();

    let Err(FlowError::Faulted(faults)) = run(&mut network).await else {
        panic!("expected a component fault");
    };
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].component, "picky");
    assert_eq!(
        faults[0].kind,
        FaultKind::Failed(ComponentError::ExecutionFailed("too large".to_string()))
    );
    assert_eq!(numbers(&handle.values().await), vec![1.0]);
    assert_eq!(network.state("numbers"), Some(ComponentState::Terminated));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn logger_forwards_and_emits_events() {
    let mut network = Network::new();
    let mut events = network.subscribe_events();
    let (sink, handle) = collector("sink");
    network.add(Source::new("words", ["hello"])).unwrap();
    network.add(Logger::new("log").with_prefix("SEEN")).unwrap();
    network.add(sink).unwrap();
    network.connect("words", "log").unwrap();
    network.connect("log", "sink").unwrap();

    run(&mut network).await.unwrap();
    assert_eq!(handle.values().await, vec![Value::from("hello")]);

    let mut logged = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::ComponentEvent {
            component,
            event: ComponentEvent::Info { message },
            ..
        } = event
        {
            logged.push((component, message));
        }
    }
    assert!(logged
        .iter()
        .any(|(component, message)| component == "log" && message.starts_with("SEEN") && message.contains("hello")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn logger_without_downstream_is_a_sink() {
    let mut network = Network::new();
    network.add(Source::new("words", ["a", "b"])).unwrap();
    network.add(Logger::new("log")).unwrap();
    network.connect("words", "log").unwrap();

    run(&mut network).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delay_holds_each_value() {
    let mut network = Network::new();
    let (sink, handle) = collector("sink");
    network.add(Source::new("numbers", [1, 2])).unwrap();
    network.add(Delay::from_millis("slow", 20)).unwrap();
    network.add(sink).unwrap();
    network.connect("numbers", "slow").unwrap();
    network.connect("slow", "sink").unwrap();

    let started = Instant::now();
    run(&mut network).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(numbers(&handle.values().await), vec![1.0, 2.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_delay_terminates_cleanly() {
    let mut network = Network::new();
    network.add(Source::new("numbers", [1])).unwrap();
    network.add(Delay::new("slow", Duration::from_secs(60))).unwrap();
    network.connect("numbers", "slow").unwrap();
    network.run().unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    network.cancel();
    timeout(LIMIT, network.wait().into_future()).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_while_sender_is_blocked_is_not_a_fault() {
    let mut network = Network::new();
    network.add(Source::new("numbers", [1, 2, 3])).unwrap();
    network.add(Delay::new("slow", Duration::from_secs(60))).unwrap();
    network.connect("numbers", "slow").unwrap();
    network.run().unwrap();

    // The source is parked on its second send while the delay holds the first.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(network.state("numbers"), Some(ComponentState::Running));
    network.cancel();

    timeout(LIMIT, network.wait().into_future())
        .await
        .unwrap()
        .unwrap();
    assert!(network.wait().faults().is_empty());
    assert_eq!(network.state("numbers"), Some(ComponentState::Terminated));
    assert_eq!(network.state("slow"), Some(ComponentState::Terminated));
}
