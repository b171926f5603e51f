// SPDX-License-Identifier: MIT OR Apache-2.0
//! Composite node types: nesting, persistence and renaming.

use parking_lot::Mutex;
use signalflow_graph::handle::{ACTIVE, MAIN_OUTPUT, SIGNAL_IN};
use signalflow_graph::{
    Engine, EngineConfig, EngineError, IntegrityError, Position, Value, BOUNDARY_ID,
};
use signalflow_store::{Backend, MemoryBackend, Result as StoreResult, Store, StoreConfig, StoreError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn config() -> EngineConfig {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    EngineConfig {
        rng_seed: Some(5),
        ..EngineConfig::default()
    }
}

/// Backend that refuses writes for selected keys
#[derive(Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    failing: Mutex<HashSet<String>>,
}

impl FlakyBackend {
    fn fail_on(&self, key: &str) {
        self.failing.lock().insert(key.to_string());
    }
}

impl Backend for FlakyBackend {
    fn read_all(&self, collection: &str) -> StoreResult<Vec<(String, String)>> {
        self.inner.read_all(collection)
    }

    fn write(&self, collection: &str, key: &str, payload: &str) -> StoreResult<()> {
        if self.failing.lock().contains(key) {
            return Err(StoreError::Backend(format!("refused {key}")));
        }
        self.inner.write(collection, key, payload)
    }

    fn delete(&self, collection: &str, key: &str) -> StoreResult<()> {
        self.inner.delete(collection, key)
    }
}

/// Build `p1 + 10` as a composite with input `x` and output `y`.
/// Returns the placed instance and the internal Math node's id.
fn build_adder(engine: &mut Engine, name: &str) -> (String, String) {
    engine.open_boundary(Position::default()).unwrap();
    let math = engine.place("Math", Position::default()).unwrap();
    engine.set_input(&math, "p2", 10.0).unwrap();
    engine.connect(BOUNDARY_ID, "x", &math, "p1").unwrap();
    engine.connect(&math, MAIN_OUTPUT, BOUNDARY_ID, "y").unwrap();
    let id = engine.build_composite(name, None).unwrap();
    (id, math)
}

/// Wrap a placed composite `inner` in another composite exposing `a` and `b`
fn wrap(engine: &mut Engine, inner: &str, name: &str) -> String {
    engine.open_boundary(Position::new(10.0, 10.0)).unwrap();
    engine.connect(BOUNDARY_ID, "a", inner, "x").unwrap();
    engine.connect(inner, "y", BOUNDARY_ID, "b").unwrap();
    engine.build_composite(name, None).unwrap()
}

#[test]
fn test_nested_composite_propagates_and_exposes_state() {
    let mut engine = Engine::in_memory(config()).unwrap();
    let (adder, math) = build_adder(&mut engine, "Adder");
    let outer = wrap(&mut engine, &adder, "Outer");

    assert_eq!(engine.node_ids(), vec![outer.clone()]);
    engine.set_input(&outer, "a", 5.0).unwrap();
    assert_eq!(engine.state(&outer, "b").unwrap(), Some(Value::Number(15.0)));
    assert_eq!(
        engine.state_at(&[outer.as_str(), adder.as_str()], "y").unwrap(),
        Some(Value::Number(15.0))
    );
    assert_eq!(
        engine.state_at(&[outer.as_str(), adder.as_str(), math.as_str()], "p1").unwrap(),
        Some(Value::Number(5.0))
    );
    assert!(engine.transitive_dependents("Adder").contains("Outer"));
}

/// Build `x * 3 > 10` feeding an OR gate, exposing `x`, `y` and `big`
fn build_gate(engine: &mut Engine, name: &str) -> String {
    engine.open_boundary(Position::default()).unwrap();
    let math = engine.place("Math", Position::new(1.0, 0.0)).unwrap();
    let compare = engine.place("Comparison", Position::new(2.0, 0.0)).unwrap();
    let gate = engine.place("Boolean", Position::new(3.0, 0.0)).unwrap();
    engine.configure(&math, &serde_json::json!({ "operator": "*" })).unwrap();
    engine.configure(&compare, &serde_json::json!({ "operator": ">" })).unwrap();
    engine.configure(&gate, &serde_json::json!({ "operator": "|" })).unwrap();
    engine.set_input(&math, "p2", 3.0).unwrap();
    engine.set_input(&compare, "p2", 10.0).unwrap();

    engine.connect(BOUNDARY_ID, "x", &math, "p1").unwrap();
    engine.connect(&math, MAIN_OUTPUT, BOUNDARY_ID, "y").unwrap();
    engine.connect(&math, MAIN_OUTPUT, &compare, "p1").unwrap();
    engine.connect(&compare, MAIN_OUTPUT, &gate, "p_1").unwrap();
    engine.connect(&gate, MAIN_OUTPUT, BOUNDARY_ID, "big").unwrap();
    engine.build_composite(name, None).unwrap()
}

#[test]
fn test_saved_graph_restores_internal_state() {
    let mut engine = Engine::in_memory(config()).unwrap();
    let gate = build_gate(&mut engine, "Gate");
    let outer = wrap(&mut engine, &gate, "Outer");
    engine.set_input(&outer, "a", 5.0).unwrap();
    assert_eq!(engine.state(&outer, "b").unwrap(), Some(Value::Number(15.0)));
    assert_eq!(
        engine.state_at(&[outer.as_str(), gate.as_str()], "big").unwrap(),
        Some(Value::Boolean(true))
    );
    let before = engine.save_sub_graph_state(&outer).unwrap();
    assert!(before.contains_key(&gate));

    let graph = engine.save_graph("Nested").unwrap();
    engine.clear();
    assert!(engine.node_ids().is_empty());

    engine.load_graph(&graph).unwrap();
    let ids = engine.node_ids();
    assert_eq!(ids.len(), 1);
    let loaded = &ids[0];
    assert_eq!(engine.save_sub_graph_state(loaded).unwrap(), before);
    assert_eq!(engine.state(loaded, "b").unwrap(), Some(Value::Number(15.0)));

    engine.set_input(loaded, "a", 2.0).unwrap();
    assert_eq!(engine.state(loaded, "b").unwrap(), Some(Value::Number(6.0)));
    assert_eq!(
        engine.state_at(&[loaded.as_str(), gate.as_str()], "big").unwrap(),
        Some(Value::Boolean(false))
    );
}

/// A clock driving a counter, started through `_bangin` and exposing
/// `ticks`. Returns the placed instance and the internal counter's id.
fn build_metronome(engine: &mut Engine) -> (String, String) {
    engine.open_boundary(Position::default()).unwrap();
    let clock = engine.place("Clock Pulse", Position::default()).unwrap();
    let counter = engine.place("Counter", Position::default()).unwrap();
    engine.set_input(&clock, "interval", 1.0).unwrap();
    engine.connect(BOUNDARY_ID, SIGNAL_IN, &clock, SIGNAL_IN).unwrap();
    engine.connect(&clock, "pulse", &counter, SIGNAL_IN).unwrap();
    engine.connect(&counter, MAIN_OUTPUT, BOUNDARY_ID, "ticks").unwrap();
    let metronome = engine.build_composite("Metronome", Some("Start")).unwrap();
    (metronome, counter)
}

#[test]
fn test_composite_timers_run_inside() {
    let mut engine = Engine::in_memory(config()).unwrap();
    let (metronome, _) = build_metronome(&mut engine);

    engine.bang(&metronome, SIGNAL_IN).unwrap();
    engine.advance(Duration::from_millis(2500)).unwrap();
    assert_eq!(engine.state(&metronome, "ticks").unwrap(), Some(Value::Number(2.0)));

    engine.remove(&metronome).unwrap();
    assert_eq!(engine.pending_timers(), 0);
}

#[test]
fn test_deactivated_composite_keeps_inner_clock() {
    let mut engine = Engine::in_memory(config()).unwrap();
    let (metronome, counter) = build_metronome(&mut engine);
    engine.bang(&metronome, SIGNAL_IN).unwrap();
    engine.advance(Duration::from_millis(1500)).unwrap();

    engine.set_input(&metronome, ACTIVE, false).unwrap();
    assert_eq!(engine.pending_timers(), 1);
    engine.advance(Duration::from_secs(2)).unwrap();

    assert_eq!(
        engine.state_at(&[metronome.as_str(), counter.as_str()], MAIN_OUTPUT).unwrap(),
        Some(Value::Number(3.0))
    );
    assert_eq!(engine.state(&metronome, "ticks").unwrap(), Some(Value::Number(1.0)));
}

#[test]
fn test_rename_reports_partial_failure() {
    let backend = Arc::new(FlakyBackend::default());
    let store = Store::with_backend(Arc::clone(&backend) as Arc<dyn Backend>, false).unwrap();
    let mut engine = Engine::new(config(), store).unwrap();
    build_adder(&mut engine, "Adder");

    let first = engine.save_graph("First").unwrap();
    let second = engine.save_graph("Second").unwrap();
    let third = engine.save_graph("Third").unwrap();
    engine.flush().unwrap();
    backend.fail_on(&second);

    let Err(EngineError::Integrity(IntegrityError::RenamePropagationFailure(report))) =
        engine.rename_type("Adder", "Add Ten")
    else {
        panic!("rename should fail on the refused graph");
    };
    assert_eq!(report.renamed, vec![first]);
    assert_eq!(report.failed.as_ref().map(|(g, _)| g.clone()), Some(second));
    assert_eq!(report.skipped, vec![third]);
    assert_eq!(report.total(), 3);

    assert!(engine.types().contains("Adder"));
    assert!(!engine.types().contains("Add Ten"));
}

#[test]
fn test_rename_updates_live_and_saved_graphs() {
    let mut engine = Engine::in_memory(config()).unwrap();
    let (adder, _) = build_adder(&mut engine, "Adder");
    let outer = wrap(&mut engine, &adder, "Outer");
    let graph = engine.save_graph("Nested").unwrap();

    engine.rename_type("Adder", "Add Ten").unwrap();
    assert!(engine.types().contains("Add Ten"));
    assert!(engine.composite_definition("Adder").is_none());
    assert!(engine.transitive_dependents("Add Ten").contains("Outer"));

    engine.clear();
    engine.load_graph(&graph).unwrap();
    let loaded = engine.node_ids().remove(0);
    assert_eq!(engine.instance(&loaded).unwrap().type_name(), "Outer");
    engine.set_input(&loaded, "a", 2.0).unwrap();
    assert_eq!(engine.state(&loaded, "b").unwrap(), Some(Value::Number(12.0)));
    assert!(engine.instance(&outer).is_none());
}

#[test]
fn test_directory_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store_config = StoreConfig::at(dir.path());

    let graph = {
        let mut engine = Engine::new(config(), Store::open(&store_config).unwrap()).unwrap();
        let (adder, _) = build_adder(&mut engine, "Adder");
        engine.set_input(&adder, "x", 3.0).unwrap();
        let graph = engine.save_graph("Main").unwrap();
        engine.flush().unwrap();
        graph
    };

    let mut engine = Engine::new(config(), Store::open(&store_config).unwrap()).unwrap();
    assert!(!engine.types().contains("Adder"));
    engine.resync().unwrap();
    assert!(engine.types().contains("Adder"));
    assert_eq!(engine.list_graphs()[0].name, "Main");

    engine.load_graph(&graph).unwrap();
    let loaded = engine.node_ids().remove(0);
    assert_eq!(engine.state(&loaded, "y").unwrap(), Some(Value::Number(13.0)));
}
