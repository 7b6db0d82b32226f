//! Report round-trip and concurrent-writer tests.

use std::sync::Arc;
use std::thread;

use chrono::Utc;
use pipewright_core::{AgentName, AgentResult, Gate, GateResult};
use pipewright_store::{ReportKind, ReportStore};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn gate_result_round_trips_byte_identical() {
    let tmp = TempDir::new().expect("tempdir");
    let store = ReportStore::new(tmp.path());

    let mut result = GateResult::failed(Gate::Requirements, "2 essential file(s) missing");
    result.details.insert(
        "missing_files".into(),
        json!(["hardhat.config.js", ".env"]),
    );

    let handle = store
        .record(ReportKind::Validation, result.gate.as_str(), &result)
        .expect("record");

    let loaded: GateResult = store.load(&handle).expect("load");
    assert_eq!(loaded, result);

    let on_disk = store.read_bytes(&handle).expect("bytes");
    let reencoded = serde_json::to_vec_pretty(&loaded).expect("encode");
    assert_eq!(on_disk, reencoded, "persisted bytes must equal the returned value's encoding");
}

#[test]
fn agent_result_round_trips() {
    let tmp = TempDir::new().expect("tempdir");
    let store = ReportStore::new(tmp.path());

    let result = AgentResult {
        agent: AgentName::from("contract_generator"),
        task: "generate".to_string(),
        success: true,
        payload: json!({ "code": "pragma solidity ^0.8.20;", "lines": 1 }),
        error: None,
        timestamp: Utc::now(),
    };
    let handle = store
        .record(ReportKind::Agent, result.agent.as_str(), &result)
        .expect("record");
    let loaded: AgentResult = store.load(&handle).expect("load");
    assert_eq!(loaded, result);
}

#[test]
fn concurrent_writers_for_same_id_never_collide() {
    let tmp = TempDir::new().expect("tempdir");
    let store = Arc::new(ReportStore::new(tmp.path()));

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store
                    .record(ReportKind::Validation, "security", &json!({ "writer": n }))
                    .expect("record")
            })
        })
        .collect();

    let mut writers: Vec<u64> = Vec::new();
    for handle in handles {
        let receipt = handle.join().expect("join");
        let value: serde_json::Value = store.load(&receipt).expect("load");
        writers.push(value["writer"].as_u64().expect("writer field"));
    }
    writers.sort_unstable();
    assert_eq!(writers, (0..8).collect::<Vec<_>>());
    assert_eq!(store.list(ReportKind::Validation).expect("list").len(), 8);
}

#[test]
fn kinds_are_partitioned_by_directory() {
    let tmp = TempDir::new().expect("tempdir");
    let store = ReportStore::new(tmp.path());
    for kind in ReportKind::all() {
        store.record(*kind, "x", &json!({})).expect("record");
    }
    for dir in ["agents", "validations", "phases"] {
        assert!(tmp.path().join(dir).is_dir(), "{dir} should exist");
    }
    assert_eq!(store.list(ReportKind::Agent).expect("list").len(), 1);
}
