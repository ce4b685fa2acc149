// tests/telemetry_schema_tests.rs
//
// Telemetry contract tests: every JSONL record an environment writes must
// carry schema_version 1 and the flattened step info.

use std::fs;

use cyberwheel::telemetry::{StepLog, TelemetryTarget};
use cyberwheel::{CyberwheelEnv, EnvConfig};
use cyberwheel::rl::{Evaluator, FixedPolicy};
use serde_json::{json, Value};

const REQUIRED_KEYS: &[&str] = &[
    "schema_version",
    "seed",
    "reward",
    "done",
    "truncated",
    "step",
    "red_action",
    "blue_action",
    "blue_success",
];

fn step_log(path: &std::path::Path) -> StepLog {
    StepLog::create(&TelemetryTarget {
        path: path.to_path_buf(),
        append: false,
    })
    .expect("telemetry file opens")
}

fn read_records(path: &std::path::Path) -> Vec<Value> {
    fs::read_to_string(path)
        .expect("telemetry file exists")
        .lines()
        .map(|l| serde_json::from_str(l).expect("each line is JSON"))
        .collect()
}

#[test]
fn env_records_match_schema_v1() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.jsonl");

    let mut cfg = EnvConfig::example();
    cfg.num_steps = 12;
    let mut env = CyberwheelEnv::new(cfg).unwrap().with_telemetry(step_log(&path));
    env.reset(Some(7));
    for _ in 0..12 {
        let r = env.step(0);
        if r.done || r.truncated {
            break;
        }
    }
    drop(env);

    let records = read_records(&path);
    assert!(!records.is_empty());
    for record in &records {
        for key in REQUIRED_KEYS {
            assert!(record.get(*key).is_some(), "missing {key}: {record}");
        }
        assert_eq!(record["schema_version"], json!(1));
        assert_eq!(record["seed"], json!(7));
    }

    let steps: Vec<u64> = records
        .iter()
        .map(|r| r["step"].as_u64().expect("step is an integer"))
        .collect();
    assert!(steps.windows(2).all(|w| w[1] == w[0] + 1), "steps: {steps:?}");

    let last = records.last().unwrap();
    assert!(last["done"].as_bool().unwrap() || last["truncated"].as_bool().unwrap());
}

#[test]
fn evaluation_episodes_share_one_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eval.jsonl");

    let mut cfg = EnvConfig::example();
    cfg.num_steps = 5;
    let mut eval = Evaluator::new(cfg).unwrap().with_telemetry(step_log(&path));
    let report = eval.run(&mut FixedPolicy::new(4), 3, 20);
    drop(eval);

    let records = read_records(&path);
    assert_eq!(records.len(), report.rows.len());
    let seeds: Vec<u64> = records.iter().map(|r| r["seed"].as_u64().unwrap()).collect();
    assert_eq!(seeds.first(), Some(&20));
    assert_eq!(seeds.last(), Some(&22));
}
