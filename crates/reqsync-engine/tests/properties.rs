//! Property tests over whole scenarios

use proptest::prelude::*;
use reqsync_engine::{EngineConfig, SyncInput};
use reqsync_model::PhaseResult;
use reqsync_test_utils::{module_with, Scenario, ScenarioBuilder};
use serde_json::{json, Value};

const DECLARED: [&str; 5] = ["", "pending", "in_progress", "complete", "planned"];
const OBSERVED: [Option<&str>; 4] = [None, Some("passed"), Some("failed"), Some("skipped")];

#[derive(Debug, Clone)]
struct Row {
    declared: usize,
    observed: usize,
    validated: bool,
    target: Option<u8>,
}

fn row() -> impl Strategy<Value = Row> {
    (0..DECLARED.len(), 0..OBSERVED.len(), any::<bool>(), prop::option::of(0u8..3)).prop_map(
        |(declared, observed, validated, target)| Row {
            declared,
            observed,
            validated,
            target,
        },
    )
}

fn scenario(rows: &[Row]) -> (Scenario, Vec<PhaseResult>) {
    let requirements: Vec<Value> = rows
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let mut r = json!({"id": format!("REQ-{i}"), "extra_key": i});
            if !DECLARED[s.declared].is_empty() {
                r["status"] = json!(DECLARED[s.declared]);
            }
            if s.validated {
                r["validation"] = json!([{"type": "test", "ref": "test/phases/test-unit.sh"}]);
            }
            if let Some(t) = s.target {
                r["operational_target_id"] = json!(format!("OT-{t}"));
            }
            r
        })
        .collect();
    let results = rows
        .iter()
        .enumerate()
        .filter_map(|(i, s)| {
            OBSERVED[s.observed].map(|status| {
                PhaseResult::new("unit", status).covering([format!("REQ-{i}")])
            })
        })
        .collect();
    let scenario = ScenarioBuilder::new()
        .module("01-core", &module_with("core", requirements))
        .file("test/phases/test-unit.sh", "#!/bin/sh\n")
        .build();
    (scenario, results)
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn second_sync_writes_no_manifests(
        rows in prop::collection::vec(row(), 1..8),
        canonicalize in any::<bool>(),
    ) {
        let (scenario, results) = scenario(&rows);
        let config = EngineConfig::default().with_canonicalize(canonicalize);
        let engine = scenario.engine(config);
        let input = SyncInput::new("prop", scenario.dir()).with_phase_results(results);
        let module = scenario.path("requirements/01-core/module.json");

        block_on(engine.sync(&input)).unwrap();
        let after_first = scenario.fs.contents(&module);
        scenario.fs.clear_ops();

        let second = block_on(engine.sync(&input)).unwrap();
        prop_assert!(second.files_updated.is_empty());
        prop_assert!(second.transitions.is_empty());
        prop_assert!(!scenario.fs.written().contains(&module));
        prop_assert_eq!(scenario.fs.contents(&module), after_first);
    }

    #[test]
    fn read_operations_are_pure(rows in prop::collection::vec(row(), 1..8)) {
        let (scenario, _) = scenario(&rows);
        let engine = scenario.engine(EngineConfig::default());

        let first = block_on(engine.summary(scenario.dir())).unwrap();
        let second = block_on(engine.summary(scenario.dir())).unwrap();
        prop_assert_eq!(first, second);
        prop_assert!(scenario.fs.ops().is_empty());
    }

    #[test]
    fn any_passing_member_passes_its_target(rows in prop::collection::vec(row(), 1..8)) {
        let (scenario, results) = scenario(&rows);
        let engine = scenario.engine(EngineConfig::default().with_update_statuses(false));
        let input = SyncInput::new("prop", scenario.dir()).with_phase_results(results);
        let outcome = block_on(engine.sync(&input)).unwrap();

        for (i, s) in rows.iter().enumerate() {
            let (Some(t), Some("passed")) = (s.target, OBSERVED[s.observed]) else {
                continue;
            };
            let id = format!("OT-{t}");
            let target = outcome.summary.targets.targets.iter().find(|x| x.id == id);
            prop_assert!(target.is_some_and(|x| x.passing), "REQ-{} passed but {} did not", i, id);
        }
    }
}
