// tests/pipeline_properties.rs

use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use kbflow::dag::StepDefinition;
use kbflow::engine::ExecutionOptions;
use kbflow::model::Model;
use kbflow::processing::ProcessingStatus;
use kbflow::types::Role;
use kbflow_test_utils::bodies::{GatedBody, SpyBody, marker, marker_model};
use kbflow_test_utils::builders::EngineBuilder;
use kbflow_test_utils::recording::RecordingCatalog;
use kbflow_test_utils::{eventually, init_tracing, processing_of, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// One generated step: its inputs (indices of earlier steps), its role when
/// it has inputs, and whether its body fails.
#[derive(Debug, Clone)]
struct GenStep {
    inputs: BTreeSet<usize>,
    role: Role,
    fails: bool,
}

// Acyclic by construction: step N only consumes steps 0..N-1.
fn dag_strategy(max_steps: usize) -> impl Strategy<Value = Vec<GenStep>> {
    (1..=max_steps).prop_flat_map(|num_steps| {
        proptest::collection::vec(
            (
                proptest::collection::vec(any::<usize>(), 0..3),
                prop_oneof![
                    Just(Role::Transformation),
                    Just(Role::Mapping),
                    Just(Role::Meta)
                ],
                proptest::bool::weighted(0.25),
            ),
            num_steps,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (deps, role, fails))| GenStep {
                    inputs: if i == 0 {
                        BTreeSet::new()
                    } else {
                        deps.into_iter().map(|d| d % i).collect()
                    },
                    role,
                    fails,
                })
                .collect()
        })
    })
}

fn step_name(i: usize) -> String {
    format!("step_{i}")
}

/// Whether any strict ancestor of `i` fails.
fn has_failing_ancestor(steps: &[GenStep], i: usize, memo: &mut HashMap<usize, bool>) -> bool {
    if let Some(&known) = memo.get(&i) {
        return known;
    }
    let result = steps[i]
        .inputs
        .iter()
        .any(|&j| steps[j].fails || has_failing_ancestor(steps, j, memo));
    memo.insert(i, result);
    result
}

fn is_monotone(history: &[ProcessingStatus]) -> bool {
    use ProcessingStatus::*;
    matches!(
        history,
        [NotStarted]
            | [NotStarted, Running]
            | [NotStarted, Running, Succeeded]
            | [NotStarted, Running, Failed]
            | [NotStarted, Failed]
    )
}

/// Run a generated graph; returns, per step, the final status and how often
/// its body ran, plus whether every recorded history was monotone.
fn run_generated(steps: &[GenStep]) -> Result<(Vec<(ProcessingStatus, usize)>, bool), Box<dyn Error>> {
    let catalog = Arc::new(RecordingCatalog::new());
    let mut builder = EngineBuilder::new().with_catalog(catalog.clone());
    let mut spies = Vec::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        let name = step_name(i);
        let spy = Arc::new(if step.fails {
            SpyBody::failing(&name)
        } else {
            SpyBody::new(&name)
        });
        let role = if step.inputs.is_empty() { Role::Source } else { step.role };
        builder = builder.with_body(&name, role, spy.clone());
        spies.push(spy);
    }
    let engine = builder.build();

    for (i, step) in steps.iter().enumerate() {
        let name = step_name(i);
        let def = if step.inputs.is_empty() {
            StepDefinition::source(&name, format!("ds_{i}"), &name)
        } else {
            StepDefinition::refinement(&name, step.role, &name, step.inputs.iter().map(|&j| step_name(j)))
        };
        engine.create_step("prop", def)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    let handle = runtime.block_on(async {
        tokio::time::timeout(
            Duration::from_secs(5),
            engine.execute_project("prop", &[], ExecutionOptions::default()),
        )
        .await
    })??;

    let mut outcomes = Vec::with_capacity(steps.len());
    for (i, spy) in spies.iter().enumerate() {
        let processing = processing_of(&engine, handle.processings(), &step_name(i))?;
        outcomes.push((processing.status, spy.calls()));
    }
    let monotone = catalog.all_histories().values().all(|h| is_monotone(h));
    Ok((outcomes, monotone))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn statuses_only_move_forward_and_failures_propagate(steps in dag_strategy(8)) {
        init_tracing();
        let (outcomes, monotone) = run_generated(&steps).map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert!(monotone, "a processing left a terminal state or skipped backwards");

        let mut memo = HashMap::new();
        for (i, (status, calls)) in outcomes.iter().enumerate() {
            prop_assert!(status.is_terminal(), "step_{} ended {:?}", i, status);
            if has_failing_ancestor(&steps, i, &mut memo) {
                prop_assert_eq!(*status, ProcessingStatus::Failed, "step_{}", i);
                prop_assert_eq!(*calls, 0, "step_{} computed despite a failed upstream", i);
            } else if steps[i].fails {
                prop_assert_eq!(*status, ProcessingStatus::Failed, "step_{}", i);
                prop_assert_eq!(*calls, 1);
            } else {
                prop_assert_eq!(*status, ProcessingStatus::Succeeded, "step_{}", i);
                prop_assert_eq!(*calls, 1);
            }
        }
    }
}

#[tokio::test]
async fn transformation_chain_keeps_every_contribution() -> TestResult {
    init_tracing();
    let s = Arc::new(SpyBody::new("s"));
    let t1 = Arc::new(SpyBody::new("t1"));
    let t2 = Arc::new(SpyBody::new("t2"));
    let probe = Arc::new(SpyBody::new("probe"));
    let engine = EngineBuilder::new()
        .with_body("s", Role::Source, s.clone())
        .with_body("t1", Role::Transformation, t1.clone())
        .with_body("t2", Role::Transformation, t2.clone())
        .with_body("probe", Role::Transformation, probe.clone())
        .build();
    engine.create_step("p", StepDefinition::source("S", "D1", "s"))?;
    engine.create_step("p", StepDefinition::refinement("T1", Role::Transformation, "t1", ["S"]))?;
    engine.create_step("p", StepDefinition::refinement("T2", Role::Transformation, "t2", ["T1"]))?;
    engine.create_step("p", StepDefinition::refinement("PROBE", Role::Transformation, "probe", ["T2"]))?;

    with_timeout(engine.execute_project("p", &[], ExecutionOptions::default())).await?;

    let t2_input = t2.last_input().ok_or("T2 never ran")?;
    assert_eq!(
        t2_input.data["D1"],
        Model::union([&marker_model("s"), &marker_model("t1")])
    );

    let seen = probe.last_input().ok_or("probe never ran")?;
    assert_eq!(seen.data.len(), 1);
    let d1 = &seen.data["D1"];
    assert_eq!(d1.len(), 3);
    for name in ["s", "t1", "t2"] {
        assert!(d1.contains(&marker(name)), "missing contribution of {name}");
    }
    assert!(seen.meta.is_empty());
    Ok(())
}

#[tokio::test]
async fn mapping_and_meta_expose_no_data() -> TestResult {
    init_tracing();
    let a = Arc::new(SpyBody::new("a"));
    let b = Arc::new(SpyBody::new("b"));
    let m = Arc::new(SpyBody::new("m"));
    let stats = Arc::new(SpyBody::new("stats"));
    let probe = Arc::new(SpyBody::new("probe"));
    let engine = EngineBuilder::new()
        .with_body("a", Role::Source, a.clone())
        .with_body("b", Role::Source, b.clone())
        .with_body("m", Role::Mapping, m.clone())
        .with_body("stats", Role::Meta, stats.clone())
        .with_body("probe", Role::Transformation, probe.clone())
        .build();
    engine.create_step("p", StepDefinition::source("A", "D1", "a"))?;
    engine.create_step("p", StepDefinition::source("B", "D2", "b"))?;
    engine.create_step("p", StepDefinition::refinement("M", Role::Mapping, "m", ["A", "B"]))?;
    engine.create_step("p", StepDefinition::refinement("STATS", Role::Meta, "stats", ["M", "A"]))?;
    engine.create_step("p", StepDefinition::refinement("PROBE", Role::Transformation, "probe", ["STATS", "M"]))?;

    let handle = with_timeout(engine.execute_project("p", &[], ExecutionOptions::default())).await?;
    for step in ["A", "B", "M", "STATS", "PROBE"] {
        let processing = processing_of(&engine, handle.processings(), step)?;
        assert_eq!(processing.status, ProcessingStatus::Succeeded, "step {step}");
    }

    // The meta step still sees the data of its direct source input.
    let stats_input = stats.last_input().ok_or("meta step never ran")?;
    assert_eq!(stats_input.data.keys().collect::<Vec<_>>(), vec!["D1"]);
    assert_eq!(stats_input.meta, marker_model("m"));

    // Neither the mapping nor the meta step hands data on.
    let seen = probe.last_input().ok_or("probe never ran")?;
    assert!(seen.data.is_empty());
    assert_eq!(seen.meta.len(), 2);
    assert!(seen.meta.contains(&marker("m")));
    assert!(seen.meta.contains(&marker("stats")));
    Ok(())
}

#[tokio::test]
async fn downstream_waits_for_a_running_upstream() -> TestResult {
    init_tracing();
    let s = Arc::new(SpyBody::new("s"));
    let gate = Arc::new(GatedBody::new("g"));
    let after = Arc::new(SpyBody::new("after"));
    let engine = EngineBuilder::new()
        .with_body("s", Role::Source, s.clone())
        .with_body("g", Role::Mapping, gate.clone())
        .with_body("after", Role::Meta, after.clone())
        .build();
    engine.create_step("p", StepDefinition::source("S", "D1", "s"))?;
    engine.create_step("p", StepDefinition::refinement("G", Role::Mapping, "g", ["S"]))?;
    engine.create_step("p", StepDefinition::refinement("AFTER", Role::Meta, "after", ["G"]))?;

    let options = ExecutionOptions {
        wait: false,
        ..ExecutionOptions::default()
    };
    let handle = with_timeout(engine.execute_project("p", &[], options)).await?;
    assert!(engine.is_executing("p"));

    eventually(|| gate.entered()).await;
    let g = processing_of(&engine, handle.processings(), "G")?;
    assert_eq!(g.status, ProcessingStatus::Running);

    // Give the downstream every chance to run early.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(after.calls(), 0);
    assert!(!handle.is_finished());
    let waiting = processing_of(&engine, handle.processings(), "AFTER")?;
    assert!(!waiting.is_terminal());

    gate.open();
    with_timeout(handle.wait()).await;

    assert_eq!(after.calls(), 1);
    let seen = after.last_input().ok_or("downstream never ran")?;
    assert!(seen.meta.contains(&marker("g")));
    assert!(seen.data.is_empty());
    let done = processing_of(&engine, handle.processings(), "AFTER")?;
    assert_eq!(done.status, ProcessingStatus::Succeeded);

    eventually(|| !engine.is_executing("p")).await;
    Ok(())
}
