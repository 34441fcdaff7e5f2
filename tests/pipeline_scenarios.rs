// tests/pipeline_scenarios.rs

use std::error::Error;
use std::sync::Arc;

use serde_json::json;

use kbflow::dag::StepDefinition;
use kbflow::engine::{Engine, ExecutionOptions};
use kbflow::errors::KbflowError;
use kbflow::model::{Model, vocab};
use kbflow::processing::ProcessingStatus;
use kbflow::processor::ProcessorRegistry;
use kbflow::types::Role;
use kbflow_test_utils::bodies::{SpyBody, marker, marker_model};
use kbflow_test_utils::builders::EngineBuilder;
use kbflow_test_utils::{init_tracing, processing_of, with_timeout};
use oxrdf::{NamedNode, Triple};

type TestResult = Result<(), Box<dyn Error>>;

const LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";

/// S1 (D1) and S2 (D2) feeding one mapping step M.
struct TwoSources {
    engine: Engine,
    s1: Arc<SpyBody>,
    s2: Arc<SpyBody>,
    m: Arc<SpyBody>,
}

fn two_sources_and_mapping(s1: SpyBody) -> Result<TwoSources, Box<dyn Error>> {
    let s1 = Arc::new(s1);
    let s2 = Arc::new(SpyBody::new("s2"));
    let m = Arc::new(SpyBody::new("m"));
    let engine = EngineBuilder::new()
        .with_body("load-s1", Role::Source, s1.clone())
        .with_body("load-s2", Role::Source, s2.clone())
        .with_body("match", Role::Mapping, m.clone())
        .build();

    engine.create_step("p", StepDefinition::source("S1", "D1", "load-s1"))?;
    engine.create_step("p", StepDefinition::source("S2", "D2", "load-s2"))?;
    engine.create_step(
        "p",
        StepDefinition::refinement("M", Role::Mapping, "match", ["S1", "S2"]),
    )?;

    Ok(TwoSources { engine, s1, s2, m })
}

fn inline_source(id: &str, dataset: &str, data: &str) -> StepDefinition {
    StepDefinition::source(id, dataset, "ntriples-inline").with_parameters(json!({ "data": data }))
}

#[tokio::test]
async fn scenario_a_sources_feed_mapping_per_dataset() -> TestResult {
    init_tracing();
    let fx = two_sources_and_mapping(SpyBody::new("s1"))?;

    let handle = with_timeout(fx.engine.execute_project("p", &[], ExecutionOptions::default())).await?;
    assert!(handle.is_finished());
    assert_eq!(handle.processings().len(), 3);

    for step in ["S1", "S2", "M"] {
        let processing = processing_of(&fx.engine, handle.processings(), step)?;
        assert_eq!(processing.status, ProcessingStatus::Succeeded, "step {step}");
        assert!(processing.start_time.is_some() && processing.end_time.is_some());
    }
    assert_eq!((fx.s1.calls(), fx.s2.calls(), fx.m.calls()), (1, 1, 1));

    // M saw one group per dataset and nothing else.
    let input = fx.m.last_input().ok_or("mapping never ran")?;
    assert_eq!(input.data.keys().collect::<Vec<_>>(), vec!["D1", "D2"]);
    assert_eq!(input.data["D1"], marker_model("s1"));
    assert_eq!(input.data["D2"], marker_model("s2"));
    assert!(input.meta.is_empty());

    let m = processing_of(&fx.engine, handle.processings(), "M")?;
    assert_eq!(fx.engine.get_result_model(m.id)?, marker_model("m"));
    Ok(())
}

#[tokio::test]
async fn scenario_a_mapping_without_matches_adds_nothing() -> TestResult {
    init_tracing();
    let engine = Engine::in_memory(ProcessorRegistry::with_builtins());
    let alpha = format!("<urn:a:1> <{LABEL}> \"alpha\" .\n");
    let beta = format!("<urn:b:1> <{LABEL}> \"beta\" .\n");
    engine.create_step("p", inline_source("S1", "D1", &alpha))?;
    engine.create_step("p", inline_source("S2", "D2", &beta))?;
    engine.create_step(
        "p",
        StepDefinition::refinement("M", Role::Mapping, "equivalent-value", ["S1", "S2"])
            .with_parameters(json!({ "property": LABEL })),
    )?;

    let handle = with_timeout(engine.execute_project("p", &[], ExecutionOptions::default())).await?;

    let m = processing_of(&engine, handle.processings(), "M")?;
    assert_eq!(m.status, ProcessingStatus::Succeeded);
    assert!(engine.get_result_model(m.id)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn scenario_a_mapping_reports_shared_values_both_ways() -> TestResult {
    init_tracing();
    let engine = Engine::in_memory(ProcessorRegistry::with_builtins());
    let left = format!("<urn:a:1> <{LABEL}> \"Oslo\" .\n<urn:a:2> <{LABEL}> \"Bergen\" .\n");
    let right = format!("<urn:b:7> <{LABEL}> \"Oslo\" .\n");
    engine.create_step("p", inline_source("S1", "D1", &left))?;
    engine.create_step("p", inline_source("S2", "D2", &right))?;
    engine.create_step(
        "p",
        StepDefinition::refinement("M", Role::Mapping, "equivalent-value", ["S1", "S2"])
            .with_parameters(json!({ "property": LABEL })),
    )?;

    let handle = with_timeout(engine.execute_project("p", &[], ExecutionOptions::default())).await?;

    let m = processing_of(&engine, handle.processings(), "M")?;
    let model = engine.get_result_model(m.id)?;
    let a = NamedNode::new_unchecked("urn:a:1");
    let b = NamedNode::new_unchecked("urn:b:7");
    assert_eq!(model.len(), 2);
    assert!(model.contains(&Triple::new(a.clone(), vocab::CORRESPONDS_TO.into_owned(), b.clone())));
    assert!(model.contains(&Triple::new(b, vocab::CORRESPONDS_TO.into_owned(), a)));
    Ok(())
}

#[tokio::test]
async fn scenario_b_failed_source_fails_only_its_dependents() -> TestResult {
    init_tracing();
    let fx = two_sources_and_mapping(SpyBody::failing("s1"))?;

    let handle = with_timeout(fx.engine.execute_project("p", &[], ExecutionOptions::default())).await?;

    let s1 = processing_of(&fx.engine, handle.processings(), "S1")?;
    assert_eq!(s1.status, ProcessingStatus::Failed);
    let s1_error = s1.error.ok_or("S1 has no error record")?;
    assert!(s1_error.mentions("no such file"), "got: {s1_error:#}");
    assert!(s1.result_hash.is_none());

    let s2 = processing_of(&fx.engine, handle.processings(), "S2")?;
    assert_eq!(s2.status, ProcessingStatus::Succeeded);

    let m = processing_of(&fx.engine, handle.processings(), "M")?;
    assert_eq!(m.status, ProcessingStatus::Failed);
    let m_error = m.error.ok_or("M has no error record")?;
    assert!(m_error.message.contains("'S1'"), "got: {m_error:#}");
    // The whole chain down to the I/O error survives the hop.
    assert!(m_error.mentions("no such file"));
    assert_eq!(m_error.depth(), s1_error.depth() + 1);

    assert_eq!(fx.m.calls(), 0);
    assert_eq!(fx.s2.calls(), 1);
    assert!(matches!(
        fx.engine.get_result_model(m.id),
        Err(KbflowError::NotSucceeded(id)) if id == m.id
    ));
    Ok(())
}

#[tokio::test]
async fn scenario_c_resume_reuses_the_stored_source_result() -> TestResult {
    init_tracing();
    let fx = two_sources_and_mapping(SpyBody::new("s1"))?;

    let first = with_timeout(fx.engine.execute_project("p", &[], ExecutionOptions::default())).await?;
    let s1_first = processing_of(&fx.engine, first.processings(), "S1")?;
    assert_eq!(s1_first.status, ProcessingStatus::Succeeded);

    let second = with_timeout(fx.engine.execute_project(
        "p",
        &[s1_first.id],
        ExecutionOptions::default(),
    ))
    .await?;

    // S1 is reused, not recomputed.
    assert_eq!(fx.s1.calls(), 1);
    assert_eq!(fx.engine.processings_of_step("S1")?.len(), 1);
    assert!(second.processings().contains(&s1_first.id));

    // S2 and M get fresh processings.
    assert_eq!(fx.s2.calls(), 2);
    assert_eq!(fx.m.calls(), 2);
    assert_eq!(fx.engine.processings_of_step("S2")?.len(), 2);
    let m_second = processing_of(&fx.engine, second.processings(), "M")?;
    assert_eq!(m_second.status, ProcessingStatus::Succeeded);
    assert!(m_second.input_processings.contains(&s1_first.id));

    // M read S1's stored model.
    let input = fx.m.last_input().ok_or("mapping never ran")?;
    assert_eq!(input.data["D1"], marker_model("s1"));
    assert!(input.data["D1"].contains(&marker("s1")));
    Ok(())
}

#[tokio::test]
async fn resuming_from_a_finished_sink_reuses_its_whole_lineage() -> TestResult {
    init_tracing();
    let fx = two_sources_and_mapping(SpyBody::new("s1"))?;

    let first = with_timeout(fx.engine.execute_project("p", &[], ExecutionOptions::default())).await?;
    let m_first = processing_of(&fx.engine, first.processings(), "M")?;

    let second = with_timeout(fx.engine.execute_project(
        "p",
        &[m_first.id],
        ExecutionOptions::default(),
    ))
    .await?;

    assert!(second.is_finished());
    let mut reused = second.processings().to_vec();
    let mut original = first.processings().to_vec();
    reused.sort();
    original.sort();
    assert_eq!(reused, original);
    assert_eq!((fx.s1.calls(), fx.s2.calls(), fx.m.calls()), (1, 1, 1));
    Ok(())
}

#[tokio::test]
async fn resuming_from_an_unknown_processing_writes_nothing() -> TestResult {
    init_tracing();
    let fx = two_sources_and_mapping(SpyBody::new("s1"))?;
    let missing = kbflow::processing::ProcessingId::new();

    let result = fx
        .engine
        .execute_project("p", &[missing], ExecutionOptions::default())
        .await;

    assert!(matches!(result, Err(KbflowError::ProcessingNotFound(id)) if id == missing));
    for step in ["S1", "S2", "M"] {
        assert!(fx.engine.processings_of_step(step)?.is_empty());
    }
    assert!(!fx.engine.is_executing("p"));
    Ok(())
}

#[tokio::test]
async fn resuming_from_a_transformation_rebuilds_its_data_lineage() -> TestResult {
    init_tracing();
    let s = Arc::new(SpyBody::new("s"));
    let t1 = Arc::new(SpyBody::new("t1"));
    let t2 = Arc::new(SpyBody::new("t2"));
    let engine = EngineBuilder::new()
        .with_body("s", Role::Source, s.clone())
        .with_body("t1", Role::Transformation, t1.clone())
        .with_body("t2", Role::Transformation, t2.clone())
        .build();
    engine.create_step("p", StepDefinition::source("S", "D1", "s"))?;
    engine.create_step("p", StepDefinition::refinement("T1", Role::Transformation, "t1", ["S"]))?;
    engine.create_step("p", StepDefinition::refinement("T2", Role::Transformation, "t2", ["T1"]))?;

    let first = with_timeout(engine.execute_project("p", &[], ExecutionOptions::default())).await?;
    let t1_first = processing_of(&engine, first.processings(), "T1")?;

    let second = with_timeout(engine.execute_project("p", &[t1_first.id], ExecutionOptions::default())).await?;
    assert!(second.processings().contains(&t1_first.id));
    assert_eq!((s.calls(), t1.calls(), t2.calls()), (1, 1, 2));

    // Only T1's own model is stored; the source's contribution comes back
    // through T1's recorded inputs.
    let input = t2.last_input().ok_or("T2 never ran")?;
    assert_eq!(input.data.keys().collect::<Vec<_>>(), vec!["D1"]);
    assert_eq!(input.data["D1"], Model::union([&marker_model("s"), &marker_model("t1")]));

    let t2_second = processing_of(&engine, second.processings(), "T2")?;
    assert_eq!(t2_second.status, ProcessingStatus::Succeeded);
    assert!(t2_second.input_processings.contains(&t1_first.id));
    Ok(())
}

#[tokio::test]
async fn resuming_from_a_failed_processing_fails_dependents_unstarted() -> TestResult {
    init_tracing();
    let s = Arc::new(SpyBody::failing("s"));
    let t = Arc::new(SpyBody::new("t"));
    let engine = EngineBuilder::new()
        .with_body("s", Role::Source, s.clone())
        .with_body("t", Role::Transformation, t.clone())
        .build();
    engine.create_step("p", StepDefinition::source("S", "D1", "s"))?;
    engine.create_step("p", StepDefinition::refinement("T", Role::Transformation, "t", ["S"]))?;

    let first = with_timeout(engine.execute_project("p", &[], ExecutionOptions::default())).await?;
    let s_failed = processing_of(&engine, first.processings(), "S")?;
    assert_eq!(s_failed.status, ProcessingStatus::Failed);

    let second = with_timeout(engine.execute_project("p", &[s_failed.id], ExecutionOptions::default())).await?;
    assert_eq!(second.summary().map(|s| s.dispatched), Some(0));
    assert_eq!(engine.processings_of_step("S")?.len(), 1);
    assert_eq!((s.calls(), t.calls()), (1, 0));

    let dependent = processing_of(&engine, second.processings(), "T")?;
    assert_eq!(dependent.status, ProcessingStatus::Failed);
    assert!(dependent.start_time.is_none());
    assert_eq!(dependent.input_processings.iter().collect::<Vec<_>>(), vec![&s_failed.id]);
    let error = dependent.error.ok_or("T has no error record")?;
    assert_eq!(error.message, "Upstream step 'S' of step 'T' failed");
    assert!(error.mentions("no such file"), "got: {error:#}");
    Ok(())
}

#[tokio::test]
async fn curated_incorrespondence_suppresses_a_value_match() -> TestResult {
    init_tracing();
    let engine = Engine::in_memory(ProcessorRegistry::with_builtins());
    let left = format!(
        "<urn:a:1> <{LABEL}> \"Springfield\" .\n<urn:a:2> <{LABEL}> \"Oslo\" .\n<urn:a:3> <{LABEL}> \"Bergen\" .\n"
    );
    let right = format!(
        "<urn:b:1> <{LABEL}> \"Springfield\" .\n<urn:b:2> <{LABEL}> \"Oslo\" .\n<urn:b:3> <{LABEL}> \"Bergen\" .\n"
    );
    engine.create_step("p", inline_source("S1", "D1", &left))?;
    engine.create_step("p", inline_source("S2", "D2", &right))?;
    engine.create_step(
        "p",
        StepDefinition::refinement("CURATED", Role::Mapping, "manual-mapping", ["S1", "S2"]).with_parameters(json!({
            "corresponding": [["urn:a:2", "urn:b:2"]],
            "not_corresponding": [["urn:a:1", "urn:b:1"]],
        })),
    )?;
    engine.create_step(
        "p",
        StepDefinition::refinement("M", Role::Mapping, "equivalent-value", ["S1", "S2", "CURATED"])
            .with_parameters(json!({ "property": LABEL })),
    )?;

    let handle = with_timeout(engine.execute_project("p", &[], ExecutionOptions::default())).await?;

    let curated = processing_of(&engine, handle.processings(), "CURATED")?;
    let asserted = engine.get_result_model(curated.id)?;
    assert_eq!(asserted.len(), 4);
    assert!(asserted.contains(&Triple::new(
        NamedNode::new_unchecked("urn:b:1"),
        vocab::CORRESPONDS_NOT_TO.into_owned(),
        NamedNode::new_unchecked("urn:a:1"),
    )));

    // Only the pair nobody spoke about is matched.
    let m = processing_of(&engine, handle.processings(), "M")?;
    let matched = engine.get_result_model(m.id)?;
    let a = NamedNode::new_unchecked("urn:a:3");
    let b = NamedNode::new_unchecked("urn:b:3");
    assert_eq!(matched.len(), 2, "got: {matched:?}");
    assert!(matched.contains(&Triple::new(a.clone(), vocab::CORRESPONDS_TO.into_owned(), b.clone())));
    assert!(matched.contains(&Triple::new(b, vocab::CORRESPONDS_TO.into_owned(), a)));
    Ok(())
}

#[test]
fn manual_mapping_rejects_unknown_parameters() -> TestResult {
    let engine = Engine::in_memory(ProcessorRegistry::with_builtins());
    engine.create_step("p", inline_source("S1", "D1", ""))?;
    let result = engine.create_step(
        "p",
        StepDefinition::refinement("CURATED", Role::Mapping, "manual-mapping", ["S1"])
            .with_parameters(json!({ "mappings": [["urn:a:1", "urn:b:1"]] })),
    );
    assert!(matches!(result, Err(KbflowError::Definition(_))), "got: {result:?}");
    Ok(())
}
