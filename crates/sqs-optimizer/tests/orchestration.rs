//! End-to-end behaviour of the orchestrator against the synthetic engine.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use sqs_engine::{SearchSettings, SyntheticEngine};
use sqs_optimizer::telemetry::{init_tracing, DEFAULT_FILTER};
use sqs_optimizer::{Orchestrator, OrchestratorConfig, RunEvent, DEFAULT_DOCS_URL};
use sqs_types::{
    Configuration, Control, EngineFault, Precision, ProgressSnapshot, RunError, Severity,
    SqsError,
};

fn iron_aluminide() -> Configuration {
    json!({
        "iterations": 1_000_000,
        "structure": {
            "lattice": [[2.86, 0.0, 0.0], [0.0, 2.86, 0.0], [0.0, 0.0, 2.86]],
            "coords": [[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]],
            "species": ["Fe", "Fe"],
            "supercell": [3, 3, 3]
        },
        "composition": [{"Fe": 45, "Al": 9}],
        "target_objective": 0
    })
}

fn with(mut config: Configuration, key: &str, value: Configuration) -> Configuration {
    if let Some(fields) = config.as_object_mut() {
        fields.insert(key.to_string(), value);
    }
    config
}

fn orchestrator(settings: SearchSettings) -> Orchestrator<SyntheticEngine> {
    init_tracing(DEFAULT_FILTER);
    Orchestrator::new(
        Arc::new(SyntheticEngine::new(settings)),
        OrchestratorConfig::default(),
    )
}

fn reporting_every(report_every: u64) -> SearchSettings {
    SearchSettings {
        report_every,
        ..SearchSettings::default()
    }
}

#[test]
fn malformed_composition_yields_one_warning() {
    let orchestrator = orchestrator(SearchSettings::default());
    let config = with(iron_aluminide(), "composition", json!([{"Fe": 45, "Al": 8}]));

    let diagnostics = orchestrator.validate(&config);
    assert_eq!(diagnostics.len(), 1);
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic.severity, Severity::Warning);
    assert_eq!(diagnostic.path, vec!["composition", "sites"]);
    assert!(!diagnostic.message.is_empty());
    assert_eq!(
        diagnostic.help_url.as_deref(),
        Some(format!("{DEFAULT_DOCS_URL}#composition").as_str())
    );

    // nothing changed, nothing new to say
    assert_eq!(orchestrator.validate(&config), diagnostics);
}

#[test]
fn oversized_supercell_is_a_diagnostic() {
    let orchestrator = orchestrator(SearchSettings::default());
    let mut config = with(iron_aluminide(), "composition", json!({"Fe": 1}));
    config["structure"]["supercell"] = json!([1_000_000, 1_000_000, 1_000]);

    let diagnostics = orchestrator.validate(&config);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].path, vec!["supercell"]);
}

#[test]
fn valid_configuration_has_no_diagnostics() {
    let orchestrator = orchestrator(SearchSettings::default());
    assert!(orchestrator.validate(&iron_aluminide()).is_empty());
}

#[test]
fn unmapped_keys_keep_their_name() {
    let orchestrator = orchestrator(SearchSettings::default());

    let diagnostics = orchestrator.validate(&with(iron_aluminide(), "iteration_mode", json!("brute")));
    assert_eq!(diagnostics[0].path, vec!["iteration_mode"]);

    let diagnostics = orchestrator.validate(&json!(42));
    assert!(diagnostics[0].path.is_empty());
}

#[test]
fn shared_link_reproduces_the_configuration() {
    let orchestrator = orchestrator(SearchSettings::default());
    let config = iron_aluminide();

    let link = orchestrator.share(&config).unwrap();
    assert!(link.as_str().starts_with(&orchestrator.config().app_url));
    assert!(link.query_pairs().any(|(name, _)| name == "config"));
    assert_eq!(orchestrator.load(link.as_str()).unwrap(), config);
}

#[tokio::test]
async fn progress_arrives_in_order_before_the_result() {
    let orchestrator = orchestrator(reporting_every(100));
    let config = with(iron_aluminide(), "iterations", json!(2_000));

    let mut seen: Vec<ProgressSnapshot> = Vec::new();
    let result = orchestrator
        .submit(&config, Some(Precision::Double), |snapshot| {
            seen.push(*snapshot);
            Control::Continue
        })
        .await
        .unwrap();

    assert_eq!(seen.len(), 20);
    assert!(seen.windows(2).all(|w| w[0].finished < w[1].finished));
    assert!(seen
        .windows(2)
        .all(|w| w[1].best_objective <= w[0].best_objective));

    let last = seen.last().unwrap();
    assert_eq!(last.working, 0);
    assert_eq!(last.finished, result.finished);
    assert_eq!(result.finished, 2_000);
    assert_eq!(result.best_objective, Some(last.best_objective));
    assert_eq!(result.precision, Precision::Double);
    assert!(!result.cancelled);
}

#[tokio::test]
async fn stop_on_first_snapshot_settles() {
    let orchestrator = orchestrator(SearchSettings {
        report_every: 10,
        report_delay: Some(Duration::from_millis(1)),
        ..SearchSettings::default()
    });

    let mut snapshots = 0;
    let alloy = iron_aluminide();
    let submission = orchestrator.submit(&alloy, None, |_| {
        snapshots += 1;
        Control::Stop
    });
    let result = tokio::time::timeout(Duration::from_secs(30), submission)
        .await
        .expect("run did not settle")
        .unwrap();

    assert!(result.cancelled);
    assert!(result.finished < 1_000_000);
    assert!(snapshots >= 1);
}

#[tokio::test]
async fn handle_events_end_with_the_settlement() {
    let orchestrator = orchestrator(reporting_every(50));
    let config = with(iron_aluminide(), "iterations", json!(500));

    let mut handle = orchestrator.start(&config, None).unwrap();
    let run_id = handle.run_id();
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }

    let (last, progress) = events.split_last().unwrap();
    assert!(progress.iter().all(|e| matches!(e, RunEvent::Progress(_))));
    assert_eq!(progress.len(), 10);
    match last {
        RunEvent::Settled(Ok(result)) => {
            assert_eq!(result.run_id, run_id);
            assert_eq!(result.precision, Precision::Single);
        }
        other => panic!("unexpected final event: {other:?}"),
    }
}

#[tokio::test]
async fn one_run_at_a_time() {
    let orchestrator = orchestrator(SearchSettings {
        report_every: 10,
        report_delay: Some(Duration::from_millis(5)),
        ..SearchSettings::default()
    });

    let first = orchestrator.start(&iron_aluminide(), None).unwrap();
    match orchestrator.start(&iron_aluminide(), None) {
        Err(SqsError::Run(RunError::AlreadyRunning { run_id })) => {
            assert_eq!(run_id, first.run_id())
        }
        other => panic!("expected AlreadyRunning, got {:?}", other.map(|h| h.run_id())),
    }

    first.cancel();
    let result = tokio::time::timeout(Duration::from_secs(30), first.wait())
        .await
        .expect("run did not settle")
        .unwrap();
    assert!(result.cancelled);
    assert!(orchestrator.runner().in_flight().is_none());
}

#[tokio::test]
async fn engine_fault_surfaces_unmodified() {
    init_tracing(DEFAULT_FILTER);
    let fault = EngineFault::new("allocation failed").with_payload(json!({"errno": 12}));
    let engine = SyntheticEngine::new(SearchSettings::default()).with_failure(fault.clone());
    let orchestrator = Orchestrator::new(Arc::new(engine), OrchestratorConfig::default());

    let err = orchestrator
        .submit(&iron_aluminide(), None, |_| Control::Continue)
        .await
        .unwrap_err();
    match err {
        SqsError::Run(RunError::Engine(surfaced)) => assert_eq!(surfaced, fault),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn linked_configuration_runs() {
    let orchestrator = orchestrator(reporting_every(1_000));
    let config = with(
        with(iron_aluminide(), "iterations", json!(200)),
        "prec",
        json!(1),
    );

    let link = orchestrator.share(&config).unwrap();
    let result = orchestrator
        .submit_link(link.as_str(), None, |_| Control::Continue)
        .await
        .unwrap();
    assert_eq!(result.finished, 200);
    assert_eq!(result.precision, Precision::Double);
}

#[tokio::test]
async fn rejected_link_payload_is_not_run() {
    let orchestrator = orchestrator(SearchSettings::default());
    let config = with(iron_aluminide(), "composition", json!({"Fe": 1}));
    let token = sqs_codec::encode(&config).unwrap();
    let link = format!("https://sqsgen.gehringer.tech/?config={token}");

    let err = orchestrator
        .submit_link(&link, None, |_| Control::Continue)
        .await
        .unwrap_err();
    assert!(matches!(err, SqsError::Rejected { .. }));
    assert!(orchestrator.runner().in_flight().is_none());
}
