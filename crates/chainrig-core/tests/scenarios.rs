//! Fault injection scenarios against the simulated network, plus a full
//! orchestrate-then-evaluate run.

use std::sync::Arc;
use std::time::Duration;

use chainrig_api::{ChainSpec, SimulatedNetwork, SimulatedNetworkConfig};
use chainrig_core::evaluators::{self, DoubleBlockInjection, DoubleVoteInjection, ValidatorsSlashed};
use async_trait::async_trait;
use chainrig_api::Epoch;
use chainrig_core::{
    build_orchestrator, on_epoch, run_end_to_end, ComponentHandle, ComponentRole, ComponentState,
    EvalError, EvalResult, Evaluation, EvaluationContext, EvaluationScheduler, Evaluator,
    GateConfig, GateError, NetworkHandles, Orchestrator, OrchestratorConfig, OrchestratorError,
    ReadinessGate, RunError, Runnable, SchedulerConfig, SimComponentFactory, SimulatedComponent,
    TopologyConfig,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const SLOT: Duration = Duration::from_millis(100);

fn network(validators: u64, seed: u64) -> (Arc<SimulatedNetwork>, NetworkHandles) {
    let net = SimulatedNetwork::new(SimulatedNetworkConfig {
        spec: ChainSpec::default().with_slot_duration(SLOT),
        validator_count: validators,
        seed,
    });
    let handles = NetworkHandles::new(net.endpoints(2), net.keystore(), net.spec().clone());
    (net, handles)
}

/// Sleep until the head is at the first slot of `epoch`.
async fn advance_to_epoch(epoch: u64) {
    tokio::time::sleep(SLOT * (8 * epoch as u32)).await;
}

#[tokio::test(start_paused = true)]
async fn scenario_a_double_vote_adds_two_fresh_entries() {
    let (net, handles) = network(64, 11);
    advance_to_epoch(5).await;
    let ctx = EvaluationContext::new(11, CancellationToken::new());

    // Validator 3 sits on the committee for slot 39; pretend it was already hit.
    ctx.ledger().try_record(3);

    DoubleVoteInjection::default()
        .evaluate(5, &ctx, &handles)
        .await
        .unwrap();
    let after_first = ctx.ledger().indices();
    assert_eq!(after_first.len(), 3);
    assert!(after_first.contains(&3));

    DoubleVoteInjection::default()
        .evaluate(5, &ctx, &handles)
        .await
        .unwrap();
    let after_second = ctx.ledger().indices();
    assert_eq!(after_second.len(), 5);
    let mut deduped = after_second.clone();
    deduped.dedup();
    assert_eq!(deduped, after_second);

    // 3 was never submitted, so only the four fresh picks are slashed.
    let slashed = net.slashed_indices();
    assert_eq!(slashed.len(), 4);
    assert!(!slashed.contains(&3));
}

#[tokio::test(start_paused = true)]
async fn scenario_b_consequences_hold_after_epoch_eight() {
    let (_net, handles) = network(64, 12);
    let ctx = EvaluationContext::new(12, CancellationToken::new());

    advance_to_epoch(5).await;
    DoubleVoteInjection::default()
        .evaluate(5, &ctx, &handles)
        .await
        .unwrap();
    assert_eq!(ctx.ledger().len(), 2);

    advance_to_epoch(4).await;
    let consequences = [
        evaluators::by_name("validators_slashed@8").unwrap(),
        evaluators::by_name("slashed_validators_lose_balance@8").unwrap(),
    ];
    for ev in &consequences {
        assert!(!ev.is_due(8));
        assert!(ev.is_due(9));
        ev.evaluation().evaluate(9, &ctx, &handles).await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn scenario_b_unslashed_entry_fails_consequence() {
    let (_net, handles) = network(64, 12);
    let ctx = EvaluationContext::new(12, CancellationToken::new());
    advance_to_epoch(5).await;
    DoubleVoteInjection::default()
        .evaluate(5, &ctx, &handles)
        .await
        .unwrap();
    // An index that never misbehaved.
    ctx.ledger().try_record(0);

    let err = ValidatorsSlashed.evaluate(9, &ctx, &handles).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("expected 3 slashed validators, found 2"), "{msg}");
}

#[tokio::test(start_paused = true)]
async fn scenario_c_double_block_needs_both_rejections() {
    let (net, handles) = network(32, 13);
    advance_to_epoch(6).await;
    let ctx = EvaluationContext::new(13, CancellationToken::new());

    DoubleBlockInjection.evaluate(6, &ctx, &handles).await.unwrap();
    assert_eq!(ctx.ledger().len(), 1);
    assert_eq!(net.submissions_to("beacon-node-0"), 2);
    assert_eq!(net.submissions_to("beacon-node-1"), 0);

    net.set_block_validation(false);
    let fresh = EvaluationContext::new(14, CancellationToken::new());
    tokio::time::sleep(SLOT).await;
    let err = DoubleBlockInjection
        .evaluate(6, &fresh, &handles)
        .await
        .unwrap_err();
    assert!(matches!(err, EvalError::ExpectedRejection { .. }));
    assert!(err.to_string().contains("expected block to fail processing"));
    assert!(fresh.ledger().is_empty());
}

#[tokio::test(start_paused = true)]
async fn scenario_d_zero_timeout_gate_fails_within_one_poll() {
    let poll = Duration::from_millis(250);
    let gate = ReadinessGate::new(GateConfig {
        timeout: Duration::ZERO,
        poll_interval: poll,
    });
    let never = Arc::new(SimulatedComponent::new("bootnode")) as Arc<dyn Runnable>;

    let began = Instant::now();
    let err = gate
        .wait_all(&[never], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(began.elapsed() <= poll);
    assert!(matches!(err, GateError::DependencyTimeout { ref pending, .. } if pending == &["bootnode"]));
}

#[tokio::test(start_paused = true)]
async fn scenario_d_orchestrator_names_the_missing_dependency() {
    let mut orch = Orchestrator::new(OrchestratorConfig {
        gate: GateConfig {
            timeout: Duration::ZERO,
            poll_interval: Duration::from_millis(100),
        },
    });
    let bootnode = SimulatedComponent::new("bootnode").with_startup_delay(Duration::from_secs(3_600));
    orch.add_component("bootnode", ComponentHandle::Single(Arc::new(bootnode)), &[])
        .unwrap();
    orch.add_component(
        "beacon-node",
        ComponentHandle::Single(Arc::new(SimulatedComponent::new("beacon-node"))),
        &["bootnode"],
    )
    .unwrap();

    let err = orch.run().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::DependencyNotReady { .. }), "{err}");
    assert!(err.to_string().starts_with("beacon-node requires bootnode to run"), "{err}");
    assert_eq!(err.component(), Some("beacon-node"));
}

fn scheduler(epochs: u64, names: &[&str]) -> EvaluationScheduler {
    EvaluationScheduler::new(
        SchedulerConfig {
            epochs,
            parallel: false,
            epoch_timeout: Duration::from_secs(30),
            poll_interval: SLOT,
        },
        evaluators::build_all(names).unwrap(),
    )
}

fn fast_orchestrator_config() -> OrchestratorConfig {
    OrchestratorConfig {
        gate: GateConfig {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(50),
        },
    }
}

#[tokio::test(start_paused = true)]
async fn full_run_passes_default_style_evaluators() {
    let (net, handles) = network(64, 21);
    let orch = build_orchestrator(
        &TopologyConfig::default(),
        &SimComponentFactory::new(Duration::from_millis(150)),
        fast_orchestrator_config(),
        CancellationToken::new(),
    )
    .unwrap();
    let scheduler = scheduler(
        9,
        &[
            "healthz",
            "finalization_occurs",
            "validators_participating",
            "balance_history",
            "inject_double_vote@5",
            "inject_double_block@6",
            "validators_slashed@8",
            "slashed_validators_lose_balance@8",
        ],
    );

    let artifacts = run_end_to_end(&orch, &scheduler, &handles, 21).await;

    assert!(artifacts.result.is_ok(), "{:?}", artifacts.result);
    let report = &artifacts.report;
    assert!(report.passed);
    assert_eq!(report.last_completed_epoch, Some(9));
    assert!(report.injected_faults.len() >= 2);
    assert_eq!(net.slashed_indices(), report.injected_faults);
    assert!(report
        .evaluations
        .iter()
        .any(|r| r.name == "validators_slashed_9" && r.passed));
    assert!(!report.processes.is_empty());
    // 64 validators for each of epochs 0..9.
    assert_eq!(artifacts.balance_history.len(), 64 * 9);
    assert!(orch
        .started_components()
        .iter()
        .all(|c| orch.state(c) == Some(ComponentState::Stopped)));
}

#[tokio::test(start_paused = true)]
async fn full_run_reports_orchestration_failure() {
    let (_net, handles) = network(16, 22);
    let orch = build_orchestrator(
        &TopologyConfig::default(),
        &SimComponentFactory::new(Duration::from_millis(10))
            .with_failing_role(ComponentRole::Bootnode),
        fast_orchestrator_config(),
        CancellationToken::new(),
    )
    .unwrap();
    let scheduler = scheduler(3, &["healthz"]);

    let artifacts = run_end_to_end(&orch, &scheduler, &handles, 22).await;

    assert!(matches!(artifacts.result, Err(RunError::Orchestration(_))));
    let failure = artifacts.report.failure.as_ref().unwrap();
    assert_eq!(failure.component.as_deref(), Some("bootnode"));
    assert!(artifacts.report.evaluations.is_empty());
}

#[tokio::test(start_paused = true)]
async fn full_run_stops_at_first_failed_evaluation() {
    let (net, handles) = network(32, 23);
    net.set_block_validation(false);
    let orch = build_orchestrator(
        &TopologyConfig::default(),
        &SimComponentFactory::new(Duration::ZERO),
        fast_orchestrator_config(),
        CancellationToken::new(),
    )
    .unwrap();
    let scheduler = scheduler(8, &["healthz", "inject_double_block@3", "validators_slashed@3"]);

    let artifacts = run_end_to_end(&orch, &scheduler, &handles, 23).await;

    let Err(RunError::Evaluation(failure)) = &artifacts.result else {
        panic!("expected evaluation failure, got {:?}", artifacts.result);
    };
    assert_eq!(failure.evaluator(), Some("inject_double_block_3"));
    assert_eq!(failure.epoch(), 3);
    assert_eq!(artifacts.report.last_completed_epoch, Some(2));
    assert!(!artifacts
        .report
        .evaluations
        .iter()
        .any(|r| r.name.starts_with("validators_slashed")));
}

/// Passes only if `component` already reports started.
struct RequireStarted(Arc<SimulatedComponent>);

#[async_trait]
impl Evaluation for RequireStarted {
    async fn evaluate(
        &self,
        _epoch: Epoch,
        ctx: &EvaluationContext,
        _net: &NetworkHandles,
    ) -> EvalResult<()> {
        match self.0.is_started(ctx.cancel_token()).await {
            Ok(true) => Ok(()),
            _ => Err(EvalError::Violation(format!("{} has not started", self.0.name()))),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn evaluation_waits_for_slow_leaf_components() {
    let (_net, handles) = network(16, 24);
    let leaf = Arc::new(
        SimulatedComponent::new("validator-client").with_startup_delay(Duration::from_secs(3)),
    );
    let mut orch = Orchestrator::new(fast_orchestrator_config());
    orch.add_component(
        "bootnode",
        ComponentHandle::Single(Arc::new(SimulatedComponent::new("bootnode"))),
        &[],
    )
    .unwrap();
    orch.add_component("validator-client", ComponentHandle::Single(leaf.clone()), &["bootnode"])
        .unwrap();
    let scheduler = EvaluationScheduler::new(
        SchedulerConfig {
            epochs: 0,
            parallel: false,
            epoch_timeout: Duration::from_secs(30),
            poll_interval: SLOT,
        },
        vec![Evaluator::new("leaf_started", on_epoch(0), RequireStarted(leaf))],
    );

    let began = Instant::now();
    let artifacts = run_end_to_end(&orch, &scheduler, &handles, 24).await;

    assert!(artifacts.result.is_ok(), "{:?}", artifacts.result);
    assert!(began.elapsed() >= Duration::from_secs(3));
    assert!(artifacts.report.evaluations.iter().all(|r| r.passed));
}

#[tokio::test(start_paused = true)]
async fn leaf_that_never_starts_fails_the_run_before_evaluation() {
    let (_net, handles) = network(16, 25);
    let mut orch = Orchestrator::new(OrchestratorConfig {
        gate: GateConfig {
            timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
        },
    });
    orch.add_component(
        "tracing-sink",
        ComponentHandle::Single(Arc::new(
            SimulatedComponent::new("tracing-sink").with_startup_delay(Duration::from_secs(3_600)),
        )),
        &[],
    )
    .unwrap();
    let scheduler = scheduler(2, &["healthz"]);

    let artifacts = run_end_to_end(&orch, &scheduler, &handles, 25).await;

    assert!(matches!(
        artifacts.result,
        Err(RunError::Orchestration(OrchestratorError::NotReady { .. }))
    ));
    let failure = artifacts.report.failure.as_ref().unwrap();
    assert_eq!(failure.component.as_deref(), Some("tracing-sink"));
    assert!(artifacts.report.evaluations.is_empty());
}
