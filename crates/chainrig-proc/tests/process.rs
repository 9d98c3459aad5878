//! Real process lifecycle through the orchestrator. Unix only: uses `sh`.
#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chainrig_core::{
    ComponentHandle, GateConfig, GateError, Orchestrator, OrchestratorConfig, OrchestratorError,
    Runnable, RunnableError,
};
use chainrig_proc::{ProcessComponent, ProcessFactory, ProcessSpec, ReadinessProbe};
use tokio_util::sync::CancellationToken;

fn sh(script: &str, readiness: ReadinessProbe) -> ProcessSpec {
    ProcessSpec {
        binary: PathBuf::from("sh"),
        args: vec!["-c".to_string(), script.to_string()],
        readiness,
        ..ProcessSpec::default()
    }
}

fn ready_marker() -> ReadinessProbe {
    ReadinessProbe::LogLine {
        pattern: "ready".to_string(),
    }
}

#[tokio::test]
async fn log_marker_readiness_and_stop() {
    let dir = tempfile::tempdir().unwrap();
    let component = ProcessComponent::new(
        "bootnode",
        sh("sleep 0.2; echo ready; sleep 30", ready_marker()),
        dir.path(),
    );
    let cancel = CancellationToken::new();

    assert!(!component.is_started(&cancel).await.unwrap());
    component.start(&cancel).await.unwrap();
    let pid = component.pid().expect("pid after start");
    assert!(pid > 0);

    let mut ready = false;
    for _ in 0..50 {
        if component.is_started(&cancel).await.unwrap() {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(ready, "ready marker never observed");
    assert!(component.log_path().ends_with("bootnode.log"));

    component.pause().await.unwrap();
    component.resume().await.unwrap();

    component.stop().await.unwrap();
    assert!(component.pid().is_none());
    assert!(!component.is_started(&cancel).await.unwrap());
}

#[tokio::test]
async fn early_exit_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let component = ProcessComponent::new("execution-node", sh("exit 3", ReadinessProbe::Immediate), dir.path());
    let cancel = CancellationToken::new();
    component.start(&cancel).await.unwrap();

    let mut exited = None;
    for _ in 0..50 {
        match component.is_started(&cancel).await {
            Err(e) => {
                exited = Some(e);
                break;
            }
            Ok(_) => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    assert!(matches!(exited, Some(RunnableError::Exited { .. })), "{exited:?}");
    component.stop().await.unwrap();
}

#[tokio::test]
async fn missing_binary_fails_start() {
    let dir = tempfile::tempdir().unwrap();
    let spec = ProcessSpec {
        binary: PathBuf::from("/nonexistent/chainrig-test-binary"),
        ..ProcessSpec::default()
    };
    let component = ProcessComponent::new("web3signer", spec, dir.path());
    let err = component.start(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, RunnableError::StartFailed { .. }), "{err}");
}

#[tokio::test]
async fn orchestrator_starts_processes_in_order_and_lists_pids() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ProcessFactory::new(dir.path());
    let bootnode = Arc::new(ProcessComponent::new(
        "bootnode",
        sh("sleep 0.3; echo ready; sleep 30", ready_marker()),
        factory.log_dir(),
    ));
    let beacon = Arc::new(ProcessComponent::new(
        "beacon-node",
        sh("echo ready; sleep 30", ready_marker()),
        factory.log_dir(),
    ));

    let mut orch = Orchestrator::new(OrchestratorConfig {
        gate: GateConfig {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(50),
        },
    });
    orch.add_component("bootnode", ComponentHandle::Single(bootnode.clone()), &[])
        .unwrap();
    orch.add_component("beacon-node", ComponentHandle::Single(beacon.clone()), &["bootnode"])
        .unwrap();

    orch.run().await.unwrap();
    let pids = orch.process_ids();
    assert_eq!(pids.len(), 2);
    assert_eq!(pids[0].component, "bootnode");
    assert!(dir.path().join("beacon-node.log").exists());

    assert!(orch.stop_all().await.is_empty());
    assert!(bootnode.pid().is_none());
    assert!(beacon.pid().is_none());
}

#[tokio::test]
async fn dependency_that_never_gets_ready_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let stuck = Arc::new(ProcessComponent::new(
        "bootnode",
        sh("sleep 30", ready_marker()),
        dir.path(),
    ));
    let beacon = Arc::new(ProcessComponent::new(
        "beacon-node",
        sh("sleep 30", ReadinessProbe::Immediate),
        dir.path(),
    ));
    let mut orch = Orchestrator::new(OrchestratorConfig {
        gate: GateConfig {
            timeout: Duration::from_millis(300),
            poll_interval: Duration::from_millis(50),
        },
    });
    orch.add_component("bootnode", ComponentHandle::Single(stuck), &[])
        .unwrap();
    orch.add_component("beacon-node", ComponentHandle::Single(beacon.clone()), &["bootnode"])
        .unwrap();

    let err = orch.run().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::DependencyNotReady { .. }));
    assert!(err.to_string().starts_with("beacon-node requires bootnode to run"));
    assert!(beacon.pid().is_none(), "dependent must not have been spawned");

    orch.stop_all().await;
}

#[tokio::test]
async fn crashed_dependency_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let crashing = Arc::new(ProcessComponent::new(
        "bootnode",
        sh("echo starting; exit 1", ready_marker()),
        dir.path(),
    ));
    let beacon = Arc::new(ProcessComponent::new(
        "beacon-node",
        sh("sleep 30", ReadinessProbe::Immediate),
        dir.path(),
    ));
    let mut orch = Orchestrator::new(OrchestratorConfig {
        gate: GateConfig {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(50),
        },
    });
    orch.add_component("bootnode", ComponentHandle::Single(crashing), &[])
        .unwrap();
    orch.add_component("beacon-node", ComponentHandle::Single(beacon.clone()), &["bootnode"])
        .unwrap();

    let began = std::time::Instant::now();
    let err = orch.run().await.unwrap_err();
    assert!(began.elapsed() < Duration::from_secs(10), "waited {:?}", began.elapsed());
    let OrchestratorError::DependencyNotReady { source, .. } = &err else {
        panic!("unexpected: {err}");
    };
    assert!(matches!(source, GateError::DependencyFailed { component, .. } if component == "bootnode"));
    assert!(beacon.pid().is_none());

    orch.stop_all().await;
}

#[tokio::test]
async fn pause_requires_a_running_process() {
    let dir = tempfile::tempdir().unwrap();
    let component = ProcessComponent::new("builder", sh("sleep 30", ReadinessProbe::Immediate), dir.path());
    let err = component.pause().await.unwrap_err();
    assert!(matches!(err, RunnableError::Misconfigured { .. }), "{err}");
}

/// Scheduler state letter from `/proc/<pid>/stat`.
#[cfg(target_os = "linux")]
fn proc_state(pid: u32) -> char {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap();
    let after_comm = stat.rsplit_once(") ").unwrap().1;
    after_comm.chars().next().unwrap()
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn pause_and_resume_stop_and_continue_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let component = ProcessComponent::new("proxy", sh("sleep 30", ReadinessProbe::Immediate), dir.path());
    let cancel = CancellationToken::new();
    component.start(&cancel).await.unwrap();
    let pid = component.pid().unwrap();

    component.pause().await.unwrap();
    let mut state = proc_state(pid);
    for _ in 0..20 {
        if state == 'T' {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
        state = proc_state(pid);
    }
    assert_eq!(state, 'T');

    component.resume().await.unwrap();
    let mut state = proc_state(pid);
    for _ in 0..20 {
        if state != 'T' {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
        state = proc_state(pid);
    }
    assert_ne!(state, 'T');

    component.stop().await.unwrap();
}
