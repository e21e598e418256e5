use std::path::PathBuf;
use std::time::Duration;

use mailstack::process::{
    ExitState, LaunchSpec, ProcessControl, ProcessError, SystemProcesses, TerminateOutcome,
};

fn spec(name: &str, args: &[&str], dir: PathBuf) -> LaunchSpec {
    LaunchSpec {
        name: name.to_string(),
        program_and_args: args.iter().map(|s| s.to_string()).collect(),
        working_dir: dir,
        log_file: None,
    }
}

fn procs() -> SystemProcesses {
    SystemProcesses::new(Duration::from_secs(2))
}

#[tokio::test]
async fn test_launch_then_terminate_is_reentrant() {
    let dir = tempfile::tempdir().unwrap();
    let procs = procs();

    let handle = procs
        .launch(&spec("sleeper", &["sleep", "30"], dir.path().to_path_buf()))
        .await
        .unwrap();
    assert_eq!(handle.pgid, handle.pid);
    assert!(procs.is_alive(&handle).await);
    assert_eq!(procs.exit_state(&handle).await, ExitState::Running);

    assert_eq!(procs.terminate(&handle).await, TerminateOutcome::Terminated);
    assert!(!procs.is_alive(&handle).await);
    assert_eq!(procs.terminate(&handle).await, TerminateOutcome::AlreadyAbsent);
}

#[tokio::test]
async fn test_exit_status_of_own_child() {
    let dir = tempfile::tempdir().unwrap();
    let procs = procs();

    let handle = procs
        .launch(&spec("false", &["sh", "-c", "exit 3"], dir.path().to_path_buf()))
        .await
        .unwrap();

    let mut state = procs.exit_state(&handle).await;
    for _ in 0..50 {
        if state != ExitState::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        state = procs.exit_state(&handle).await;
    }
    assert_eq!(state, ExitState::Exited { code: Some(3) });
    assert!(!procs.is_alive(&handle).await);
}

#[tokio::test]
async fn test_output_goes_to_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logs/echo.log");
    let procs = procs();
    let mut launch = spec("echo", &["sh", "-c", "echo ready"], dir.path().to_path_buf());
    launch.log_file = Some(log.clone());

    let handle = procs.launch(&launch).await.unwrap();
    for _ in 0..50 {
        if !procs.is_alive(&handle).await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(std::fs::read_to_string(&log).unwrap(), "ready\n");
}

#[tokio::test]
async fn test_launch_errors() {
    let dir = tempfile::tempdir().unwrap();
    let procs = procs();

    let missing_dir = procs
        .launch(&spec("x", &["sleep", "1"], dir.path().join("nope")))
        .await;
    assert!(matches!(missing_dir, Err(ProcessError::MissingWorkingDir(_))));

    let empty = procs.launch(&spec("x", &[], dir.path().to_path_buf())).await;
    assert!(matches!(empty, Err(ProcessError::EmptyCommand(_))));

    let missing_program = procs
        .launch(&spec(
            "x",
            &["mailstack-no-such-program"],
            dir.path().to_path_buf(),
        ))
        .await;
    assert!(matches!(missing_program, Err(ProcessError::Spawn { .. })));
}

#[tokio::test]
async fn test_terminate_matching_by_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let procs = procs();
    // An argument no other process on the host will carry.
    let marker = format!("{}.{}", 40 + std::process::id() % 50, std::process::id());

    let handle = procs
        .launch(&spec("sleeper", &["sleep", marker.as_str()], dir.path().to_path_buf()))
        .await
        .unwrap();
    let pattern = format!("sleep {marker}");
    // The command line only shows up once the child has exec'd.
    for _ in 0..50 {
        if !procs.find_matching(&pattern).await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(procs.find_matching(&pattern).await, vec![handle.pid]);
    assert_eq!(procs.terminate_matching(&pattern).await, TerminateOutcome::Terminated);
    assert!(procs.find_matching(&pattern).await.is_empty());
    assert_eq!(
        procs.terminate_matching(&pattern).await,
        TerminateOutcome::AlreadyAbsent
    );
}
