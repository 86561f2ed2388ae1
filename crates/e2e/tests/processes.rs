//! Real child processes: line capture, termination, and a full run through
//! the fixture server.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use visreg_common::{DriverConfig, RunnerConfig, WebserverConfig};
use visreg_e2e::{
    CommandSpec, FixtureServer, Mode, Orchestrator, OrchestratorConfig, Outcome, ProcessEvent,
    ProcessLauncher, ReportViewer, RunError, Stream, TokioLauncher, WebFixtureHost,
};

const LIMIT: Duration = Duration::from_secs(10);

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh", "sh").arg("-c").arg(script)
}

async fn collect(spec: &CommandSpec) -> Vec<ProcessEvent> {
    let mut handle = TokioLauncher::default().launch(spec).unwrap();
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(LIMIT, handle.next_event())
            .await
            .expect("process did not finish");
        let done = matches!(event, ProcessEvent::Exited { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}

fn line(stream: Stream, line: &str) -> ProcessEvent {
    ProcessEvent::Line {
        stream,
        line: line.to_string(),
    }
}

#[tokio::test]
async fn lines_then_exit_code() {
    let events = collect(&sh("echo one; echo two >&2; printf 'three\\r\\n'; exit 3")).await;

    let stdout: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, ProcessEvent::Line { stream: Stream::Stdout, .. }))
        .cloned()
        .collect();
    assert_eq!(
        stdout,
        vec![line(Stream::Stdout, "one"), line(Stream::Stdout, "three")]
    );
    assert!(events.contains(&line(Stream::Stderr, "two")));
    assert_eq!(events.last(), Some(&ProcessEvent::Exited { code: Some(3) }));
}

#[tokio::test]
async fn unterminated_last_line_is_delivered() {
    let events = collect(&sh("printf 'no newline'")).await;
    assert_eq!(
        events,
        vec![
            line(Stream::Stdout, "no newline"),
            ProcessEvent::Exited { code: Some(0) }
        ]
    );
}

#[tokio::test]
async fn working_directory_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let canonical = dir.path().canonicalize().unwrap();
    let events = collect(&sh("pwd -P").current_dir(dir.path())).await;
    assert_eq!(
        events[0],
        line(Stream::Stdout, &canonical.display().to_string())
    );
}

#[tokio::test]
async fn terminate_stops_a_long_running_process() {
    let mut handle = TokioLauncher::default()
        .launch(&sh("echo started; exec sleep 30"))
        .unwrap();
    assert!(handle.pid().is_some());

    let first = tokio::time::timeout(LIMIT, handle.next_event()).await.unwrap();
    assert_eq!(first, line(Stream::Stdout, "started"));

    handle.terminate();
    handle.terminate();
    let code = handle.wait_exit(LIMIT).await.expect("no exit after terminate");
    assert_eq!(code, None, "SIGTERM exit has no code");
}

#[tokio::test]
async fn ignored_sigterm_falls_back_to_kill() {
    let launcher = TokioLauncher::new(Duration::from_millis(200));
    let mut handle = launcher
        .launch(&sh("trap '' TERM; echo armed; while true; do sleep 1; done"))
        .unwrap();

    let first = tokio::time::timeout(LIMIT, handle.next_event()).await.unwrap();
    assert_eq!(first, line(Stream::Stdout, "armed"));

    handle.terminate();
    assert!(handle.wait_exit(LIMIT).await.is_some());
}

#[tokio::test]
async fn no_lines_after_exit_when_output_outlives_the_process() {
    // The backgrounded subshell keeps stdout open past the drain window.
    let launcher = TokioLauncher::default().with_drain(Duration::from_millis(200));
    let mut handle = launcher
        .launch(&sh("(sleep 1; echo late) & echo early"))
        .unwrap();

    let first = tokio::time::timeout(LIMIT, handle.next_event()).await.unwrap();
    assert_eq!(first, line(Stream::Stdout, "early"));
    let exit = tokio::time::timeout(LIMIT, handle.next_event()).await.unwrap();
    assert_eq!(exit, ProcessEvent::Exited { code: Some(0) });

    // Once the readers are gone the channel closes instead of delivering "late".
    let after = tokio::time::timeout(Duration::from_secs(3), handle.next_event())
        .await
        .unwrap();
    assert_eq!(after, ProcessEvent::Exited { code: None });
}

#[tokio::test]
async fn missing_binary_is_a_spawn_error() {
    let err = TokioLauncher::default()
        .launch(&CommandSpec::new("driver", "/nonexistent/visreg-driver"))
        .err()
        .unwrap();
    assert!(matches!(err, RunError::Spawn { ref name, .. } if name == "driver"));
}

fn script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<PathBuf>>>);

impl ReportViewer for Recorder {
    fn open(&self, report: &Path) -> std::io::Result<()> {
        self.0.lock().unwrap().push(report.to_path_buf());
        Ok(())
    }
}

fn orchestrator(
    dir: &Path,
    runner_body: &str,
    viewer: Recorder,
) -> Orchestrator<WebFixtureHost, TokioLauncher, Recorder> {
    let driver = script(
        dir,
        "driver.sh",
        "echo \"GhostDriver - Main - running on port ${1#--webdriver=}\"\nexec sleep 60",
    );
    let runner = script(dir, "runner.sh", runner_body);

    let config = OrchestratorConfig {
        driver: DriverConfig {
            binary: driver,
            startup_timeout_secs: 10,
            ..Default::default()
        },
        runner: RunnerConfig {
            binary: runner,
            reports_dir: dir.join("reports"),
            timeout_secs: 10,
            ..Default::default()
        },
        ..Default::default()
    };
    let host = WebFixtureHost::new(WebserverConfig {
        port: 0,
        root: dir.to_path_buf(),
        dynamic_dir: dir.join("dynamic"),
        ..Default::default()
    });
    Orchestrator::new(config, host, TokioLauncher::default(), viewer)
}

#[tokio::test]
async fn full_run_with_real_processes() {
    let dir = tempfile::tempdir().unwrap();
    let viewer = Recorder::default();
    let orchestrator = orchestrator(
        dir.path(),
        "echo \"✓ $1 $2\"\necho '(node:1) DeprecationWarning: old' >&2",
        viewer.clone(),
    );

    let report = orchestrator
        .run(Mode::Update, Path::new("suite"))
        .await
        .unwrap();

    assert_eq!(report.outcome, Outcome::Success);
    assert_eq!(report.passed, 1);
    assert!(report.server.is_none());
    assert!(viewer.0.lock().unwrap().is_empty());
    assert!(dir.path().join("reports/visreg-summary.json").is_file());
}

#[tokio::test]
async fn failing_run_hands_back_live_server() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("page.html"), "<p>fixture</p>").unwrap();
    let viewer = Recorder::default();
    let orchestrator = orchestrator(dir.path(), "echo '✘ graph3d'", viewer.clone());

    let report = orchestrator
        .run(Mode::Test, Path::new("suite"))
        .await
        .unwrap();

    assert_eq!(report.outcome, Outcome::ReportedFailure);
    assert_eq!(
        *viewer.0.lock().unwrap(),
        vec![dir.path().join("reports/index.html")]
    );

    let mut server = report.server.expect("server kept for inspection");
    let body = reqwest::get(format!("{}/page.html", server.base_url()))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "<p>fixture</p>");

    FixtureServer::stop(&server);
    tokio::time::timeout(LIMIT, server.stopped()).await.unwrap();
}
