//! What an operator sees in the log for the common failure paths.

use std::time::Duration;

use fmtlink_core::{BackendSession, ReinitController, SessionState, StartOutcome};

use crate::common::{Harness, LogCapture};

#[tokio::test]
async fn missing_config_logs_info_line() {
    let logs = LogCapture::default();
    let _guard = logs.install();

    let h = Harness::new();
    h.set_config_found(false);
    let mut session = BackendSession::new(h.deps());
    let outcome = session.reinitialize().await.unwrap();
    assert_eq!(outcome, StartOutcome::ConfigAbsent);

    let lines = logs.lines_with(&["INFO", "Configuration file not found."]);
    assert_eq!(lines.len(), 1, "{}", logs.contents());
    assert!(logs.lines_with(&["ERROR"]).is_empty());
}

#[tokio::test(start_paused = true)]
async fn untrusted_executable_logs_resolution_failure() {
    let logs = LogCapture::default();
    let _guard = logs.install();

    let h = Harness::new();
    h.set_trusted(false);
    let controller =
        ReinitController::spawn(BackendSession::new(h.deps()), Duration::from_millis(250));
    let mut stats = controller.subscribe_stats();
    controller.trigger();
    stats.wait_for(|s| s.completed == 1).await.unwrap();
    assert_eq!(controller.status().state, SessionState::Stopped);

    let lines = logs.lines_with(&["ERROR", "resolution_failed", "Reinitialization failed"]);
    assert_eq!(lines.len(), 1, "{}", logs.contents());
    assert!(lines[0].contains("has not been approved"));
    assert!(logs.lines_with(&["Formatter backend ready"]).is_empty());

    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn successful_run_logs_ready_with_mode() {
    let logs = LogCapture::default();
    let _guard = logs.install();

    let h = Harness::new();
    let controller =
        ReinitController::spawn(BackendSession::new(h.deps()), Duration::from_millis(250));
    let mut stats = controller.subscribe_stats();
    controller.trigger();
    stats.wait_for(|s| s.completed == 1).await.unwrap();

    let lines = logs.lines_with(&["INFO", "Formatter backend ready", "server"]);
    assert_eq!(lines.len(), 1, "{}", logs.contents());

    controller.shutdown().await;
}
