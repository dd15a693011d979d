//! End-to-end scenarios for a single backend session.

use std::sync::Arc;
use std::time::Duration;

use fmtlink_core::{
    BackendHandle, BackendSession, Mode, ReinitController, SessionState, StartOutcome,
};
use tokio::time::Instant;

use crate::common::{FORMATTER, Harness};

/// No configuration file anywhere in scope.
#[tokio::test]
async fn scenario_a_missing_config_stays_stopped() {
    let h = Harness::new();
    h.set_config_found(false);
    let mut session = BackendSession::new(h.deps());

    let outcome = session.reinitialize().await.unwrap();

    assert_eq!(outcome, StartOutcome::ConfigAbsent);
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(session.handle().is_none());
    assert_eq!(h.probe.created(), 0);
}

/// Valid config and executable: running, and a second run replaces the
/// client only after the first one is gone.
#[tokio::test]
async fn scenario_b_restart_releases_before_creating() {
    let h = Harness::new();
    let mut session = BackendSession::new(h.deps());

    let outcome = session.reinitialize().await.unwrap();
    assert_eq!(outcome, StartOutcome::Running(Mode::Server));
    assert_eq!(session.state(), SessionState::Running);
    assert!(matches!(session.handle(), Some(BackendHandle::Server(_))));

    let options = h.factory.last_options.lock().unwrap().clone().unwrap();
    assert_eq!(options.executable.to_str(), Some(FORMATTER));
    assert_eq!(options.args, vec!["lsp"]);

    session.reinitialize().await.unwrap();
    assert_eq!(
        h.probe.events(),
        vec![
            "create#1", "start#1", "stop#1", "dispose#1", "create#2", "start#2"
        ]
    );
    assert_eq!(h.probe.live(), 1);
    assert_eq!(h.probe.max_live(), 1);
}

/// The executable needs trust approval that was never given.
#[tokio::test]
async fn scenario_c_untrusted_executable_is_reported() {
    let h = Harness::new();
    h.set_trusted(false);
    let mut session = BackendSession::new(h.deps());

    let err = session.reinitialize().await.unwrap_err();

    assert_eq!(err.kind(), "resolution_failed");
    assert!(err.to_string().contains("has not been approved"));
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(session.handle().is_none());
    assert_eq!(h.probe.created(), 0);
}

/// Same as scenario C, through the filesystem resolver and a real trust store.
#[cfg(unix)]
#[tokio::test]
async fn scenario_c_with_filesystem_resolver() {
    use std::os::unix::fs::PermissionsExt;

    use fmtlink_core::{FsExecutableResolver, TrustStore};

    let dir = tempfile::tempdir().unwrap();
    let exe = dir.path().join("dprint");
    std::fs::write(&exe, "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

    let h = Harness::new();
    h.set_settings(&format!("[backend]\npath = \"{}\"\n", exe.display()));
    let trust = Arc::new(TrustStore::in_memory());
    let mut session = BackendSession::new(
        h.deps()
            .with_resolver(Arc::new(FsExecutableResolver))
            .with_trust(Arc::clone(&trust)),
    );

    let err = session.reinitialize().await.unwrap_err();
    assert_eq!(err.kind(), "resolution_failed");
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(h.probe.created(), 0);

    trust.approve(&exe).unwrap();
    let outcome = session.reinitialize().await.unwrap();
    assert_eq!(outcome, StartOutcome::Running(Mode::Server));
    let options = h.factory.last_options.lock().unwrap().clone().unwrap();
    assert_eq!(options.executable, std::fs::canonicalize(&exe).unwrap());
}

/// `fmtlink trust` runs as a separate process with its own store; the host's
/// next run must see the approval without restarting.
#[cfg(unix)]
#[tokio::test]
async fn approval_from_another_process_is_honoured_by_next_run() {
    use std::os::unix::fs::PermissionsExt;

    use fmtlink_core::{FsExecutableResolver, TrustStore};

    let dir = tempfile::tempdir().unwrap();
    let exe = dir.path().join("dprint");
    std::fs::write(&exe, "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
    let store_path = dir.path().join("state").join("trusted-executables.json");

    let h = Harness::new();
    h.set_settings(&format!("[backend]\npath = \"{}\"\n", exe.display()));
    let host_trust = Arc::new(TrustStore::load(&store_path).unwrap());
    let mut session = BackendSession::new(
        h.deps()
            .with_resolver(Arc::new(FsExecutableResolver))
            .with_trust(Arc::clone(&host_trust)),
    );

    let err = session.reinitialize().await.unwrap_err();
    assert_eq!(err.kind(), "resolution_failed");

    let cli_trust = TrustStore::load(&store_path).unwrap();
    assert!(cli_trust.approve(&exe).unwrap());

    let outcome = session.reinitialize().await.unwrap();
    assert_eq!(outcome, StartOutcome::Running(Mode::Server));
    assert!(host_trust.is_trusted(&exe));

    // Revocation is picked up the same way.
    assert!(cli_trust.revoke(&exe).unwrap());
    let err = session.reinitialize().await.unwrap_err();
    assert_eq!(err.kind(), "resolution_failed");
    assert_eq!(session.state(), SessionState::Stopped);
}

/// A burst inside the debounce window is one run; a later trigger is one more.
#[tokio::test(start_paused = true)]
async fn scenario_d_burst_then_single_trigger() {
    let h = Harness::new();
    let controller =
        ReinitController::spawn(BackendSession::new(h.deps()), Duration::from_millis(250));
    let mut stats = controller.subscribe_stats();

    for _ in 0..5 {
        controller.trigger();
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    stats.wait_for(|s| s.completed == 1).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(controller.stats().started, 1);
    assert_eq!(h.probe.discovery_calls(), 1);

    controller.trigger();
    stats.wait_for(|s| s.completed == 2).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(controller.stats().started, 2);
    assert_eq!(h.probe.discovery_calls(), 2);
    assert_eq!(h.probe.live(), 1);

    controller.shutdown().await;
    assert_eq!(h.probe.live(), 0);
}

/// A prior handle that won't stop is force-released after the stop timeout,
/// and the new handle still comes up.
#[tokio::test(start_paused = true)]
async fn scenario_e_stuck_teardown_is_forced() {
    let h = Harness::new();
    h.set_stop_delay(Duration::from_secs(60));
    let mut session = BackendSession::new(h.deps());
    session.reinitialize().await.unwrap();

    let started = Instant::now();
    let outcome = session.reinitialize().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, StartOutcome::Running(Mode::Server));
    assert!(elapsed >= Duration::from_secs(2), "took {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
    assert_eq!(
        h.probe.events(),
        vec![
            "create#1", "start#1", "stop#1", "dispose#1", "create#2", "start#2"
        ]
    );
    assert_eq!(h.probe.live(), 1);
    assert_eq!(h.probe.max_live(), 1);
}

/// A stop timeout from settings bounds the wait, not a hard-coded one.
#[tokio::test(start_paused = true)]
async fn configured_stop_timeout_is_used() {
    let h = Harness::new();
    h.set_settings("[lifecycle]\nstop_timeout_ms = 500\n");
    h.set_stop_delay(Duration::from_secs(60));
    let mut session = BackendSession::new(h.deps());
    session.reinitialize().await.unwrap();

    let started = Instant::now();
    session.dispose().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(500), "took {elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(h.probe.live(), 0);
}

#[tokio::test]
async fn handshake_failure_leaves_nothing_running() {
    let h = Harness::new();
    h.factory
        .fail_start
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let mut session = BackendSession::new(h.deps());

    let err = session.reinitialize().await.unwrap_err();
    assert_eq!(err.kind(), "connection_failed");
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(h.probe.live(), 0);
    assert_eq!(h.probe.events(), vec!["create#1", "start#1"]);
}

#[tokio::test]
async fn dispose_is_idempotent_from_any_state() {
    let h = Harness::new();
    let mut session = BackendSession::new(h.deps());
    session.dispose().await;
    session.dispose().await;
    assert_eq!(session.state(), SessionState::Stopped);

    session.reinitialize().await.unwrap();
    session.dispose().await;
    session.dispose().await;
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(session.handle().is_none());
    assert_eq!(h.probe.live(), 0);
    assert_eq!(
        h.probe.events(),
        vec!["create#1", "start#1", "stop#1", "dispose#1"]
    );
}

#[tokio::test]
async fn legacy_mode_needs_no_client() {
    let h = Harness::new();
    h.set_settings("[backend]\nmode = \"legacy\"\nformat_args = [\"fmt\", \"--stdin\"]\n");
    let mut session = BackendSession::new(h.deps());

    let outcome = session.reinitialize().await.unwrap();
    assert_eq!(outcome, StartOutcome::Running(Mode::Legacy));
    let invoker = session.invoker().unwrap();
    assert_eq!(invoker.executable().to_str(), Some(FORMATTER));
    assert_eq!(h.probe.created(), 0);
}
