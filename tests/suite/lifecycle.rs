//! Host start/shutdown wiring.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fmtlink_core::{Lifecycle, Mode, SessionState};

use crate::common::Harness;

#[tokio::test(start_paused = true)]
async fn start_runs_once_and_shutdown_releases() {
    let h = Harness::new();
    let lifecycle = Lifecycle::start(h.deps());
    let mut stats = lifecycle.subscribe_stats();

    stats.wait_for(|s| s.completed == 1).await.unwrap();
    assert_eq!(lifecycle.status().state, SessionState::Running);
    assert_eq!(lifecycle.current_mode(), Some(Mode::Server));
    assert_eq!(h.probe.live(), 1);

    lifecycle.shutdown().await;
    assert_eq!(h.probe.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn startup_debounce_comes_from_settings() {
    let h = Harness::new();
    h.set_settings("[lifecycle]\ndebounce_ms = 1000\n");
    let lifecycle = Lifecycle::start(h.deps());

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(lifecycle.stats().started, 0);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(lifecycle.stats().started, 1);
    lifecycle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn workspace_changes_trigger_runs() {
    let h = Harness::new();
    let lifecycle = Lifecycle::start(h.deps());
    let mut stats = lifecycle.subscribe_stats();
    stats.wait_for(|s| s.completed == 1).await.unwrap();

    assert!(lifecycle.add_workspace_folder(PathBuf::from("/work/docs")));
    assert!(!lifecycle.add_workspace_folder(PathBuf::from("/work/docs")));
    stats.wait_for(|s| s.completed == 2).await.unwrap();

    let options = h.factory.last_options.lock().unwrap().clone().unwrap();
    assert_eq!(
        options.workspace_folders,
        vec![PathBuf::from("/work/site"), PathBuf::from("/work/docs")]
    );

    assert!(lifecycle.remove_workspace_folder(Path::new("/work/site")));
    stats.wait_for(|s| s.completed == 3).await.unwrap();
    let options = h.factory.last_options.lock().unwrap().clone().unwrap();
    assert_eq!(options.cwd, PathBuf::from("/work/docs"));
    assert_eq!(lifecycle.workspace_folders(), vec![PathBuf::from("/work/docs")]);

    assert!(!lifecycle.remove_workspace_folder(Path::new("/nowhere")));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(lifecycle.stats().started, 3);

    lifecycle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn mode_switch_is_flagged_for_reload() {
    let h = Harness::new();
    let lifecycle = Lifecycle::start(h.deps());
    let mut stats = lifecycle.subscribe_stats();
    stats.wait_for(|s| s.completed == 1).await.unwrap();
    assert!(!lifecycle.mode_switched());

    h.set_settings("[backend]\nmode = \"legacy\"\n");
    lifecycle.restart();
    stats.wait_for(|s| s.completed == 2).await.unwrap();

    assert!(lifecycle.mode_switched());
    assert_eq!(lifecycle.current_mode(), Some(Mode::Legacy));
    assert_eq!(h.probe.live(), 0);

    let invoker = lifecycle.invoker().await.unwrap();
    assert_eq!(invoker.args(), ["fmt", "--stdin"]);
    lifecycle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn server_mode_has_no_invoker() {
    let h = Harness::new();
    let lifecycle = Lifecycle::start(h.deps());
    let mut stats = lifecycle.subscribe_stats();
    stats.wait_for(|s| s.completed == 1).await.unwrap();

    assert!(lifecycle.invoker().await.is_none());
    lifecycle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_mid_run_waits_then_disposes() {
    let h = Harness::new();
    h.set_run_delay(Duration::from_secs(2));
    let lifecycle = Lifecycle::start(h.deps());
    let trigger = lifecycle.trigger_source();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(lifecycle.stats().in_flight());
    trigger.trigger();

    lifecycle.shutdown().await;
    assert_eq!(h.probe.discovery_calls(), 1);
    assert_eq!(h.probe.live(), 0);
    assert_eq!(h.probe.events(), vec!["create#1", "start#1", "stop#1", "dispose#1"]);

    // Late triggers from a source that outlived shutdown are harmless.
    trigger.trigger();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.probe.discovery_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn status_channel_reports_transitions() {
    let h = Harness::new();
    h.set_config_found(false);
    let lifecycle = Lifecycle::start(h.deps());
    let mut status = lifecycle.subscribe_status();

    status
        .wait_for(|s| s.mode == Some(Mode::Server))
        .await
        .unwrap();
    let mut stats = lifecycle.subscribe_stats();
    stats.wait_for(|s| s.completed == 1).await.unwrap();
    assert_eq!(lifecycle.status().state, SessionState::Stopped);
    assert_eq!(lifecycle.status().to_string(), "stopped (server)");

    lifecycle.shutdown().await;
}
