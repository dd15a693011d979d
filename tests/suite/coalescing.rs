//! Debounce, coalescing and single-flight properties of the controller.

use std::time::Duration;

use fmtlink_core::{BackendSession, Mode, ReinitController};

use crate::common::Harness;

const DEBOUNCE: Duration = Duration::from_millis(250);

fn spawn(h: &Harness) -> ReinitController {
    ReinitController::spawn(BackendSession::new(h.deps()), DEBOUNCE)
}

#[tokio::test(start_paused = true)]
async fn triggers_before_first_fire_collapse_to_one_run() {
    for burst in [1_usize, 2, 10, 50] {
        let h = Harness::new();
        let controller = spawn(&h);
        for _ in 0..burst {
            controller.trigger();
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(controller.stats().started, 1, "burst of {burst}");
        assert_eq!(h.probe.discovery_calls(), 1, "burst of {burst}");
        controller.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn each_trigger_resets_the_timer() {
    let h = Harness::new();
    let controller = spawn(&h);

    // Eight triggers 200ms apart: never a 250ms quiet window until the end.
    for _ in 0..8 {
        controller.trigger();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(controller.stats().started, 0);
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.stats().started, 1);
    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn mid_run_triggers_cause_exactly_one_follow_up() {
    for k in [1_usize, 3, 25] {
        let h = Harness::new();
        h.set_run_delay(Duration::from_secs(1));
        let controller = spawn(&h);

        controller.trigger();
        tokio::time::sleep(DEBOUNCE + Duration::from_millis(10)).await;
        assert!(controller.stats().in_flight());

        for _ in 0..k {
            controller.trigger();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_secs(10)).await;

        let stats = controller.stats();
        assert_eq!(stats.started, 2, "k = {k}");
        assert_eq!(stats.completed, 2, "k = {k}");
        assert_eq!(h.probe.discovery_calls(), 2, "k = {k}");
        controller.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn runs_never_overlap_under_a_trigger_storm() {
    let h = Harness::new();
    h.set_run_delay(Duration::from_secs(2));
    let controller = spawn(&h);
    let trigger = controller.trigger_handle();

    // One quiet window lets the first run start.
    trigger.trigger();
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(10)).await;
    assert!(controller.stats().in_flight());

    // Several independent sources fire at uneven intervals, all while that
    // run is still in flight.
    let mut sources = Vec::new();
    for (period_ms, count) in [(30_u64, 40), (70, 15), (110, 10)] {
        let trigger = trigger.clone();
        sources.push(tokio::spawn(async move {
            for _ in 0..count {
                trigger.trigger();
                tokio::time::sleep(Duration::from_millis(period_ms)).await;
            }
        }));
    }
    for source in sources {
        source.await.unwrap();
    }
    assert_eq!(controller.stats().started, 1);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.probe.max_active_runs(), 1);
    assert_eq!(h.probe.max_live(), 1);
    assert_eq!(h.probe.live(), 1);
    let stats = controller.stats();
    assert!(!stats.in_flight());
    assert_eq!(stats.started, 2, "{stats:?}");
    assert_eq!(h.probe.discovery_calls(), 2);
    controller.shutdown().await;
    assert_eq!(h.probe.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn final_run_sees_final_settings() {
    let h = Harness::new();
    h.set_run_delay(Duration::from_millis(500));
    let controller = spawn(&h);
    let mut stats = controller.subscribe_stats();

    controller.trigger();
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(10)).await;
    assert!(controller.stats().in_flight());

    // The settings change lands mid-run; only the follow-up can see it.
    h.set_settings("[backend]\nmode = \"legacy\"\n");
    controller.trigger();

    stats.wait_for(|s| s.completed == 2).await.unwrap();
    assert_eq!(controller.current_mode(), Some(Mode::Legacy));
    assert_eq!(controller.stats().mode_switches, 1);
    assert_eq!(h.probe.live(), 0);
    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_run_still_honours_pending() {
    let h = Harness::new();
    h.set_trusted(false);
    h.set_run_delay(Duration::from_millis(500));
    let controller = spawn(&h);
    let mut stats = controller.subscribe_stats();

    controller.trigger();
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(10)).await;
    controller.trigger();

    stats.wait_for(|s| s.completed == 1).await.unwrap();
    assert_eq!(controller.stats().failed, 1);
    h.set_trusted(true);

    stats.wait_for(|s| s.completed == 2).await.unwrap();
    let last = controller.stats();
    assert_eq!(last.failed, 1);
    assert_eq!(h.probe.live(), 1);
    controller.shutdown().await;
}
