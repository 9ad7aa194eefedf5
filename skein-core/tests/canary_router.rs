//! Behavioral tests for the canary router across full lifecycles.

use skein_core::canary::{CanaryConfig, CanaryRouter, CanaryStatus, VersionRef};
use std::time::Duration;

fn vref(version: u32, seed: char) -> VersionRef {
    VersionRef {
        version,
        structural_hash: seed.to_string().repeat(64),
    }
}

fn config(weight: f64) -> CanaryConfig {
    CanaryConfig {
        initial_weight: weight,
        promotion_steps: vec![0.5, 1.0],
        observation_window: Duration::from_secs(3600),
        error_threshold: 0.05,
        latency_threshold_ms: None,
        min_requests: 10,
        auto_promote: false,
    }
}

#[test]
fn selection_frequency_tracks_weight() {
    let router = CanaryRouter::new();
    router
        .start_canary("p", vref(1, 'a'), vref(2, 'b'), config(0.5))
        .unwrap();

    let trials = 4000;
    let new_hash = "b".repeat(64);
    let hits = (0..trials)
        .filter(|_| router.select_version("p").unwrap() == new_hash)
        .count();

    let frequency = hits as f64 / trials as f64;
    // Loose statistical bound: ~7 sigma for p=0.5, n=4000.
    assert!(
        (frequency - 0.5).abs() < 0.06,
        "frequency {frequency} strays too far from the 0.5 weight"
    );
}

#[test]
fn selection_shifts_after_promotion() {
    let router = CanaryRouter::new();
    router
        .start_canary("p", vref(1, 'a'), vref(2, 'b'), config(0.0))
        .unwrap();

    let new_hash = "b".repeat(64);
    assert!(
        (0..200).all(|_| router.select_version("p").unwrap() != new_hash),
        "weight 0 sends nothing to the new side"
    );

    // promote → 0.5 → promote → complete (no more routing).
    router.promote("p").unwrap();
    let hits = (0..2000)
        .filter(|_| router.select_version("p").unwrap() == new_hash)
        .count();
    assert!(hits > 800 && hits < 1200, "got {hits}/2000 at weight 0.5");

    let state = router.promote("p").unwrap();
    assert_eq!(state.status, CanaryStatus::Complete);
    assert!(router.select_version("p").is_none());
}

#[test]
fn rollback_ends_routing_and_replacement_restarts_it() {
    let router = CanaryRouter::new();
    router
        .start_canary("p", vref(1, 'a'), vref(2, 'b'), config(1.0))
        .unwrap();
    router.rollback("p").unwrap();
    assert!(router.select_version("p").is_none());

    // Terminal state can be replaced by a fresh canary.
    let state = router
        .start_canary("p", vref(1, 'a'), vref(3, 'c'), config(1.0))
        .unwrap();
    assert_eq!(state.status, CanaryStatus::Observing);
    assert_eq!(router.select_version("p").unwrap(), "c".repeat(64));
}

#[test]
fn metrics_accumulate_per_side() {
    let router = CanaryRouter::new();
    router
        .start_canary("p", vref(1, 'a'), vref(2, 'b'), config(0.5))
        .unwrap();

    router.record_result("p", &"a".repeat(64), true, 10.0);
    router.record_result("p", &"a".repeat(64), false, 20.0);
    router.record_result("p", &"b".repeat(64), true, 5.0);

    let state = router.get_state("p").unwrap();
    assert_eq!(state.old_metrics.requests, 2);
    assert_eq!(state.old_metrics.failures, 1);
    assert_eq!(state.old_metrics.error_rate, 0.5);
    assert_eq!(state.new_metrics.requests, 1);
    assert_eq!(state.new_metrics.successes, 1);
    assert_eq!(state.new_metrics.p99_latency_ms, 5.0);
}

#[test]
fn late_results_after_terminal_state_do_not_count() {
    let router = CanaryRouter::new();
    router
        .start_canary("p", vref(1, 'a'), vref(2, 'b'), config(1.0))
        .unwrap();
    router.rollback("p").unwrap();

    let state = router.record_result("p", &"b".repeat(64), false, 5.0).unwrap();
    assert_eq!(state.status, CanaryStatus::RolledBack);
    assert_eq!(state.new_metrics.requests, 0);
}
