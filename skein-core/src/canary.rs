use crate::error::SkeinError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Default bound on the per-side latency sample ring.
pub const DEFAULT_LATENCY_RING: usize = 1024;

/// Configuration for a single canary migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanaryConfig {
    /// Share of traffic routed to the new version at start.
    #[serde(default = "default_initial_weight")]
    pub initial_weight: f64,

    /// Ascending weights adopted by successive promotions.
    #[serde(default = "default_promotion_steps")]
    pub promotion_steps: Vec<f64>,

    /// Minimum time spent on a step before auto-promotion.
    /// Accepts `"30s"` / `"5m"` strings or a plain number of seconds.
    #[serde(default = "default_observation_window", with = "window_serde")]
    pub observation_window: Duration,

    /// Error rate above which the canary is rolled back.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: f64,

    /// Optional p99 latency ceiling for the new side.
    #[serde(default)]
    pub latency_threshold_ms: Option<u64>,

    /// Samples required on the new side before any rule fires.
    #[serde(default = "default_min_requests")]
    pub min_requests: u64,

    /// Advance steps automatically once the window passes clean.
    #[serde(default)]
    pub auto_promote: bool,
}

fn default_initial_weight() -> f64 {
    0.1
}
fn default_promotion_steps() -> Vec<f64> {
    vec![0.25, 0.5, 0.75, 1.0]
}
fn default_observation_window() -> Duration {
    Duration::from_secs(60)
}
fn default_error_threshold() -> f64 {
    0.05
}
fn default_min_requests() -> u64 {
    10
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            initial_weight: default_initial_weight(),
            promotion_steps: default_promotion_steps(),
            observation_window: default_observation_window(),
            error_threshold: default_error_threshold(),
            latency_threshold_ms: None,
            min_requests: default_min_requests(),
            auto_promote: false,
        }
    }
}

impl CanaryConfig {
    fn validate(&self) -> Result<(), SkeinError> {
        if !(0.0..=1.0).contains(&self.initial_weight) {
            return Err(SkeinError::InvalidInput(
                "initialWeight must be within [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.error_threshold) {
            return Err(SkeinError::InvalidInput(
                "errorThreshold must be within [0, 1]".into(),
            ));
        }
        if self.min_requests < 1 {
            return Err(SkeinError::InvalidInput(
                "minRequests must be at least 1".into(),
            ));
        }
        if let Some(ms) = self.latency_threshold_ms {
            if ms == 0 {
                return Err(SkeinError::InvalidInput(
                    "latencyThresholdMs must be positive".into(),
                ));
            }
        }
        let mut prev = 0.0_f64;
        for (i, w) in self.promotion_steps.iter().enumerate() {
            if !(0.0..=1.0).contains(w) {
                return Err(SkeinError::InvalidInput(format!(
                    "promotionSteps[{i}] must be within [0, 1]"
                )));
            }
            if *w < prev {
                return Err(SkeinError::InvalidInput(
                    "promotionSteps must be ascending".into(),
                ));
            }
            prev = *w;
        }
        Ok(())
    }
}

mod window_serde {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Seconds(u64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => humantime::parse_duration(&s).map_err(D::Error::custom),
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        }
    }
}

/// One side of a canary: a version number and its structural hash.
/// Hashes are carried as values, never as handles into the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRef {
    pub version: u32,
    pub structural_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanaryStatus {
    Observing,
    RolledBack,
    Complete,
}

impl CanaryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CanaryStatus::Observing)
    }
}

/// Per-side counters with a bounded latency sample ring.
#[derive(Debug, Clone)]
struct VersionMetrics {
    requests: u64,
    successes: u64,
    failures: u64,
    latencies: VecDeque<f64>,
    ring: usize,
}

impl VersionMetrics {
    fn new(ring: usize) -> Self {
        Self {
            requests: 0,
            successes: 0,
            failures: 0,
            latencies: VecDeque::with_capacity(ring.min(64)),
            ring,
        }
    }

    fn record(&mut self, success: bool, latency_ms: f64) {
        self.requests += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        if self.latencies.len() == self.ring {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency_ms);
    }

    fn reset(&mut self) {
        self.requests = 0;
        self.successes = 0;
        self.failures = 0;
        self.latencies.clear();
    }

    fn error_rate(&self) -> f64 {
        self.failures as f64 / (self.requests.max(1)) as f64
    }

    /// `ceil(0.99 * n)`-th order statistic over the ring; 0 when empty.
    fn p99_latency_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.latencies.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let rank = ((0.99 * sorted.len() as f64).ceil() as usize).max(1);
        sorted[rank - 1]
    }

    fn avg_latency_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        self.latencies.iter().sum::<f64>() / self.latencies.len() as f64
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests,
            successes: self.successes,
            failures: self.failures,
            error_rate: self.error_rate(),
            avg_latency_ms: self.avg_latency_ms(),
            p99_latency_ms: self.p99_latency_ms(),
        }
    }
}

/// Serializable view of one side's metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub p99_latency_ms: f64,
}

/// Serializable view of a canary, returned by every router operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanaryState {
    pub pipeline_name: String,
    pub old_version: VersionRef,
    pub new_version: VersionRef,
    pub config: CanaryConfig,
    pub current_step: usize,
    pub current_weight: f64,
    pub status: CanaryStatus,
    pub started_at: DateTime<Utc>,
    pub old_metrics: MetricsSnapshot,
    pub new_metrics: MetricsSnapshot,
}

struct CanaryEntry {
    name: String,
    old: VersionRef,
    new: VersionRef,
    config: CanaryConfig,
    current_step: usize,
    current_weight: f64,
    status: CanaryStatus,
    started_at: DateTime<Utc>,
    last_step_started_at: Instant,
    old_metrics: VersionMetrics,
    new_metrics: VersionMetrics,
}

impl CanaryEntry {
    fn snapshot(&self) -> CanaryState {
        CanaryState {
            pipeline_name: self.name.clone(),
            old_version: self.old.clone(),
            new_version: self.new.clone(),
            config: self.config.clone(),
            current_step: self.current_step,
            current_weight: self.current_weight,
            status: self.status,
            started_at: self.started_at,
            old_metrics: self.old_metrics.snapshot(),
            new_metrics: self.new_metrics.snapshot(),
        }
    }

    /// Advance one promotion step; adopting the final step completes the
    /// canary at full weight.
    fn advance(&mut self) {
        let steps = &self.config.promotion_steps;
        let idx = self.current_step;
        if idx + 1 >= steps.len() {
            self.status = CanaryStatus::Complete;
            self.current_weight = 1.0;
            self.current_step = steps.len();
            info!(pipeline = %self.name, "Canary complete");
        } else {
            self.current_weight = steps[idx];
            self.current_step = idx + 1;
            self.new_metrics.reset();
            self.last_step_started_at = Instant::now();
            info!(
                pipeline = %self.name,
                step = self.current_step,
                weight = self.current_weight,
                "Canary advanced"
            );
        }
    }

    fn roll_back(&mut self, reason: &str) {
        self.status = CanaryStatus::RolledBack;
        self.current_weight = 0.0;
        warn!(pipeline = %self.name, reason = reason, "Canary rolled back");
    }

    /// Autopilot, evaluated after each recorded result. Rules fire in
    /// order; the first match wins for this call.
    fn evaluate(&mut self) {
        if self.status != CanaryStatus::Observing {
            return;
        }
        if self.new_metrics.requests < self.config.min_requests {
            return;
        }
        if self.new_metrics.error_rate() > self.config.error_threshold {
            self.roll_back("error rate above threshold");
            return;
        }
        if let Some(limit) = self.config.latency_threshold_ms {
            if self.new_metrics.p99_latency_ms() > limit as f64 {
                self.roll_back("p99 latency above threshold");
                return;
            }
        }
        if self.config.auto_promote
            && self.last_step_started_at.elapsed() >= self.config.observation_window
        {
            self.advance();
        }
    }
}

/// Weighted traffic splitter over two pipeline versions, one migration
/// per pipeline name at a time.
pub struct CanaryRouter {
    entries: DashMap<String, CanaryEntry>,
    latency_ring: usize,
}

impl CanaryRouter {
    pub fn new() -> Self {
        Self::with_latency_ring(DEFAULT_LATENCY_RING)
    }

    pub fn with_latency_ring(latency_ring: usize) -> Self {
        Self {
            entries: DashMap::new(),
            latency_ring: latency_ring.max(1),
        }
    }

    /// Begin a canary for `name`. Fails with `Conflict` while an
    /// `Observing` canary exists; terminal canaries are replaced.
    pub fn start_canary(
        &self,
        name: &str,
        old: VersionRef,
        new: VersionRef,
        config: CanaryConfig,
    ) -> Result<CanaryState, SkeinError> {
        config.validate()?;
        match self.entries.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                if slot.get().status == CanaryStatus::Observing {
                    return Err(SkeinError::Conflict(format!(
                        "canary already active for pipeline `{name}`"
                    )));
                }
                let entry = self.fresh_entry(name, old, new, config);
                let state = entry.snapshot();
                slot.insert(entry);
                Ok(state)
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let entry = self.fresh_entry(name, old, new, config);
                let state = entry.snapshot();
                slot.insert(entry);
                Ok(state)
            }
        }
    }

    fn fresh_entry(
        &self,
        name: &str,
        old: VersionRef,
        new: VersionRef,
        config: CanaryConfig,
    ) -> CanaryEntry {
        info!(
            pipeline = %name,
            old_version = old.version,
            new_version = new.version,
            weight = config.initial_weight,
            "Canary started"
        );
        CanaryEntry {
            name: name.to_string(),
            old,
            new,
            current_step: 0,
            current_weight: config.initial_weight,
            status: CanaryStatus::Observing,
            started_at: Utc::now(),
            last_step_started_at: Instant::now(),
            old_metrics: VersionMetrics::new(self.latency_ring),
            new_metrics: VersionMetrics::new(self.latency_ring),
            config,
        }
    }

    /// Pick the structural hash to serve for `name`. Returns `None`
    /// unless an `Observing` canary routes traffic for the name.
    pub fn select_version(&self, name: &str) -> Option<String> {
        let entry = self.entries.get(name)?;
        if entry.status != CanaryStatus::Observing {
            return None;
        }
        let take_new = match entry.current_weight {
            w if w <= 0.0 => false,
            w if w >= 1.0 => true,
            w => rand::rng().random_bool(w),
        };
        Some(if take_new {
            entry.new.structural_hash.clone()
        } else {
            entry.old.structural_hash.clone()
        })
    }

    /// Record an execution result on whichever side `hash` identifies,
    /// then run the autopilot. Returns the post-update state.
    pub fn record_result(
        &self,
        name: &str,
        hash: &str,
        success: bool,
        latency_ms: f64,
    ) -> Option<CanaryState> {
        let mut entry = self.entries.get_mut(name)?;
        if entry.status == CanaryStatus::Observing {
            if entry.new.structural_hash == hash {
                entry.new_metrics.record(success, latency_ms);
                entry.evaluate();
            } else if entry.old.structural_hash == hash {
                entry.old_metrics.record(success, latency_ms);
                entry.evaluate();
            }
            // A hash matching neither side is a late result from an
            // earlier regime; it does not count.
        }
        Some(entry.snapshot())
    }

    pub fn get_state(&self, name: &str) -> Option<CanaryState> {
        self.entries.get(name).map(|e| e.snapshot())
    }

    /// Manual step advance.
    pub fn promote(&self, name: &str) -> Option<CanaryState> {
        let mut entry = self.entries.get_mut(name)?;
        if entry.status == CanaryStatus::Observing {
            entry.advance();
        }
        Some(entry.snapshot())
    }

    pub fn rollback(&self, name: &str) -> Option<CanaryState> {
        let mut entry = self.entries.get_mut(name)?;
        if entry.status == CanaryStatus::Observing {
            entry.roll_back("explicit rollback");
        }
        Some(entry.snapshot())
    }

    /// Alias for `rollback`.
    pub fn abort(&self, name: &str) -> Option<CanaryState> {
        self.rollback(name)
    }

    /// Drop the canary record for `name` entirely, rolling it back first
    /// if it still routes traffic.
    pub fn remove(&self, name: &str) -> Option<CanaryState> {
        {
            let mut entry = self.entries.get_mut(name)?;
            if entry.status == CanaryStatus::Observing {
                entry.roll_back("canary deleted");
            }
        }
        self.entries.remove(name).map(|(_, e)| e.snapshot())
    }

    /// True when an `Observing` canary routes traffic for `hash`.
    /// Terminal canaries hold hashes as historical values only and do
    /// not pin images.
    pub fn references_hash(&self, hash: &str) -> bool {
        self.entries.iter().any(|e| {
            e.status == CanaryStatus::Observing
                && (e.old.structural_hash == hash || e.new.structural_hash == hash)
        })
    }

    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == CanaryStatus::Observing)
            .count()
    }
}

impl Default for CanaryRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vref(version: u32, seed: char) -> VersionRef {
        VersionRef {
            version,
            structural_hash: seed.to_string().repeat(64),
        }
    }

    fn quick_config() -> CanaryConfig {
        CanaryConfig {
            initial_weight: 1.0,
            promotion_steps: vec![1.0],
            observation_window: Duration::ZERO,
            error_threshold: 0.05,
            latency_threshold_ms: None,
            min_requests: 1,
            auto_promote: true,
        }
    }

    #[test]
    fn test_start_then_conflict_while_observing() {
        let router = CanaryRouter::new();
        router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), quick_config())
            .unwrap();
        let err = router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), quick_config())
            .unwrap_err();
        assert!(matches!(err, SkeinError::Conflict(_)));
    }

    #[test]
    fn test_terminal_state_permits_replacement() {
        let router = CanaryRouter::new();
        router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), quick_config())
            .unwrap();
        router.rollback("p").unwrap();
        let state = router
            .start_canary("p", vref(1, 'a'), vref(3, 'c'), quick_config())
            .unwrap();
        assert_eq!(state.status, CanaryStatus::Observing);
        assert_eq!(state.new_version.version, 3);
    }

    #[test]
    fn test_select_weight_extremes() {
        let router = CanaryRouter::new();
        let mut cfg = quick_config();
        cfg.initial_weight = 0.0;
        cfg.auto_promote = false;
        router
            .start_canary("zero", vref(1, 'a'), vref(2, 'b'), cfg.clone())
            .unwrap();
        for _ in 0..50 {
            assert_eq!(
                router.select_version("zero").unwrap(),
                "a".repeat(64),
                "weight 0 must always serve the old side"
            );
        }

        cfg.initial_weight = 1.0;
        router
            .start_canary("one", vref(1, 'a'), vref(2, 'b'), cfg)
            .unwrap();
        for _ in 0..50 {
            assert_eq!(router.select_version("one").unwrap(), "b".repeat(64));
        }
    }

    #[test]
    fn test_select_none_without_canary() {
        let router = CanaryRouter::new();
        assert!(router.select_version("nope").is_none());
    }

    #[test]
    fn test_autopromote_single_step_completes() {
        let router = CanaryRouter::new();
        router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), quick_config())
            .unwrap();
        let state = router.record_result("p", &"b".repeat(64), true, 4.0).unwrap();
        assert_eq!(state.status, CanaryStatus::Complete);
        assert_eq!(state.current_weight, 1.0);
        assert!(router.select_version("p").is_none());
    }

    #[test]
    fn test_error_rate_rollback() {
        let router = CanaryRouter::new();
        let mut cfg = quick_config();
        cfg.min_requests = 2;
        router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), cfg)
            .unwrap();
        let s1 = router.record_result("p", &"b".repeat(64), false, 5.0).unwrap();
        assert_eq!(s1.status, CanaryStatus::Observing, "below minRequests");
        let s2 = router.record_result("p", &"b".repeat(64), false, 5.0).unwrap();
        assert_eq!(s2.status, CanaryStatus::RolledBack);
        assert_eq!(s2.current_weight, 0.0);
        assert!(router.select_version("p").is_none());
    }

    #[test]
    fn test_error_rule_takes_precedence_over_latency() {
        let router = CanaryRouter::new();
        let mut cfg = quick_config();
        cfg.min_requests = 1;
        cfg.latency_threshold_ms = Some(1);
        router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), cfg)
            .unwrap();
        // Both rules would fire; the error rule must be the recorded cause,
        // observable as a rollback even though latency also breached.
        let s = router
            .record_result("p", &"b".repeat(64), false, 10_000.0)
            .unwrap();
        assert_eq!(s.status, CanaryStatus::RolledBack);
    }

    #[test]
    fn test_latency_rollback() {
        let router = CanaryRouter::new();
        let mut cfg = quick_config();
        cfg.auto_promote = false;
        cfg.latency_threshold_ms = Some(100);
        router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), cfg)
            .unwrap();
        let s = router.record_result("p", &"b".repeat(64), true, 500.0).unwrap();
        assert_eq!(s.status, CanaryStatus::RolledBack);
    }

    #[test]
    fn test_old_side_failures_do_not_roll_back() {
        let router = CanaryRouter::new();
        let mut cfg = quick_config();
        cfg.auto_promote = false;
        router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), cfg)
            .unwrap();
        for _ in 0..10 {
            let s = router.record_result("p", &"a".repeat(64), false, 5.0).unwrap();
            assert_eq!(s.status, CanaryStatus::Observing);
        }
    }

    #[test]
    fn test_manual_promotion_walks_all_steps() {
        let router = CanaryRouter::new();
        let mut cfg = quick_config();
        cfg.auto_promote = false;
        cfg.initial_weight = 0.1;
        cfg.promotion_steps = vec![0.25, 0.5, 1.0];
        router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), cfg)
            .unwrap();

        let s = router.promote("p").unwrap();
        assert_eq!(s.status, CanaryStatus::Observing);
        assert_eq!(s.current_weight, 0.25);
        assert_eq!(s.current_step, 1);

        let s = router.promote("p").unwrap();
        assert_eq!(s.current_weight, 0.5);

        let s = router.promote("p").unwrap();
        assert_eq!(s.status, CanaryStatus::Complete);
        assert_eq!(s.current_weight, 1.0);
    }

    #[test]
    fn test_step_advance_resets_new_metrics() {
        let router = CanaryRouter::new();
        let mut cfg = quick_config();
        cfg.auto_promote = false;
        cfg.promotion_steps = vec![0.5, 1.0];
        router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), cfg)
            .unwrap();
        router.record_result("p", &"b".repeat(64), true, 5.0);
        let s = router.promote("p").unwrap();
        assert_eq!(s.new_metrics.requests, 0, "promotion must reset the window");
        assert_eq!(s.old_metrics.requests, 0);
    }

    #[test]
    fn test_latency_ring_is_bounded() {
        let router = CanaryRouter::with_latency_ring(8);
        let mut cfg = quick_config();
        cfg.auto_promote = false;
        cfg.error_threshold = 1.0;
        router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), cfg)
            .unwrap();
        for i in 0..100 {
            router.record_result("p", &"b".repeat(64), true, i as f64);
        }
        let s = router.get_state("p").unwrap();
        assert_eq!(s.new_metrics.requests, 100);
        // Ring keeps the most recent 8 samples: 92..=99.
        assert_eq!(s.new_metrics.p99_latency_ms, 99.0);
        assert_eq!(s.new_metrics.avg_latency_ms, 95.5);
    }

    #[test]
    fn test_p99_order_statistic() {
        let mut m = VersionMetrics::new(1024);
        assert_eq!(m.p99_latency_ms(), 0.0);
        for v in [10.0, 20.0, 30.0, 40.0] {
            m.record(true, v);
        }
        // ceil(0.99 * 4) = 4 → 4th order statistic.
        assert_eq!(m.p99_latency_ms(), 40.0);
    }

    #[test]
    fn test_config_validation() {
        let router = CanaryRouter::new();
        let mut cfg = quick_config();
        cfg.initial_weight = 1.5;
        assert!(router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), cfg)
            .is_err());

        let mut cfg = quick_config();
        cfg.promotion_steps = vec![0.5, 0.2];
        assert!(router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), cfg)
            .is_err());

        let mut cfg = quick_config();
        cfg.min_requests = 0;
        assert!(router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), cfg)
            .is_err());
    }

    #[test]
    fn test_config_window_serde() {
        let json = r#"{"initialWeight":1.0,"promotionSteps":[1.0],"observationWindow":"0s","minRequests":1,"autoPromote":true}"#;
        let cfg: CanaryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.observation_window, Duration::ZERO);
        assert!(cfg.auto_promote);

        let cfg: CanaryConfig = serde_json::from_str(r#"{"observationWindow":30}"#).unwrap();
        assert_eq!(cfg.observation_window, Duration::from_secs(30));

        let cfg: CanaryConfig = serde_json::from_str(r#"{"observationWindow":"5m"}"#).unwrap();
        assert_eq!(cfg.observation_window, Duration::from_secs(300));
    }

    #[test]
    fn test_references_hash_only_while_observing() {
        let router = CanaryRouter::new();
        router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), quick_config())
            .unwrap();
        assert!(router.references_hash(&"a".repeat(64)));
        assert!(router.references_hash(&"b".repeat(64)));
        router.rollback("p");
        assert!(!router.references_hash(&"b".repeat(64)));
    }

    #[test]
    fn test_remove_rolls_back_first() {
        let router = CanaryRouter::new();
        router
            .start_canary("p", vref(1, 'a'), vref(2, 'b'), quick_config())
            .unwrap();
        let removed = router.remove("p").unwrap();
        assert_eq!(removed.status, CanaryStatus::RolledBack);
        assert!(router.get_state("p").is_none());
    }
}
