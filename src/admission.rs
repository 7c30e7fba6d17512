use crate::bans::BanRegistry;
use crate::config::AdmissionConfig;
use crate::error::AdmissionError;
use crate::identity::{self, ClientCandidates, ClientId};
use crate::metrics::{ACTIVE_BANS, FAIL_OPEN_TOTAL, TRACKED_CLIENTS};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::window::CounterStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Admit,
    RejectRateLimited,
    RejectBanned,
}

impl Decision {
    // message for the 429 body
    pub fn message(&self) -> &'static str {
        match self {
            Decision::Admit => "admitted",
            Decision::RejectRateLimited => "Rate limit exceeded. Try again later.",
            Decision::RejectBanned => "Temporarily banned for excessive requests.",
        }
    }
}

/// What the controller hands back to the HTTP layer per request.
#[derive(Debug, Clone)]
pub struct AdmissionOutcome {
    pub client: ClientId,
    pub decision: Decision,
    /// Pre-append count inside the rate window at decision time
    pub count: u32,
    pub ban_active: bool,
}

/// Admission controller: the single entry point invoked per request.
///
/// Owns the counter store and ban registry; all mutation goes through
/// [`AdmissionController::check`]. Internal store faults degrade to an
/// admit with an error-tagged telemetry event (fail-open) — only a
/// caller contract violation (no resolvable client address) is returned
/// as an error.
pub struct AdmissionController {
    config: AdmissionConfig,
    counters: CounterStore,
    bans: BanRegistry,
    sink: Arc<dyn TelemetrySink>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig, sink: Arc<dyn TelemetrySink>) -> Self {
        let counters = CounterStore::new(config.rate_window, config.cleanup_window);
        let bans = BanRegistry::new(config.ban_duration);
        Self::with_stores(config, counters, bans, sink)
    }

    /// Build a controller around pre-built stores.
    pub fn with_stores(
        config: AdmissionConfig,
        counters: CounterStore,
        bans: BanRegistry,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            config,
            counters,
            bans,
            sink,
        }
    }

    /// Decide whether the request identified by `candidates` proceeds.
    ///
    /// `now` is supplied by the caller, which is what lets tests drive
    /// synthetic clocks. `context` is an opaque payload carried into the
    /// telemetry event untouched.
    pub fn check(
        &self,
        candidates: &ClientCandidates<'_>,
        now: Instant,
        context: serde_json::Value,
    ) -> Result<AdmissionOutcome, AdmissionError> {
        let client = identity::resolve(candidates)?;

        let (decision, count, ban_active, error) = match self.evaluate(&client, now) {
            Ok((decision, count, ban_active)) => (decision, count, ban_active, None),
            Err(err) => {
                // fail open: an unprotected request beats a dead service
                log::error!("admission check failed open for {}: {}", client, err);
                FAIL_OPEN_TOTAL.inc();
                (Decision::Admit, 0, false, Some(err.to_string()))
            }
        };

        // amortize cleanup onto the request path
        if let Err(err) = self.counters.prune(&client, now) {
            log::warn!("opportunistic prune failed for {}: {}", client, err);
        }
        if let Ok(tracked) = self.counters.tracked_clients() {
            TRACKED_CLIENTS.set(tracked as f64);
        }

        let event = TelemetryEvent {
            timestamp: chrono::Utc::now(),
            client: client.as_str().to_string(),
            decision,
            count_in_window: count,
            ban_active,
            error,
            context,
        };
        if let Err(err) = self.sink.record(&event) {
            // isolated: never propagated to the decision path
            log::warn!("telemetry sink failure: {}", err);
        }

        Ok(AdmissionOutcome {
            client,
            decision,
            count,
            ban_active,
        })
    }

    // ban check -> rate check -> escalate, one client at a time
    fn evaluate(
        &self,
        client: &ClientId,
        now: Instant,
    ) -> Result<(Decision, u32, bool), AdmissionError> {
        if self.bans.is_banned(client, now) {
            return Ok((Decision::RejectBanned, 0, true));
        }

        let prior = self.counters.record_and_count(client, now)?;
        if prior >= self.config.request_limit_per_second {
            if prior > self.config.ban_threshold_count {
                self.bans.ban(client, now);
                ACTIVE_BANS.set(self.bans.active_bans(now) as f64);
                log::warn!(
                    "client {} banned for {:?} after {} requests inside the rate window",
                    client,
                    self.config.ban_duration,
                    prior
                );
                return Ok((Decision::RejectRateLimited, prior, true));
            }
            return Ok((Decision::RejectRateLimited, prior, false));
        }

        Ok((Decision::Admit, prior, false))
    }

    /// Background sweep: drop idle clients and expired bans, refresh the
    /// gauges. Correctness never depends on this running; reads already
    /// resolve staleness lazily.
    pub fn sweep(&self, now: Instant) {
        match self.counters.prune_idle(now) {
            Ok(removed) if removed > 0 => log::debug!("sweep removed {} idle clients", removed),
            Ok(_) => {}
            Err(err) => log::warn!("idle sweep failed: {}", err),
        }
        let evicted = self.bans.evict_expired(now);
        if evicted > 0 {
            log::debug!("sweep evicted {} expired bans", evicted);
        }
        if let Ok(tracked) = self.counters.tracked_clients() {
            TRACKED_CLIENTS.set(tracked as f64);
        }
        ACTIVE_BANS.set(self.bans.active_bans(now) as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryError;
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingSink {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn events(&self) -> Vec<TelemetryEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl TelemetrySink for RecordingSink {
        fn record(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl TelemetrySink for FailingSink {
        fn record(&self, _event: &TelemetryEvent) -> Result<(), TelemetryError> {
            Err(TelemetryError::Io(std::io::Error::other("sink down")))
        }
    }

    fn test_config(limit: u32, threshold: u32, ban_secs: u64) -> AdmissionConfig {
        AdmissionConfig {
            request_limit_per_second: limit,
            ban_threshold_count: threshold,
            ban_duration: Duration::from_secs(ban_secs),
            ..Default::default()
        }
    }

    fn direct<'a>(addr: &'a str) -> ClientCandidates<'a> {
        ClientCandidates {
            real_ip: None,
            forwarded_for: None,
            direct_addr: addr,
        }
    }

    fn at(base: Instant, secs: f64) -> Instant {
        base + Duration::from_secs_f64(secs)
    }

    fn check_at(
        controller: &AdmissionController,
        addr: &str,
        t: Instant,
    ) -> AdmissionOutcome {
        controller
            .check(&direct(addr), t, serde_json::Value::Null)
            .unwrap()
    }

    #[test]
    fn admits_up_to_the_limit_within_one_second() {
        let controller =
            AdmissionController::new(test_config(10, 50, 300), RecordingSink::new());
        let base = Instant::now();

        for i in 0..10u32 {
            let outcome = check_at(&controller, "203.0.113.5:443", at(base, f64::from(i) * 0.01));
            assert_eq!(outcome.decision, Decision::Admit, "request {}", i);
            assert_eq!(outcome.count, i);
        }
        let outcome = check_at(&controller, "203.0.113.5:443", at(base, 0.11));
        assert_eq!(outcome.decision, Decision::RejectRateLimited);
    }

    #[test]
    fn burst_scenario_limit_threshold_ban() {
        // limit 3, threshold 5, ban 10s
        let sink = RecordingSink::new();
        let controller = AdmissionController::new(test_config(3, 5, 10), sink.clone());
        let base = Instant::now();

        for (i, t) in [0.0, 0.1, 0.2].iter().enumerate() {
            let outcome = check_at(&controller, "203.0.113.5", at(base, *t));
            assert_eq!(outcome.decision, Decision::Admit);
            assert_eq!(outcome.count, i as u32);
        }

        // count 3..=5: rejected but not yet over the ban threshold
        for t in [0.3, 0.35, 0.4] {
            let outcome = check_at(&controller, "203.0.113.5", at(base, t));
            assert_eq!(outcome.decision, Decision::RejectRateLimited);
            assert!(!outcome.ban_active);
        }

        // count 6 > 5: rejection escalates to a ban
        let outcome = check_at(&controller, "203.0.113.5", at(base, 0.45));
        assert_eq!(outcome.decision, Decision::RejectRateLimited);
        assert!(outcome.ban_active);

        // banned from the next call on
        let outcome = check_at(&controller, "203.0.113.5", at(base, 0.5));
        assert_eq!(outcome.decision, Decision::RejectBanned);

        // another client is unaffected
        let outcome = check_at(&controller, "198.51.100.7", at(base, 0.5));
        assert_eq!(outcome.decision, Decision::Admit);

        // 10.4s after the ban-triggering call: evaluated fresh on rate state
        let outcome = check_at(&controller, "203.0.113.5", at(base, 10.9));
        assert_eq!(outcome.decision, Decision::Admit);
        assert_eq!(outcome.count, 0);
    }

    #[test]
    fn banned_requests_skip_the_rate_check() {
        let controller =
            AdmissionController::new(test_config(3, 5, 10), RecordingSink::new());
        let base = Instant::now();

        for i in 0..7 {
            check_at(&controller, "203.0.113.5", at(base, i as f64 * 0.05));
        }
        // ban is active; hammering while banned must not extend the window
        for i in 0..20 {
            let outcome = check_at(&controller, "203.0.113.5", at(base, 1.0 + i as f64 * 0.05));
            assert_eq!(outcome.decision, Decision::RejectBanned);
        }
        // after expiry the old window entries have long lapsed
        let outcome = check_at(&controller, "203.0.113.5", at(base, 11.0));
        assert_eq!(outcome.decision, Decision::Admit);
    }

    #[test]
    fn telemetry_event_carries_the_decision_snapshot() {
        let sink = RecordingSink::new();
        let controller = AdmissionController::new(test_config(1, 50, 300), sink.clone());
        let base = Instant::now();

        let context = serde_json::json!({"method": "GET", "path": "/"});
        controller
            .check(&direct("203.0.113.5:443"), base, context.clone())
            .unwrap();
        controller
            .check(&direct("203.0.113.5:443"), at(base, 0.1), context.clone())
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].client, "203.0.113.5");
        assert_eq!(events[0].decision, Decision::Admit);
        assert_eq!(events[0].count_in_window, 0);
        assert_eq!(events[0].context, context);
        assert_eq!(events[1].decision, Decision::RejectRateLimited);
        assert_eq!(events[1].count_in_window, 1);
        assert!(events[1].error.is_none());
    }

    #[test]
    fn sink_failure_does_not_affect_the_decision() {
        let controller = AdmissionController::new(test_config(10, 50, 300), Arc::new(FailingSink));
        let base = Instant::now();

        let outcome = check_at(&controller, "203.0.113.5", base);
        assert_eq!(outcome.decision, Decision::Admit);
        let outcome = check_at(&controller, "203.0.113.5", at(base, 0.1));
        assert_eq!(outcome.decision, Decision::Admit);
    }

    #[test]
    fn internal_store_fault_fails_open_to_admit() {
        let sink = RecordingSink::new();
        let config = test_config(1, 5, 300);
        let counters = CounterStore::new(config.rate_window, config.cleanup_window);
        counters.poison_lock();
        let controller = AdmissionController::with_stores(
            config.clone(),
            counters,
            crate::bans::BanRegistry::new(config.ban_duration),
            sink.clone(),
        );
        let base = Instant::now();

        // even hammering past the limit admits: the rate state is unreadable
        for i in 0..5 {
            let outcome = check_at(&controller, "203.0.113.5", at(base, i as f64 * 0.01));
            assert_eq!(outcome.decision, Decision::Admit);
            assert_eq!(outcome.count, 0);
            assert!(!outcome.ban_active);
        }

        let events = sink.events();
        assert_eq!(events.len(), 5);
        for event in &events {
            assert_eq!(event.decision, Decision::Admit);
            assert!(
                event.error.as_deref().unwrap().contains("poisoned"),
                "expected an error-tagged event, got {:?}",
                event.error
            );
        }
    }

    #[test]
    fn ban_escalation_refreshes_the_active_bans_gauge() {
        use crate::metrics::ACTIVE_BANS;

        let controller =
            AdmissionController::new(test_config(1, 2, 300), RecordingSink::new());
        let base = Instant::now();

        // counts 0..=3; the count-3 call crosses the threshold and bans
        for i in 0..4 {
            check_at(&controller, "192.0.2.200", at(base, i as f64 * 0.01));
        }
        assert!(ACTIVE_BANS.get() >= 1.0);
    }

    #[test]
    fn unresolvable_client_is_reported_not_failed_open() {
        let controller =
            AdmissionController::new(test_config(10, 50, 300), RecordingSink::new());
        let result = controller.check(&direct(""), Instant::now(), serde_json::Value::Null);
        assert!(matches!(result, Err(AdmissionError::NoClientAddress)));
    }

    #[test]
    fn sweep_bounds_memory_to_active_clients() {
        let controller =
            AdmissionController::new(test_config(10, 50, 300), RecordingSink::new());
        let base = Instant::now();

        for i in 0..100 {
            let addr = format!("10.0.{}.{}", i / 256, i % 256);
            check_at(&controller, &addr, base);
        }
        check_at(&controller, "203.0.113.5", at(base, 59.0));

        controller.sweep(at(base, 61.0));
        // only the late client is inside the retention horizon
        let outcome = check_at(&controller, "203.0.113.5", at(base, 61.5));
        assert_eq!(outcome.count, 0);
    }

    #[test]
    fn concurrent_checks_do_not_deadlock() {
        use std::thread;

        let controller = Arc::new(AdmissionController::new(
            test_config(5, 20, 1),
            RecordingSink::new(),
        ));

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let controller = controller.clone();
                thread::spawn(move || {
                    let addr = format!("192.0.2.{}", worker);
                    for _ in 0..50 {
                        let _ = controller.check(
                            &direct(&addr),
                            Instant::now(),
                            serde_json::Value::Null,
                        );
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        controller.sweep(Instant::now());
    }
}
