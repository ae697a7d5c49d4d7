use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::domain::Provenance;

/// Upper bounds of the resolution latency buckets.
pub const LATENCY_BOUNDS_MICROS: [u64; 5] = [1_000, 5_000, 10_000, 50_000, 100_000];

/// Process-wide engine counters, rendered for Prometheus scraping.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Rule resolutions by provenance
    pub rules_resolved_default: AtomicU64,
    pub rules_resolved_custom: AtomicU64,

    /// Rules refused because the plan lacks the module
    pub module_gate_denials: AtomicU64,

    /// Persisted values that no longer parse
    pub invalid_stored_values: AtomicU64,

    /// Permission checks by outcome
    pub permission_checks_granted: AtomicU64,
    pub permission_checks_denied: AtomicU64,

    /// Assignment writes (assign, customize, unassign, set_active)
    pub assignment_writes_total: AtomicU64,
    pub assignment_write_rejections: AtomicU64,

    /// Cross-tenant lookups turned into not-found
    pub tenancy_rejections: AtomicU64,

    /// Resolution latency, one slot per bound plus overflow
    pub resolution_latency: [AtomicU64; LATENCY_BOUNDS_MICROS.len() + 1],
    pub resolution_latency_sum_micros: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    pub fn record_resolution(&self, provenance: Provenance) {
        match provenance {
            Provenance::Default => self.rules_resolved_default.fetch_add(1, Ordering::Relaxed),
            Provenance::Custom => self.rules_resolved_custom.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_module_denial(&self) {
        self.module_gate_denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_stored_value(&self) {
        self.invalid_stored_values.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_permission_check(&self, granted: bool) {
        if granted {
            self.permission_checks_granted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.permission_checks_denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_assignment_write(&self, success: bool) {
        self.assignment_writes_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.assignment_write_rejections.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_tenancy_rejection(&self) {
        self.tenancy_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_resolution(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let slot = LATENCY_BOUNDS_MICROS
            .iter()
            .position(|bound| micros <= *bound)
            .unwrap_or(LATENCY_BOUNDS_MICROS.len());

        self.resolution_latency[slot].fetch_add(1, Ordering::Relaxed);
        self.resolution_latency_sum_micros
            .fetch_add(micros, Ordering::Relaxed);
    }

    pub fn resolutions_observed(&self) -> u64 {
        self.resolution_latency
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .sum()
    }

    fn write_latency_histogram(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP entitlr_resolution_latency_seconds Rule resolution latency");
        let _ = writeln!(out, "# TYPE entitlr_resolution_latency_seconds histogram");

        let mut cumulative = 0;
        for (bound, slot) in LATENCY_BOUNDS_MICROS.iter().zip(&self.resolution_latency) {
            cumulative += slot.load(Ordering::Relaxed);
            let le = *bound as f64 / 1_000_000.0;
            let _ = writeln!(
                out,
                "entitlr_resolution_latency_seconds_bucket{{le=\"{le}\"}} {cumulative}"
            );
        }

        let count = self.resolutions_observed();
        let sum = self.resolution_latency_sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(out, "entitlr_resolution_latency_seconds_bucket{{le=\"+Inf\"}} {count}");
        let _ = writeln!(out, "entitlr_resolution_latency_seconds_sum {sum}");
        let _ = writeln!(out, "entitlr_resolution_latency_seconds_count {count}");
    }

    /// Render all counters in the Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut out = format!(
            r#"# HELP entitlr_rule_resolutions_total Rule resolutions by provenance
# TYPE entitlr_rule_resolutions_total counter
entitlr_rule_resolutions_total{{provenance="default"}} {}
entitlr_rule_resolutions_total{{provenance="custom"}} {}

# HELP entitlr_module_gate_denials_total Rules refused for a missing module
# TYPE entitlr_module_gate_denials_total counter
entitlr_module_gate_denials_total {}

# HELP entitlr_invalid_stored_values_total Stored rule values that failed to parse
# TYPE entitlr_invalid_stored_values_total counter
entitlr_invalid_stored_values_total {}

# HELP entitlr_permission_checks_total Permission checks by outcome
# TYPE entitlr_permission_checks_total counter
entitlr_permission_checks_total{{outcome="granted"}} {}
entitlr_permission_checks_total{{outcome="denied"}} {}

# HELP entitlr_assignment_writes_total Rule assignment write attempts
# TYPE entitlr_assignment_writes_total counter
entitlr_assignment_writes_total {}

# HELP entitlr_assignment_write_rejections_total Rejected rule assignment writes
# TYPE entitlr_assignment_write_rejections_total counter
entitlr_assignment_write_rejections_total {}

# HELP entitlr_tenancy_rejections_total Cross-tenant accesses reported as not found
# TYPE entitlr_tenancy_rejections_total counter
entitlr_tenancy_rejections_total {}

"#,
            self.rules_resolved_default.load(Ordering::Relaxed),
            self.rules_resolved_custom.load(Ordering::Relaxed),
            self.module_gate_denials.load(Ordering::Relaxed),
            self.invalid_stored_values.load(Ordering::Relaxed),
            self.permission_checks_granted.load(Ordering::Relaxed),
            self.permission_checks_denied.load(Ordering::Relaxed),
            self.assignment_writes_total.load(Ordering::Relaxed),
            self.assignment_write_rejections.load(Ordering::Relaxed),
            self.tenancy_rejections.load(Ordering::Relaxed),
        );
        self.write_latency_histogram(&mut out);
        out
    }
}

/// Observes the latency of a resolution when dropped, including the
/// error paths.
pub struct ResolutionTimer<'a> {
    registry: &'a MetricsRegistry,
    start: Instant,
}

impl<'a> ResolutionTimer<'a> {
    pub fn new(registry: &'a MetricsRegistry) -> Self {
        ResolutionTimer {
            registry,
            start: Instant::now(),
        }
    }
}

impl Drop for ResolutionTimer<'_> {
    fn drop(&mut self) {
        self.registry.observe_resolution(self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_resolution() {
        let metrics = MetricsRegistry::new();

        metrics.record_resolution(Provenance::Default);
        metrics.record_resolution(Provenance::Default);
        metrics.record_resolution(Provenance::Custom);

        assert_eq!(metrics.rules_resolved_default.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.rules_resolved_custom.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_timer_records_on_drop() {
        let metrics = MetricsRegistry::new();
        {
            let _timer = ResolutionTimer::new(&metrics);
        }
        assert_eq!(metrics.resolutions_observed(), 1);
    }

    #[test]
    fn test_latency_histogram_is_cumulative() {
        let metrics = MetricsRegistry::new();
        metrics.observe_resolution(Duration::from_micros(400));
        metrics.observe_resolution(Duration::from_millis(7));
        metrics.observe_resolution(Duration::from_secs(2));

        let output = metrics.to_prometheus();

        assert!(output.contains("entitlr_resolution_latency_seconds_bucket{le=\"0.001\"} 1"));
        assert!(output.contains("entitlr_resolution_latency_seconds_bucket{le=\"0.005\"} 1"));
        assert!(output.contains("entitlr_resolution_latency_seconds_bucket{le=\"0.01\"} 2"));
        assert!(output.contains("entitlr_resolution_latency_seconds_bucket{le=\"0.1\"} 2"));
        assert!(output.contains("entitlr_resolution_latency_seconds_bucket{le=\"+Inf\"} 3"));
        assert!(output.contains("entitlr_resolution_latency_seconds_count 3"));
    }

    #[test]
    fn test_counters_rendered() {
        let metrics = MetricsRegistry::new();
        metrics.record_permission_check(false);
        metrics.record_assignment_write(false);

        let output = metrics.to_prometheus();

        assert!(output.contains("entitlr_permission_checks_total{outcome=\"denied\"} 1"));
        assert!(output.contains("entitlr_assignment_write_rejections_total 1"));
        assert!(output.contains("entitlr_module_gate_denials_total 0"));
    }
}
