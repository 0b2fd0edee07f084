//! Prometheus metrics for the agent.
//!
//! One [`Metrics`] instance is owned by the service and registered in its
//! own [`Registry`], so tests can build as many as they like.

use cns_types::IPConfigState;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

use crate::ipam::{PoolCounts, StateTransitionMiddleware};

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

#[derive(Clone)]
pub struct Metrics {
    pub http_request_latency_seconds: HistogramVec,
    pub ip_assignment_latency_seconds: Histogram,
    pub ip_state_transitions_total: IntCounterVec,
    pub reconciler_passes_total: IntCounterVec,
    pub reconciler_latency_seconds: HistogramVec,
    pub pool_ips: IntGaugeVec,
    registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_request_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "cns_http_request_latency_seconds",
                "Latency of HTTP API requests in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["path", "return_code"],
        )?;
        registry.register(Box::new(http_request_latency_seconds.clone()))?;

        let ip_assignment_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "cns_ip_assignment_latency_seconds",
                "Time from a pod's IP request to its assignment in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(ip_assignment_latency_seconds.clone()))?;

        let ip_state_transitions_total = IntCounterVec::new(
            Opts::new(
                "cns_ip_state_transitions_total",
                "IP configuration state transitions",
            ),
            &["previous_state", "next_state"],
        )?;
        registry.register(Box::new(ip_state_transitions_total.clone()))?;

        let reconciler_passes_total = IntCounterVec::new(
            Opts::new("cns_reconciler_passes_total", "Reconciler passes by outcome"),
            &["reconciler", "result"],
        )?;
        registry.register(Box::new(reconciler_passes_total.clone()))?;

        let reconciler_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "cns_reconciler_latency_seconds",
                "Duration of a reconciler pass in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["reconciler"],
        )?;
        registry.register(Box::new(reconciler_latency_seconds.clone()))?;

        let pool_ips = IntGaugeVec::new(
            Opts::new("cns_pool_ips", "Secondary IPs in the pool by state"),
            &["state"],
        )?;
        registry.register(Box::new(pool_ips.clone()))?;

        Ok(Self {
            http_request_latency_seconds,
            ip_assignment_latency_seconds,
            ip_state_transitions_total,
            reconciler_passes_total,
            reconciler_latency_seconds,
            pool_ips,
            registry,
        })
    }

    pub fn observe_http(&self, path: &str, return_code: &str, elapsed: Duration) {
        self.http_request_latency_seconds
            .with_label_values(&[path, return_code])
            .observe(elapsed.as_secs_f64());
    }

    pub fn observe_reconciler(&self, reconciler: &str, ok: bool, elapsed: Duration) {
        let result = if ok { "success" } else { "failure" };
        self.reconciler_passes_total
            .with_label_values(&[reconciler, result])
            .inc();
        self.reconciler_latency_seconds
            .with_label_values(&[reconciler])
            .observe(elapsed.as_secs_f64());
    }

    pub fn set_pool_counts(&self, counts: &PoolCounts) {
        let pairs = [
            (IPConfigState::Available, counts.available),
            (IPConfigState::Assigned, counts.assigned),
            (IPConfigState::PendingRelease, counts.pending_release),
            (IPConfigState::PendingProgramming, counts.pending_programming),
        ];
        for (state, count) in pairs {
            self.pool_ips
                .with_label_values(&[state.as_str()])
                .set(count as i64);
        }
    }

    /// Middleware counting every IP state transition.
    pub fn transition_counter(&self) -> TransitionCounter {
        TransitionCounter {
            counter: self.ip_state_transitions_total.clone(),
        }
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub struct TransitionCounter {
    counter: IntCounterVec,
}

impl StateTransitionMiddleware for TransitionCounter {
    fn on_transition(&self, previous: IPConfigState, next: IPConfigState) {
        self.counter
            .with_label_values(&[previous.as_str(), next.as_str()])
            .inc();
    }
}
