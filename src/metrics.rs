use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Encoder, Histogram, IntCounter,
    IntGauge, TextEncoder,
};

// --- Reconciliation Metrics ---

pub static TRACKED_POSITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "nexus_reconciler_tracked_positions",
        "Number of positions currently believed open"
    )
    .expect("tracked_positions gauge")
});

pub static CLOSURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "nexus_reconciler_closures_total",
        "Total position closures reconciled"
    )
    .expect("closures counter")
});

pub static RECONCILIATION_GAPS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "nexus_reconciler_gaps_total",
        "Closures whose closing deal could not be retrieved (profit defaulted to zero)"
    )
    .expect("gaps counter")
});

pub static ABORTED_PASSES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "nexus_reconciler_aborted_passes_total",
        "Passes aborted because the open-positions query failed"
    )
    .expect("aborted_passes counter")
});

pub static DUPLICATE_OPENS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "nexus_reconciler_duplicate_opens_total",
        "record_open calls that overwrote an already tracked position"
    )
    .expect("duplicate_opens counter")
});

pub static PASS_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "nexus_reconciler_pass_duration_seconds",
        "Wall time of one reconciliation pass, broker queries included",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("pass_duration histogram")
});

pub fn set_tracked_positions(count: i64) {
    TRACKED_POSITIONS.set(count);
}

pub fn inc_closures() {
    CLOSURES.inc();
}

pub fn inc_reconciliation_gaps() {
    RECONCILIATION_GAPS.inc();
}

pub fn inc_aborted_passes() {
    ABORTED_PASSES.inc();
}

pub fn inc_duplicate_opens() {
    DUPLICATE_OPENS.inc();
}

pub fn observe_pass_duration(seconds: f64) {
    PASS_DURATION.observe(seconds);
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
