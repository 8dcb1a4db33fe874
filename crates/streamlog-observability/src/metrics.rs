use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
};

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Broker: produce path
    // ============================================================================

    /// Total records appended
    pub static ref PRODUCE_RECORDS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("streamlog_produce_records_total", "Total records appended"),
        &["topic"]
    ).expect("metric can be created");

    /// Total bytes appended
    pub static ref PRODUCE_BYTES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("streamlog_produce_bytes_total", "Total bytes appended"),
        &["topic"]
    ).expect("metric can be created");

    /// Produce latency
    pub static ref PRODUCE_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("streamlog_produce_latency_seconds", "Produce latency in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["topic", "ack"]
    ).expect("metric can be created");

    /// Idempotent replays answered with the previously recorded offset
    pub static ref IDEMPOTENT_REPLAYS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("streamlog_idempotent_replays_total", "Total idempotent producer replays"),
        &["topic"]
    ).expect("metric can be created");

    /// Segment rolls (size- or age-driven)
    pub static ref SEGMENT_ROLLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("streamlog_segment_rolls_total", "Total segment rolls"),
        &["topic"]
    ).expect("metric can be created");

    // ============================================================================
    // Broker: fetch path
    // ============================================================================

    /// Total records fetched
    pub static ref FETCH_RECORDS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("streamlog_fetch_records_total", "Total records fetched"),
        &["topic"]
    ).expect("metric can be created");

    /// Total bytes fetched
    pub static ref FETCH_BYTES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("streamlog_fetch_bytes_total", "Total bytes fetched"),
        &["topic"]
    ).expect("metric can be created");

    /// Fetch latency
    pub static ref FETCH_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("streamlog_fetch_latency_seconds", "Fetch latency in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["topic"]
    ).expect("metric can be created");

    /// Batches that failed CRC validation during reads
    pub static ref CRC_MISMATCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("streamlog_crc_mismatches_total", "Batches failing CRC validation"),
        &["topic"]
    ).expect("metric can be created");

    // ============================================================================
    // Coordinator
    // ============================================================================

    /// Consumer group rebalances
    pub static ref REBALANCES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("streamlog_rebalances_total", "Total consumer group rebalances"),
        &["group"]
    ).expect("metric can be created");

    /// Active members per group
    pub static ref ACTIVE_MEMBERS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("streamlog_active_members", "Active members per consumer group"),
        &["group"]
    ).expect("metric can be created");
}

/// Register every metric with the global registry. Idempotent: duplicate
/// registration errors are ignored.
pub fn register_metrics() {
    let _ = REGISTRY.register(Box::new(PRODUCE_RECORDS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PRODUCE_BYTES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PRODUCE_LATENCY.clone()));
    let _ = REGISTRY.register(Box::new(IDEMPOTENT_REPLAYS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SEGMENT_ROLLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FETCH_RECORDS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FETCH_BYTES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FETCH_LATENCY.clone()));
    let _ = REGISTRY.register(Box::new(CRC_MISMATCHES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(REBALANCES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ACTIVE_MEMBERS.clone()));
}
