//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tradepost_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");

    // Moderation Metrics
    pub static ref MODERATION_TRANSITIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tradepost_moderation_transitions_total", "Total number of moderation state transitions"),
        &["entity", "transition"]
    ).expect("metric can be created");

    // Asset Metrics
    pub static ref UPLOAD_TICKETS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tradepost_upload_tickets_total", "Total number of upload tickets issued"),
        &["realm"]
    ).expect("metric can be created");
    pub static ref DOWNLOAD_TICKETS_TOTAL: IntCounter = IntCounter::new(
        "tradepost_download_tickets_total",
        "Total number of download tickets issued"
    ).expect("metric can be created");

    // OTP Metrics
    pub static ref OTP_CODES_ISSUED_TOTAL: IntCounter = IntCounter::new(
        "tradepost_otp_codes_issued_total",
        "Total number of one-time codes issued"
    ).expect("metric can be created");

    // Notification Metrics
    pub static ref NOTIFICATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tradepost_notifications_total", "Total number of notification deliveries"),
        &["kind", "status"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tradepost_errors_total", "Total number of errors"),
        &["error_type", "endpoint"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Safe to call more than once; a collector that is already registered is
/// left alone.
pub fn init_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(MODERATION_TRANSITIONS_TOTAL.clone()),
        Box::new(UPLOAD_TICKETS_TOTAL.clone()),
        Box::new(DOWNLOAD_TICKETS_TOTAL.clone()),
        Box::new(OTP_CODES_ISSUED_TOTAL.clone()),
        Box::new(NOTIFICATIONS_TOTAL.clone()),
        Box::new(ERRORS_TOTAL.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to register metrics collector"),
        }
    }

    tracing::info!("Metrics registry initialized");
}
