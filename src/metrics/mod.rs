//! Prometheus metrics.
//!
//! Collectors register on the default registry; `/metrics` renders the text
//! exposition format.

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

pub static POSTS_PUBLISHED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "journal_posts_published_total",
        "Draft to published transitions"
    )
    .expect("metric registration")
});

pub static VIEWS_RECORDED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("journal_views_recorded_total", "View counter increments")
        .expect("metric registration")
});

pub static NOTIFICATIONS_SENT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "journal_notifications_sent_total",
        "Subscriber emails delivered"
    )
    .expect("metric registration")
});

pub static NOTIFICATIONS_FAILED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "journal_notifications_failed_total",
        "Subscriber emails that failed delivery"
    )
    .expect("metric registration")
});

/// Actix handler that renders Prometheus metrics in text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
