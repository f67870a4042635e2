//! Prometheus metrics HTTP endpoint
//!
//! Exposes kiosk metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{
    Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS,
};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with gate label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    gate: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{gate=\"{gate}\"}} {val}");
}

/// Write a latency histogram in milliseconds
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    gate: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");
    let mut cumulative = 0u64;
    for (bound, count) in METRICS_BUCKET_BOUNDS.iter().zip(buckets.iter()) {
        cumulative += count;
        let _ = writeln!(output, "{name}_bucket{{gate=\"{gate}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{gate=\"{gate}\",le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum{{gate=\"{gate}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{gate=\"{gate}\"}} {cumulative}");
}

/// Render all metrics in Prometheus text format
pub fn format_prometheus_metrics(metrics: &Metrics, gate: &str) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(4096);

    write_exit_metrics(&mut output, gate, &summary);
    write_drop_metrics(&mut output, gate, &summary);
    write_barrier_metrics(&mut output, gate, &summary);
    write_state_metrics(&mut output, gate, &summary);
    write_latency_metrics(&mut output, gate, &summary);

    output
}

fn write_exit_metrics(output: &mut String, gate: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "kiosk_validations_total",
        "Tickets submitted for validation",
        MetricType::Counter,
        gate,
        summary.validations_total,
    );
    write_metric(
        output,
        "kiosk_validations_failed_total",
        "Ticket validations that failed",
        MetricType::Counter,
        gate,
        summary.validations_failed,
    );
    write_metric(
        output,
        "kiosk_settlements_total",
        "Settlement attempts",
        MetricType::Counter,
        gate,
        summary.settlements_total,
    );
    write_metric(
        output,
        "kiosk_settlements_succeeded_total",
        "Settlements reported successful",
        MetricType::Counter,
        gate,
        summary.settlements_succeeded,
    );
    write_metric(
        output,
        "kiosk_settlements_failed_total",
        "Settlements declined or errored",
        MetricType::Counter,
        gate,
        summary.settlements_failed,
    );
    write_metric(
        output,
        "kiosk_card_forms_rejected_total",
        "Card forms rejected before submission",
        MetricType::Counter,
        gate,
        summary.card_forms_rejected,
    );
    write_metric(
        output,
        "kiosk_payment_timeouts_total",
        "Payment countdown expiries",
        MetricType::Counter,
        gate,
        summary.payment_timeouts,
    );
    write_metric(
        output,
        "kiosk_assistance_requests_total",
        "Attendant hand-offs",
        MetricType::Counter,
        gate,
        summary.assistance_requests,
    );
}

fn write_drop_metrics(output: &mut String, gate: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "kiosk_stale_responses_total",
        "Backend responses dropped for a discarded session",
        MetricType::Counter,
        gate,
        summary.stale_responses,
    );
    write_metric(
        output,
        "kiosk_side_effects_dropped_total",
        "Barrier or attendant commands dropped on a full queue",
        MetricType::Counter,
        gate,
        summary.side_effects_dropped,
    );
}

fn write_barrier_metrics(output: &mut String, gate: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "kiosk_barrier_opens_total",
        "Barrier open commands the relay accepted",
        MetricType::Counter,
        gate,
        summary.barrier_opens,
    );
    write_metric(
        output,
        "kiosk_barrier_open_failures_total",
        "Barrier open commands that failed",
        MetricType::Counter,
        gate,
        summary.barrier_open_failures,
    );
}

fn write_state_metrics(output: &mut String, gate: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "kiosk_state",
        "Current state (0=scan 1=payment 2=success 3=fail 4=assistance)",
        MetricType::Gauge,
        gate,
        summary.current_state,
    );
    write_metric(
        output,
        "kiosk_backend_latency_max_ms",
        "Slowest backend call",
        MetricType::Gauge,
        gate,
        summary.backend_latency_max_ms,
    );
}

fn write_latency_metrics(output: &mut String, gate: &str, summary: &MetricsSummary) {
    write_histogram(
        output,
        "kiosk_validation_latency_ms",
        "Ticket validation latency",
        gate,
        &summary.validation_latency_buckets,
        summary.validation_latency_sum_ms,
    );
    write_histogram(
        output,
        "kiosk_settlement_latency_ms",
        "Settlement latency",
        gate,
        &summary.settlement_latency_buckets,
        summary.settlement_latency_sum_ms,
    );
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    gate_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (status, content_type, body) = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => (
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&metrics, &gate_id),
        ),
        (&Method::GET, "/health") => (StatusCode::OK, "text/plain", "ok".to_string()),
        _ => (StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    Ok(response)
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    gate_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let gate_id = Arc::new(gate_id);

    info!(port = %port, gate = %gate_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let gate_id = gate_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let gate_id = gate_id.clone();
                                async move { handle_request(req, metrics, gate_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
