//! Mock parking backend
//!
//! Simulates the two exit endpoints of the parking backend for local runs:
//! - `GET /exit/details/{ticket_id}` - active ticket lookup with fee
//! - `POST /exit/payment` - settlement; marks the ticket paid
//!
//! Seeded tickets: `T-42` (75.50), `T-99` (40.00), and numeric tickets
//! 100..=199 priced with the compact-car tariff. Errors use the
//! `{"detail": "..."}` body shape of the real service.
//!
//! Usage:
//!   cargo run --bin mock-backend -- --port 8000
//!   cargo run --bin mock-backend -- --decline upi --latency-ms 1500

use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::Parser;
use exit_kiosk::domain::types::{Amount, PaymentMethod};
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mock-backend")]
#[command(about = "Mock parking backend for local exit kiosk runs")]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Payment method whose settlements are declined (cash, card, upi)
    #[arg(long)]
    decline: Option<String>,

    /// Artificial latency added to every response (ms)
    #[arg(long, default_value = "0")]
    latency_ms: u64,
}

#[derive(Debug, Clone)]
struct MockTicket {
    vehicle_number: String,
    spot_number: String,
    entry_time: DateTime<Utc>,
    fee: Option<Amount>,
    active: bool,
}

impl MockTicket {
    fn duration_minutes(&self) -> i64 {
        (Utc::now() - self.entry_time).num_minutes()
    }

    /// Fixed fee if seeded, else first hour 25.00 and 12.00 per started hour after
    fn fee(&self) -> Amount {
        if let Some(fee) = self.fee {
            return fee;
        }
        let minutes = self.duration_minutes();
        if minutes <= 0 {
            return Amount(0);
        }
        let hours = (minutes + 59) / 60;
        Amount(2500 + (hours - 1).max(0) * 1200)
    }
}

struct MockState {
    tickets: Mutex<HashMap<String, MockTicket>>,
    decline: Option<PaymentMethod>,
    latency: Duration,
    next_payment_id: Mutex<i64>,
}

impl MockState {
    fn seeded(decline: Option<PaymentMethod>, latency: Duration) -> Self {
        let now = Utc::now();
        let mut tickets = HashMap::new();
        tickets.insert(
            "T-42".to_string(),
            MockTicket {
                vehicle_number: "MH12AB1234".to_string(),
                spot_number: "A-12".to_string(),
                entry_time: now - ChronoDuration::minutes(185),
                fee: Some(Amount(7550)),
                active: true,
            },
        );
        tickets.insert(
            "T-99".to_string(),
            MockTicket {
                vehicle_number: "DL3CAF0001".to_string(),
                spot_number: "B-07".to_string(),
                entry_time: now - ChronoDuration::minutes(70),
                fee: Some(Amount(4000)),
                active: true,
            },
        );
        for id in 100..=199i64 {
            tickets.insert(
                id.to_string(),
                MockTicket {
                    vehicle_number: format!("KA01MX{:04}", id),
                    spot_number: format!("C-{:02}", id - 99),
                    entry_time: now - ChronoDuration::minutes((id - 100) * 13 + 5),
                    fee: None,
                    active: true,
                },
            );
        }
        Self { tickets: Mutex::new(tickets), decline, latency, next_payment_id: Mutex::new(1) }
    }
}

#[derive(Debug, Deserialize)]
struct PaymentBody {
    ticket_id: serde_json::Value,
    amount_paid: f64,
    payment_method: PaymentMethod,
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

fn detail(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, json!({ "detail": message }))
}

/// Ticket ids arrive as JSON numbers or strings
fn ticket_key(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn exit_details(state: &MockState, ticket_id: &str) -> Response<Full<Bytes>> {
    let Ok(tickets) = state.tickets.lock() else {
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "state unavailable");
    };
    let Some(ticket) = tickets.get(ticket_id).filter(|t| t.active) else {
        info!(ticket_id = %ticket_id, "mock_details_not_found");
        return detail(StatusCode::NOT_FOUND, "Active ticket not found");
    };

    let fee = ticket.fee();
    info!(ticket_id = %ticket_id, fee = %fee, "mock_details");
    let id_value = ticket_id
        .parse::<i64>()
        .map(serde_json::Value::from)
        .unwrap_or_else(|_| serde_json::Value::from(ticket_id));
    json_response(
        StatusCode::OK,
        json!({
            "ticket_id": id_value,
            "vehicle_number": ticket.vehicle_number,
            "spot_number": ticket.spot_number,
            // naive UTC timestamp, like the real service
            "entry_time": ticket.entry_time.naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            "current_time": Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            "duration_minutes": ticket.duration_minutes(),
            "calculated_fee": fee.as_major(),
        }),
    )
}

fn exit_payment(state: &MockState, body: &[u8]) -> Response<Full<Bytes>> {
    let payment: PaymentBody = match serde_json::from_slice(body) {
        Ok(p) => p,
        Err(e) => return detail(StatusCode::UNPROCESSABLE_ENTITY, &format!("invalid body: {e}")),
    };
    let Some(key) = ticket_key(&payment.ticket_id) else {
        return detail(StatusCode::UNPROCESSABLE_ENTITY, "ticket_id must be a number or string");
    };

    let (Ok(mut tickets), Ok(mut next_id)) = (state.tickets.lock(), state.next_payment_id.lock())
    else {
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "state unavailable");
    };
    let Some(ticket) = tickets.get_mut(&key).filter(|t| t.active) else {
        return detail(StatusCode::NOT_FOUND, "Active ticket not found");
    };

    let fee = ticket.fee();
    let paid = Amount::from_major(payment.amount_paid);
    if paid < fee {
        warn!(ticket_id = %key, fee = %fee, paid = %paid, "mock_payment_insufficient");
        return detail(
            StatusCode::BAD_REQUEST,
            &format!("Insufficient payment. Required: {fee}, Paid: {paid}"),
        );
    }

    if state.decline == Some(payment.payment_method) {
        info!(ticket_id = %key, method = %payment.payment_method, "mock_payment_declined");
        return json_response(
            StatusCode::OK,
            json!({
                "payment_status": "declined",
                "message": format!("{} payment declined by issuer", payment.payment_method.label()),
            }),
        );
    }

    ticket.active = false;
    let payment_id = *next_id;
    *next_id += 1;
    info!(
        ticket_id = %key,
        method = %payment.payment_method,
        payment_id = %payment_id,
        "mock_payment_successful"
    );

    json_response(
        StatusCode::OK,
        json!({
            "payment_id": payment_id,
            "payment_status": "successful",
            "transaction_time": Utc::now().to_rfc3339(),
            "message": "Payment successful. Thank you!",
        }),
    )
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<MockState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if !state.latency.is_zero() {
        tokio::time::sleep(state.latency).await;
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::GET, p) if p.starts_with("/exit/details/") => {
            exit_details(&state, p.trim_start_matches("/exit/details/"))
        }
        (&Method::POST, "/exit/payment") => match req.into_body().collect().await {
            Ok(collected) => exit_payment(&state, &collected.to_bytes()),
            Err(e) => detail(StatusCode::BAD_REQUEST, &format!("unreadable body: {e}")),
        },
        (&Method::GET, "/health") => json_response(StatusCode::OK, json!({ "status": "ok" })),
        _ => detail(StatusCode::NOT_FOUND, "Not Found"),
    };

    info!(method = %method, path = %path, status = %response.status().as_u16(), "mock_request");
    Ok(response)
}

fn parse_method(raw: &str) -> Option<PaymentMethod> {
    match raw.to_ascii_lowercase().as_str() {
        "cash" => Some(PaymentMethod::Cash),
        "card" => Some(PaymentMethod::Card),
        "upi" => Some(PaymentMethod::Upi),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let decline = match args.decline.as_deref() {
        Some(raw) => {
            Some(parse_method(raw).ok_or_else(|| format!("unknown payment method '{raw}'"))?)
        }
        None => None,
    };
    let state = Arc::new(MockState::seeded(decline, Duration::from_millis(args.latency_ms)));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;
    info!(
        port = %args.port,
        decline = ?decline,
        latency_ms = %args.latency_ms,
        "mock_backend_started"
    );

    loop {
        let (stream, _addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "mock_accept_error");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { handle_request(req, state).await }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(error = %e, "mock_http_error");
            }
        });
    }
}
