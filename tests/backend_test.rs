//! Integration tests for the HTTP backend client against a local hyper server

use bytes::Bytes;
use exit_kiosk::domain::error::KioskError;
use exit_kiosk::domain::types::{Amount, PaymentMethod, SettlementRequestBody, TicketId};
use exit_kiosk::io::{HttpBackend, PaymentGateway, TicketValidator};
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

type Handler = fn(&Method, &str, &[u8]) -> (StatusCode, String);

/// Serve `handler` on an ephemeral port; returns the base URL and the captured request bodies
async fn spawn_server(handler: Handler) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let captured = bodies.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { return };
            let captured = captured.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let captured = captured.clone();
                    async move {
                        let method = req.method().clone();
                        let path = req.uri().path().to_string();
                        let body = req.into_body().collect().await.unwrap().to_bytes();
                        if !body.is_empty() {
                            let text = String::from_utf8_lossy(&body).to_string();
                            captured.lock().unwrap().push(text);
                        }
                        let (status, text) = handler(&method, &path, &body);
                        let mut response = Response::new(Full::new(Bytes::from(text)));
                        *response.status_mut() = status;
                        Ok::<_, Infallible>(response)
                    }
                });
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
            });
        }
    });

    (format!("http://{addr}"), bodies)
}

fn parking_backend(method: &Method, path: &str, body: &[u8]) -> (StatusCode, String) {
    match (method, path) {
        (&Method::GET, "/exit/details/42") => (
            StatusCode::OK,
            r#"{"ticket_id": 42, "vehicle_number": "MH12AB1234",
                "entry_time": "2026-10-19T08:15:00.123456",
                "current_time": "2026-10-19T11:20:00",
                "duration_minutes": 185, "calculated_fee": 75.5}"#
                .to_string(),
        ),
        (&Method::GET, "/exit/details/7") => {
            (StatusCode::BAD_REQUEST, r#"{"detail": "Ticket already paid"}"#.to_string())
        }
        (&Method::GET, "/exit/details/8") => (StatusCode::OK, "not json".to_string()),
        (&Method::GET, "/exit/details/9") => {
            (StatusCode::SERVICE_UNAVAILABLE, "upstream down".to_string())
        }
        (&Method::GET, _) => {
            (StatusCode::NOT_FOUND, r#"{"detail": "Active ticket not found"}"#.to_string())
        }
        (&Method::POST, "/exit/payment") => {
            let body: serde_json::Value = serde_json::from_slice(body).unwrap();
            match body["payment_method"].as_str() {
                Some("cash") => (
                    StatusCode::OK,
                    r#"{"payment_id": 11, "payment_status": "successful",
                        "transaction_time": "2026-10-19T11:21:00",
                        "message": "Payment successful. Thank you!"}"#
                        .to_string(),
                ),
                Some("upi") => (
                    StatusCode::OK,
                    r#"{"payment_status": "declined", "message": "UPI payment declined"}"#
                        .to_string(),
                ),
                _ => (
                    StatusCode::BAD_REQUEST,
                    r#"{"detail": "Insufficient payment. Required: 75.5, Paid: 10.0"}"#.to_string(),
                ),
            }
        }
        _ => (StatusCode::NOT_FOUND, String::new()),
    }
}

fn settlement(method: PaymentMethod) -> SettlementRequestBody {
    SettlementRequestBody {
        ticket_id: TicketId::from("42"),
        amount_paid: Amount(7550),
        payment_method: method,
    }
}

async fn backend() -> (HttpBackend, Arc<Mutex<Vec<String>>>) {
    let (url, bodies) = spawn_server(parking_backend).await;
    (HttpBackend::new(&url, Duration::from_secs(2)).unwrap(), bodies)
}

#[tokio::test]
async fn test_validate_ticket_ok() {
    let (backend, _) = backend().await;
    let quote = backend.validate_ticket(&TicketId::from("42")).await.unwrap();

    assert_eq!(quote.details.ticket_id, TicketId::from("42"));
    assert_eq!(quote.calculated_fee, Amount(7550));
    assert_eq!(quote.details.duration_minutes, Some(185));
    assert_eq!(quote.details.spot_number, None);
    assert_eq!(quote.details.entry_time.to_rfc3339(), "2026-10-19T08:15:00.123456+00:00");
}

#[tokio::test]
async fn test_validate_ticket_error_mapping() {
    let (backend, _) = backend().await;

    let err = backend.validate_ticket(&TicketId::from("404")).await.unwrap_err();
    assert_eq!(err, KioskError::TicketNotFound("Active ticket not found".to_string()));

    let err = backend.validate_ticket(&TicketId::from("7")).await.unwrap_err();
    assert_eq!(err, KioskError::TicketInactive("Ticket already paid".to_string()));

    let err = backend.validate_ticket(&TicketId::from("8")).await.unwrap_err();
    assert!(matches!(err, KioskError::NetworkFailure(_)));

    let err = backend.validate_ticket(&TicketId::from("9")).await.unwrap_err();
    assert!(matches!(err, KioskError::NetworkFailure(_)));
}

#[tokio::test]
async fn test_ticket_id_cannot_reach_another_resource() {
    let (backend, bodies) = backend().await;

    // Each id must resolve as one literal ticket, never as ticket 42 or the payment route
    for typed in ["42?x=1", "42#x", "42/", "../payment", "../../exit/payment"] {
        let err = backend.validate_ticket(&TicketId::from(typed)).await.unwrap_err();
        assert!(matches!(err, KioskError::TicketNotFound(_)), "{typed}: {err:?}");
    }
    assert!(bodies.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_settle_sends_full_amount() {
    let (backend, bodies) = backend().await;
    let response = backend.settle(&settlement(PaymentMethod::Cash)).await.unwrap();

    assert!(response.is_successful());
    assert_eq!(response.payment_id, Some(11));

    let sent: serde_json::Value = serde_json::from_str(&bodies.lock().unwrap()[0]).unwrap();
    assert_eq!(sent["ticket_id"], 42);
    assert_eq!(sent["amount_paid"], 75.5);
    assert_eq!(sent["payment_method"], "cash");
}

#[tokio::test]
async fn test_settle_declined_and_rejected() {
    let (backend, _) = backend().await;

    let declined = backend.settle(&settlement(PaymentMethod::Upi)).await.unwrap();
    assert!(!declined.is_successful());
    assert_eq!(declined.message.as_deref(), Some("UPI payment declined"));

    let err = backend.settle(&settlement(PaymentMethod::Card)).await.unwrap_err();
    assert_eq!(
        err,
        KioskError::PaymentSystemError(
            "Insufficient payment. Required: 75.5, Paid: 10.0".to_string()
        )
    );
}

#[tokio::test]
async fn test_unreachable_backend_is_network_failure() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = HttpBackend::new(&format!("http://{addr}"), Duration::from_millis(500)).unwrap();
    let err = backend.validate_ticket(&TicketId::from("42")).await.unwrap_err();
    assert!(matches!(err, KioskError::NetworkFailure(_)));

    let err = backend.settle(&settlement(PaymentMethod::Cash)).await.unwrap_err();
    assert!(matches!(err, KioskError::NetworkFailure(_)));
}
