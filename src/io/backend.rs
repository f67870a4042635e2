//! Parking backend client - ticket validation and payment settlement over HTTP
//!
//! The controller only sees the `TicketValidator` and `PaymentGateway` traits,
//! so tests and the demo setup can swap in other implementations.

use crate::domain::error::KioskError;
use crate::domain::types::{SettlementRequestBody, SettlementResponse, TicketId, TicketQuote};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Looks up a ticket and the fee owed on it
#[async_trait]
pub trait TicketValidator: Send + Sync {
    async fn validate_ticket(&self, ticket_id: &TicketId) -> Result<TicketQuote, KioskError>;
}

/// Settles the fee for a ticket. The outcome comes entirely from the backend.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn settle(
        &self,
        request: &SettlementRequestBody,
    ) -> Result<SettlementResponse, KioskError>;
}

/// FastAPI style error body
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// Pull the human readable `detail` out of an error response body
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { detail: Some(serde_json::Value::String(s)) }) => s,
        Ok(ErrorBody { detail: Some(other) }) => other.to_string(),
        _ => String::new(),
    }
}

/// Map a non-success validation status to the ticket error kinds
fn validation_error(status: StatusCode, detail: String) -> KioskError {
    match status {
        StatusCode::NOT_FOUND => KioskError::TicketNotFound(detail),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::GONE => {
            KioskError::TicketInactive(detail)
        }
        _ => KioskError::NetworkFailure(format!(
            "validation returned {}: {}",
            status.as_u16(),
            detail
        )),
    }
}

/// Map a non-success settlement status; any answer from the service is a system error
fn settlement_error(status: StatusCode, detail: String) -> KioskError {
    if status.is_server_error() {
        KioskError::NetworkFailure(format!("settlement returned {}: {}", status.as_u16(), detail))
    } else {
        KioskError::PaymentSystemError(detail)
    }
}

/// reqwest-backed implementation of both collaborators
pub struct HttpBackend {
    base_url: String,
    base: Url,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, KioskError> {
        let base_url = base_url.trim_end_matches('/');
        let base = match Url::parse(base_url) {
            Ok(url) if !url.cannot_be_a_base() => url,
            Ok(_) => {
                return Err(KioskError::NetworkFailure(format!(
                    "backend url '{base_url}' cannot carry a path"
                )))
            }
            Err(e) => {
                return Err(KioskError::NetworkFailure(format!(
                    "backend url '{base_url}': {e}"
                )))
            }
        };

        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KioskError::NetworkFailure(format!("http client: {e}")))?;
        Ok(Self { base_url: base_url.to_string(), base, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The ticket id is typed at the terminal; it always stays one encoded path segment
    fn details_url(&self, ticket_id: &TicketId) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["exit", "details", ticket_id.as_str()]);
        }
        url
    }

    fn payment_url(&self) -> String {
        format!("{}/exit/payment", self.base_url)
    }
}

#[async_trait]
impl TicketValidator for HttpBackend {
    async fn validate_ticket(&self, ticket_id: &TicketId) -> Result<TicketQuote, KioskError> {
        let start = Instant::now();
        let url = self.details_url(ticket_id);

        let response = self.client.get(url).send().await.map_err(|e| {
            error!(ticket_id = %ticket_id, error = %e, "ticket_validation_request_failed");
            KioskError::NetworkFailure(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| KioskError::NetworkFailure(format!("reading validation response: {e}")))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            let detail = error_detail(&body);
            warn!(
                ticket_id = %ticket_id,
                status = %status.as_u16(),
                detail = %detail,
                latency_ms = %latency_ms,
                "ticket_validation_rejected"
            );
            return Err(validation_error(status, detail));
        }

        let quote: TicketQuote = serde_json::from_str(&body).map_err(|e| {
            error!(ticket_id = %ticket_id, error = %e, "ticket_validation_bad_payload");
            KioskError::NetworkFailure("Received invalid ticket data from the server.".to_string())
        })?;

        info!(
            ticket_id = %ticket_id,
            fee = %quote.calculated_fee,
            latency_ms = %latency_ms,
            "ticket_validation_ok"
        );
        Ok(quote)
    }
}

#[async_trait]
impl PaymentGateway for HttpBackend {
    async fn settle(
        &self,
        request: &SettlementRequestBody,
    ) -> Result<SettlementResponse, KioskError> {
        let start = Instant::now();

        let response =
            self.client.post(self.payment_url()).json(request).send().await.map_err(|e| {
                error!(ticket_id = %request.ticket_id, error = %e, "settlement_request_failed");
                KioskError::NetworkFailure(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| KioskError::NetworkFailure(format!("reading settlement response: {e}")))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            let detail = error_detail(&body);
            warn!(
                ticket_id = %request.ticket_id,
                status = %status.as_u16(),
                detail = %detail,
                latency_ms = %latency_ms,
                "settlement_rejected"
            );
            return Err(settlement_error(status, detail));
        }

        let settlement: SettlementResponse = serde_json::from_str(&body).map_err(|e| {
            error!(ticket_id = %request.ticket_id, error = %e, "settlement_bad_payload");
            KioskError::PaymentSystemError(
                "Received invalid payment data from the server.".to_string(),
            )
        })?;

        debug!(
            ticket_id = %request.ticket_id,
            method = %request.payment_method,
            amount = %request.amount_paid,
            payment_status = %settlement.payment_status,
            latency_ms = %latency_ms,
            "settlement_response"
        );
        Ok(settlement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail() {
        assert_eq!(
            error_detail(r#"{"detail":"Active ticket not found"}"#),
            "Active ticket not found"
        );
        assert_eq!(error_detail(r#"{"detail":[{"msg":"bad"}]}"#), r#"[{"msg":"bad"}]"#);
        assert_eq!(error_detail("<html>oops</html>"), "");
    }

    #[test]
    fn test_validation_error_mapping() {
        assert!(matches!(
            validation_error(StatusCode::NOT_FOUND, "x".into()),
            KioskError::TicketNotFound(d) if d == "x"
        ));
        assert!(matches!(
            validation_error(StatusCode::CONFLICT, String::new()),
            KioskError::TicketInactive(_)
        ));
        assert!(matches!(
            validation_error(StatusCode::BAD_GATEWAY, String::new()),
            KioskError::NetworkFailure(_)
        ));
    }

    #[test]
    fn test_settlement_error_mapping() {
        assert!(matches!(
            settlement_error(StatusCode::BAD_REQUEST, "Insufficient payment".into()),
            KioskError::PaymentSystemError(d) if d == "Insufficient payment"
        ));
        assert!(matches!(
            settlement_error(StatusCode::INTERNAL_SERVER_ERROR, String::new()),
            KioskError::NetworkFailure(_)
        ));
    }

    #[test]
    fn test_urls() {
        let backend = HttpBackend::new("http://127.0.0.1:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(backend.base_url(), "http://127.0.0.1:8000");
        assert_eq!(
            backend.details_url(&TicketId::from("12")).as_str(),
            "http://127.0.0.1:8000/exit/details/12"
        );
        assert_eq!(backend.payment_url(), "http://127.0.0.1:8000/exit/payment");

        let prefixed =
            HttpBackend::new("http://parking.local/api", Duration::from_secs(1)).unwrap();
        assert_eq!(
            prefixed.details_url(&TicketId::from("T-42")).as_str(),
            "http://parking.local/api/exit/details/T-42"
        );
    }

    #[test]
    fn test_details_url_encodes_ticket_id() {
        let backend = HttpBackend::new("http://127.0.0.1:8000", Duration::from_secs(1)).unwrap();
        assert_eq!(
            backend.details_url(&TicketId::from("42?x=1")).path(),
            "/exit/details/42%3Fx=1"
        );
        assert_eq!(
            backend.details_url(&TicketId::from("../payment")).path(),
            "/exit/details/..%2Fpayment"
        );
        assert_eq!(
            backend.details_url(&TicketId::from("7#frag")).path(),
            "/exit/details/7%23frag"
        );
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        assert!(matches!(
            HttpBackend::new("not a url", Duration::from_secs(1)),
            Err(KioskError::NetworkFailure(_))
        ));
        assert!(matches!(
            HttpBackend::new("mailto:desk@parking.local", Duration::from_secs(1)),
            Err(KioskError::NetworkFailure(_))
        ));
    }
}
