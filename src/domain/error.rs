//! Error kinds surfaced at the kiosk controller boundary
//!
//! None of these is fatal: every one is reported on the terminal and the
//! controller stays in a state from which the user can retry or reset.

use crate::domain::card::CardFormError;
use crate::domain::session::KioskState;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KioskError {
    /// Backend has no ticket with this identifier
    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    /// Ticket exists but is already paid or closed
    #[error("Ticket not active: {0}")]
    TicketInactive(String),

    /// Transport failure, timeout, or an unreadable backend response
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// Local card-form check failed; nothing was sent
    #[error("Card details rejected: {0}")]
    ValidationFailure(#[from] CardFormError),

    /// Payment service answered but did not report success
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// Payment service rejected the request
    #[error("Payment system error: {0}")]
    PaymentSystemError(String),

    /// Event does not apply to the current state
    #[error("{event} is not allowed while in {state}")]
    InvalidTransition { event: &'static str, state: KioskState },
}

impl KioskError {
    /// Text shown to the driver on the terminal
    pub fn user_message(&self) -> String {
        match self {
            KioskError::TicketNotFound(detail) | KioskError::TicketInactive(detail) => {
                if detail.is_empty() {
                    "This ticket could not be found or is no longer active.".to_string()
                } else {
                    detail.clone()
                }
            }
            KioskError::NetworkFailure(_) => {
                "An unexpected error occurred. Please try again.".to_string()
            }
            KioskError::ValidationFailure(e) => e.to_string(),
            KioskError::PaymentDeclined(_) => {
                "The transaction was declined. Please try another method.".to_string()
            }
            KioskError::PaymentSystemError(detail) => {
                if detail.is_empty() {
                    "An unexpected error occurred.".to_string()
                } else {
                    detail.clone()
                }
            }
            KioskError::InvalidTransition { .. } => "Please wait.".to_string(),
        }
    }

    /// Short stable name for logs and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            KioskError::TicketNotFound(_) => "ticket_not_found",
            KioskError::TicketInactive(_) => "ticket_inactive",
            KioskError::NetworkFailure(_) => "network_failure",
            KioskError::ValidationFailure(_) => "validation_failure",
            KioskError::PaymentDeclined(_) => "payment_declined",
            KioskError::PaymentSystemError(_) => "payment_system_error",
            KioskError::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        assert_eq!(
            KioskError::TicketNotFound(String::new()).user_message(),
            "This ticket could not be found or is no longer active."
        );
        assert_eq!(
            KioskError::TicketNotFound("Active ticket not found".into()).user_message(),
            "Active ticket not found"
        );
        assert_eq!(
            KioskError::ValidationFailure(CardFormError::Expired).user_message(),
            "Card has expired."
        );
        assert!(KioskError::NetworkFailure("connection refused".into())
            .user_message()
            .starts_with("An unexpected error"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = KioskError::InvalidTransition {
            event: "select_payment_method",
            state: KioskState::Scan,
        };
        assert_eq!(err.to_string(), "select_payment_method is not allowed while in scan");
        assert_eq!(err.kind(), "invalid_transition");
    }
}
