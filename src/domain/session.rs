//! Exit session data model
//!
//! One `ExitSession` is live per terminal. It is rebuilt from scratch on every
//! reset, so nothing from a previous vehicle can leak into the next one.

use crate::domain::types::{Amount, PaymentMethod, TicketDetails, TicketId};
use serde::Serialize;

/// Lifecycle stage of the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KioskState {
    Scan,
    Payment,
    StatusSuccess,
    StatusFail,
    Assistance,
}

impl KioskState {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            KioskState::Scan => "scan",
            KioskState::Payment => "payment",
            KioskState::StatusSuccess => "status-success",
            KioskState::StatusFail => "status-fail",
            KioskState::Assistance => "assistance",
        }
    }

    /// States in which fee and ticket details must be present
    pub fn holds_quote(&self) -> bool {
        matches!(self, KioskState::Payment | KioskState::StatusSuccess | KioskState::StatusFail)
    }
}

impl std::fmt::Display for KioskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session identity, bumped on every reset and every new scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[repr(transparent)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stamp carried by an outstanding backend call.
///
/// A response is applied only if its token equals the controller's current
/// in-flight token; anything else belongs to a session that no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallToken {
    pub session: SessionId,
    pub call: u64,
}

impl std::fmt::Display for CallToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.session, self.call)
    }
}

/// Why an attendant was called
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistanceReason {
    /// Payment countdown expired
    Timeout,
    /// Driver pressed the call button
    Requested,
    /// Driver lost the ticket
    LostTicket,
}

impl AssistanceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistanceReason::Timeout => "timeout",
            AssistanceReason::Requested => "requested",
            AssistanceReason::LostTicket => "lost_ticket",
        }
    }
}

/// Hand-off to a human attendant, produced whenever the terminal enters `Assistance`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendantNotice {
    pub gate_id: String,
    pub session: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<TicketId>,
    /// What the attendant has to collect, as quoted before the hand-off
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<PaymentMethod>,
    pub reason: AssistanceReason,
}

/// Severity of a terminal notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Message shown to the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { level, title: title.into(), message: message.into() }
    }
}

/// The single live exit transaction
#[derive(Debug, Clone, PartialEq)]
pub struct ExitSession {
    pub id: SessionId,
    pub ticket_id: Option<TicketId>,
    pub ticket_details: Option<TicketDetails>,
    pub calculated_fee: Option<Amount>,
    pub payment_method: Option<PaymentMethod>,
}

impl ExitSession {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            ticket_id: None,
            ticket_details: None,
            calculated_fee: None,
            payment_method: None,
        }
    }

    /// True when nothing but the identity is set
    pub fn is_empty(&self) -> bool {
        self.ticket_id.is_none()
            && self.ticket_details.is_none()
            && self.calculated_fee.is_none()
            && self.payment_method.is_none()
    }

    pub fn has_quote(&self) -> bool {
        self.ticket_details.is_some() && self.calculated_fee.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_empty() {
        let session = ExitSession::new(SessionId(3));
        assert!(session.is_empty());
        assert!(!session.has_quote());
        assert_eq!(session.id, SessionId(3));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(KioskState::StatusSuccess.as_str(), "status-success");
        assert_eq!(serde_json::to_string(&KioskState::StatusFail).unwrap(), "\"status-fail\"");
        assert!(KioskState::Payment.holds_quote());
        assert!(!KioskState::Assistance.holds_quote());
    }
}
