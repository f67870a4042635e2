//! Exit journal - appends one record per finished exit attempt
//!
//! Records are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::session::{AssistanceReason, AttendantNotice, ExitSession, SessionId};
use crate::domain::types::{Amount, PaymentMethod, TicketId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};
use uuid::Uuid;

/// How an exit attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitOutcome {
    Paid,
    Declined,
    Failed,
    Assistance(AssistanceReason),
}

impl ExitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitOutcome::Paid => "paid",
            ExitOutcome::Declined => "declined",
            ExitOutcome::Failed => "failed",
            ExitOutcome::Assistance(_) => "assistance",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExitRecord {
    /// Time-sortable record id (UUIDv7)
    pub rid: String,
    pub gate_id: String,
    pub session: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<TicketId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<PaymentMethod>,
    pub outcome: ExitOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub ts: DateTime<Utc>,
}

impl ExitRecord {
    pub fn from_session(
        gate_id: &str,
        session: &ExitSession,
        outcome: ExitOutcome,
        message: Option<String>,
    ) -> Self {
        Self {
            rid: Uuid::now_v7().to_string(),
            gate_id: gate_id.to_string(),
            session: session.id,
            ticket_id: session.ticket_id.clone(),
            vehicle_number: session.ticket_details.as_ref().and_then(|d| d.vehicle_number.clone()),
            fee: session.calculated_fee,
            method: session.payment_method,
            outcome,
            message,
            ts: Utc::now(),
        }
    }

    /// Record of a hand-off; the terminal session no longer holds the quote
    pub fn from_notice(notice: &AttendantNotice) -> Self {
        Self {
            rid: Uuid::now_v7().to_string(),
            gate_id: notice.gate_id.clone(),
            session: notice.session,
            ticket_id: notice.ticket_id.clone(),
            vehicle_number: notice.vehicle_number.clone(),
            fee: notice.fee,
            method: notice.method,
            outcome: ExitOutcome::Assistance(notice.reason),
            message: None,
            ts: Utc::now(),
        }
    }
}

/// Append-only JSONL writer
pub struct Journal {
    file_path: String,
}

impl Journal {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "journal_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a record; returns true if successful
    pub fn write(&self, record: &ExitRecord) -> bool {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                error!(rid = %record.rid, error = %e, "journal_serialize_failed");
                return false;
            }
        };

        match self.append_line(&line) {
            Ok(()) => {
                info!(
                    rid = %record.rid,
                    session = %record.session,
                    outcome = %record.outcome.as_str(),
                    "exit_journaled"
                );
                true
            }
            Err(e) => {
                error!(rid = %record.rid, error = %e, "journal_write_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "journal_written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TicketDetails;
    use std::fs;
    use tempfile::tempdir;

    fn paid_session() -> ExitSession {
        let mut session = ExitSession::new(SessionId(4));
        session.ticket_id = Some(TicketId::from("42"));
        session.ticket_details = Some(TicketDetails {
            ticket_id: TicketId::from("42"),
            entry_time: Utc::now(),
            spot_number: None,
            vehicle_number: Some("DL3CAF0001".to_string()),
            duration_minutes: Some(30),
        });
        session.calculated_fee = Some(Amount(7550));
        session.payment_method = Some(PaymentMethod::Upi);
        session
    }

    #[test]
    fn test_write_record() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("exits.jsonl");
        let journal = Journal::new(file_path.to_str().unwrap());

        let record =
            ExitRecord::from_session("GATE-EXIT-01", &paid_session(), ExitOutcome::Paid, None);
        assert!(journal.write(&record));

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["rid"], record.rid);
        assert_eq!(parsed["ticket_id"], 42);
        assert_eq!(parsed["fee"], 75.5);
        assert_eq!(parsed["method"], "upi");
        assert_eq!(parsed["outcome"], "paid");
        assert_eq!(parsed["vehicle_number"], "DL3CAF0001");
    }

    #[test]
    fn test_assistance_outcome_carries_reason() {
        let notice = AttendantNotice {
            gate_id: "GATE-EXIT-01".to_string(),
            session: SessionId(9),
            ticket_id: None,
            vehicle_number: None,
            fee: None,
            method: None,
            reason: AssistanceReason::LostTicket,
        };
        let json = serde_json::to_value(ExitRecord::from_notice(&notice)).unwrap();
        assert_eq!(json["outcome"]["assistance"], "lost_ticket");
        assert_eq!(json["session"], 9);
        assert!(json.get("ticket_id").is_none());
        assert!(json.get("fee").is_none());
    }

    #[test]
    fn test_timeout_record_keeps_handed_over_quote() {
        let notice = AttendantNotice {
            gate_id: "GATE-EXIT-01".to_string(),
            session: SessionId(4),
            ticket_id: Some(TicketId::from("42")),
            vehicle_number: Some("DL3CAF0001".to_string()),
            fee: Some(Amount(7550)),
            method: Some(PaymentMethod::Card),
            reason: AssistanceReason::Timeout,
        };
        let json = serde_json::to_value(ExitRecord::from_notice(&notice)).unwrap();
        assert_eq!(json["outcome"]["assistance"], "timeout");
        assert_eq!(json["vehicle_number"], "DL3CAF0001");
        assert_eq!(json["fee"], 75.5);
        assert_eq!(json["method"], "card");
    }

    #[test]
    fn test_appends_and_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("exits.jsonl");
        let journal = Journal::new(nested.to_str().unwrap());

        for outcome in [ExitOutcome::Declined, ExitOutcome::Paid] {
            let record = ExitRecord::from_session("G", &paid_session(), outcome, Some("x".into()));
            assert!(journal.write(&record));
        }

        let content = fs::read_to_string(&nested).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"declined\""));
        assert!(lines[1].contains("\"paid\""));
    }
}
