//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `backend` - HTTP client for ticket validation and payment settlement
//! - `attendant` - Attendant notification worker
//! - `journal` - Exit record output to file (JSONL format)
//! - `prometheus` - Prometheus metrics HTTP endpoint
//! - `terminal` - Line command parsing and view rendering

pub mod attendant;
pub mod backend;
pub mod journal;
pub mod prometheus;
pub mod terminal;

// Re-export commonly used types
pub use attendant::{create_attendant_channel, AttendantSender, HttpAttendantNotifier};
pub use backend::{HttpBackend, PaymentGateway, TicketValidator};
pub use journal::{ExitOutcome, ExitRecord, Journal};
