//! Domain models - exit session and payment types
//!
//! This module contains the canonical data types used throughout the terminal:
//! - `ExitSession` - the single live exit transaction
//! - `KioskState` - lifecycle stage of the terminal
//! - `TicketDetails` / `TicketQuote` - data returned by ticket validation
//! - `CardForm` - locally validated card input
//! - `KioskError` - every error surfaced to the driver

pub mod card;
pub mod error;
pub mod session;
pub mod types;
pub mod upi;

// Re-export commonly used types at module level
pub use card::{CardForm, CardFormError};
pub use error::KioskError;
pub use session::{
    AssistanceReason, AttendantNotice, CallToken, ExitSession, KioskState, Notice, NoticeLevel,
    SessionId,
};
pub use types::{Amount, PaymentMethod, SettlementResponse, TicketDetails, TicketId, TicketQuote};
pub use upi::{UpiPayee, UpiReference};
