//! UPI payment reference shown to the driver (rendered as a QR code by the display)

use crate::domain::error::KioskError;
use crate::domain::types::{Amount, TicketId};
use reqwest::Url;
use serde::Serialize;

/// Merchant side of a UPI collect link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpiPayee {
    pub address: String,
    pub name: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpiReference {
    pub link: String,
    pub amount: String,
    pub note: String,
}

impl UpiReference {
    /// Build a `upi://pay` link for the fee of one ticket
    pub fn new(payee: &UpiPayee, ticket_id: &TicketId, amount: Amount) -> Result<Self, KioskError> {
        let amount = amount.to_string();
        let note = format!("Exit {ticket_id}");
        let link = Url::parse_with_params(
            "upi://pay",
            &[
                ("pa", payee.address.as_str()),
                ("pn", payee.name.as_str()),
                ("am", amount.as_str()),
                ("cu", payee.currency.as_str()),
                ("tn", note.as_str()),
            ],
        )
        .map_err(|e| KioskError::PaymentSystemError(format!("invalid UPI link: {e}")))?;
        Ok(Self { link: link.to_string(), amount, note })
    }
}
