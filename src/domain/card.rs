//! Local card-form checks, run before any card settlement reaches the backend

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

/// Card details as typed on the terminal keypad
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardForm {
    pub number: String,
    pub expiry: String,
    pub cvc: String,
}

impl CardForm {
    pub fn new(
        number: impl Into<String>,
        expiry: impl Into<String>,
        cvc: impl Into<String>,
    ) -> Self {
        Self { number: number.into(), expiry: expiry.into(), cvc: cvc.into() }
    }

    /// Check number, expiry and CVC in that order, reporting the first failure.
    ///
    /// `today` supplies the current month; a card expiring this month is accepted.
    pub fn validate(&self, today: NaiveDate) -> Result<(), CardFormError> {
        if !is_digits(&self.number, 16, 16) {
            return Err(CardFormError::InvalidNumber);
        }

        let (month, year) = parse_expiry(&self.expiry).ok_or(CardFormError::InvalidExpiryFormat)?;
        if (year, month) < (today.year(), today.month()) {
            return Err(CardFormError::Expired);
        }

        if !is_digits(&self.cvc, 3, 4) {
            return Err(CardFormError::InvalidCvc);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CardFormError {
    #[error("Please enter a valid 16-digit card number.")]
    InvalidNumber,
    #[error("Please enter a valid expiry date in MM/YY format.")]
    InvalidExpiryFormat,
    #[error("Card has expired.")]
    Expired,
    #[error("Please enter a valid 3 or 4-digit CVC.")]
    InvalidCvc,
}

fn is_digits(value: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit())
}

/// Parse `MM/YY` into (month, 20YY)
fn parse_expiry(value: &str) -> Option<(u32, i32)> {
    let (mm, yy) = value.split_once('/')?;
    if !is_digits(mm, 2, 2) || !is_digits(yy, 2, 2) {
        return None;
    }
    let month: u32 = mm.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    let year: i32 = yy.parse().ok()?;
    Some((month, 2000 + year))
}
