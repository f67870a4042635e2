//! Line-oriented terminal surface
//!
//! Turns operator/driver input lines into `KioskCommand`s and renders
//! `KioskView` snapshots as short text blocks.

use crate::domain::card::CardForm;
use crate::domain::session::{AssistanceReason, KioskState};
use crate::domain::types::{PaymentMethod, TicketId};
use crate::services::controller::KioskView;
use crate::services::countdown::CountdownTier;
use crate::services::kiosk::KioskCommand;
use std::fmt::Write;
use thiserror::Error;

pub const HELP: &str = "\
commands:
  scan <ticket>                 validate a ticket
  cash | card | upi             choose a payment method
  card <number> <MM/YY> <cvc>   pay by card in one step
  card-cancel                   close the card form
  upi-confirm                   confirm the UPI transfer
  cancel                        abandon this exit
  retry                         retry a failed payment
  new                           start the next exit
  help | lost                   call an attendant
  quit                          stop the terminal";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown command '{0}' (type 'commands' for a list)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// What a line of input asks for
#[derive(Debug, Clone)]
pub enum Input {
    /// Nothing to do (blank line)
    Empty,
    /// Print the command list
    Commands,
    Kiosk(Vec<KioskCommand>),
}

pub fn parse_line(line: &str) -> Result<Input, InputError> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Ok(Input::Empty);
    };
    let args: Vec<&str> = parts.collect();

    let commands = match (word.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("scan", [ticket]) => vec![KioskCommand::Scan(TicketId::new(*ticket))],
        ("scan", _) => return Err(InputError::Usage("scan <ticket>")),
        ("cash", []) => vec![KioskCommand::SelectMethod(PaymentMethod::Cash)],
        ("card", []) => vec![KioskCommand::SelectMethod(PaymentMethod::Card)],
        ("card", [number, expiry, cvc]) => vec![
            KioskCommand::SelectMethod(PaymentMethod::Card),
            KioskCommand::SubmitCard(CardForm::new(*number, *expiry, *cvc)),
        ],
        ("card", _) => return Err(InputError::Usage("card <number> <MM/YY> <cvc>")),
        ("card-cancel", []) => vec![KioskCommand::CancelCard],
        ("upi", []) => vec![KioskCommand::SelectMethod(PaymentMethod::Upi)],
        ("upi-confirm", []) => vec![KioskCommand::ConfirmUpi],
        ("cancel", []) => vec![KioskCommand::Cancel],
        ("retry", []) => vec![KioskCommand::Retry],
        ("new", []) => vec![KioskCommand::NewExit],
        ("help", []) => vec![KioskCommand::RequestAssistance(AssistanceReason::Requested)],
        ("lost", []) => vec![KioskCommand::RequestAssistance(AssistanceReason::LostTicket)],
        ("quit" | "exit", []) => vec![KioskCommand::Shutdown],
        ("commands" | "?", []) => return Ok(Input::Commands),
        (other, _) => return Err(InputError::Unknown(other.to_string())),
    };
    Ok(Input::Kiosk(commands))
}

fn headline(state: KioskState) -> &'static str {
    match state {
        KioskState::Scan => "Scan your parking ticket",
        KioskState::Payment => "Choose how to pay",
        KioskState::StatusSuccess => "Payment successful",
        KioskState::StatusFail => "Payment failed",
        KioskState::Assistance => "Attendant called",
    }
}

/// Render a view as the text shown on the terminal
pub fn render_view(view: &KioskView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} [{}] ==", headline(view.state), view.state);

    if let Some(ref details) = view.ticket_details {
        let _ = writeln!(out, "ticket:   {}", details.ticket_id);
        if let Some(ref vehicle) = details.vehicle_number {
            let _ = writeln!(out, "vehicle:  {vehicle}");
        }
        if let Some(ref spot) = details.spot_number {
            let _ = writeln!(out, "spot:     {spot}");
        }
        let _ = writeln!(out, "entry:    {}", details.entry_time.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(ref duration) = view.parking_duration {
        let _ = writeln!(out, "duration: {duration}");
    }
    if let Some(fee) = view.fee {
        let _ = writeln!(out, "fee:      INR {fee}");
    }
    if let Some(method) = view.payment_method {
        let _ = writeln!(out, "method:   {}", method.label());
    }
    if let (Some(remaining), Some(tier)) = (view.remaining_seconds, view.tier) {
        let marker = match tier {
            CountdownTier::Normal => "",
            CountdownTier::Warning => " (hurry)",
            CountdownTier::Critical => " (!)",
        };
        let _ = writeln!(out, "time:     {}:{:02}{marker}", remaining / 60, remaining % 60);
    }
    if view.awaiting_card_form {
        let _ = writeln!(out, "enter:    card <number> <MM/YY> <cvc>  or  card-cancel");
    }
    if let Some(ref upi) = view.upi {
        let _ = writeln!(out, "upi:      {}", upi.link);
        let _ = writeln!(out, "then:     upi-confirm");
    }
    if let Some(ref notice) = view.notice {
        let _ = writeln!(out, "{}: {}", notice.title, notice.message);
    }
    let _ = write!(out, "> {}", view.log_line);
    out
}
