//! Exit session controller
//!
//! Owns the single `ExitSession` of the terminal and moves it through
//! scan → payment → status → scan, with attendant hand-off reachable from
//! anywhere. The controller itself never awaits: every backend call is split
//! into a `begin_*` step that stamps the request with a `CallToken` and a
//! `complete_*` step that applies the response only if that token is still
//! the one in flight. A reset, a new scan, a timeout or an attendant call
//! clears the in-flight token, so a late response for a discarded session is
//! dropped instead of mutating the new one.
//!
//! The `submit_ticket` and `confirm_settlement` wrappers run begin → await →
//! complete in sequence for callers that don't need cancellation.

use crate::domain::card::CardForm;
use crate::domain::error::KioskError;
use crate::domain::session::{
    AssistanceReason, AttendantNotice, CallToken, ExitSession, KioskState, Notice, NoticeLevel,
    SessionId,
};
use crate::domain::types::{
    format_duration, Amount, PaymentMethod, SettlementRequestBody, SettlementResponse,
    TicketDetails, TicketId, TicketQuote,
};
use crate::domain::upi::{UpiPayee, UpiReference};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::backend::{PaymentGateway, TicketValidator};
use crate::services::countdown::{Countdown, CountdownTier, Tick};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const LOG_READY: &str = "Ready. Waiting for ticket scan...";

/// Timing and merchant settings the controller needs from `Config`
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub gate_id: String,
    pub payment_timeout_secs: u64,
    pub success_return_delay: Duration,
    pub failure_return_delay: Duration,
    pub upi_payee: UpiPayee,
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            gate_id: config.gate_id().to_string(),
            payment_timeout_secs: config.payment_timeout_secs(),
            success_return_delay: config.success_return_delay(),
            failure_return_delay: config.failure_return_delay(),
            upi_payee: UpiPayee {
                address: config.upi_payee().to_string(),
                name: config.upi_payee_name().to_string(),
                currency: config.upi_currency().to_string(),
            },
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Ticket lookup handed to the validation collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRequest {
    pub token: CallToken,
    pub ticket_id: TicketId,
}

/// Settlement handed to the payment collaborator. Carries the full amount every time.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementRequest {
    pub token: CallToken,
    pub body: SettlementRequestBody,
}

/// What the terminal must do after a payment button press
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Settle now (cash)
    Settle(SettlementRequest),
    /// Prompt for card details, then call `submit_card_form`
    CardFormRequired,
    /// Show the reference, then wait for `confirm_upi`
    UpiReference(UpiReference),
}

/// Backend verdict on a settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Success { message: String },
    Declined { message: String },
}

/// Result of one countdown tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Running { remaining: u64, tier: CountdownTier },
    TimedOut(AttendantNotice),
}

/// Input the payment screen is waiting for
#[derive(Debug, Clone, PartialEq)]
enum PendingInput {
    None,
    CardForm,
    UpiConfirmation(UpiReference),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AutoReturn {
    due: Instant,
    target: KioskState,
}

/// Snapshot of everything the display needs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KioskView {
    pub session: SessionId,
    pub state: KioskState,
    pub ticket_id: Option<TicketId>,
    pub ticket_details: Option<TicketDetails>,
    pub fee: Option<Amount>,
    pub payment_method: Option<PaymentMethod>,
    pub parking_duration: Option<String>,
    pub remaining_seconds: Option<u64>,
    pub progress: Option<f64>,
    pub tier: Option<CountdownTier>,
    pub awaiting_card_form: bool,
    pub upi: Option<UpiReference>,
    pub busy: bool,
    pub notice: Option<Notice>,
    pub log_line: String,
}

pub struct ExitController {
    settings: ControllerSettings,
    state: KioskState,
    session: ExitSession,
    countdown: Countdown,
    auto_return: Option<AutoReturn>,
    in_flight: Option<CallToken>,
    pending_input: PendingInput,
    next_session: u64,
    next_call: u64,
    notice: Option<Notice>,
    log_line: String,
    today: Box<dyn Fn() -> NaiveDate + Send>,
    metrics: Arc<Metrics>,
}

impl ExitController {
    pub fn new(settings: ControllerSettings, metrics: Arc<Metrics>) -> Self {
        let countdown = Countdown::new(settings.payment_timeout_secs);
        Self {
            settings,
            state: KioskState::Scan,
            session: ExitSession::new(SessionId(0)),
            countdown,
            auto_return: None,
            in_flight: None,
            pending_input: PendingInput::None,
            next_session: 1,
            next_call: 1,
            notice: None,
            log_line: LOG_READY.to_string(),
            today: Box::new(|| chrono::Local::now().date_naive()),
            metrics,
        }
    }

    /// Replace the clock used for card expiry checks
    pub fn with_today(mut self, today: impl Fn() -> NaiveDate + Send + 'static) -> Self {
        self.today = Box::new(today);
        self
    }

    pub fn state(&self) -> KioskState {
        self.state
    }

    pub fn session(&self) -> &ExitSession {
        &self.session
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.countdown.remaining()
    }

    pub fn countdown_running(&self) -> bool {
        self.countdown.is_running()
    }

    pub fn in_flight(&self) -> Option<CallToken> {
        self.in_flight
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Deadline of the scheduled auto-return, if any
    pub fn next_auto_return(&self) -> Option<Instant> {
        self.auto_return.map(|a| a.due)
    }

    // ------------------------------------------------------------------
    // Ticket validation
    // ------------------------------------------------------------------

    /// Start validating a scanned or typed ticket. Discards the previous session.
    pub fn begin_validation(
        &mut self,
        ticket_id: TicketId,
    ) -> Result<ValidationRequest, KioskError> {
        self.expect_state("submit_ticket", &[KioskState::Scan])?;

        self.session = ExitSession::new(self.bump_session());
        self.in_flight = None;

        if ticket_id.is_empty() {
            let err = KioskError::TicketNotFound("Please enter a ticket number.".to_string());
            self.metrics.record_validation(false);
            self.show_error("Invalid Ticket", &err);
            self.log_line = "Validation failed. Please try again.".to_string();
            return Err(err);
        }

        self.session.ticket_id = Some(ticket_id.clone());
        let token = self.issue_token();
        self.notice = None;
        self.log_line = "Validating ticket...".to_string();

        debug!(ticket_id = %ticket_id, token = %token, "ticket_validation_started");
        Ok(ValidationRequest { token, ticket_id })
    }

    /// Apply a validation response. `None` means the response was stale and ignored.
    pub fn complete_validation(
        &mut self,
        token: CallToken,
        result: Result<TicketQuote, KioskError>,
    ) -> Option<Result<TicketQuote, KioskError>> {
        if !self.accepts(token, KioskState::Scan) {
            return None;
        }
        self.in_flight = None;

        match result {
            Ok(quote) => {
                self.metrics.record_validation(true);
                self.session.ticket_details = Some(quote.details.clone());
                self.session.calculated_fee = Some(quote.calculated_fee);
                info!(
                    session = %self.session.id,
                    ticket_id = %quote.details.ticket_id,
                    fee = %quote.calculated_fee,
                    "ticket_validated"
                );
                self.enter_payment();
                Some(Ok(quote))
            }
            Err(e) => {
                self.metrics.record_validation(false);
                warn!(
                    session = %self.session.id,
                    kind = %e.kind(),
                    error = %e,
                    "ticket_validation_failed"
                );
                self.show_error("Invalid Ticket", &e);
                self.log_line = "Validation failed. Please try again.".to_string();
                Some(Err(e))
            }
        }
    }

    /// Validate a ticket end to end against `validator`
    pub async fn submit_ticket(
        &mut self,
        validator: &dyn TicketValidator,
        ticket_id: TicketId,
    ) -> Result<TicketQuote, KioskError> {
        let request = self.begin_validation(ticket_id)?;
        let result = validator.validate_ticket(&request.ticket_id).await;
        self.complete_validation(request.token, result).unwrap_or_else(|| {
            Err(KioskError::NetworkFailure("validation superseded".to_string()))
        })
    }

    // ------------------------------------------------------------------
    // Payment method selection
    // ------------------------------------------------------------------

    /// Record the driver's payment button press
    pub fn select_payment_method(
        &mut self,
        method: PaymentMethod,
    ) -> Result<Selection, KioskError> {
        self.expect_state("select_payment_method", &[KioskState::Payment])?;
        self.expect_idle("select_payment_method")?;

        self.session.payment_method = Some(method);
        self.pending_input = PendingInput::None;
        info!(session = %self.session.id, method = %method, "payment_method_selected");

        match method {
            PaymentMethod::Cash => {
                self.begin_settlement(PaymentMethod::Cash).map(Selection::Settle)
            }
            PaymentMethod::Card => {
                self.pending_input = PendingInput::CardForm;
                self.log_line = "Awaiting card details...".to_string();
                Ok(Selection::CardFormRequired)
            }
            PaymentMethod::Upi => {
                let (ticket_id, fee) = self.quote_parts()?;
                let reference = UpiReference::new(&self.settings.upi_payee, &ticket_id, fee)?;
                self.pending_input = PendingInput::UpiConfirmation(reference.clone());
                self.log_line = "Scan the UPI code, then confirm payment.".to_string();
                Ok(Selection::UpiReference(reference))
            }
        }
    }

    /// Check the card form locally; only a passing form produces a settlement
    pub fn submit_card_form(&mut self, form: &CardForm) -> Result<SettlementRequest, KioskError> {
        self.expect_state("submit_card_form", &[KioskState::Payment])?;
        self.expect_idle("submit_card_form")?;
        if self.pending_input != PendingInput::CardForm {
            return Err(self.invalid("submit_card_form"));
        }

        if let Err(e) = form.validate((self.today)()) {
            self.metrics.record_card_form_rejected();
            info!(session = %self.session.id, reason = %e, "card_form_rejected");
            let err = KioskError::from(e);
            self.show_error("Card Details", &err);
            return Err(err);
        }

        self.pending_input = PendingInput::None;
        self.begin_settlement(PaymentMethod::Card)
    }

    /// Driver closed the card prompt. The session stays in payment, timer running.
    pub fn cancel_card_form(&mut self) -> Result<(), KioskError> {
        if self.state != KioskState::Payment || self.pending_input != PendingInput::CardForm {
            return Err(self.invalid("cancel_card_form"));
        }
        self.pending_input = PendingInput::None;
        self.session.payment_method = None;
        self.notice = Some(Notice::new(
            NoticeLevel::Info,
            "Payment Cancelled",
            "Payment cancelled by user",
        ));
        self.log_line = "Ticket validated. Awaiting payment method selection...".to_string();
        Ok(())
    }

    /// Driver confirmed the UPI transfer
    pub fn confirm_upi(&mut self) -> Result<SettlementRequest, KioskError> {
        self.expect_state("confirm_upi", &[KioskState::Payment])?;
        self.expect_idle("confirm_upi")?;
        if !matches!(self.pending_input, PendingInput::UpiConfirmation(_)) {
            return Err(self.invalid("confirm_upi"));
        }
        self.pending_input = PendingInput::None;
        self.begin_settlement(PaymentMethod::Upi)
    }

    // ------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------

    fn begin_settlement(&mut self, method: PaymentMethod) -> Result<SettlementRequest, KioskError> {
        let details = self
            .session
            .ticket_details
            .as_ref()
            .ok_or_else(|| self.invalid("confirm_settlement"))?;
        let amount = self.session.calculated_fee.ok_or_else(|| self.invalid("confirm_settlement"))?;

        let body = SettlementRequestBody {
            ticket_id: details.ticket_id.clone(),
            amount_paid: amount,
            payment_method: method,
        };
        self.session.payment_method = Some(method);
        let token = self.issue_token();
        self.log_line = format!("Processing {} payment...", method.label());

        info!(
            session = %self.session.id,
            token = %token,
            ticket_id = %body.ticket_id,
            amount = %amount,
            method = %method,
            "settlement_started"
        );
        Ok(SettlementRequest { token, body })
    }

    /// Apply a settlement response. `None` means the response was stale and ignored.
    pub fn complete_settlement(
        &mut self,
        token: CallToken,
        result: Result<SettlementResponse, KioskError>,
    ) -> Option<Result<SettlementOutcome, KioskError>> {
        if !self.accepts(token, KioskState::Payment) {
            return None;
        }
        self.in_flight = None;
        self.countdown.stop();

        match result {
            Ok(response) if response.is_successful() => {
                self.metrics.record_settlement(true);
                let message = response
                    .message
                    .unwrap_or_else(|| "Payment successful. Thank you!".to_string());
                info!(
                    session = %self.session.id,
                    payment_id = ?response.payment_id,
                    method = ?self.session.payment_method,
                    "settlement_succeeded"
                );
                self.set_state(KioskState::StatusSuccess);
                self.schedule_auto_return(self.settings.success_return_delay, KioskState::Scan);
                self.notice = Some(Notice::new(
                    NoticeLevel::Success,
                    "Payment Successful",
                    "The barrier is opening. Please exit safely.",
                ));
                self.log_line = "Payment complete. Opening barrier...".to_string();
                Some(Ok(SettlementOutcome::Success { message }))
            }
            Ok(response) => {
                let message = response.message.unwrap_or_else(|| response.payment_status.clone());
                let err = KioskError::PaymentDeclined(message.clone());
                self.enter_status_fail(&err);
                Some(Ok(SettlementOutcome::Declined { message }))
            }
            Err(e) => {
                self.enter_status_fail(&e);
                Some(Err(e))
            }
        }
    }

    /// Settle `request` end to end against `gateway`
    pub async fn confirm_settlement(
        &mut self,
        gateway: &dyn PaymentGateway,
        request: SettlementRequest,
    ) -> Result<SettlementOutcome, KioskError> {
        let result = gateway.settle(&request.body).await;
        self.complete_settlement(request.token, result).unwrap_or_else(|| {
            Err(KioskError::NetworkFailure("settlement superseded".to_string()))
        })
    }

    /// Retry from the failure screen before the auto-return fires
    pub fn retry_payment(&mut self) -> Result<(), KioskError> {
        self.expect_state("retry_payment", &[KioskState::StatusFail])?;
        self.auto_return = None;
        self.enter_payment();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Advance the payment countdown by one tick
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != KioskState::Payment {
            return TickOutcome::Idle;
        }
        match self.countdown.tick() {
            Tick::Stopped => TickOutcome::Idle,
            Tick::Remaining(remaining) => {
                TickOutcome::Running { remaining, tier: self.countdown.tier() }
            }
            Tick::Expired => {
                self.metrics.record_payment_timeout();
                warn!(session = %self.session.id, "payment_timeout");
                TickOutcome::TimedOut(self.request_assistance(AssistanceReason::Timeout))
            }
        }
    }

    /// Fire the scheduled auto-return if it is due. Returns the state entered.
    pub fn poll_auto_return(&mut self, now: Instant) -> Option<KioskState> {
        let auto_return = self.auto_return?;
        if now < auto_return.due {
            return None;
        }
        self.auto_return = None;

        match (self.state, auto_return.target) {
            (KioskState::StatusSuccess, KioskState::Scan) => {
                self.reset_to_scan();
                Some(KioskState::Scan)
            }
            (KioskState::StatusFail, KioskState::Payment) => {
                self.enter_payment();
                Some(KioskState::Payment)
            }
            (state, target) => {
                // Every state exit clears the schedule, so this is a leftover
                warn!(state = %state, target = %target, "auto_return_discarded");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Assistance and reset
    // ------------------------------------------------------------------

    /// Hand the exit over to an attendant. Valid from any state.
    pub fn request_assistance(&mut self, reason: AssistanceReason) -> AttendantNotice {
        self.countdown.stop();
        self.auto_return = None;
        self.in_flight = None;
        self.pending_input = PendingInput::None;
        self.metrics.record_assistance();

        self.set_state(KioskState::Assistance);
        self.notice = Some(match reason {
            AssistanceReason::Timeout => Notice::new(
                NoticeLevel::Warning,
                "Payment Timeout",
                "Your session has timed out. An attendant can help you complete the exit.",
            ),
            _ => Notice::new(
                NoticeLevel::Info,
                "Attendant Notified",
                "An attendant has been alerted to assist you at the gate.",
            ),
        });
        self.log_line = "Assistance requested. Attendant notified.".to_string();

        info!(session = %self.session.id, reason = %reason.as_str(), "assistance_requested");
        // The quote moves to the attendant; the terminal keeps only the ticket id
        AttendantNotice {
            gate_id: self.settings.gate_id.clone(),
            session: self.session.id,
            ticket_id: self.session.ticket_id.clone(),
            vehicle_number: self
                .session
                .ticket_details
                .take()
                .and_then(|details| details.vehicle_number),
            fee: self.session.calculated_fee.take(),
            method: self.session.payment_method.take(),
            reason,
        }
    }

    /// Drop everything and wait for the next vehicle. Idempotent.
    pub fn reset_to_scan(&mut self) {
        let dirty = self.state != KioskState::Scan
            || !self.session.is_empty()
            || self.in_flight.is_some()
            || self.notice.is_some();

        self.countdown.stop();
        self.auto_return = None;
        self.in_flight = None;
        self.pending_input = PendingInput::None;
        self.notice = None;
        self.log_line = LOG_READY.to_string();

        if dirty {
            let id = self.bump_session();
            self.session = ExitSession::new(id);
            self.set_state(KioskState::Scan);
        }
    }

    // ------------------------------------------------------------------
    // View
    // ------------------------------------------------------------------

    pub fn view(&self) -> KioskView {
        let in_payment = self.state == KioskState::Payment;
        let parking_duration = self.session.ticket_details.as_ref().map(|d| {
            let minutes = d
                .duration_minutes
                .unwrap_or_else(|| (Utc::now() - d.entry_time).num_minutes());
            format_duration(minutes)
        });
        let upi = match &self.pending_input {
            PendingInput::UpiConfirmation(reference) => Some(reference.clone()),
            _ => None,
        };

        KioskView {
            session: self.session.id,
            state: self.state,
            ticket_id: self.session.ticket_id.clone(),
            ticket_details: self.session.ticket_details.clone(),
            fee: self.session.calculated_fee,
            payment_method: self.session.payment_method,
            parking_duration,
            remaining_seconds: in_payment.then(|| self.countdown.remaining()),
            progress: in_payment.then(|| self.countdown.fraction()),
            tier: in_payment.then(|| self.countdown.tier()),
            awaiting_card_form: self.pending_input == PendingInput::CardForm,
            upi,
            busy: self.in_flight.is_some(),
            notice: self.notice.clone(),
            log_line: self.log_line.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn enter_payment(&mut self) {
        self.set_state(KioskState::Payment);
        self.session.payment_method = None;
        self.pending_input = PendingInput::None;
        self.countdown.start();
        self.log_line = "Ticket validated. Awaiting payment method selection...".to_string();
    }

    fn enter_status_fail(&mut self, err: &KioskError) {
        self.metrics.record_settlement(false);
        warn!(session = %self.session.id, kind = %err.kind(), error = %err, "settlement_failed");
        self.set_state(KioskState::StatusFail);
        self.schedule_auto_return(self.settings.failure_return_delay, KioskState::Payment);
        self.show_error("Payment Failed", err);
        self.log_line = "Payment failed. Awaiting next action.".to_string();
    }

    fn schedule_auto_return(&mut self, delay: Duration, target: KioskState) {
        self.auto_return = Some(AutoReturn { due: Instant::now() + delay, target });
    }

    fn set_state(&mut self, next: KioskState) {
        if self.state != next {
            debug!(session = %self.session.id, from = %self.state, to = %next, "state_transition");
        }
        self.state = next;
        self.metrics.set_state(next);
    }

    fn show_error(&mut self, title: &str, err: &KioskError) {
        self.notice = Some(Notice::new(NoticeLevel::Error, title, err.user_message()));
    }

    fn bump_session(&mut self) -> SessionId {
        let id = SessionId(self.next_session);
        self.next_session += 1;
        id
    }

    fn issue_token(&mut self) -> CallToken {
        let token = CallToken { session: self.session.id, call: self.next_call };
        self.next_call += 1;
        self.in_flight = Some(token);
        token
    }

    /// Identity check for late responses
    fn accepts(&self, token: CallToken, expected: KioskState) -> bool {
        if self.in_flight == Some(token) && self.state == expected {
            return true;
        }
        self.metrics.record_stale_response();
        debug!(
            token = %token,
            current = ?self.in_flight,
            state = %self.state,
            "stale_response_dropped"
        );
        false
    }

    fn quote_parts(&self) -> Result<(TicketId, Amount), KioskError> {
        match (&self.session.ticket_details, self.session.calculated_fee) {
            (Some(details), Some(fee)) => Ok((details.ticket_id.clone(), fee)),
            _ => Err(self.invalid("select_payment_method")),
        }
    }

    fn expect_state(&self, event: &'static str, allowed: &[KioskState]) -> Result<(), KioskError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid(event))
        }
    }

    fn expect_idle(&self, event: &'static str) -> Result<(), KioskError> {
        if self.in_flight.is_some() {
            Err(self.invalid(event))
        } else {
            Ok(())
        }
    }

    fn invalid(&self, event: &'static str) -> KioskError {
        KioskError::InvalidTransition { event, state: self.state }
    }
}
