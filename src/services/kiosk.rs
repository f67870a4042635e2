//! Kiosk runtime - drives the exit controller from terminal input and timers
//!
//! The runtime task is the only writer of the `ExitController`. Backend calls
//! run in spawned tasks and come back as `Completion` events stamped with the
//! call token they were issued under; the controller drops any completion
//! whose token is no longer in flight. After every event the current
//! `KioskView` is published on a watch channel for the display.

use crate::domain::card::CardForm;
use crate::domain::error::KioskError;
use crate::domain::session::{AssistanceReason, AttendantNotice, CallToken, KioskState};
use crate::domain::types::{PaymentMethod, SettlementResponse, TicketId, TicketQuote};
use crate::infra::metrics::{BackendCall, Metrics};
use crate::io::attendant::AttendantSender;
use crate::io::backend::{PaymentGateway, TicketValidator};
use crate::io::journal::{ExitOutcome, ExitRecord, Journal};
use crate::services::barrier_worker::BarrierCmd;
use crate::services::controller::{
    ExitController, KioskView, Selection, SettlementOutcome, SettlementRequest, TickOutcome,
    ValidationRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const COMPLETION_BUFFER: usize = 16;

/// Input from the terminal surface
#[derive(Debug, Clone)]
pub enum KioskCommand {
    Scan(TicketId),
    SelectMethod(PaymentMethod),
    SubmitCard(CardForm),
    CancelCard,
    ConfirmUpi,
    /// Abandon the exit and return to scan
    Cancel,
    Retry,
    /// Start over after a successful exit
    NewExit,
    RequestAssistance(AssistanceReason),
    Shutdown,
}

/// Backend response re-entering the loop
#[derive(Debug)]
enum Completion {
    Validation {
        token: CallToken,
        latency_ms: u64,
        result: Result<TicketQuote, KioskError>,
    },
    Settlement {
        token: CallToken,
        latency_ms: u64,
        result: Result<SettlementResponse, KioskError>,
    },
}

/// Collaborators the runtime talks to
pub struct KioskIo {
    pub validator: Arc<dyn TicketValidator>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub barrier_tx: mpsc::Sender<BarrierCmd>,
    pub attendant: AttendantSender,
    pub journal: Journal,
}

pub struct Kiosk {
    controller: ExitController,
    io: KioskIo,
    metrics: Arc<Metrics>,
    gate_id: String,
    tick_interval: Duration,
    view_tx: watch::Sender<KioskView>,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: Option<mpsc::Receiver<Completion>>,
}

impl Kiosk {
    pub fn new(
        controller: ExitController,
        io: KioskIo,
        metrics: Arc<Metrics>,
        gate_id: &str,
        tick_interval: Duration,
    ) -> (Self, watch::Receiver<KioskView>) {
        let (view_tx, view_rx) = watch::channel(controller.view());
        let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_BUFFER);
        let kiosk = Self {
            controller,
            io,
            metrics,
            gate_id: gate_id.to_string(),
            tick_interval,
            view_tx,
            completion_tx,
            completion_rx: Some(completion_rx),
        };
        (kiosk, view_rx)
    }

    /// Run until `Shutdown` arrives or the command channel closes
    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<KioskCommand>) {
        let Some(mut completion_rx) = self.completion_rx.take() else {
            return;
        };
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut was_running = false;

        info!(gate_id = %self.gate_id, "kiosk_started");

        loop {
            let running = self.controller.countdown_running();
            if running && !was_running {
                // First decrement lands one full interval after the countdown starts
                ticker.reset();
            }
            was_running = running;
            let auto_return = self.controller.next_auto_return();

            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(KioskCommand::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                }
                Some(completion) = completion_rx.recv() => {
                    self.handle_completion(completion);
                }
                _ = ticker.tick(), if running => {
                    self.handle_tick();
                }
                _ = sleep_until_due(auto_return), if auto_return.is_some() => {
                    if let Some(state) = self.controller.poll_auto_return(Instant::now()) {
                        let session = self.controller.session().id;
                        info!(session = %session, state = %state, "auto_return");
                    }
                }
            }

            self.publish();
        }

        info!(gate_id = %self.gate_id, "kiosk_stopped");
    }

    fn handle_command(&mut self, cmd: KioskCommand) {
        debug!(command = ?cmd, state = %self.controller.state(), "kiosk_command");

        let result = match cmd {
            KioskCommand::Scan(ticket_id) => self
                .controller
                .begin_validation(ticket_id)
                .map(|request| self.spawn_validation(request)),
            KioskCommand::SelectMethod(method) => {
                self.controller.select_payment_method(method).map(|selection| match selection {
                    Selection::Settle(request) => self.spawn_settlement(request),
                    Selection::CardFormRequired => {}
                    Selection::UpiReference(reference) => {
                        info!(link = %reference.link, "upi_reference_shown");
                    }
                })
            }
            KioskCommand::SubmitCard(form) => self
                .controller
                .submit_card_form(&form)
                .map(|request| self.spawn_settlement(request)),
            KioskCommand::CancelCard => self.controller.cancel_card_form(),
            KioskCommand::ConfirmUpi => self
                .controller
                .confirm_upi()
                .map(|request| self.spawn_settlement(request)),
            KioskCommand::Cancel | KioskCommand::NewExit => {
                info!(
                    session = %self.controller.session().id,
                    from = %self.controller.state(),
                    "exit_reset"
                );
                self.controller.reset_to_scan();
                Ok(())
            }
            KioskCommand::Retry => self.controller.retry_payment(),
            KioskCommand::RequestAssistance(reason) => {
                let notice = self.controller.request_assistance(reason);
                self.dispatch_assistance(notice);
                Ok(())
            }
            KioskCommand::Shutdown => Ok(()),
        };

        if let Err(e) = result {
            debug!(kind = %e.kind(), error = %e, "kiosk_command_rejected");
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Validation { token, latency_ms, result } => {
                self.metrics.record_backend_latency(BackendCall::Validation, latency_ms);
                // Errors are already logged and shown by the controller
                let _ = self.controller.complete_validation(token, result);
            }
            Completion::Settlement { token, latency_ms, result } => {
                self.metrics.record_backend_latency(BackendCall::Settlement, latency_ms);
                match self.controller.complete_settlement(token, result) {
                    Some(Ok(SettlementOutcome::Success { message })) => {
                        self.open_barrier();
                        self.journal(ExitOutcome::Paid, Some(message));
                    }
                    Some(Ok(SettlementOutcome::Declined { message })) => {
                        self.journal(ExitOutcome::Declined, Some(message));
                    }
                    Some(Err(e)) => {
                        self.journal(ExitOutcome::Failed, Some(e.user_message()));
                    }
                    None => {}
                }
            }
        }
    }

    fn handle_tick(&mut self) {
        match self.controller.tick() {
            TickOutcome::TimedOut(notice) => self.dispatch_assistance(notice),
            TickOutcome::Running { remaining, tier } => {
                debug!(remaining = %remaining, tier = ?tier, "countdown_tick");
            }
            TickOutcome::Idle => {}
        }
    }

    fn spawn_validation(&self, request: ValidationRequest) {
        let validator = self.io.validator.clone();
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            let result = validator.validate_ticket(&request.ticket_id).await;
            let latency_ms = start.elapsed().as_millis() as u64;
            let _ = tx
                .send(Completion::Validation { token: request.token, latency_ms, result })
                .await;
        });
    }

    fn spawn_settlement(&self, request: SettlementRequest) {
        let gateway = self.io.gateway.clone();
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            let result = gateway.settle(&request.body).await;
            let latency_ms = start.elapsed().as_millis() as u64;
            let _ = tx
                .send(Completion::Settlement { token: request.token, latency_ms, result })
                .await;
        });
    }

    fn open_barrier(&self) {
        let cmd = BarrierCmd {
            session: self.controller.session().id,
            enqueued_at: std::time::Instant::now(),
        };
        if let Err(e) = self.io.barrier_tx.try_send(cmd) {
            self.metrics.record_side_effect_dropped();
            warn!(session = %self.controller.session().id, error = %e, "barrier_cmd_dropped");
        }
    }

    fn dispatch_assistance(&self, notice: AttendantNotice) {
        let record = ExitRecord::from_notice(&notice);
        if !self.io.attendant.send(notice) {
            self.metrics.record_side_effect_dropped();
        }
        self.io.journal.write(&record);
    }

    fn journal(&self, outcome: ExitOutcome, message: Option<String>) {
        let record =
            ExitRecord::from_session(&self.gate_id, self.controller.session(), outcome, message);
        self.io.journal.write(&record);
    }

    fn publish(&self) {
        let view = self.controller.view();
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }

    /// Current state, for callers holding the runtime before it is spawned
    pub fn state(&self) -> KioskState {
        self.controller.state()
    }
}

/// Sleep until the auto-return deadline; callers guard on `Some`
async fn sleep_until_due(due: Option<Instant>) {
    tokio::time::sleep_until(due.unwrap_or_else(Instant::now)).await
}
