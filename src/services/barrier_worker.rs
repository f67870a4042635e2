//! Barrier command worker - opens the barrier off the kiosk loop
//!
//! The kiosk loop enqueues an open command when a settlement succeeds and
//! moves on; the worker owns the network round trip.

use crate::domain::session::SessionId;
use crate::infra::metrics::Metrics;
use crate::services::barrier::BarrierCommand;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A barrier open request
#[derive(Debug)]
pub struct BarrierCmd {
    /// Session whose settlement succeeded
    pub session: SessionId,
    /// When the command was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

pub struct BarrierWorker {
    barrier: Arc<dyn BarrierCommand>,
    cmd_rx: mpsc::Receiver<BarrierCmd>,
    metrics: Arc<Metrics>,
}

impl BarrierWorker {
    pub fn new(
        barrier: Arc<dyn BarrierCommand>,
        cmd_rx: mpsc::Receiver<BarrierCmd>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { barrier, cmd_rx, metrics }
    }

    /// Run the worker, processing commands until the channel closes
    pub async fn run(mut self) {
        info!("barrier_worker_started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            let queue_delay_ms = cmd.enqueued_at.elapsed().as_millis() as u64;
            match self.barrier.open(cmd.session).await {
                Ok(latency_ms) => {
                    self.metrics.record_barrier_open(true);
                    info!(
                        session = %cmd.session,
                        queue_delay_ms = %queue_delay_ms,
                        latency_ms = %latency_ms,
                        "barrier_cmd_processed"
                    );
                }
                Err(e) => {
                    // The vehicle is paid but still blocked; an attendant has to lift the barrier
                    self.metrics.record_barrier_open(false);
                    warn!(
                        session = %cmd.session,
                        queue_delay_ms = %queue_delay_ms,
                        error = %e,
                        "barrier_cmd_failed"
                    );
                }
            }

            if queue_delay_ms > 100 {
                warn!(
                    session = %cmd.session,
                    queue_delay_ms = %queue_delay_ms,
                    "barrier_cmd_queue_delay_high"
                );
            }
        }

        info!("barrier_worker_stopped");
    }
}

/// Create a barrier command channel and worker
///
/// Returns the sender (for the kiosk loop) and the worker (to be spawned)
pub fn create_barrier_worker(
    barrier: Arc<dyn BarrierCommand>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (mpsc::Sender<BarrierCmd>, BarrierWorker) {
    let (cmd_tx, cmd_rx) = mpsc::channel(buffer_size);
    let worker = BarrierWorker::new(barrier, cmd_rx, metrics);
    (cmd_tx, worker)
}
