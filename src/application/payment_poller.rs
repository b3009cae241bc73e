use crate::config::{FailedStatusPolicy, PaymentPollConfig, validate_schedule};
use crate::domain::payment::{PaymentSnapshot, PaymentStatus, PollOutcome, PollState};
use crate::domain::ports::PaymentGatewayRef;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Watches in-flight payments until they settle or the attempt budget runs out.
///
/// Each call to [`PaymentPoller::start`] spawns an independent poll task and
/// hands back a [`PaymentWatch`] that owns it.
#[derive(Clone)]
pub struct PaymentPoller {
    gateway: PaymentGatewayRef,
    failed_status: FailedStatusPolicy,
}

impl PaymentPoller {
    pub fn new(gateway: PaymentGatewayRef) -> Self {
        Self {
            gateway,
            failed_status: FailedStatusPolicy::default(),
        }
    }

    pub fn with_failed_status(mut self, policy: FailedStatusPolicy) -> Self {
        self.failed_status = policy;
        self
    }

    /// Starts polling `payment_id`.
    ///
    /// The first status query is issued immediately, the following ones every
    /// `check_interval`, for at most `max_attempts` queries in total.
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        payment_id: impl Into<String>,
        check_interval: Duration,
        max_attempts: u32,
    ) -> Result<PaymentWatch> {
        validate_schedule(check_interval, max_attempts)?;

        let payment_id = payment_id.into();
        let (state, _) = watch::channel(PollState::Polling);
        let state = Arc::new(state);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let task = PollTask {
            gateway: self.gateway.clone(),
            failed_status: self.failed_status,
            payment_id: payment_id.clone(),
            check_interval,
            max_attempts,
            state: state.clone(),
            cancel: cancel.clone(),
        };

        info!(
            payment_id = %payment_id,
            interval_ms = check_interval.as_millis() as u64,
            max_attempts,
            "payment polling started"
        );
        let handle = tokio::spawn(task.run(outcome_tx));

        Ok(PaymentWatch {
            payment_id,
            state,
            outcome: Some(outcome_rx),
            cancel,
            handle,
        })
    }

    /// Starts polling with the interval and attempt budget from `config`.
    pub fn start_with(
        &self,
        payment_id: impl Into<String>,
        config: &PaymentPollConfig,
    ) -> Result<PaymentWatch> {
        self.clone()
            .with_failed_status(config.failed_status)
            .start(payment_id, config.check_interval, config.max_attempts)
    }
}

/// Handle to one running payment poll.
///
/// Dropping the handle cancels the poll.
pub struct PaymentWatch {
    payment_id: String,
    state: Arc<watch::Sender<PollState>>,
    outcome: Option<oneshot::Receiver<PollOutcome>>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PaymentWatch {
    pub fn payment_id(&self) -> &str {
        &self.payment_id
    }

    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    /// True once the poll task has exited, for any reason.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops polling. Idempotent, and a no-op once the poll has settled.
    pub fn cancel(&self) {
        let cancelled = self.state.send_if_modified(|state| {
            if *state == PollState::Polling {
                *state = PollState::Idle;
                true
            } else {
                false
            }
        });
        self.cancel.cancel();

        if cancelled {
            info!(payment_id = %self.payment_id, "payment polling cancelled");
        }
    }

    /// Waits for the outcome.
    ///
    /// Returns `None` if the poll was cancelled, or if the outcome was
    /// already taken by an earlier call.
    pub async fn outcome(&mut self) -> Option<PollOutcome> {
        let receiver = self.outcome.take()?;
        receiver.await.ok()
    }
}

impl Drop for PaymentWatch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct PollTask {
    gateway: PaymentGatewayRef,
    failed_status: FailedStatusPolicy,
    payment_id: String,
    check_interval: Duration,
    max_attempts: u32,
    state: Arc<watch::Sender<PollState>>,
    cancel: CancellationToken,
}

impl PollTask {
    async fn run(self, outcome_tx: oneshot::Sender<PollOutcome>) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen: Option<PaymentSnapshot> = None;

        for attempt in 1..=self.max_attempts {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                result = self.gateway.payment_status(&self.payment_id) => result,
            };

            match result {
                Ok(snapshot) => {
                    debug!(
                        payment_id = %self.payment_id,
                        attempt,
                        status = ?snapshot.status,
                        "payment status received"
                    );
                    match snapshot.status {
                        PaymentStatus::Completed => {
                            return self.finish(outcome_tx, PollOutcome::Succeeded(snapshot));
                        }
                        PaymentStatus::Failed
                            if self.failed_status == FailedStatusPolicy::Terminal =>
                        {
                            return self.finish(outcome_tx, PollOutcome::Failed(snapshot));
                        }
                        _ => last_seen = Some(snapshot),
                    }
                }
                Err(e) => {
                    // The attempt still counts against the budget.
                    warn!(
                        payment_id = %self.payment_id,
                        attempt,
                        error = %e,
                        "payment status query failed"
                    );
                }
            }
        }

        self.finish(
            outcome_tx,
            PollOutcome::TimedOut {
                attempts: self.max_attempts,
                last_seen,
            },
        );
    }

    /// Publishes the terminal state and delivers the outcome, unless a
    /// cancellation got there first.
    fn finish(&self, outcome_tx: oneshot::Sender<PollOutcome>, outcome: PollOutcome) {
        let next = outcome.state();
        let settled = self.state.send_if_modified(|state| {
            if *state == PollState::Polling {
                *state = next;
                true
            } else {
                false
            }
        });

        if settled {
            info!(payment_id = %self.payment_id, state = ?next, "payment polling finished");
            let _ = outcome_tx.send(outcome);
        }
    }
}
