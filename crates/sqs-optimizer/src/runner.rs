//! Optimization run lifecycle.
//!
//! A run is submitted to the engine on the tokio runtime. Progress snapshots
//! and the final settlement travel over one channel, so a consumer observes
//! `Progress(S1) .. Progress(Sn), Settled(..)` in emission order and never a
//! snapshot after the settlement.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use sqs_types::{
    Control, Engine, Precision, ProgressReporter, ProgressSnapshot, RunConfig, RunError, RunId,
    RunResult,
};

/// Event observed by the consumer of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Progress(ProgressSnapshot),
    /// Always the last event of a run.
    Settled(Result<RunResult, RunError>),
}

/// State shared between the engine-facing reporter and the consumer handle.
struct RunChannel {
    cancelled: AtomicBool,
    /// Taken on settlement; reports arriving afterwards are dropped.
    sender: Mutex<Option<UnboundedSender<RunEvent>>>,
}

impl RunChannel {
    fn new(sender: UnboundedSender<RunEvent>) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
        }
    }

    fn report(&self, snapshot: ProgressSnapshot) -> Control {
        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Control::Stop;
        };
        if tx.send(RunEvent::Progress(snapshot)).is_err() {
            // consumer went away
            self.cancelled.store(true, Ordering::Release);
        }
        if self.cancelled.load(Ordering::Acquire) {
            Control::Stop
        } else {
            Control::Continue
        }
    }

    fn settle(&self, outcome: Result<RunResult, RunError>) {
        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.send(RunEvent::Settled(outcome));
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Consumer side of one in-flight run.
///
/// Dropping the handle requests cancellation; the run still settles in the
/// background and frees its runner.
pub struct RunHandle {
    run_id: RunId,
    events: UnboundedReceiver<RunEvent>,
    channel: Arc<RunChannel>,
    settled: bool,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Next event of the run, or `None` once the settlement has been taken.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        if self.settled {
            return None;
        }
        let event = self.events.recv().await;
        if matches!(event, Some(RunEvent::Settled(_)) | None) {
            self.settled = true;
        }
        event
    }

    /// Request cooperative cancellation. The engine notices at its next
    /// reporting point; the run must still be awaited.
    pub fn cancel(&self) {
        if !self.channel.is_cancelled() {
            info!(run_id = %self.run_id, "cancellation requested");
        }
        self.channel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.channel.is_cancelled()
    }

    /// Discard remaining progress and wait for the settlement.
    pub async fn wait(mut self) -> Result<RunResult, RunError> {
        while let Some(event) = self.next_event().await {
            if let RunEvent::Settled(outcome) = event {
                return outcome;
            }
        }
        Err(RunError::Aborted {
            message: "run channel closed before settlement".to_string(),
        })
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if !self.settled {
            self.channel.cancel();
        }
    }
}

/// Owns the lifecycle of optimization runs against one engine.
///
/// At most one run is in flight per runner.
pub struct OptimizationRunner<E: Engine + ?Sized + 'static> {
    engine: Arc<E>,
    in_flight: Arc<Mutex<Option<RunId>>>,
}

impl<E: Engine + ?Sized + 'static> OptimizationRunner<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Identifier of the outstanding run, if any.
    pub fn in_flight(&self) -> Option<RunId> {
        *self.in_flight.lock()
    }

    /// Submit `config` to the engine and return immediately.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`RunError::AlreadyRunning`] while another run is outstanding; the
    /// outstanding run is not affected.
    pub fn start(&self, config: RunConfig, precision: Precision) -> Result<RunHandle, RunError> {
        let run_id = Uuid::new_v4();
        {
            let mut slot = self.in_flight.lock();
            if let Some(existing) = *slot {
                warn!(run_id = %existing, "rejecting submission, run already in flight");
                return Err(RunError::AlreadyRunning { run_id: existing });
            }
            *slot = Some(run_id);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(RunChannel::new(tx));

        let reporter = {
            let channel = channel.clone();
            ProgressReporter::new(move |snapshot| {
                debug!(
                    run_id = %run_id,
                    finished = snapshot.finished,
                    best_objective = snapshot.best_objective,
                    "progress"
                );
                channel.report(snapshot)
            })
        };

        info!(
            run_id = %run_id,
            precision = %precision,
            iteration_mode = config.iteration_mode.as_str(),
            iterations = ?config.iterations,
            "starting optimization run"
        );

        let engine = self.engine.clone();
        let in_flight = self.in_flight.clone();
        let settle_channel = channel.clone();
        tokio::spawn(async move {
            let job = tokio::spawn(async move { engine.optimize(config, precision, reporter).await });
            let outcome = match job.await {
                Ok(Ok(mut result)) => {
                    result.run_id = run_id;
                    info!(
                        run_id = %run_id,
                        finished = result.finished,
                        cancelled = result.cancelled,
                        best_objective = ?result.best_objective,
                        "optimization run settled"
                    );
                    Ok(result)
                }
                Ok(Err(fault)) => {
                    warn!(run_id = %run_id, error = %fault, "optimization run faulted");
                    Err(RunError::Engine(fault))
                }
                Err(join_error) => {
                    warn!(run_id = %run_id, error = %join_error, "optimization task aborted");
                    Err(RunError::Aborted {
                        message: join_error.to_string(),
                    })
                }
            };

            {
                let mut slot = in_flight.lock();
                if *slot == Some(run_id) {
                    *slot = None;
                }
            }
            settle_channel.settle(outcome);
        });

        Ok(RunHandle {
            run_id,
            events: rx,
            channel,
            settled: false,
        })
    }

    /// Run to settlement, handing each snapshot to `on_progress` in order.
    ///
    /// Returning [`Control::Stop`] requests cancellation; the call still
    /// waits for the engine to settle.
    pub async fn run<F>(
        &self,
        config: RunConfig,
        precision: Precision,
        mut on_progress: F,
    ) -> Result<RunResult, RunError>
    where
        F: FnMut(&ProgressSnapshot) -> Control,
    {
        let mut handle = self.start(config, precision)?;
        while let Some(event) = handle.next_event().await {
            match event {
                RunEvent::Progress(snapshot) => {
                    if on_progress(&snapshot).is_stop() {
                        handle.cancel();
                    }
                }
                RunEvent::Settled(outcome) => return outcome,
            }
        }
        Err(RunError::Aborted {
            message: "run channel closed before settlement".to_string(),
        })
    }
}
