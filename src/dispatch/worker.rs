//! # Action Worker
//!
//! The execution context for anything that may take longer than a frame:
//! macro step sequencing, scripts and system commands. The ingestion path
//! only ever calls [`WorkerHandle::submit`], which never blocks.
//!
//! Every job runs as its own tokio task, so a slow webhook never holds up
//! the next macro. Steps within one macro always run in order.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::script::{ScriptContext, ScriptRunner};
use super::synth::{emit_key, InputSynthesizer};
use super::system::{output_kind, SystemRunner};
use super::{report_failure, Notification};
use crate::binding::action::{KeyPress, ScriptId, SystemCommand};
use crate::binding::macros::{Macro, MacroStep};
use crate::error::DispatchError;
use crate::telemetry::{OutputKind, Telemetry};

/// Work submitted by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    Macro { definition: Macro },
    Script { id: ScriptId, context: ScriptContext },
    System { command: SystemCommand },
}

impl Job {
    fn label(&self) -> String {
        match self {
            Job::Macro { definition } => format!("macro {}", definition.id),
            Job::Script { id, .. } => format!("script {}", id),
            Job::System { command } => command.label(),
        }
    }
}

/// Outcome of one macro run.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroReport {
    /// Steps fully executed before the run ended.
    pub completed: usize,
    pub total: usize,
    /// Failure that aborted the remaining steps.
    pub error: Option<DispatchError>,
}

/// Runs a macro's steps in order, stopping at the first failure.
///
/// # Arguments
///
/// * `synth` - Synthesis backend
/// * `definition` - Macro to run; typing cadences are assumed sanitized
///
/// # Returns
///
/// How many steps completed and the error that stopped the run, if any.
pub async fn run_macro(synth: &dyn InputSynthesizer, definition: &Macro) -> MacroReport {
    let total = definition.steps.len();
    for (index, step) in definition.steps.iter().enumerate() {
        if let Err(error) = run_step(synth, step).await {
            return MacroReport {
                completed: index,
                total,
                error: Some(error),
            };
        }
    }
    MacroReport {
        completed: total,
        total,
        error: None,
    }
}

/// Sends the up edge of a key the step pressed.
///
/// A refused release is attempted once more so the key is not left down;
/// the first error is still reported.
fn release_key(synth: &dyn InputSynthesizer, key: &KeyPress) -> Result<(), DispatchError> {
    emit_key(synth, key, false).map_err(|error| {
        warn!(key = key.key.0, %error, "Key release refused, retrying");
        if let Err(retry) = emit_key(synth, key, false) {
            warn!(key = key.key.0, error = %retry, "Key may remain held");
        }
        error
    })
}

async fn run_step(synth: &dyn InputSynthesizer, step: &MacroStep) -> Result<(), DispatchError> {
    match step {
        MacroStep::Press(press) => {
            emit_key(synth, press, true)?;
            release_key(synth, press)
        }
        MacroStep::Hold { key, duration_ms } => {
            emit_key(synth, key, true)?;
            tokio::time::sleep(std::time::Duration::from_millis(*duration_ms)).await;
            release_key(synth, key)
        }
        MacroStep::Delay { duration_ms } => {
            tokio::time::sleep(std::time::Duration::from_millis(*duration_ms)).await;
            Ok(())
        }
        MacroStep::TypeText { text, chars_per_second } => {
            let interval = MacroStep::char_interval(*chars_per_second);
            for (i, c) in text.chars().enumerate() {
                if i > 0 {
                    tokio::time::sleep(interval).await;
                }
                synth.type_char(c)?;
            }
            Ok(())
        }
    }
}

/// Cheap handle for submitting jobs.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl WorkerHandle {
    /// Wraps the sending half of a job channel.
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<Job>) -> Self {
        Self { tx }
    }

    /// Queues a job.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::WorkerGone`] once the worker has stopped.
    pub fn submit(&self, job: Job) -> Result<(), DispatchError> {
        self.tx.send(job).map_err(|_| DispatchError::WorkerGone)
    }
}

struct Shared {
    synth: Arc<dyn InputSynthesizer>,
    scripts: Arc<dyn ScriptRunner>,
    system: SystemRunner,
    telemetry: Telemetry,
    notifications: mpsc::UnboundedSender<Notification>,
}

impl Shared {
    async fn execute(&self, job: Job) {
        let label = job.label();
        let result = match job {
            Job::Macro { definition } => {
                let report = run_macro(self.synth.as_ref(), &definition).await;
                self.telemetry
                    .record_output(OutputKind::MacroStep, report.completed as u64);
                debug!(
                    id = %definition.id,
                    completed = report.completed,
                    total = report.total,
                    "Macro finished"
                );
                match report.error {
                    None => {
                        self.telemetry.record_output(OutputKind::Macro, 1);
                        Ok(())
                    }
                    Some(error) => Err(error),
                }
            }
            Job::Script { id, context } => match self.scripts.run(&id, &context).await {
                Ok(outcome) => {
                    self.telemetry.record_output(OutputKind::Script, 1);
                    if let Some(hint) = outcome.hint {
                        let _ = self.notifications.send(Notification::Hint { script: id, hint });
                    }
                    Ok(())
                }
                Err(message) => Err(DispatchError::Script { id: id.0, message }),
            },
            Job::System { command } => self
                .system
                .run(&command)
                .await
                .map(|()| self.telemetry.record_output(output_kind(&command), 1)),
        };
        if let Err(error) = result {
            report_failure(&self.telemetry, &self.notifications, &label, error);
        }
    }
}

/// Receives jobs and executes them off the ingestion path.
pub struct ActionWorker {
    rx: mpsc::UnboundedReceiver<Job>,
    shared: Arc<Shared>,
}

impl ActionWorker {
    /// Creates the worker and the handle that feeds it.
    #[must_use]
    pub fn new(
        synth: Arc<dyn InputSynthesizer>,
        scripts: Arc<dyn ScriptRunner>,
        system: SystemRunner,
        telemetry: Telemetry,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> (WorkerHandle, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            synth,
            scripts,
            system,
            telemetry,
            notifications,
        });
        (WorkerHandle::new(tx), Self { rx, shared })
    }

    /// Runs until every [`WorkerHandle`] is dropped, then waits for the
    /// jobs still in flight.
    pub async fn run(mut self) {
        info!("Action worker started");
        let mut tasks = tokio::task::JoinSet::new();
        while let Some(job) = self.rx.recv().await {
            let shared = Arc::clone(&self.shared);
            tasks.spawn(async move { shared.execute(job).await });
            while tasks.try_join_next().is_some() {}
        }
        while tasks.join_next().await.is_some() {}
        info!("Action worker stopped");
    }
}
