//! Serial command queue in front of the foreground state machine.
//!
//! Any number of [`ServiceClient`] clones enqueue commands; one
//! [`ServiceWorker`] drains them in arrival order and applies each to
//! completion before taking the next.

use crate::error::{Result, ServiceError};
use crate::foreground::{ForegroundIndicator, ForegroundPlatform};
use crate::service::state::{Command, ForegroundStateMachine, ServiceEvent, ServiceMode, Transition};
use crate::settings::Settings;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

struct CommandRequest {
    command: Command,
    reply_tx: oneshot::Sender<Result<Transition>>,
}

/// Handle to a command that has been queued but may not have run yet.
///
/// Dropping it does not cancel the command.
#[derive(Debug)]
pub struct PendingCommand {
    command: Command,
    reply_rx: oneshot::Receiver<Result<Transition>>,
}

impl PendingCommand {
    #[must_use]
    pub fn command(&self) -> Command {
        self.command
    }

    /// Wait for the worker to apply the command.
    pub async fn wait(self) -> Result<Transition> {
        self.reply_rx
            .await
            .map_err(|e| ServiceError::Channel(format!("service command reply dropped: {e}")))?
    }
}

#[derive(Clone)]
pub struct ServiceClient {
    request_tx: mpsc::UnboundedSender<CommandRequest>,
    event_tx: broadcast::Sender<ServiceEvent>,
    mode_rx: watch::Receiver<ServiceMode>,
}

impl ServiceClient {
    /// Queue `command` without waiting for it to run.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Channel`] if the worker has shut down.
    pub fn enqueue(&self, command: Command) -> Result<PendingCommand> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(CommandRequest { command, reply_tx })
            .map_err(|e| {
                ServiceError::Channel(format!(
                    "failed to queue {} command: {e}",
                    command.as_str()
                ))
            })?;
        Ok(PendingCommand { command, reply_rx })
    }

    /// Queue `command` and wait for its outcome.
    pub async fn send(&self, command: Command) -> Result<Transition> {
        self.enqueue(command)?.wait().await
    }

    /// Mode after the most recently applied command.
    #[must_use]
    pub fn mode(&self) -> ServiceMode {
        *self.mode_rx.borrow()
    }

    #[must_use]
    pub fn watch_mode(&self) -> watch::Receiver<ServiceMode> {
        self.mode_rx.clone()
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<ServiceEvent> {
        self.event_tx.subscribe()
    }
}

pub struct ServiceWorker<P: ForegroundPlatform> {
    request_rx: mpsc::UnboundedReceiver<CommandRequest>,
    machine: ForegroundStateMachine<P>,
    mode_tx: watch::Sender<ServiceMode>,
}

/// Build the queue and the state machine behind it.
///
/// The flag store handle is shared with the caller; only the worker writes it.
#[must_use]
pub fn service_channel<P: ForegroundPlatform>(
    platform: P,
    settings: Settings,
    indicator: ForegroundIndicator,
    event_capacity: usize,
) -> (ServiceClient, ServiceWorker<P>) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    let (mode_tx, mode_rx) = watch::channel(ServiceMode::Background);

    let machine = ForegroundStateMachine::new(platform, settings, indicator, event_tx.clone());

    (
        ServiceClient {
            request_tx,
            event_tx,
            mode_rx,
        },
        ServiceWorker {
            request_rx,
            machine,
            mode_tx,
        },
    )
}

impl<P: ForegroundPlatform> ServiceWorker<P> {
    /// Drain commands until every client is dropped.
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let result = self.apply(request.command);
            // The caller may have stopped waiting.
            let _ = request.reply_tx.send(result);
        }
        tracing::debug!("service command queue closed; worker exiting");
    }

    fn apply(&mut self, command: Command) -> Result<Transition> {
        let result = self.machine.apply(command);
        match &result {
            Ok(transition) => tracing::debug!(
                command = command.as_str(),
                mode = %transition.mode(),
                changed = transition.changed(),
                "command applied"
            ),
            Err(e) => tracing::error!(
                command = command.as_str(),
                mode = %self.machine.mode(),
                error = %e,
                "command failed"
            ),
        }
        self.mode_tx.send_replace(self.machine.mode());
        result
    }
}
