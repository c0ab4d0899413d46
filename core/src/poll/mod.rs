/// Long-poll loop driver shared by the notification and chat loops
///
/// Each loop is one task owning its watermark and flags. Commands arrive on
/// an unbounded channel; a command that supersedes the in-flight request
/// cancels that request's token, and the settled outcome decides the next
/// step: poll again (waiting or not), retry after the backoff, or idle.
pub mod chat;
pub mod notifications;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Control messages accepted by a running loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCommand {
    Pause,
    Resume,
    ForceRefresh,
    Shutdown,
}

/// Observable state of a loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopStatus {
    /// A request is in flight
    Waiting,
    /// The last request failed; a retry is pending
    RetryScheduled,
    /// No request in flight and no retry pending until resumed
    Paused,
    /// The task has exited
    Stopped,
}

/// How a loop reacts to `Resume`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePolicy {
    /// Poll once without waiting, but only if the loop was paused
    IfPaused,
    /// Behave exactly like `ForceRefresh`
    ForceRefresh,
}

/// Per-loop timing and behavior
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub retry_delay: Duration,
    pub resume: ResumePolicy,
    /// Whether the very first request holds open
    pub initial_wait: bool,
}

/// One kind of long-poll request and what to do with its answer
#[async_trait]
pub trait Poller: Send + Sync + 'static {
    type Response: Send;

    fn name(&self) -> &'static str;

    /// Issue one request; must resolve to `SyncError::Cancelled` once `cancel` fires.
    async fn fetch(&self, wait: bool, cancel: &CancellationToken) -> Result<Self::Response>;

    /// Fold a successful response into shared state.
    /// `active` is false if a pause arrived while the response was in transit.
    async fn apply(&mut self, response: Self::Response, active: bool);
}

/// Next action after a state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Poll { wait: bool },
    Retry(Instant),
    Idle,
    Stop,
}

#[derive(Debug, Default)]
struct Control {
    paused: bool,
    force_refresh: bool,
}

impl Control {
    /// Apply a command while no request is in flight. `current` is the step
    /// the loop was parked in.
    fn on_command(&mut self, cmd: LoopCommand, policy: ResumePolicy, current: Step) -> Step {
        match (cmd, policy) {
            (LoopCommand::Shutdown, _) => Step::Stop,
            (LoopCommand::Pause, _) => {
                self.paused = true;
                Step::Idle
            }
            (LoopCommand::ForceRefresh, _) | (LoopCommand::Resume, ResumePolicy::ForceRefresh) => {
                self.paused = false;
                // Nothing to abort, so the immediate poll consumes the flag
                self.force_refresh = false;
                Step::Poll { wait: false }
            }
            (LoopCommand::Resume, ResumePolicy::IfPaused) => {
                if self.paused {
                    self.paused = false;
                    Step::Poll { wait: false }
                } else {
                    current
                }
            }
        }
    }

    /// Apply a command while a request is in flight. Returns true when the
    /// request has to be aborted.
    fn on_command_in_flight(&mut self, cmd: LoopCommand, policy: ResumePolicy) -> bool {
        match (cmd, policy) {
            (LoopCommand::Shutdown, _) => true,
            (LoopCommand::Pause, _) => {
                self.paused = true;
                true
            }
            (LoopCommand::ForceRefresh, _) | (LoopCommand::Resume, ResumePolicy::ForceRefresh) => {
                self.paused = false;
                self.force_refresh = true;
                true
            }
            // Paused but the aborted request has not settled yet
            (LoopCommand::Resume, ResumePolicy::IfPaused) if self.paused => {
                self.paused = false;
                self.force_refresh = true;
                true
            }
            // Already running
            (LoopCommand::Resume, ResumePolicy::IfPaused) => false,
        }
    }

    /// Decide what follows a settled request
    fn after_outcome<T>(&mut self, outcome: &Result<T>, retry_delay: Duration) -> Step {
        if self.paused {
            return Step::Idle;
        }
        match outcome {
            Ok(_) => Step::Poll { wait: true },
            Err(e) if e.is_cancelled() => {
                if std::mem::take(&mut self.force_refresh) {
                    Step::Poll { wait: false }
                } else {
                    Step::Poll { wait: true }
                }
            }
            Err(_) => Step::Retry(Instant::now() + retry_delay),
        }
    }
}

/// Handle to a running loop task
#[derive(Clone)]
pub struct LoopHandle {
    name: &'static str,
    commands: mpsc::UnboundedSender<LoopCommand>,
    status: watch::Receiver<LoopStatus>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl LoopHandle {
    /// Spawn `poller` on the current runtime
    pub fn spawn<P: Poller>(poller: P, settings: LoopSettings) -> Self {
        let name = poller.name();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(LoopStatus::Waiting);
        let task = tokio::spawn(drive(poller, cmd_rx, status_tx, settings));
        Self {
            name,
            commands: cmd_tx,
            status: status_rx,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn pause(&self) {
        self.send(LoopCommand::Pause);
    }

    pub fn resume(&self) {
        self.send(LoopCommand::Resume);
    }

    pub fn force_refresh(&self) {
        self.send(LoopCommand::ForceRefresh);
    }

    pub fn status(&self) -> LoopStatus {
        *self.status.borrow()
    }

    /// Resolve once the loop reports `want`
    pub async fn wait_for_status(&self, want: LoopStatus) -> LoopStatus {
        let mut rx = self.status.clone();
        let status = match rx.wait_for(|s| *s == want || *s == LoopStatus::Stopped).await {
            Ok(status) => *status,
            Err(_) => LoopStatus::Stopped,
        };
        status
    }

    /// Stop the loop and wait for its task to exit
    pub async fn shutdown(&self) {
        self.send(LoopCommand::Shutdown);
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("{} loop task ended abnormally: {}", self.name, e);
            }
        }
    }

    fn send(&self, cmd: LoopCommand) {
        if self.commands.send(cmd).is_err() {
            debug!("{} loop already stopped, dropping {:?}", self.name, cmd);
        }
    }
}

async fn drive<P: Poller>(
    mut poller: P,
    mut commands: mpsc::UnboundedReceiver<LoopCommand>,
    status: watch::Sender<LoopStatus>,
    settings: LoopSettings,
) {
    let name = poller.name();
    let mut control = Control::default();
    let mut step = Step::Poll {
        wait: settings.initial_wait,
    };
    info!("{} loop started", name);

    loop {
        step = match step {
            Step::Stop => break,

            Step::Idle => {
                status.send_replace(LoopStatus::Paused);
                match commands.recv().await {
                    Some(cmd) => control.on_command(cmd, settings.resume, Step::Idle),
                    None => Step::Stop,
                }
            }

            Step::Retry(deadline) => {
                status.send_replace(LoopStatus::RetryScheduled);
                tokio::select! {
                    _ = sleep_until(deadline) => Step::Poll { wait: true },
                    cmd = commands.recv() => match cmd {
                        Some(cmd) => control.on_command(cmd, settings.resume, step),
                        None => Step::Stop,
                    },
                }
            }

            Step::Poll { .. } if control.paused => Step::Idle,

            Step::Poll { wait } => {
                status.send_replace(LoopStatus::Waiting);
                debug!("{} poll (wait: {})", name, wait);
                let cancel = CancellationToken::new();
                let mut stop = false;
                let mut commands_open = true;

                let outcome = {
                    let request = poller.fetch(wait, &cancel);
                    tokio::pin!(request);
                    loop {
                        tokio::select! {
                            result = &mut request => break result,
                            cmd = commands.recv(), if commands_open => {
                                let cmd = match cmd {
                                    Some(cmd) => cmd,
                                    None => {
                                        commands_open = false;
                                        LoopCommand::Shutdown
                                    }
                                };
                                stop |= cmd == LoopCommand::Shutdown;
                                if control.on_command_in_flight(cmd, settings.resume) {
                                    cancel.cancel();
                                }
                            }
                        }
                    }
                };

                if stop {
                    Step::Stop
                } else {
                    let next = control.after_outcome(&outcome, settings.retry_delay);
                    match outcome {
                        Ok(response) => poller.apply(response, !control.paused).await,
                        Err(e) if e.is_cancelled() => debug!("{} poll superseded", name),
                        Err(e) if control.paused => debug!("{} poll failed while paused: {}", name, e),
                        Err(e) => warn!(
                            "{} poll failed, retrying in {:?}: {}",
                            name, settings.retry_delay, e
                        ),
                    }
                    next
                }
            }
        };
    }

    status.send_replace(LoopStatus::Stopped);
    info!("{} loop stopped", name);
}
