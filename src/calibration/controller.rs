// CalibrationController: single task that owns the calibration session
//
// UI commands, calibration samples, link status and the recording timer are
// all funnelled through one `select!` loop, so a transition can never
// interleave with another. The timer is just a `sleep_until` arm that exists
// while a recording window is open; leaving the Recording state drops it.

use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::calibration::action::CalibrationAction;
use crate::calibration::progress::SessionNotice;
use crate::calibration::session::{CalibrationSession, SessionSnapshot};
use crate::calibration::suggest::{ThresholdSuggester, ThresholdSuggestion};
use crate::calibration::thresholds::ThresholdSet;
use crate::error::{log_calibration_error, CalibrationError};
use crate::link::LinkStatus;
use crate::protocol::TelemetryEvent;

/// Buffer size of the notice broadcast channel
const NOTICE_CHANNEL_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<T>;

enum ControlCommand {
    StartStream(Reply<Result<SessionNotice, CalibrationError>>),
    StopStream(Reply<Result<SessionNotice, CalibrationError>>),
    BeginRecording(
        CalibrationAction,
        Reply<Result<SessionNotice, CalibrationError>>,
    ),
    Snapshot(Reply<SessionSnapshot>),
    SetHistoryCapacity(usize, Reply<()>),
    Suggest {
        current: ThresholdSet,
        defaults: ThresholdSet,
        reply: Reply<Result<ThresholdSuggestion, CalibrationError>>,
    },
    ClearSamples(Reply<()>),
    Shutdown(Reply<()>),
}

/// Cloneable handle to a running calibration controller
#[derive(Clone)]
pub struct CalibrationHandle {
    commands: mpsc::UnboundedSender<ControlCommand>,
    notices: broadcast::Sender<SessionNotice>,
}

/// Spawn the controller task on the current tokio runtime
///
/// # Arguments
/// * `session` - Session the task takes ownership of
/// * `events` - Calibration pressure subscription from the telemetry stream
/// * `status` - Link status subscription; a disconnect ends the stream
///
/// # Returns
/// Handle for UI commands and the task's join handle
pub fn spawn_controller(
    session: CalibrationSession,
    events: mpsc::UnboundedReceiver<TelemetryEvent>,
    status: broadcast::Receiver<LinkStatus>,
) -> (CalibrationHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (notice_tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);

    let controller = CalibrationController {
        session,
        suggester: ThresholdSuggester::new(),
        notices: notice_tx.clone(),
    };
    let task = tokio::spawn(controller.run(command_rx, events, status));

    (
        CalibrationHandle {
            commands: command_tx,
            notices: notice_tx,
        },
        task,
    )
}

impl CalibrationHandle {
    pub async fn start_stream(&self) -> Result<SessionNotice, CalibrationError> {
        self.request(ControlCommand::StartStream).await?
    }

    pub async fn stop_stream(&self) -> Result<SessionNotice, CalibrationError> {
        self.request(ControlCommand::StopStream).await?
    }

    /// Open a recording window for `action`
    ///
    /// # Errors
    /// - `InvalidTransition` unless the stream is running and no window is open
    /// - `ControllerUnavailable` if the task has stopped
    pub async fn begin_recording(
        &self,
        action: CalibrationAction,
    ) -> Result<SessionNotice, CalibrationError> {
        self.request(|reply| ControlCommand::BeginRecording(action, reply))
            .await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, CalibrationError> {
        self.request(ControlCommand::Snapshot).await
    }

    pub async fn set_history_capacity(&self, capacity: usize) -> Result<(), CalibrationError> {
        self.request(|reply| ControlCommand::SetHistoryCapacity(capacity, reply))
            .await
    }

    /// Derive thresholds from the recordings collected so far
    ///
    /// # Arguments
    /// * `current` - Thresholds currently applied to the device
    /// * `defaults` - Factory thresholds, used when the neutral band collapses
    ///
    /// # Errors
    /// - `NoSamples` when nothing has been recorded yet
    pub async fn suggest_thresholds(
        &self,
        current: ThresholdSet,
        defaults: ThresholdSet,
    ) -> Result<ThresholdSuggestion, CalibrationError> {
        self.request(|reply| ControlCommand::Suggest {
            current,
            defaults,
            reply,
        })
        .await?
    }

    pub async fn clear_samples(&self) -> Result<(), CalibrationError> {
        self.request(ControlCommand::ClearSamples).await
    }

    /// Subscribe to the calibration log
    pub fn subscribe_notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    /// Stop the controller task; later requests fail with `ControllerUnavailable`
    pub async fn shutdown(&self) -> Result<(), CalibrationError> {
        self.request(ControlCommand::Shutdown).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ControlCommand,
    ) -> Result<T, CalibrationError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .map_err(|_| CalibrationError::ControllerUnavailable)?;
        reply_rx
            .await
            .map_err(|_| CalibrationError::ControllerUnavailable)
    }
}

struct CalibrationController {
    session: CalibrationSession,
    suggester: ThresholdSuggester,
    notices: broadcast::Sender<SessionNotice>,
}

impl CalibrationController {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ControlCommand>,
        mut events: mpsc::UnboundedReceiver<TelemetryEvent>,
        mut status: broadcast::Receiver<LinkStatus>,
    ) {
        let mut events_open = true;
        let mut status_open = true;
        info!("[CalibrationController] Started");

        loop {
            let deadline = self.session.deadline();

            // Samples and link changes that already arrived are handled
            // before the next UI command.
            tokio::select! {
                biased;

                event = events.recv(), if events_open => match event {
                    Some(TelemetryEvent::CalibrationPressureSample(value)) => {
                        if let Some(notice) = self.session.on_sample(value, Instant::now()) {
                            self.publish(notice);
                        }
                    }
                    Some(other) => {
                        debug!("[CalibrationController] Ignoring {:?}", other.kind());
                    }
                    None => {
                        debug!("[CalibrationController] Telemetry subscription closed");
                        events_open = false;
                    }
                },

                change = status.recv(), if status_open => match change {
                    Ok(LinkStatus::Disconnected { reason }) => {
                        info!("[CalibrationController] Link down: {}", reason);
                        if let Some(notice) = self.session.on_link_lost() {
                            self.publish(notice);
                        }
                    }
                    Ok(LinkStatus::Connected { .. }) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("[CalibrationController] Missed {} link status updates", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        status_open = false;
                    }
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(notice) = self.session.poll_deadline(Instant::now()) {
                        self.publish(notice);
                    }
                }

                command = commands.recv() => match command {
                    Some(ControlCommand::Shutdown(reply)) => {
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        info!("[CalibrationController] Stopped");
    }

    fn handle(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::StartStream(reply) => {
                let result = self.session.start_stream();
                let _ = reply.send(self.report(result, "start_stream"));
            }
            ControlCommand::StopStream(reply) => {
                let result = self.session.stop_stream();
                let _ = reply.send(self.report(result, "stop_stream"));
            }
            ControlCommand::BeginRecording(action, reply) => {
                let result = self.session.begin_recording(action, Instant::now());
                let _ = reply.send(self.report(result, "begin_recording"));
            }
            ControlCommand::Snapshot(reply) => {
                let _ = reply.send(self.session.snapshot());
            }
            ControlCommand::SetHistoryCapacity(capacity, reply) => {
                self.session.set_history_capacity(capacity);
                let _ = reply.send(());
            }
            ControlCommand::Suggest {
                current,
                defaults,
                reply,
            } => {
                let _ = reply.send(self.suggest(&current, &defaults));
            }
            ControlCommand::ClearSamples(reply) => {
                let notice = self.session.clear_samples();
                self.publish(notice);
                let _ = reply.send(());
            }
            ControlCommand::Shutdown(reply) => {
                let _ = reply.send(());
            }
        }
    }

    fn suggest(
        &self,
        current: &ThresholdSet,
        defaults: &ThresholdSet,
    ) -> Result<ThresholdSuggestion, CalibrationError> {
        let samples = self.session.samples();
        if samples.is_empty() {
            let err = CalibrationError::NoSamples;
            log_calibration_error(&err, "suggest_thresholds");
            return Err(err);
        }
        let suggestion = self.suggester.derive(samples, current, defaults);
        info!(
            "[CalibrationController] Suggested thresholds {:?} from {} actions",
            suggestion.thresholds.as_array(),
            samples.len()
        );
        Ok(suggestion)
    }

    fn report(
        &self,
        result: Result<SessionNotice, CalibrationError>,
        context: &str,
    ) -> Result<SessionNotice, CalibrationError> {
        match &result {
            Ok(notice) => self.publish(notice.clone()),
            Err(err) => log_calibration_error(err, context),
        }
        result
    }

    fn publish(&self, notice: SessionNotice) {
        debug!("[CalibrationController] {}", notice.describe());
        // No subscribers is fine; the log is optional.
        let _ = self.notices.send(notice);
    }
}
