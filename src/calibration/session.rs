// CalibrationSession: calibration stream and recording window state machine
//
// The session is synchronous and never reads the clock itself: every
// time-dependent operation takes `now`, so the controller task (and the tests)
// decide what time it is. Commands for the device go out through a
// `CommandSink`.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::time::Instant;

use crate::calibration::action::{ActionSampleSet, CalibrationAction};
use crate::calibration::history::PressureHistory;
use crate::calibration::progress::SessionNotice;
use crate::error::CalibrationError;
use crate::link::CommandSink;
use crate::protocol::DeviceCommand;

/// Default recording window
pub const DEFAULT_RECORDING_WINDOW: Duration = Duration::from_millis(3000);

/// Default number of points kept for the live graph
pub const DEFAULT_HISTORY_CAPACITY: usize = 400;

/// Where the session is
///
/// The recording payload travels with the state, so "recording without an
/// action" cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Recording {
        action: CalibrationAction,
        deadline: Instant,
    },
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Streaming => "streaming",
            SessionState::Recording { .. } => "recording",
        }
    }

    pub fn is_streaming(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

/// Open recording window and its in-flight buffer
#[derive(Debug)]
struct RecordingWindow {
    action: CalibrationAction,
    deadline: Instant,
    buffer: Vec<u16>,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Streaming,
    Recording(RecordingWindow),
}

/// Point-in-time copy of the session for the UI
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub samples: ActionSampleSet,
    pub rolling_value: Option<u16>,
    pub history: Vec<u16>,
    /// Samples captured so far in the open window
    pub in_flight: usize,
}

/// Calibration session state machine
///
/// Transitions:
/// - `Idle -> Streaming` on [`start_stream`](Self::start_stream)
/// - `Streaming -> Recording` on [`begin_recording`](Self::begin_recording)
/// - `Recording -> Streaming` when the window deadline passes (commit)
/// - `Streaming | Recording -> Idle` on [`stop_stream`](Self::stop_stream)
///   or [`on_link_lost`](Self::on_link_lost) (in-flight buffer discarded)
///
/// A rejected transition returns `CalibrationError::InvalidTransition` and
/// leaves every field untouched.
pub struct CalibrationSession {
    phase: Phase,
    samples: ActionSampleSet,
    history: PressureHistory,
    rolling_value: Option<u16>,
    window: Duration,
    sink: Arc<dyn CommandSink>,
}

impl CalibrationSession {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self::with_settings(sink, DEFAULT_RECORDING_WINDOW, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_settings(
        sink: Arc<dyn CommandSink>,
        window: Duration,
        history_capacity: usize,
    ) -> Self {
        Self {
            phase: Phase::Idle,
            samples: ActionSampleSet::new(),
            history: PressureHistory::new(history_capacity),
            rolling_value: None,
            window,
            sink,
        }
    }

    pub fn state(&self) -> SessionState {
        match &self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Streaming => SessionState::Streaming,
            Phase::Recording(window) => SessionState::Recording {
                action: window.action,
                deadline: window.deadline,
            },
        }
    }

    /// Deadline of the open recording window, if any
    pub fn deadline(&self) -> Option<Instant> {
        match &self.phase {
            Phase::Recording(window) => Some(window.deadline),
            _ => None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn samples(&self) -> &ActionSampleSet {
        &self.samples
    }

    pub fn rolling_value(&self) -> Option<u16> {
        self.rolling_value
    }

    pub fn history(&self) -> &PressureHistory {
        &self.history
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            samples: self.samples.clone(),
            rolling_value: self.rolling_value,
            history: self.history.to_vec(),
            in_flight: match &self.phase {
                Phase::Recording(window) => window.buffer.len(),
                _ => 0,
            },
        }
    }

    /// Switch the device into the calibration stream
    ///
    /// # Errors
    /// - `InvalidTransition` unless Idle
    /// - `LinkDown` when the sink has no open link
    pub fn start_stream(&mut self) -> Result<SessionNotice, CalibrationError> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(self.rejected("start the calibration stream"));
        }
        if !self.sink.is_connected() {
            return Err(CalibrationError::LinkDown);
        }

        self.sink.send(&DeviceCommand::StartCalibration);
        self.history.clear();
        self.rolling_value = None;
        self.phase = Phase::Streaming;
        info!("[CalibrationSession] Calibration stream started");
        Ok(SessionNotice::StreamStarted)
    }

    /// Leave the calibration stream, discarding any open recording
    ///
    /// # Errors
    /// - `InvalidTransition` when Idle
    pub fn stop_stream(&mut self) -> Result<SessionNotice, CalibrationError> {
        if matches!(self.phase, Phase::Idle) {
            return Err(self.rejected("stop the calibration stream"));
        }

        self.sink.send(&DeviceCommand::StopCalibration);
        let discarded = self.enter_idle();
        info!(
            "[CalibrationSession] Calibration stream stopped (discarded recording: {:?})",
            discarded
        );
        Ok(SessionNotice::StreamStopped { discarded })
    }

    /// Open a recording window for `action` ending at `now + window`
    ///
    /// # Errors
    /// - `InvalidTransition` unless Streaming; an open window is left as is
    pub fn begin_recording(
        &mut self,
        action: CalibrationAction,
        now: Instant,
    ) -> Result<SessionNotice, CalibrationError> {
        if !matches!(self.phase, Phase::Streaming) {
            return Err(self.rejected("begin recording"));
        }

        self.phase = Phase::Recording(RecordingWindow {
            action,
            deadline: now + self.window,
            buffer: Vec::new(),
        });
        info!("[CalibrationSession] Recording {} started", action);
        Ok(SessionNotice::RecordingStarted {
            action,
            window_ms: self.window.as_millis() as u64,
        })
    }

    /// Feed one calibration pressure sample
    ///
    /// An overdue window is committed before the sample is considered, so a
    /// sample arriving after the deadline never lands in the buffer.
    pub fn on_sample(&mut self, value: u16, now: Instant) -> Option<SessionNotice> {
        let committed = self.poll_deadline(now);

        match &mut self.phase {
            Phase::Idle => {
                debug!("[CalibrationSession] Ignoring sample {} while idle", value);
            }
            Phase::Streaming => {
                self.rolling_value = Some(value);
                self.history.push(value);
            }
            Phase::Recording(window) => {
                window.buffer.push(value);
                self.rolling_value = Some(value);
                self.history.push(value);
            }
        }

        committed
    }

    /// Commit the open window if its deadline has passed
    pub fn poll_deadline(&mut self, now: Instant) -> Option<SessionNotice> {
        let due = matches!(&self.phase, Phase::Recording(window) if now >= window.deadline);
        if !due {
            return None;
        }

        let Phase::Recording(window) = std::mem::replace(&mut self.phase, Phase::Streaming) else {
            return None;
        };
        let sample_count = window.buffer.len();
        self.samples.insert(window.action, window.buffer);
        info!(
            "[CalibrationSession] Recording {} committed with {} samples",
            window.action, sample_count
        );
        Some(SessionNotice::RecordingCommitted {
            action: window.action,
            sample_count,
        })
    }

    /// The link dropped underneath us; no command is sent
    pub fn on_link_lost(&mut self) -> Option<SessionNotice> {
        if matches!(self.phase, Phase::Idle) {
            return None;
        }
        let discarded = self.enter_idle();
        info!("[CalibrationSession] Link lost, returning to idle");
        Some(SessionNotice::LinkLost { discarded })
    }

    pub fn set_history_capacity(&mut self, capacity: usize) {
        self.history.set_capacity(capacity);
    }

    /// Forget every committed recording
    pub fn clear_samples(&mut self) -> SessionNotice {
        self.samples.clear();
        SessionNotice::SamplesCleared
    }

    fn enter_idle(&mut self) -> Option<CalibrationAction> {
        let previous = std::mem::replace(&mut self.phase, Phase::Idle);
        self.history.clear();
        self.rolling_value = None;
        match previous {
            Phase::Recording(window) => Some(window.action),
            _ => None,
        }
    }

    fn rejected(&self, attempted: &'static str) -> CalibrationError {
        CalibrationError::InvalidTransition {
            from: self.state().label(),
            attempted,
        }
    }
}
