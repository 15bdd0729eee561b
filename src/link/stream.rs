// TelemetryStream: owns the serial link, its read loop and the event fan-out
//
// One background thread polls the transport, assembles lines, decodes them
// and hands each event to the subscriber registry. Writes share the transport
// through the same mutex, held only for the duration of one read or write.
// A transport failure from either side takes the transport out of its slot;
// whoever takes it publishes the single `Disconnected(IoFailure)` status.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};

use super::serial::open_port;
use super::subscribers::SubscriberRegistry;
use super::{CommandSink, DisconnectReason, LinkState, LinkStatus, SerialTransport};
use crate::error::{log_link_error, LinkError};
use crate::protocol::{decode_line, DeviceCommand, EventKind, LineAssembler, TelemetryEvent};

/// Largest single read from the transport
const READ_CHUNK: usize = 1024;

/// Buffer size of the link status broadcast channel
const STATUS_CHANNEL_CAPACITY: usize = 16;

/// Serial link tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkSettings {
    pub baud_rate: u32,
    /// Sleep between polls when no bytes are waiting
    pub poll_interval: Duration,
    /// Read timeout handed to the serial driver
    pub read_timeout: Duration,
    /// How long `disconnect` waits for the read loop before detaching it
    pub join_timeout: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: crate::protocol::BAUD_RATE,
            poll_interval: Duration::from_millis(5),
            read_timeout: Duration::from_millis(100),
            join_timeout: Duration::from_millis(500),
        }
    }
}

/// Read loop counters, for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkCounters {
    pub lines_read: u64,
    pub events_dispatched: u64,
    pub malformed_lines: u64,
    pub overlong_lines: u64,
}

#[derive(Default)]
struct Counters {
    lines_read: AtomicU64,
    events_dispatched: AtomicU64,
    malformed_lines: AtomicU64,
    overlong_lines: AtomicU64,
}

enum ReadOutcome {
    Idle,
    Data(usize),
    Closed,
    Failed(io::Error),
}

struct Shared {
    transport: Mutex<Option<Box<dyn SerialTransport>>>,
    state: RwLock<LinkState>,
    port: RwLock<Option<String>>,
    stop: AtomicBool,
    subscribers: SubscriberRegistry,
    status: broadcast::Sender<LinkStatus>,
    counters: Counters,
}

impl Shared {
    fn lock_transport(
        &self,
    ) -> Result<MutexGuard<'_, Option<Box<dyn SerialTransport>>>, LinkError> {
        self.transport.lock().map_err(|_| LinkError::LockPoisoned {
            component: "transport".to_string(),
        })
    }

    fn set_state(&self, state: LinkState, port: Option<String>) {
        if let Ok(mut guard) = self.state.write() {
            *guard = state;
        }
        if let Ok(mut guard) = self.port.write() {
            *guard = port;
        }
    }

    fn publish(&self, status: LinkStatus) {
        // No receivers is fine
        let _ = self.status.send(status);
    }

    fn read_available(&self, buf: &mut [u8]) -> ReadOutcome {
        let mut slot = match self.lock_transport() {
            Ok(slot) => slot,
            Err(_) => return ReadOutcome::Closed,
        };
        let Some(transport) = slot.as_mut() else {
            return ReadOutcome::Closed;
        };

        let available = match transport.bytes_available() {
            Ok(0) => return ReadOutcome::Idle,
            Ok(available) => available,
            Err(err) => return ReadOutcome::Failed(err),
        };
        let len = available.min(buf.len());
        match transport.read(&mut buf[..len]) {
            Ok(0) => ReadOutcome::Idle,
            Ok(count) => ReadOutcome::Data(count),
            Err(err) => ReadOutcome::Failed(err),
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let result = {
            let mut slot = self.lock_transport()?;
            match slot.as_mut() {
                Some(transport) => transport.write_all(bytes),
                None => return Err(LinkError::NotConnected),
            }
        };

        result.map_err(|err| {
            let reason = err.to_string();
            self.fail(reason.clone());
            LinkError::IoFailure { reason }
        })
    }

    /// Unsolicited disconnect; only the caller that takes the transport reports it
    fn fail(&self, reason: String) {
        let taken = match self.transport.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if taken.is_none() {
            return;
        }
        drop(taken);

        self.stop.store(true, Ordering::SeqCst);
        self.set_state(LinkState::Disconnected, None);
        log_link_error(
            &LinkError::IoFailure {
                reason: reason.clone(),
            },
            "telemetry_stream",
        );
        self.publish(LinkStatus::Disconnected {
            reason: DisconnectReason::IoFailure(reason),
        });
    }

    fn handle_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        self.counters.lines_read.fetch_add(1, Ordering::Relaxed);

        let Some(event) = decode_line(line) else {
            self.counters
                .malformed_lines
                .fetch_add(1, Ordering::Relaxed);
            debug!("[TelemetryStream] Dropping malformed line {:?}", line);
            return;
        };

        match &event {
            TelemetryEvent::Acknowledgement(text) => {
                info!("[TelemetryStream] Device ACK: {}", text)
            }
            TelemetryEvent::ErrorReport(text) => warn!("[TelemetryStream] Device ERR: {}", text),
            _ => {}
        }
        self.counters
            .events_dispatched
            .fetch_add(1, Ordering::Relaxed);
        self.subscribers.dispatch(&event);
    }
}

fn read_loop(shared: Arc<Shared>, poll_interval: Duration) {
    let mut assembler = LineAssembler::new();
    let mut buf = [0u8; READ_CHUNK];
    let mut overlong_seen = 0;

    while !shared.stop.load(Ordering::SeqCst) {
        match shared.read_available(&mut buf) {
            ReadOutcome::Idle => thread::sleep(poll_interval),
            ReadOutcome::Data(count) => {
                for line in assembler.push(&buf[..count]) {
                    shared.handle_line(&line);
                }
                let overlong = assembler.discarded();
                if overlong > overlong_seen {
                    shared
                        .counters
                        .overlong_lines
                        .fetch_add(overlong - overlong_seen, Ordering::Relaxed);
                    overlong_seen = overlong;
                }
            }
            ReadOutcome::Closed => break,
            ReadOutcome::Failed(err) => {
                if !shared.stop.load(Ordering::SeqCst) {
                    shared.fail(err.to_string());
                }
                break;
            }
        }
    }

    debug!("[TelemetryStream] Read loop exited");
}

/// Serial telemetry stream with typed per-kind subscriptions
///
/// # Example
/// ```ignore
/// let stream = TelemetryStream::new(LinkSettings::default());
/// let mut samples = stream.subscribe(EventKind::CalibrationPressure);
/// stream.connect("/dev/ttyACM0")?;
/// ```
pub struct TelemetryStream {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    settings: LinkSettings,
}

impl TelemetryStream {
    pub fn new(settings: LinkSettings) -> Self {
        let (status, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                transport: Mutex::new(None),
                state: RwLock::new(LinkState::Disconnected),
                port: RwLock::new(None),
                stop: AtomicBool::new(false),
                subscribers: SubscriberRegistry::new(),
                status,
                counters: Counters::default(),
            }),
            reader: Mutex::new(None),
            settings,
        }
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    /// Open `port`, start the read loop and send the handshake
    ///
    /// # Errors
    /// - `AlreadyConnected` if a link is open
    /// - `OpenFailed` if the serial port cannot be opened
    pub fn connect(&self, port: &str) -> Result<(), LinkError> {
        if self.is_connected() {
            return Err(LinkError::AlreadyConnected);
        }
        let transport = open_port(port, self.settings.baud_rate, self.settings.read_timeout)
            .inspect_err(|err| log_link_error(err, "connect"))?;
        self.connect_with(Box::new(transport), port)
    }

    /// Attach an already open transport; `label` names it in status updates
    pub fn connect_with(
        &self,
        transport: Box<dyn SerialTransport>,
        label: &str,
    ) -> Result<(), LinkError> {
        if self.shared.lock_transport()?.is_some() {
            return Err(LinkError::AlreadyConnected);
        }

        // A reader left over from a failed session must be gone before the
        // new transport is visible, or it could consume the first bytes.
        self.join_reader();
        self.shared.stop.store(false, Ordering::SeqCst);
        {
            let mut slot = self.shared.lock_transport()?;
            if slot.is_some() {
                return Err(LinkError::AlreadyConnected);
            }
            *slot = Some(transport);
        }
        self.shared
            .set_state(LinkState::Connected, Some(label.to_string()));

        let shared = Arc::clone(&self.shared);
        let poll_interval = self.settings.poll_interval;
        let spawned = thread::Builder::new()
            .name("telemetry-reader".to_string())
            .spawn(move || read_loop(shared, poll_interval));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                if let Ok(mut slot) = self.shared.lock_transport() {
                    slot.take();
                }
                self.shared.set_state(LinkState::Disconnected, None);
                let err = LinkError::from(err);
                log_link_error(&err, "connect");
                return Err(err);
            }
        };
        if let Ok(mut reader) = self.reader.lock() {
            *reader = Some(handle);
        }

        info!("[TelemetryStream] Connected to {}", label);
        self.shared.publish(LinkStatus::Connected {
            port: label.to_string(),
        });
        self.send(&DeviceCommand::Handshake)
    }

    /// Close the link and stop the read loop
    ///
    /// Calling this while disconnected is a no-op.
    pub fn disconnect(&self) -> Result<(), LinkError> {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.join_reader();

        let taken = self.shared.lock_transport()?.take();
        if taken.is_none() {
            debug!("[TelemetryStream] disconnect() while not connected");
            return Ok(());
        }
        drop(taken);

        self.shared.set_state(LinkState::Disconnected, None);
        info!("[TelemetryStream] Disconnected");
        self.shared.publish(LinkStatus::Disconnected {
            reason: DisconnectReason::Requested,
        });
        Ok(())
    }

    /// Write one command to the device
    ///
    /// # Errors
    /// - `NotConnected` when no link is open (logged at debug level)
    /// - `IoFailure` when the write fails; the link is then torn down
    pub fn send(&self, command: &DeviceCommand) -> Result<(), LinkError> {
        self.write_line(&command.encode())
    }

    /// Write a raw text line; a trailing newline is added when missing
    pub fn send_line(&self, text: &str) -> Result<(), LinkError> {
        if text.ends_with('\n') {
            self.write_line(text)
        } else {
            self.write_line(&format!("{}\n", text))
        }
    }

    fn write_line(&self, line: &str) -> Result<(), LinkError> {
        let result = self.shared.write(line.as_bytes());
        match &result {
            Ok(()) => debug!("[TelemetryStream] Sent {:?}", line.trim_end()),
            Err(LinkError::NotConnected) => {
                debug!(
                    "[TelemetryStream] Not connected, dropping {:?}",
                    line.trim_end()
                )
            }
            Err(_) => {}
        }
        result
    }

    pub fn state(&self) -> LinkState {
        self.shared
            .state
            .read()
            .map(|state| *state)
            .unwrap_or(LinkState::Disconnected)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Port (or transport label) of the open link
    pub fn port(&self) -> Option<String> {
        self.shared.port.read().ok().and_then(|port| port.clone())
    }

    pub fn counters(&self) -> LinkCounters {
        let counters = &self.shared.counters;
        LinkCounters {
            lines_read: counters.lines_read.load(Ordering::Relaxed),
            events_dispatched: counters.events_dispatched.load(Ordering::Relaxed),
            malformed_lines: counters.malformed_lines.load(Ordering::Relaxed),
            overlong_lines: counters.overlong_lines.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    pub fn subscribe(&self, kind: EventKind) -> mpsc::UnboundedReceiver<TelemetryEvent> {
        self.shared.subscribers.subscribe(kind)
    }

    /// Every event, in arrival order
    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<TelemetryEvent> {
        self.shared.subscribers.subscribe_all()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<LinkStatus> {
        self.shared.status.subscribe()
    }

    /// Stream of one event kind
    pub fn event_stream(&self, kind: EventKind) -> impl Stream<Item = TelemetryEvent> {
        UnboundedReceiverStream::new(self.subscribe(kind))
    }

    /// Stream of link status changes; lagged updates are skipped
    pub fn status_stream(&self) -> impl Stream<Item = LinkStatus> {
        BroadcastStream::new(self.subscribe_status())
            .filter_map(|status| futures::future::ready(status.ok()))
    }

    fn join_reader(&self) {
        let handle = match self.reader.lock() {
            Ok(mut reader) => reader.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        let deadline = Instant::now() + self.settings.join_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        if !handle.is_finished() {
            warn!(
                "[TelemetryStream] Read loop did not stop within {:?}; detaching",
                self.settings.join_timeout
            );
            return;
        }
        if handle.join().is_err() {
            warn!("[TelemetryStream] Read loop panicked");
        }
    }
}

impl Default for TelemetryStream {
    fn default() -> Self {
        Self::new(LinkSettings::default())
    }
}

impl Drop for TelemetryStream {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.join_reader();
    }
}

impl CommandSink for TelemetryStream {
    fn is_connected(&self) -> bool {
        TelemetryStream::is_connected(self)
    }

    fn send(&self, command: &DeviceCommand) {
        let _ = self.write_line(&command.encode());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ScriptedTransport;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn fast_settings() -> LinkSettings {
        LinkSettings {
            poll_interval: Duration::from_millis(1),
            ..LinkSettings::default()
        }
    }

    #[tokio::test]
    async fn test_connect_sends_handshake() {
        let stream = TelemetryStream::new(fast_settings());
        let mut status = stream.subscribe_status();
        let (transport, script) = ScriptedTransport::new();

        stream.connect_with(Box::new(transport), "stub").unwrap();

        assert_eq!(script.written_lines(), vec!["H"]);
        assert_eq!(stream.state(), LinkState::Connected);
        assert_eq!(stream.port().as_deref(), Some("stub"));
        assert_eq!(
            status.recv().await.unwrap(),
            LinkStatus::Connected {
                port: "stub".to_string()
            }
        );
        stream.disconnect().unwrap();
    }

    #[tokio::test]
    async fn test_events_reach_kind_subscribers() {
        let stream = TelemetryStream::new(fast_settings());
        let mut calib = stream.subscribe(EventKind::CalibrationPressure);
        let mut joystick = stream.subscribe(EventKind::Joystick);
        let (transport, script) = ScriptedTransport::new();
        stream.connect_with(Box::new(transport), "stub").unwrap();

        script.feed(b"CALIB_P:4");
        script.feed(b"12\r\nJOY:-3,7\nnoise\n");

        let event = timeout(WAIT, calib.recv()).await.unwrap().unwrap();
        assert_eq!(event, TelemetryEvent::CalibrationPressureSample(412));
        let event = timeout(WAIT, joystick.recv()).await.unwrap().unwrap();
        assert_eq!(event, TelemetryEvent::JoystickVector { x: -3, y: 7 });

        stream.disconnect().unwrap();
        let counters = stream.counters();
        assert_eq!(counters.events_dispatched, 2);
        assert_eq!(counters.malformed_lines, 1);
    }

    #[tokio::test]
    async fn test_read_failure_reports_once() {
        let stream = TelemetryStream::new(fast_settings());
        let (transport, script) = ScriptedTransport::new();
        stream.connect_with(Box::new(transport), "stub").unwrap();
        let mut status = stream.subscribe_status();

        script.fail_reads("device unplugged");
        script.fail_writes("device unplugged");

        let change = timeout(WAIT, status.recv()).await.unwrap().unwrap();
        assert!(matches!(
            change,
            LinkStatus::Disconnected {
                reason: DisconnectReason::IoFailure(_)
            }
        ));
        assert_eq!(stream.state(), LinkState::Disconnected);

        // Further writes are no-ops and do not report again.
        assert_eq!(
            stream.send(&DeviceCommand::StopCalibration),
            Err(LinkError::NotConnected)
        );
        stream.disconnect().unwrap();
        assert!(matches!(
            status.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_write_failure_tears_down_link() {
        let stream = TelemetryStream::new(fast_settings());
        let (transport, script) = ScriptedTransport::new();
        stream.connect_with(Box::new(transport), "stub").unwrap();
        let mut status = stream.subscribe_status();

        script.fail_writes("broken pipe");
        let err = stream.send(&DeviceCommand::StartCalibration).unwrap_err();
        assert!(matches!(err, LinkError::IoFailure { .. }));
        assert!(!stream.is_connected());

        let change = timeout(WAIT, status.recv()).await.unwrap().unwrap();
        assert!(matches!(change, LinkStatus::Disconnected { .. }));
    }

    #[tokio::test]
    async fn test_reconnect_after_write_failure_keeps_first_bytes() {
        let stream = TelemetryStream::new(fast_settings());
        let mut pressure = stream.subscribe(EventKind::Pressure);
        let (transport, mut script) = ScriptedTransport::new();
        stream.connect_with(Box::new(transport), "stub").unwrap();

        for value in 400..420u16 {
            script.fail_writes("broken pipe");
            assert!(stream.send(&DeviceCommand::StartCalibration).is_err());

            let (transport, next) = ScriptedTransport::new();
            next.feed_line(&format!("P:{value}"));
            stream.connect_with(Box::new(transport), "stub").unwrap();

            let event = timeout(WAIT, pressure.recv()).await.unwrap().unwrap();
            assert_eq!(event, TelemetryEvent::PressureSample(value));
            script = next;
        }
        stream.disconnect().unwrap();
    }

    #[test]
    fn test_send_while_disconnected_is_noop() {
        let stream = TelemetryStream::default();
        assert_eq!(
            stream.send(&DeviceCommand::Handshake),
            Err(LinkError::NotConnected)
        );
        CommandSink::send(&stream, &DeviceCommand::Handshake);
        assert!(stream.disconnect().is_ok());
    }

    #[test]
    fn test_connect_twice_rejected() {
        let stream = TelemetryStream::new(fast_settings());
        let (first, _a) = ScriptedTransport::new();
        let (second, _b) = ScriptedTransport::new();
        stream.connect_with(Box::new(first), "one").unwrap();
        assert_eq!(
            stream.connect_with(Box::new(second), "two"),
            Err(LinkError::AlreadyConnected)
        );
        stream.disconnect().unwrap();
    }

    #[tokio::test]
    async fn test_explicit_disconnect_reports_requested() {
        let stream = TelemetryStream::new(fast_settings());
        let (transport, script) = ScriptedTransport::new();
        stream.connect_with(Box::new(transport), "stub").unwrap();
        let mut status = stream.subscribe_status();

        stream.send_line("SET_HST:300").unwrap();
        stream.disconnect().unwrap();

        assert_eq!(script.written_lines(), vec!["H", "SET_HST:300"]);
        assert_eq!(
            status.recv().await.unwrap(),
            LinkStatus::Disconnected {
                reason: DisconnectReason::Requested
            }
        );
    }
}
