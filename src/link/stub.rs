use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use super::SerialTransport;

#[derive(Default)]
struct ScriptState {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
    read_failure: Option<String>,
    write_failure: Option<String>,
    end_of_script: bool,
}

fn lock(state: &Mutex<ScriptState>) -> MutexGuard<'_, ScriptState> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scripted transport used for deterministic testing and CLI replay.
///
/// Bytes fed through the paired [`ScriptHandle`] become readable; everything
/// the stream writes is captured for inspection.
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

/// Test-side handle of a [`ScriptedTransport`]
#[derive(Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> (Self, ScriptHandle) {
        let state = Arc::new(Mutex::new(ScriptState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            ScriptHandle { state },
        )
    }

    /// Transport that yields `bytes` and then reports end of input as an
    /// I/O failure, which ends the session like an unplugged cable.
    pub fn replay(bytes: &[u8]) -> (Self, ScriptHandle) {
        let (transport, handle) = Self::new();
        handle.feed(bytes);
        lock(&handle.state).end_of_script = true;
        (transport, handle)
    }
}

impl SerialTransport for ScriptedTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let state = lock(&self.state);
        if let Some(reason) = &state.read_failure {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, reason.clone()));
        }
        if state.incoming.is_empty() && state.end_of_script {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "end of recorded telemetry"));
        }
        Ok(state.incoming.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        let count = buf.len().min(state.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(state.incoming.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = lock(&self.state);
        if let Some(reason) = &state.write_failure {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, reason.clone()));
        }
        state.written.extend_from_slice(bytes);
        Ok(())
    }
}

impl ScriptHandle {
    /// Make `bytes` readable by the stream
    pub fn feed(&self, bytes: &[u8]) {
        lock(&self.state).incoming.extend(bytes.iter().copied());
    }

    pub fn feed_line(&self, line: &str) {
        self.feed(format!("{}\n", line).as_bytes());
    }

    /// Bytes not yet consumed by the stream
    pub fn pending(&self) -> usize {
        lock(&self.state).incoming.len()
    }

    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    /// Written bytes split into lines, terminators removed
    pub fn written_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.written())
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Every subsequent poll fails with `reason`
    pub fn fail_reads(&self, reason: &str) {
        lock(&self.state).read_failure = Some(reason.to_string());
    }

    /// Every subsequent write fails with `reason`
    pub fn fail_writes(&self, reason: &str) {
        lock(&self.state).write_failure = Some(reason.to_string());
    }
}
