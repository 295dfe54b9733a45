//! Serial session with the instrument.
//!
//! The port is opened and read on a dedicated thread. Every decoded line,
//! parse result and state change is sent back over an `mpsc` channel in the
//! order it happened; the UI drains that channel once per tick.

use std::io::{self, BufRead, BufReader, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

pub use serialport::{SerialPortInfo, SerialPortType};

use crate::error::ReaderError;
use crate::parser::{self, ParseSkipped, Reading};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderState {
    Idle,
    Connecting,
    Streaming,
    Closed,
    Error,
}

#[derive(Debug)]
pub enum SerialEvent {
    Opened { port: String },
    /// Raw line as received, trimmed.
    Line(String),
    Parsed(Reading),
    Skipped(ParseSkipped),
    Failed(ReaderError),
    Closed,
}

pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().context("list available ports")?;
    Ok(ports)
}

/// One connection at a time to the instrument. Owned by the UI; the reader
/// thread only sees the running flag and the sending half of the channel.
pub struct SerialSession {
    port: Option<String>,
    state: ReaderState,
    running: Arc<AtomicBool>,
    events: Option<Receiver<SerialEvent>>,
    /// Last reader thread. It owns the port until it exits.
    reader: Option<JoinHandle<()>>,
}

impl Default for SerialSession {
    fn default() -> Self {
        Self {
            port: None,
            state: ReaderState::Idle,
            running: Arc::new(AtomicBool::new(false)),
            events: None,
            reader: None,
        }
    }
}

impl SerialSession {
    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// True while connecting or streaming. Port selection is locked meanwhile.
    pub fn is_active(&self) -> bool {
        matches!(self.state, ReaderState::Connecting | ReaderState::Streaming)
    }

    pub fn start(&mut self, port: &str, baud_rate: u32, timeout: Duration) {
        let path = port.to_string();
        self.start_with(port, move || {
            serialport::new(path, baud_rate)
                .timeout(timeout)
                .open()
                .map_err(io::Error::from)
        });
    }

    /// Starts a session over whatever `open` returns. The opener runs on the
    /// reader thread.
    ///
    /// Serial ports are exclusive, so a previous reader is waited for first;
    /// this takes at most one read timeout.
    pub fn start_with<R, F>(&mut self, port: &str, open: F)
    where
        R: Read + Send + 'static,
        F: FnOnce() -> io::Result<R> + Send + 'static,
    {
        self.stop();
        self.join_reader();

        let (tx, rx) = mpsc::channel::<SerialEvent>();
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let label = port.to_string();

        let reader = thread::spawn(move || {
            let handle = match open() {
                Ok(handle) => handle,
                Err(source) => {
                    warn!(port = %label, error = %source, "serial open failed");
                    let _ = tx.send(SerialEvent::Failed(ReaderError::PortUnavailable {
                        port: label,
                        source,
                    }));
                    return;
                }
            };
            info!(port = %label, "serial port opened");
            if tx.send(SerialEvent::Opened { port: label.clone() }).is_err() {
                return;
            }

            if let Err(e) = read_lines(handle, &thread_running, &tx) {
                if thread_running.load(Ordering::SeqCst) {
                    warn!(port = %label, error = %e, "serial session ended");
                    let _ = tx.send(SerialEvent::Failed(e));
                }
            }
            info!(port = %label, "serial port closed");
            let _ = tx.send(SerialEvent::Closed);
        });

        self.port = Some(port.to_string());
        self.state = ReaderState::Connecting;
        self.running = running;
        self.events = Some(rx);
        self.reader = Some(reader);
    }

    fn join_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("serial reader thread panicked");
            }
        }
    }

    /// Asks the reader to finish and detaches from it. The port itself is
    /// released by the reader thread at its next read timeout, and the next
    /// `start` waits for that. Safe to call any number of times.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.events = None;
        if self.state != ReaderState::Idle {
            self.state = ReaderState::Closed;
        }
    }

    /// Drains pending events in arrival order and applies state changes.
    pub fn poll(&mut self) -> Vec<SerialEvent> {
        let mut drained = Vec::new();
        if let Some(rx) = self.events.as_ref() {
            loop {
                match rx.try_recv() {
                    Ok(ev) => drained.push(ev),
                    Err(mpsc::TryRecvError::Empty) => break,
                    Err(mpsc::TryRecvError::Disconnected) => break,
                }
            }
        }

        for ev in &drained {
            match ev {
                SerialEvent::Opened { .. } => self.state = ReaderState::Streaming,
                SerialEvent::Failed(ReaderError::PortUnavailable { .. }) => {
                    self.state = ReaderState::Error;
                    self.events = None;
                }
                SerialEvent::Failed(ReaderError::SerialIo(_)) => {
                    self.state = ReaderState::Error;
                }
                SerialEvent::Closed => {
                    if self.state != ReaderState::Error {
                        self.state = ReaderState::Closed;
                    }
                    self.events = None;
                }
                SerialEvent::Line(_) | SerialEvent::Parsed(_) | SerialEvent::Skipped(_) => {}
            }
        }
        drained
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Reads newline-terminated lines until stopped, end of stream, or an I/O
/// error. A line cut by a read timeout is completed by the following reads.
fn read_lines<R: Read>(
    port: R,
    running: &AtomicBool,
    tx: &Sender<SerialEvent>,
) -> Result<(), ReaderError> {
    let mut reader = BufReader::new(port);
    let mut buf = Vec::new();

    while running.load(Ordering::SeqCst) {
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return Ok(()),
            Ok(_) => {
                let delivered = deliver_line(&buf, tx);
                buf.clear();
                if !delivered {
                    return Ok(());
                }
            }
            Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
            Err(e) => return Err(ReaderError::SerialIo(e)),
        }
    }
    Ok(())
}

/// Returns false once the receiving side is gone.
fn deliver_line(raw: &[u8], tx: &Sender<SerialEvent>) -> bool {
    let decoded = String::from_utf8_lossy(raw).replace(char::REPLACEMENT_CHARACTER, "");
    let line = decoded.trim();
    if line.is_empty() {
        return true;
    }
    debug!(line, "serial line");

    let parsed = match parser::parse_line(line) {
        Ok(reading) => SerialEvent::Parsed(reading),
        Err(reason) => SerialEvent::Skipped(reason),
    };
    tx.send(SerialEvent::Line(line.to_string())).is_ok() && tx.send(parsed).is_ok()
}
