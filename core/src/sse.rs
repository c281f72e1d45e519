//! Server-sent events: frame decoder and the background stream worker.
//!
//! # Design
//! `Decoder` reads one event at a time from a `BufRead`. Lines are
//! `field: value`; a blank line dispatches the event; lines starting with `:`
//! are comments. Multiple `data` lines are joined with `\n`.
//!
//! `EventStream::spawn` moves the live body reader onto a worker thread that
//! pushes each event's data onto a bounded channel, in wire order. The worker
//! stops on a decode error (kept as the terminal error), on EOF, on an empty
//! data frame, or on the `[DONE]` sentinel, which is never forwarded. A
//! cancellation channel is checked before every read and raced against every
//! send, so a consumer that cancels or drops the stream never leaves the
//! worker blocked. The channel closes, and the reader (and with it the
//! connection) is released, exactly once when the worker returns.

use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::error::Error;

/// Data payload that marks the end of a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const CHANNEL_CAPACITY: usize = 16;

/// Longest line the decoder accepts before failing the stream.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One decoded event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

pub struct Decoder<R> {
    reader: R,
    line: Vec<u8>,
    max_line: usize,
}

impl<R: BufRead> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            max_line: MAX_LINE_BYTES,
        }
    }

    /// Fail with `Error::Decode` on lines longer than `max_line` bytes,
    /// excluding the line ending.
    pub fn with_line_limit(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    /// Next complete event, or `None` at end of input.
    pub fn next_event(&mut self) -> Result<Option<SseEvent>, Error> {
        let mut event = SseEvent::default();
        let mut data_lines: Vec<String> = Vec::new();
        let mut has_fields = false;

        loop {
            self.line.clear();
            // room for the longest accepted line plus its CRLF
            let cap = self.max_line.saturating_add(2) as u64;
            let n = (&mut self.reader).take(cap).read_until(b'\n', &mut self.line)?;
            if strip_line_ending(&self.line).len() > self.max_line {
                return Err(Error::Decode(format!(
                    "event stream line exceeds {} bytes",
                    self.max_line
                )));
            }
            if n == 0 {
                if !has_fields {
                    return Ok(None);
                }
                event.data = data_lines.join("\n");
                return Ok(Some(event));
            }

            let raw = strip_line_ending(&self.line);
            let line = std::str::from_utf8(raw)
                .map_err(|e| Error::Decode(format!("invalid UTF-8 in event stream: {e}")))?;

            if line.is_empty() {
                if has_fields {
                    event.data = data_lines.join("\n");
                    return Ok(Some(event));
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
                None => (line, ""),
            };
            has_fields = true;
            match field {
                "data" => data_lines.push(value.to_string()),
                "event" => event.event = Some(value.to_string()),
                "id" if !value.contains('\0') => event.id = Some(value.to_string()),
                "retry" => {
                    if let Ok(ms) = value.parse() {
                        event.retry = Some(ms);
                    }
                }
                _ => {}
            }
        }
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Why the worker stopped.
#[derive(Debug)]
enum StreamEnd {
    Sentinel,
    Eof,
    Cancelled,
    ConsumerGone,
    Failed(Error),
}

/// A live stream of event data payloads, fed by a background worker.
pub struct EventStream {
    events: Receiver<String>,
    cancel: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    error: Arc<Mutex<Option<Error>>>,
}

impl EventStream {
    /// Start a worker decoding `reader`.
    pub fn spawn<R: Read + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let error = Arc::new(Mutex::new(None));
        let worker_error = Arc::clone(&error);

        let worker = thread::spawn(move || {
            let decoder = Decoder::new(BufReader::new(reader));
            let end = pump(decoder, &tx, &cancel_rx);
            tracing::trace!(?end, "event stream worker finished");
            if let StreamEnd::Failed(e) = end {
                *worker_error.lock() = Some(e);
            }
            drop(tx);
        });

        Self {
            events: rx,
            cancel: Some(cancel_tx),
            worker: Some(worker),
            error,
        }
    }

    /// Block for the next payload; `None` once the stream has ended.
    pub fn recv(&self) -> Option<String> {
        self.events.recv().ok()
    }

    /// Like `recv`, giving up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<String, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    pub fn iter(&self) -> crossbeam_channel::Iter<'_, String> {
        self.events.iter()
    }

    /// Ask the worker to stop. It notices before its next read or while
    /// waiting to hand over an event.
    pub fn cancel(&mut self) {
        self.cancel.take();
    }

    /// Cancel, wait for the worker to exit, and return its terminal error.
    pub fn close(mut self) -> Result<(), Error> {
        self.cancel();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| Error::Decode("event stream worker panicked".to_string()))?;
        }
        match self.error.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Take the error that ended the stream, if any.
    pub fn take_error(&self) -> Option<Error> {
        self.error.lock().take()
    }

    /// True when the stream ended because a read timed out.
    pub fn is_timeout(&self) -> bool {
        self.error.lock().as_ref().is_some_and(Error::is_timeout)
    }
}

impl Iterator for EventStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.recv()
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("pending", &self.events.len())
            .field("cancelled", &self.cancel.is_none())
            .finish()
    }
}

fn pump<R: BufRead>(
    mut decoder: Decoder<R>,
    events: &Sender<String>,
    cancel: &Receiver<()>,
) -> StreamEnd {
    loop {
        if !matches!(cancel.try_recv(), Err(TryRecvError::Empty)) {
            return StreamEnd::Cancelled;
        }
        let event = match decoder.next_event() {
            Ok(Some(event)) => event,
            Ok(None) => return StreamEnd::Eof,
            Err(e) => return StreamEnd::Failed(e),
        };
        if event.data.is_empty() || event.data == DONE_SENTINEL {
            return StreamEnd::Sentinel;
        }
        select! {
            send(events, event.data) -> sent => {
                if sent.is_err() {
                    return StreamEnd::ConsumerGone;
                }
            }
            recv(cancel) -> _ => return StreamEnd::Cancelled,
        }
    }
}
