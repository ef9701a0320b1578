//! Server accept-loop workers.
//!
//! Each worker owns a clone of the listening socket and loops:
//!
//! ```text
//! Idle → Accepting → Reading → (peer closed) → Accepting → ...
//!            │
//!            └─ accept error → Faulted (worker exits)
//! ```
//!
//! A read error on an accepted connection only ends that connection; the
//! worker goes back to accepting. Stop is signalled through a shared flag
//! checked after every accept.

use std::io::{self, Read};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};

use super::codec::Utf8StreamDecoder;
use crate::agent::MessageQueue;
use crate::constants::READ_BUFFER_SIZE;

/// Lifecycle state of one accept-loop worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Spawned, not yet accepting.
    Idle = 0,
    /// Blocked in `accept`.
    Accepting = 1,
    /// Reading from an accepted connection.
    Reading = 2,
    /// Exited after a socket failure.
    Faulted = 3,
    /// Exited after a stop request.
    Stopped = 4,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Accepting,
            2 => Self::Reading,
            3 => Self::Faulted,
            _ => Self::Stopped,
        }
    }

    /// Whether the worker thread is still running.
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Idle | Self::Accepting | Self::Reading)
    }
}

/// Shared, lock-free state table for a server's workers.
#[derive(Debug)]
pub(crate) struct WorkerSlots {
    slots: Box<[AtomicU8]>,
}

impl WorkerSlots {
    pub(crate) fn new(count: usize) -> Self {
        let slots = (0..count)
            .map(|_| AtomicU8::new(WorkerState::Idle as u8))
            .collect();
        Self { slots }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn get(&self, index: usize) -> WorkerState {
        WorkerState::from_u8(self.slots[index].load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, index: usize, state: WorkerState) {
        self.slots[index].store(state as u8, Ordering::SeqCst);
    }

    /// Mark a worker as exited, keeping `Faulted` if it was set.
    fn finish(&self, index: usize) {
        let _ = self.slots[index].fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
            (raw != WorkerState::Faulted as u8).then_some(WorkerState::Stopped as u8)
        });
    }

    pub(crate) fn snapshot(&self) -> Vec<WorkerState> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }
}

/// One accept-loop worker, moved onto its own thread by [`AcceptWorker::spawn`].
#[derive(Debug)]
pub(crate) struct AcceptWorker {
    pub(crate) index: usize,
    pub(crate) server_name: String,
    pub(crate) listener: TcpListener,
    pub(crate) queue: MessageQueue,
    pub(crate) stop: Arc<AtomicBool>,
    pub(crate) slots: Arc<WorkerSlots>,
}

impl AcceptWorker {
    /// Start the worker on a named background thread.
    pub(crate) fn spawn(self) -> Result<JoinHandle<()>> {
        let index = self.index;
        thread::Builder::new()
            .name(format!("tcp-accept-{index}"))
            .spawn(move || self.run())
            .with_context(|| format!("Failed to spawn accept worker {index}"))
    }

    /// Accept loop - runs on the worker thread until stopped or faulted.
    fn run(self) {
        let slots = Arc::clone(&self.slots);
        let index = self.index;
        let _exit = scopeguard::guard((), move |()| slots.finish(index));

        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            self.slots.set(index, WorkerState::Accepting);

            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    if self.stop.load(Ordering::SeqCst) {
                        break;
                    }
                    self.slots.set(index, WorkerState::Reading);
                    log::debug!(
                        "[Server] '{}' worker {} accepted {}",
                        self.server_name,
                        index,
                        peer
                    );

                    match read_stream(&mut stream, &self.queue) {
                        Ok(chunks) => log::debug!(
                            "[Server] '{}' worker {}: {} closed after {} chunk(s)",
                            self.server_name,
                            index,
                            peer,
                            chunks
                        ),
                        Err(e) => log::error!(
                            "[Server] '{}' could not receive any message from {}: {e}",
                            self.server_name,
                            peer
                        ),
                    }
                }
                Err(e) if is_transient_accept_error(&e) => {}
                Err(e) => {
                    if self.stop.load(Ordering::SeqCst) {
                        break;
                    }
                    log::error!(
                        "[Server] '{}' worker {} could not accept connections: {e}",
                        self.server_name,
                        index
                    );
                    self.slots.set(index, WorkerState::Faulted);
                    return;
                }
            }
        }

        log::debug!("[Server] '{}' worker {} stopped", self.server_name, index);
    }
}

/// Errors after which `accept` can simply be retried.
fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
    )
}

/// Read `stream` until EOF, pushing each non-empty decoded chunk.
///
/// Returns the number of chunks pushed.
pub(crate) fn read_stream(stream: &mut impl Read, queue: &MessageQueue) -> io::Result<usize> {
    let mut decoder = Utf8StreamDecoder::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut chunks = 0;

    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.feed(&buf[..n]);
                if !text.is_empty() {
                    queue.push(text);
                    chunks += 1;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        queue.push(tail);
        chunks += 1;
    }
    Ok(chunks)
}
