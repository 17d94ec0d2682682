//! One connected display client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Why a send to a client was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendRefusal {
    /// Queued bytes would exceed the client's buffer limit.
    BufferFull,
    /// The outbound channel is full.
    ChannelFull,
    /// The client's writer is gone.
    Closed,
}

/// A connected display client.
///
/// Outbound text goes through a bounded channel to the client's writer
/// task. Queued-but-unwritten bytes are tracked so a slow client is skipped
/// instead of buffering without bound.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    tx: mpsc::Sender<Arc<String>>,
    buffer_limit: usize,
    buffered: AtomicUsize,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Connection whose queued bytes may not exceed `buffer_limit`.
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>, buffer_limit: usize) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            buffer_limit,
            buffered: AtomicUsize::new(0),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue a message without blocking. Refused when the bytes already
    /// queued exceed the limit; a refused message is counted and not retried.
    pub fn send(&self, message: Arc<String>) -> Result<(), SendRefusal> {
        let len = message.len();
        if self.buffered.load(Ordering::Acquire) > self.buffer_limit {
            return Err(self.refuse(SendRefusal::BufferFull));
        }
        match self.tx.try_send(message) {
            Ok(()) => {
                let _ = self.buffered.fetch_add(len, Ordering::AcqRel);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(self.refuse(SendRefusal::ChannelFull)),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(self.refuse(SendRefusal::Closed)),
        }
    }

    fn refuse(&self, reason: SendRefusal) -> SendRefusal {
        let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
        reason
    }

    /// The writer task finished writing `len` bytes.
    pub fn mark_written(&self, len: usize) {
        let _ = self
            .buffered
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |b| Some(b.saturating_sub(len)));
    }

    /// Bytes queued but not yet written.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    /// Messages refused so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// A pong (or any frame) arrived.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last pong or since connecting.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }
}
