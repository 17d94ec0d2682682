//! Debounced, animation-locked batching of counter deltas.
//!
//! One accumulator per [`BatchDirection`]. An `add` either re-arms the
//! direction's debounce timer or, while the direction is animating, only
//! accumulates. A flush moves the whole pending amount into the counters
//! in one step and locks the direction for the animation window; when the
//! window closes, anything that piled up is flushed straight away.
//!
//! Every amount passed to `add` ends up in exactly one flushed
//! [`CounterUpdate`]: the sum of flushed deltas per direction equals the
//! sum of added amounts.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use subcount_core::{BatchDirection, CounterUpdate};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::board::CounterBoard;
use crate::scheduler::Scheduler;

/// Timer durations for the batching engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchingConfig {
    /// Quiet period after the last add before flushing.
    pub debounce: Duration,
    /// How long a flushed direction stays locked.
    pub animation_window: Duration,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            animation_window: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    pending: u64,
    animating: bool,
}

struct Inner {
    config: BatchingConfig,
    slots: [Mutex<Accumulator>; 4],
    board: Arc<CounterBoard>,
    scheduler: Scheduler,
    updates: mpsc::UnboundedSender<CounterUpdate>,
}

/// Per-direction batching in front of the [`CounterBoard`].
#[derive(Clone)]
pub struct BatchingEngine {
    inner: Arc<Inner>,
}

impl BatchingEngine {
    /// Engine that applies flushes to `board` and emits them on `updates`.
    pub fn new(
        config: BatchingConfig,
        board: Arc<CounterBoard>,
        scheduler: Scheduler,
        updates: mpsc::UnboundedSender<CounterUpdate>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                slots: Default::default(),
                board,
                scheduler,
                updates,
            }),
        }
    }

    /// Queue `amount` for `direction`.
    pub fn add(&self, direction: BatchDirection, amount: u64) {
        if amount == 0 {
            return;
        }
        let mut slot = self.slot(direction);
        slot.pending = slot.pending.saturating_add(amount);
        if slot.animating {
            debug!(%direction, pending = slot.pending, "accumulating during animation");
            return;
        }
        let engine = self.clone();
        self.inner
            .scheduler
            .schedule(debounce_timer(direction), self.inner.config.debounce, move || {
                engine.flush(direction);
                std::future::ready(())
            });
    }

    /// Flush `direction` now unless it is animating or empty.
    pub fn flush(&self, direction: BatchDirection) {
        let mut slot = self.slot(direction);
        self.flush_locked(direction, &mut slot);
    }

    /// Apply every pending amount immediately, ignoring animation locks.
    ///
    /// Used at shutdown so queued deltas reach the counter store.
    pub fn drain(&self) {
        for direction in BatchDirection::ALL {
            let mut slot = self.slot(direction);
            let _ = self.inner.scheduler.cancel(&debounce_timer(direction));
            let _ = self.inner.scheduler.cancel(&animation_timer(direction));
            slot.animating = false;
            let amount = std::mem::take(&mut slot.pending);
            if amount > 0 {
                self.apply_and_emit(direction, amount);
            }
        }
    }

    /// Amount waiting to be flushed for `direction`.
    pub fn pending(&self, direction: BatchDirection) -> u64 {
        self.slot(direction).pending
    }

    /// Whether `direction` is inside its animation window.
    pub fn is_animating(&self, direction: BatchDirection) -> bool {
        self.slot(direction).animating
    }

    fn slot(&self, direction: BatchDirection) -> parking_lot::MutexGuard<'_, Accumulator> {
        self.inner.slots[direction.index()].lock()
    }

    fn flush_locked(&self, direction: BatchDirection, slot: &mut Accumulator) {
        if slot.animating || slot.pending == 0 {
            return;
        }
        let amount = std::mem::take(&mut slot.pending);
        slot.animating = true;
        self.apply_and_emit(direction, amount);

        let engine = self.clone();
        self.inner.scheduler.schedule(
            animation_timer(direction),
            self.inner.config.animation_window,
            move || {
                engine.end_animation(direction);
                std::future::ready(())
            },
        );
    }

    fn apply_and_emit(&self, direction: BatchDirection, amount: u64) {
        let count = self.inner.board.apply(direction, amount);
        info!(%direction, amount, count, "batch flushed");
        if self
            .inner
            .updates
            .send(CounterUpdate::batch(direction, amount, count))
            .is_err()
        {
            debug!(%direction, "update receiver dropped");
        }
    }

    fn end_animation(&self, direction: BatchDirection) {
        let mut slot = self.slot(direction);
        slot.animating = false;
        if slot.pending > 0 {
            debug!(%direction, pending = slot.pending, "re-flushing after animation");
            self.flush_locked(direction, &mut slot);
        }
    }
}

fn debounce_timer(direction: BatchDirection) -> String {
    format!("batch:{direction}")
}

fn animation_timer(direction: BatchDirection) -> String {
    format!("animation:{direction}")
}
