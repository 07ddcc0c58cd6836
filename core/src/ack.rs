//! Correlation between emitted/received frames and the hardware
//! acknowledgment line.
//!
//! The ack line is physically independent of both the transmit and the
//! decode pipeline: a decode can succeed while the device never reacted.
//! This state machine owns the single pending-operation slot and decides
//! whether an edge on the line confirms the operation that is waiting.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::codec::IdentifiedFrame;

/// Confirmation and timeout windows.
///
/// The defaults are empirically tuned hardware response latencies, not
/// protocol constants, so they stay configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckWindows {
    /// An edge within this window of the operation start confirms it.
    pub confirm_window: Duration,
    /// A pending operation older than this is abandoned.
    pub timeout: Duration,
}

impl Default for AckWindows {
    fn default() -> Self {
        Self {
            confirm_window: Duration::from_millis(400),
            timeout: Duration::from_millis(3500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Transmit,
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Edge arrived inside the confirmation window.
    Confirmed,
    /// Edge arrived, but after the confirmation window. Unconfirmed.
    Late,
    /// No edge before the absolute timeout. Unconfirmed.
    TimedOut,
    /// A newer `begin_*` took over the slot before resolution.
    Superseded,
}

/// A resolved pending operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckResolution {
    pub kind: AckKind,
    pub outcome: AckOutcome,
    /// The decoded frame a pending receive carried, if any.
    pub frame: Option<IdentifiedFrame>,
}

#[derive(Debug)]
enum Slot {
    Idle,
    Awaiting {
        started_at: Instant,
        kind: AckKind,
        generation: u64,
        frame: Option<IdentifiedFrame>,
    },
}

struct Inner {
    slot: Slot,
    /// Outcome of the most recently resolved generation, kept for waiters.
    resolved: Option<(u64, AckOutcome)>,
    next_generation: u64,
}

/// The single pending-ack slot shared between the transmit path and the
/// asynchronous edge callback.
///
/// Every transition is a compare-and-clear under one lock: an edge or a
/// timeout racing a new `begin_*` cannot leak a stale confirmation into the
/// new operation, because outcomes are keyed by generation.
pub struct AckCorrelator {
    inner: Mutex<Inner>,
    resolved_cond: Condvar,
    windows: AckWindows,
}

impl AckCorrelator {
    pub fn new(windows: AckWindows) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slot: Slot::Idle,
                resolved: None,
                next_generation: 0,
            }),
            resolved_cond: Condvar::new(),
            windows,
        }
    }

    /// Begin a transmit operation; returns its generation token.
    pub fn begin_transmit(&self, now: Instant) -> u64 {
        self.begin(now, AckKind::Transmit, None)
    }

    /// Begin a receive operation carrying its decoded frame.
    pub fn begin_receive(&self, now: Instant, frame: IdentifiedFrame) -> u64 {
        self.begin(now, AckKind::Receive, Some(frame))
    }

    fn begin(&self, now: Instant, kind: AckKind, frame: Option<IdentifiedFrame>) -> u64 {
        let mut inner = self.inner.lock();
        if let Slot::Awaiting { generation, .. } = inner.slot {
            debug!("superseding pending ack slot (generation {generation})");
            inner.resolved = Some((generation, AckOutcome::Superseded));
            self.resolved_cond.notify_all();
        }
        let generation = inner.next_generation;
        inner.next_generation += 1;
        inner.slot = Slot::Awaiting {
            started_at: now,
            kind,
            generation,
            frame,
        };
        generation
    }

    /// Handle one edge on the acknowledgment line.
    ///
    /// Returns `None` for an unsolicited edge (nothing was pending).
    pub fn on_ack_edge(&self, now: Instant) -> Option<AckResolution> {
        let mut inner = self.inner.lock();
        match std::mem::replace(&mut inner.slot, Slot::Idle) {
            Slot::Idle => {
                warn!("unsolicited ack edge, no operation pending");
                None
            }
            Slot::Awaiting {
                started_at,
                kind,
                generation,
                frame,
            } => {
                let elapsed = now.saturating_duration_since(started_at);
                let outcome = if elapsed <= self.windows.confirm_window {
                    info!("ack edge after {elapsed:?}: {kind:?} confirmed");
                    AckOutcome::Confirmed
                } else {
                    info!("ack edge after {elapsed:?}: outside confirmation window");
                    AckOutcome::Late
                };
                inner.resolved = Some((generation, outcome));
                self.resolved_cond.notify_all();
                Some(AckResolution {
                    kind,
                    outcome,
                    frame,
                })
            }
        }
    }

    /// Abandon the pending operation once it is older than the absolute
    /// timeout. Returns the abandoned operation, if one timed out.
    pub fn poll_timeout(&self, now: Instant) -> Option<AckResolution> {
        let mut inner = self.inner.lock();
        let expired = match &inner.slot {
            Slot::Awaiting { started_at, .. } => {
                now.saturating_duration_since(*started_at) > self.windows.timeout
            }
            Slot::Idle => false,
        };
        if !expired {
            return None;
        }
        match std::mem::replace(&mut inner.slot, Slot::Idle) {
            Slot::Awaiting {
                kind,
                generation,
                frame,
                ..
            } => {
                info!("pending {kind:?} timed out without an ack edge");
                inner.resolved = Some((generation, AckOutcome::TimedOut));
                self.resolved_cond.notify_all();
                Some(AckResolution {
                    kind,
                    outcome: AckOutcome::TimedOut,
                    frame,
                })
            }
            Slot::Idle => None,
        }
    }

    /// Block until the given generation resolves.
    ///
    /// The wait is bounded by the absolute timeout measured from the
    /// operation start; if nothing resolved the slot by then, the waiter
    /// resolves it as timed out itself.
    pub fn wait(&self, generation: u64) -> AckOutcome {
        let mut inner = self.inner.lock();
        loop {
            if let Some((resolved_generation, outcome)) = inner.resolved {
                if resolved_generation == generation {
                    return outcome;
                }
            }
            let deadline = match &inner.slot {
                Slot::Awaiting {
                    generation: pending,
                    started_at,
                    ..
                } if *pending == generation => *started_at + self.windows.timeout,
                // Our generation is neither pending nor resolved: a newer
                // operation took the slot.
                _ => return AckOutcome::Superseded,
            };
            if self.resolved_cond.wait_until(&mut inner, deadline).timed_out() {
                let expired_kind = match &inner.slot {
                    Slot::Awaiting {
                        generation: pending,
                        kind,
                        ..
                    } if *pending == generation => Some(*kind),
                    _ => None,
                };
                if let Some(kind) = expired_kind {
                    info!("pending {kind:?} timed out without an ack edge");
                    inner.slot = Slot::Idle;
                    inner.resolved = Some((generation, AckOutcome::TimedOut));
                    return AckOutcome::TimedOut;
                }
            }
        }
    }

    #[cfg(test)]
    fn is_awaiting(&self) -> bool {
        matches!(self.inner.lock().slot, Slot::Awaiting { .. })
    }
}
