//! Progress reporting seam for the sync engine.
//!
//! Display concerns (progress bars, structured log lines) live outside
//! the core; the engine only emits [`SyncEvent`]s to a caller-supplied
//! [`SyncObserver`].

use std::fmt;

use tokio::sync::mpsc;

/// The four ordered engine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Discover,
    Create,
    Enrich,
    Relations,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Discover => "discover",
            Self::Create => "create",
            Self::Enrich => "enrich",
            Self::Relations => "relations",
        };
        f.write_str(s)
    }
}

/// Progress event emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A phase began. `total` is `None` when the amount of work is not
    /// known up front (discovery).
    PhaseStarted {
        phase: SyncPhase,
        total: Option<usize>,
    },
    /// One unit of work within a phase finished.
    ItemCompleted { phase: SyncPhase, item_id: String },
    PhaseCompleted { phase: SyncPhase },
    PhaseFailed { phase: SyncPhase, message: String },
}

/// Receives engine progress events.
///
/// Callbacks run on the engine's task and must not block; heavyweight
/// consumers should forward into a channel (see [`ChannelObserver`]).
pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent) {
        let _ = event;
    }
}

/// Observer that drops every event.
#[derive(Debug, Default, Clone)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}

/// Observer that forwards events into an unbounded channel. A closed
/// receiver is tolerated; progress must never fail a sync.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SyncObserver for ChannelObserver {
    fn on_event(&self, event: &SyncEvent) {
        let _ = self.tx.send(event.clone());
    }
}
