//! Fixed-period refresh of the transport.
//!
//! A tick polls the backend through the transport, fires `natural_end` when the
//! loaded track finishes, beats the heartbeat and keeps the latest snapshot for
//! the presentation layer. Ticks hold the only mutable borrow of the transport,
//! so two can never run at once; periods missed while a tick blocked are dropped,
//! not replayed.

use crate::model::Snapshot;
use crate::transport::TransportStateMachine;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub const MIN_PERIOD: Duration = Duration::from_millis(50);
pub const MAX_PERIOD: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Ran(Snapshot),
    NotDue,
}

#[derive(Debug)]
pub struct UpdateScheduler {
    period: Duration,
    next_due: Option<Instant>,
    skipped: u64,
    /// Load generation for which `natural_end` already fired.
    ended_for: Option<u64>,
    latest: Snapshot,
}

impl UpdateScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.clamp(MIN_PERIOD, MAX_PERIOD),
            next_due: None,
            skipped: 0,
            ended_for: None,
            latest: Snapshot::default(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn due(&self, now: Instant) -> bool {
        self.next_due.is_none_or(|due| now >= due)
    }

    /// Time left until the next tick, zero when one is due.
    pub fn until_due(&self, now: Instant) -> Duration {
        self.next_due
            .map_or(Duration::ZERO, |due| due.saturating_duration_since(now))
    }

    pub fn skipped_periods(&self) -> u64 {
        self.skipped
    }

    pub fn latest(&self) -> &Snapshot {
        &self.latest
    }

    pub fn tick(&mut self, now: Instant, transport: &mut TransportStateMachine) -> TickOutcome {
        if !self.due(now) {
            return TickOutcome::NotDue;
        }
        if let Some(due) = self.next_due {
            let missed = (now.duration_since(due).as_nanos() / self.period.as_nanos()) as u64;
            if missed > 0 {
                self.skipped += missed;
                debug!(missed, "tick ran late; skipping missed periods");
            }
        }
        self.next_due = Some(now + self.period);

        if transport.refresh() {
            let generation = transport.load_generation();
            if self.ended_for != Some(generation) {
                self.ended_for = Some(generation);
                if let Err(err) = transport.natural_end() {
                    debug!(%err, "advance after end of track failed");
                }
            }
        }

        transport.heartbeat().beat();
        self.latest = transport.snapshot();
        trace!(
            state = self.latest.state.label(),
            position_ms = self.latest.position.as_millis() as u64,
            "tick"
        );
        TickOutcome::Ran(self.latest.clone())
    }

    /// Publish a fresh snapshot outside the tick cadence, e.g. right after a command.
    pub fn publish(&mut self, transport: &TransportStateMachine) -> &Snapshot {
        self.latest = transport.snapshot();
        &self.latest
    }
}
