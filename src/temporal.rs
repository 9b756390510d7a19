// ⏰ Temporal Model - Closure periods derived from the event log
// "Time must be explicit": periods are VALUES computed from the log, never stored
//
// State machine over one sorted log:
//
//   (no period) --closed--> (period open at t)
//   (period open) --open--> emit [start, t]
//   (no period) --open-->   no-op (already open, or log starts mid-history)
//   (period open) --closed--> no-op (closure confirmed, not a new one)
//
// A period still open at the end of the log is ONGOING; its duration is
// measured against `now` and is only a snapshot.

use crate::entities::{Status, StatusEvent};
use chrono::{DateTime, Duration, Utc};

// ============================================================================
// CLOSURE PERIOD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodEnd {
    /// Closed by an `open` event at this time
    At(DateTime<Utc>),

    /// No `open` event yet
    Ongoing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosurePeriod {
    pub start: DateTime<Utc>,
    pub end: PeriodEnd,

    /// end − start, or now − start for ongoing periods (never negative)
    pub duration: Duration,
}

impl ClosurePeriod {
    pub fn is_ongoing(&self) -> bool {
        matches!(self.end, PeriodEnd::Ongoing)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        match self.end {
            PeriodEnd::At(end) => Some(end),
            PeriodEnd::Ongoing => None,
        }
    }
}

// ============================================================================
// RECONSTRUCTION
// ============================================================================

/// Closure periods of one log, taken in log order.
///
/// Under sequence ordering a reopening can carry an older stamp than the
/// closure it ends; such a period lasts zero. One linear pass. `now` is only used for a trailing ongoing period.
pub fn reconstruct_periods(events: &[StatusEvent], now: DateTime<Utc>) -> Vec<ClosurePeriod> {
    let mut periods = Vec::new();
    let mut open_since: Option<DateTime<Utc>> = None;

    for event in events {
        match (event.status, open_since) {
            (Status::Closed, None) => open_since = Some(event.timestamp),
            (Status::Open, Some(start)) => {
                periods.push(ClosurePeriod {
                    start,
                    end: PeriodEnd::At(event.timestamp),
                    duration: (event.timestamp - start).max(Duration::zero()),
                });
                open_since = None;
            }
            (Status::Open, None) | (Status::Closed, Some(_)) => {}
        }
    }

    if let Some(start) = open_since {
        periods.push(ClosurePeriod {
            start,
            end: PeriodEnd::Ongoing,
            duration: (now - start).max(Duration::zero()),
        });
    }

    periods
}

/// Same as `reconstruct_periods` against the current wall clock
pub fn reconstruct_periods_now(events: &[StatusEvent]) -> Vec<ClosurePeriod> {
    reconstruct_periods(events, Utc::now())
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Summary over the periods of one location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureStats {
    /// Number of periods, ongoing included
    pub closures: usize,

    /// Sum of all durations (ongoing counted up to `now`)
    pub total_closed: Duration,

    pub longest: Option<Duration>,

    pub ongoing: bool,
}

impl ClosureStats {
    pub fn from_periods(periods: &[ClosurePeriod]) -> Self {
        ClosureStats {
            closures: periods.len(),
            total_closed: periods
                .iter()
                .fold(Duration::zero(), |total, p| total + p.duration),
            longest: periods.iter().map(|p| p.duration).max(),
            ongoing: periods.last().map(|p| p.is_ongoing()).unwrap_or(false),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
