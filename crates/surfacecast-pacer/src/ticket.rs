//! Invalidation tickets: the demand channel between Pacer and Pump.
//!
//! At most one ticket is outstanding per pipeline. A ticket is issued when
//! the Pacer wants a fresh render, dispatched once the Pump has handed the
//! invalidation to the producer, and finally either fulfilled (a matching
//! frame arrives) or expired (its deadline passes first). A late fulfillment
//! of an already-expired ticket is tolerated as a spontaneous frame; it does
//! not drive outstanding demand negative.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static NEXT_TICKET_ID: AtomicU64 = AtomicU64::new(1);

/// A handle representing one in-flight render request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationTicket {
    id: u64,
    issued_at: Instant,
    deadline: Instant,
}

impl InvalidationTicket {
    /// Issue a new ticket with a deadline `timeout` in the future.
    pub fn issue(now: Instant, timeout: Duration) -> Self {
        Self {
            id: NEXT_TICKET_ID.fetch_add(1, Ordering::Relaxed),
            issued_at: now,
            deadline: now + timeout,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Whether `now` is at or past this ticket's deadline.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// Timeout deadline for a ticket: `3 * period`, per the Render Pump's ticket
/// lifecycle contract.
pub fn ticket_timeout(period: Duration) -> Duration {
    period * 3
}
