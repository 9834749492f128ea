//! Per-room countdown timer for Gavel auction rounds.
//!
//! A [`Countdown`] drives one bidding round: while armed it yields a
//! [`CountdownEvent::Tick`] roughly once per second (so the room can
//! rebroadcast remaining time) and a single terminal
//! [`CountdownEvent::Expired`] when the deadline passes. While disarmed,
//! [`Countdown::wait`] pends forever — the correct behavior inside a room
//! task's `tokio::select!` loop, where commands keep flowing regardless.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* bids, settlement, ... */ }
//!         event = countdown.wait() => match event {
//!             CountdownEvent::Tick { remaining } => broadcast_remaining(remaining),
//!             CountdownEvent::Expired => settle_by_timer(),
//!         }
//!     }
//! }
//! ```
//!
//! Because the countdown lives inside the same task that applies bids,
//! a timer expiry and a last-second bid can never interleave: whichever
//! the select loop picks first wins, and the other sees the new state.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// Default spacing between [`CountdownEvent::Tick`]s.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// What the countdown produced when [`Countdown::wait`] resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    /// Periodic progress report while the round is running.
    Tick {
        /// Time left until expiry, measured when the tick fired.
        remaining: Duration,
    },
    /// The deadline passed. Fires exactly once per arming; the countdown
    /// disarms itself before returning this.
    Expired,
}

/// A resettable one-shot countdown with periodic progress ticks.
///
/// One `Countdown` per room. Arming, resetting, and cancelling are plain
/// synchronous calls so they compose with the room's serialized command
/// handling.
pub struct Countdown {
    deadline: Option<Instant>,
    next_tick: Option<Instant>,
    tick_interval: Duration,
}

impl Countdown {
    /// Creates a disarmed countdown with the default 1 Hz tick interval.
    pub fn new() -> Self {
        Self::with_tick_interval(DEFAULT_TICK_INTERVAL)
    }

    /// Creates a disarmed countdown with a custom tick interval.
    pub fn with_tick_interval(tick_interval: Duration) -> Self {
        Self {
            deadline: None,
            next_tick: None,
            tick_interval,
        }
    }

    /// Arms (or re-arms) the countdown to expire after `duration`.
    ///
    /// Calling this while armed moves the deadline — this is the
    /// soft-close reset: a valid bid always restarts the full round.
    pub fn arm(&mut self, duration: Duration) {
        let now = Instant::now();
        self.deadline = Some(now + duration);
        self.next_tick = Some(now + self.tick_interval);
        debug!(secs = duration.as_secs_f64(), "countdown armed");
    }

    /// Disarms the countdown. [`wait`](Self::wait) pends until re-armed.
    ///
    /// Idempotent; safe to call when already disarmed.
    pub fn cancel(&mut self) {
        if self.deadline.take().is_some() {
            self.next_tick = None;
            debug!("countdown cancelled");
        }
    }

    /// Whether a deadline is currently set.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left until expiry, or `None` while disarmed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Waits for the next tick or the expiry, whichever comes first.
    ///
    /// While disarmed this future never completes; inside `tokio::select!`
    /// the other branches still run. Expiry disarms the countdown, so a
    /// second `wait` after `Expired` pends until the next [`arm`](Self::arm).
    pub async fn wait(&mut self) -> CountdownEvent {
        let (deadline, next_tick) = match (self.deadline, self.next_tick) {
            (Some(d), Some(t)) => (d, t),
            _ => {
                // Disarmed: pend forever. select! handles other branches.
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        if next_tick >= deadline {
            time::sleep_until(deadline).await;
            self.deadline = None;
            self.next_tick = None;
            trace!("countdown expired");
            CountdownEvent::Expired
        } else {
            time::sleep_until(next_tick).await;
            self.next_tick = Some(next_tick + self.tick_interval);
            let remaining = deadline.saturating_duration_since(Instant::now());
            trace!(remaining_secs = remaining.as_secs_f64(), "countdown tick");
            CountdownEvent::Tick { remaining }
        }
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}
