//! Countdown state machine
//!
//! A countdown owns a single remaining-seconds value. The owner drives it with
//! one `tick()` per elapsed second; the countdown never schedules anything
//! itself, so it can be stepped deterministically in tests.
//!
//! States: `Idle` (not counting), `Running`, `Expired` (terminal until reset).

use crate::invariants::assert_countdown_invariants;

/// Observable countdown state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownPhase {
    Idle,
    Running,
    Expired,
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Not running or already expired; nothing changed
    Ignored,
    /// One second elapsed, this many remain
    Decremented(u64),
    /// The countdown just reached zero. Reported once per run.
    Expired,
}

/// Display urgency derived from the fraction of time left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    /// Under 30% remaining
    Warning,
    /// Under 10% remaining
    Critical,
}

#[derive(Debug, Clone)]
pub struct CountdownTimer {
    initial: u64,
    remaining: u64,
    running: bool,
    expired: bool,
}

impl CountdownTimer {
    /// Create a stopped countdown. Negative durations are treated as zero.
    pub fn new(initial_seconds: i64) -> Self {
        let initial = clamp_seconds(initial_seconds);
        Self {
            initial,
            remaining: initial,
            running: false,
            expired: false,
        }
    }

    /// Create a countdown from user-supplied text. Anything that is not a
    /// number of seconds is treated as zero.
    pub fn from_input(input: &str) -> Self {
        Self::new(i64::try_from(parse_seconds(input)).unwrap_or(i64::MAX))
    }

    pub fn phase(&self) -> CountdownPhase {
        if self.expired {
            CountdownPhase::Expired
        } else if self.running && self.remaining > 0 {
            CountdownPhase::Running
        } else {
            CountdownPhase::Idle
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn initial(&self) -> u64 {
        self.initial
    }

    /// The caller's running signal, independent of expiry
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Set the caller's running signal. Pausing keeps the remaining time.
    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Restart from a new duration regardless of the current state.
    ///
    /// Clears expiry. Whether counting continues is still governed by the
    /// running signal.
    pub fn reset(&mut self, initial_seconds: i64) {
        self.initial = clamp_seconds(initial_seconds);
        self.remaining = self.initial;
        self.expired = false;
        assert_countdown_invariants(self);
    }

    /// Advance by one elapsed second
    pub fn tick(&mut self) -> Tick {
        if self.phase() != CountdownPhase::Running {
            return Tick::Ignored;
        }

        let next = self.remaining.saturating_sub(1);
        self.remaining = next;
        let outcome = if next == 0 {
            self.expired = true;
            Tick::Expired
        } else {
            Tick::Decremented(next)
        };

        assert_countdown_invariants(self);
        outcome
    }

    /// Remaining time as `MM:SS`
    pub fn display(&self) -> String {
        format_clock(i64::try_from(self.remaining).unwrap_or(i64::MAX))
    }

    pub fn urgency(&self) -> Urgency {
        let total = if self.initial > 0 { self.initial } else { 1 };
        let percent = self.remaining as f64 / total as f64 * 100.0;
        if percent < 10.0 {
            Urgency::Critical
        } else if percent < 30.0 {
            Urgency::Warning
        } else {
            Urgency::Normal
        }
    }
}

fn clamp_seconds(seconds: i64) -> u64 {
    u64::try_from(seconds).unwrap_or(0)
}

/// Parse a duration typed by a user. Non-numeric, non-finite or negative
/// input yields zero; fractions are truncated.
pub fn parse_seconds(input: &str) -> u64 {
    match input.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v.trunc() as u64,
        _ => 0,
    }
}

/// Render seconds as zero-padded `MM:SS`. Negative input renders `00:00`.
pub fn format_clock(total_seconds: i64) -> String {
    if total_seconds < 0 {
        return "00:00".to_string();
    }
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}", minutes, seconds)
}
