//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use crate::countdown::CountdownTimer;
use crate::models::Session;
use crate::playback::PlaybackState;

/// Validate that a countdown's counters are consistent
pub fn assert_countdown_invariants(timer: &CountdownTimer) {
    debug_assert!(
        timer.remaining() <= timer.initial(),
        "Countdown has {} seconds left of {}",
        timer.remaining(),
        timer.initial()
    );

    // Expiry is only reachable by counting down to zero
    debug_assert!(
        !timer.is_expired() || timer.remaining() == 0,
        "Countdown expired with {} seconds left",
        timer.remaining()
    );
}

/// Validate that playback state is within its bounds
pub fn assert_playback_invariants(state: &PlaybackState) {
    debug_assert!(
        (0.0..=1.0).contains(&state.volume),
        "Volume {} outside [0, 1]",
        state.volume
    );

    debug_assert!(
        state.position >= 0.0,
        "Negative playback position {}",
        state.position
    );

    if let Some(duration) = state.duration {
        debug_assert!(
            state.position <= duration,
            "Position {} beyond duration {}",
            state.position,
            duration
        );
    }
}

/// Validate that an in-memory session is usable
pub fn assert_session_invariants(session: &Session) {
    // A held session always carries a credential
    debug_assert!(
        !session.token.is_empty(),
        "Session for user {} has an empty token",
        session.user.id
    );
}

/// Validate that persisted entries are both present or both absent
pub fn assert_storage_pair_invariants(token: Option<&str>, user: Option<&str>) {
    debug_assert!(
        token.is_some() == user.is_some(),
        "Persisted session half-written: token {}, user {}",
        if token.is_some() { "present" } else { "absent" },
        if user.is_some() { "present" } else { "absent" }
    );
}
