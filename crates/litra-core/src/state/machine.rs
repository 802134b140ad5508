//! Session lifecycle state machine.

use std::fmt;

/// Lifecycle phase of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Transport not yet claimed.
    #[default]
    Uninitialized,
    /// Interface claimed, nothing exchanged yet.
    Claimed,
    /// At least one command or poll has run.
    Active,
    /// Transport released. Terminal.
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Uninitialized => write!(f, "UNINITIALIZED"),
            SessionPhase::Claimed => write!(f, "CLAIMED"),
            SessionPhase::Active => write!(f, "ACTIVE"),
            SessionPhase::Closed => write!(f, "CLOSED"),
        }
    }
}

impl SessionPhase {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Uninitialized, Claimed)
                | (Uninitialized, Closed)
                | (Claimed, Active)
                | (Claimed, Closed)
                | (Active, Active)
                | (Active, Closed)
        )
    }

    /// Transport is held and usable.
    pub fn is_open(&self) -> bool {
        matches!(self, SessionPhase::Claimed | SessionPhase::Active)
    }
}

/// Tracks the current phase and refuses illegal transitions.
#[derive(Debug, Default)]
pub struct PhaseTracker {
    phase: SessionPhase,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Move to `next`. Returns the previous phase, or `None` if the move is
    /// not allowed (the phase is left unchanged).
    pub fn goto(&mut self, next: SessionPhase) -> Option<SessionPhase> {
        if !self.phase.can_transition_to(next) {
            tracing::debug!(from = %self.phase, to = %next, "Refused phase transition");
            return None;
        }
        let prev = self.phase;
        if prev != next {
            tracing::info!(from = %prev, to = %next, "Phase transition");
        }
        self.phase = next;
        Some(prev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut tracker = PhaseTracker::new();
        assert_eq!(tracker.goto(SessionPhase::Claimed), Some(SessionPhase::Uninitialized));
        assert_eq!(tracker.goto(SessionPhase::Active), Some(SessionPhase::Claimed));
        assert_eq!(tracker.goto(SessionPhase::Active), Some(SessionPhase::Active));
        assert_eq!(tracker.goto(SessionPhase::Closed), Some(SessionPhase::Active));
        assert_eq!(tracker.phase(), SessionPhase::Closed);
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut tracker = PhaseTracker::new();
        tracker.goto(SessionPhase::Closed);
        assert_eq!(tracker.goto(SessionPhase::Active), None);
        assert_eq!(tracker.goto(SessionPhase::Closed), None);
        assert_eq!(tracker.phase(), SessionPhase::Closed);
    }

    #[test]
    fn test_cannot_skip_claim() {
        let mut tracker = PhaseTracker::new();
        assert_eq!(tracker.goto(SessionPhase::Active), None);
        assert!(!tracker.phase().is_open());
    }
}
