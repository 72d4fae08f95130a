use serde::{Deserialize, Serialize};
use std::fmt;

/// The single authoritative phase tag for one interview session.
///
/// Exactly one variant is active at any instant; every index an async
/// completion might touch is carried inside the variant, so illegal
/// combinations ("recording while still asking") are unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Countdown { remaining: u32 },
    Asking { index: usize },
    Recording { index: usize, elapsed_secs: u32 },
    Processing { index: usize },
    Finished,
}

impl SessionState {
    /// The question index this state refers to, if any.
    pub fn question_index(&self) -> Option<usize> {
        match self {
            SessionState::Asking { index }
            | SessionState::Recording { index, .. }
            | SessionState::Processing { index } => Some(*index),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    /// Whether a transition from `self` to `next` is one the controller
    /// is ever allowed to make. Checked with `debug_assert!` on every
    /// state change.
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            // restart()/dispose() may bail out of anything.
            (_, Idle) => true,
            (Idle, Countdown { .. }) => true,
            (Countdown { remaining: a }, Countdown { remaining: b }) => *b < *a,
            (Countdown { .. }, Asking { index: 0 }) => true,
            (Asking { index: a }, Recording { index: b, elapsed_secs: 0 }) => a == b,
            (Recording { index: a, elapsed_secs: t }, Recording { index: b, elapsed_secs: u }) => {
                a == b && *u == *t + 1
            }
            (Recording { index: a, .. }, Processing { index: b }) => a == b,
            (Processing { index: a }, Asking { index: b }) => *b == *a + 1,
            (Processing { .. }, Finished) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Countdown { remaining } => write!(f, "Countdown({})", remaining),
            SessionState::Asking { index } => write!(f, "Asking({})", index),
            SessionState::Recording { index, elapsed_secs } => {
                write!(f, "Recording({}, {}s)", index, elapsed_secs)
            }
            SessionState::Processing { index } => write!(f, "Processing({})", index),
            SessionState::Finished => write!(f, "Finished"),
        }
    }
}
