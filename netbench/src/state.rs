//! Receiver finite-state machine types.
//!
//! A receiver run has exactly two states:
//!
//! ```text
//!               decode ok / malformed datagram
//!                 ┌──────────┐
//!                 ▼          │
//!  ──────▶  LISTENING ───────┘
//!                 │
//!                 │  STOP | end-of-stream | idle timeout | fatal error
//!                 ▼
//!            FINISHED(reason)  ──▶ report (once)
//! ```
//!
//! Transitions are driven by [`crate::receiver::Receiver`]; this module only
//! names the states and the reasons a run can end.

use std::fmt;

use crate::record::RecordError;

/// Why a receiver run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The `STOP` marker arrived.
    Terminated,
    /// The peer closed the stream.
    Closed,
    /// No datagram arrived within the idle timeout.  This is the normal end
    /// of a datagram run whose `STOP` was lost.
    IdleTimeout,
    /// A stream record failed to decode; the rest of the stream is
    /// untrustworthy.
    Malformed(RecordError),
    /// The transport reported an error it cannot recover from.
    TransportError(String),
}

impl StopReason {
    /// `true` for the endings that are not failures.
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            StopReason::Terminated | StopReason::Closed | StopReason::IdleTimeout
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Terminated => write!(f, "termination marker received"),
            StopReason::Closed => write!(f, "peer closed the connection"),
            StopReason::IdleTimeout => write!(f, "idle timeout"),
            StopReason::Malformed(e) => write!(f, "{e}"),
            StopReason::TransportError(e) => write!(f, "transport error: {e}"),
        }
    }
}

/// Current state of a receiver run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// Waiting for the next unit.
    #[default]
    Listening,
    /// No further input will be read.
    Finished(StopReason),
}

impl ReceiverState {
    pub fn is_finished(&self) -> bool {
        matches!(self, ReceiverState::Finished(_))
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverState::Listening => write!(f, "LISTENING"),
            ReceiverState::Finished(reason) => write!(f, "FINISHED ({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_listening() {
        assert_eq!(ReceiverState::default(), ReceiverState::Listening);
        assert!(!ReceiverState::default().is_finished());
    }

    #[test]
    fn clean_endings() {
        assert!(StopReason::Terminated.is_clean());
        assert!(StopReason::Closed.is_clean());
        assert!(StopReason::IdleTimeout.is_clean());
        assert!(!StopReason::TransportError("reset".into()).is_clean());
        assert!(!StopReason::Malformed(RecordError::FieldCount(1)).is_clean());
    }

    #[test]
    fn display_names_the_reason() {
        let s = ReceiverState::Finished(StopReason::IdleTimeout).to_string();
        assert_eq!(s, "FINISHED (idle timeout)");
    }
}
