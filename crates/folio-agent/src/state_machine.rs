//! Per-turn phase tracking with validated transitions.
//!
//! A turn moves strictly forward:
//! Idle -> Routing -> Executing -> Merging -> Done

use std::fmt;
use std::time::Instant;

use tracing::debug;

use crate::error::AgentError;

/// Phase of a single turn. Nothing here outlives the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnPhase {
    Idle,
    Routing,
    Executing,
    Merging,
    Done,
}

impl TurnPhase {
    pub const ALL: [TurnPhase; 5] = [
        TurnPhase::Idle,
        TurnPhase::Routing,
        TurnPhase::Executing,
        TurnPhase::Merging,
        TurnPhase::Done,
    ];
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Routing => "routing",
            TurnPhase::Executing => "executing",
            TurnPhase::Merging => "merging",
            TurnPhase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Validate that a phase transition is allowed.
///
/// Valid transitions:
/// - Idle -> Routing
/// - Routing -> Executing
/// - Executing -> Merging
/// - Merging -> Done
pub fn validate_transition(from: TurnPhase, to: TurnPhase) -> Result<(), AgentError> {
    let valid = matches!(
        (from, to),
        (TurnPhase::Idle, TurnPhase::Routing)
            | (TurnPhase::Routing, TurnPhase::Executing)
            | (TurnPhase::Executing, TurnPhase::Merging)
            | (TurnPhase::Merging, TurnPhase::Done)
    );

    if valid {
        Ok(())
    } else {
        Err(AgentError::InvalidTransition { from, to })
    }
}

/// Tracks the phase of one in-flight turn.
#[derive(Debug)]
pub struct TurnProgress {
    session_id: String,
    phase: TurnPhase,
    started: Instant,
}

impl TurnProgress {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            phase: TurnPhase::Idle,
            started: Instant::now(),
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Move to the next phase, rejecting anything but a forward step.
    pub fn advance(&mut self, to: TurnPhase) -> Result<(), AgentError> {
        validate_transition(self.phase, to)?;
        debug!(
            session_id = %self.session_id,
            from = %self.phase,
            to = %to,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Turn phase"
        );
        self.phase = to;
        Ok(())
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Valid transitions
    // =====================================================================

    #[test]
    fn test_idle_to_routing() {
        assert!(validate_transition(TurnPhase::Idle, TurnPhase::Routing).is_ok());
    }

    #[test]
    fn test_routing_to_executing() {
        assert!(validate_transition(TurnPhase::Routing, TurnPhase::Executing).is_ok());
    }

    #[test]
    fn test_executing_to_merging() {
        assert!(validate_transition(TurnPhase::Executing, TurnPhase::Merging).is_ok());
    }

    #[test]
    fn test_merging_to_done() {
        assert!(validate_transition(TurnPhase::Merging, TurnPhase::Done).is_ok());
    }

    // =====================================================================
    // Invalid transitions
    // =====================================================================

    #[test]
    fn test_idle_to_done_invalid() {
        assert!(validate_transition(TurnPhase::Idle, TurnPhase::Done).is_err());
    }

    #[test]
    fn test_routing_to_merging_skips_execution() {
        assert!(validate_transition(TurnPhase::Routing, TurnPhase::Merging).is_err());
    }

    #[test]
    fn test_done_is_terminal() {
        for to in TurnPhase::ALL {
            assert!(validate_transition(TurnPhase::Done, to).is_err());
        }
    }

    #[test]
    fn test_no_backward_edges() {
        assert!(validate_transition(TurnPhase::Executing, TurnPhase::Routing).is_err());
        assert!(validate_transition(TurnPhase::Merging, TurnPhase::Executing).is_err());
    }

    #[test]
    fn test_all_valid_transitions_count() {
        let mut valid_count = 0;
        for from in TurnPhase::ALL {
            for to in TurnPhase::ALL {
                if validate_transition(from, to).is_ok() {
                    valid_count += 1;
                }
            }
        }
        assert_eq!(valid_count, 4, "Expected exactly 4 valid transitions");
    }

    // =====================================================================
    // TurnProgress
    // =====================================================================

    #[test]
    fn test_progress_full_pass() {
        let mut progress = TurnProgress::new("s1");
        assert_eq!(progress.phase(), TurnPhase::Idle);
        progress.advance(TurnPhase::Routing).unwrap();
        progress.advance(TurnPhase::Executing).unwrap();
        progress.advance(TurnPhase::Merging).unwrap();
        progress.advance(TurnPhase::Done).unwrap();
        assert_eq!(progress.phase(), TurnPhase::Done);
    }

    #[test]
    fn test_progress_rejects_skip_and_keeps_phase() {
        let mut progress = TurnProgress::new("s1");
        let err = progress.advance(TurnPhase::Merging).unwrap_err();
        assert!(matches!(
            err,
            AgentError::InvalidTransition {
                from: TurnPhase::Idle,
                to: TurnPhase::Merging
            }
        ));
        assert_eq!(progress.phase(), TurnPhase::Idle);
    }
}
