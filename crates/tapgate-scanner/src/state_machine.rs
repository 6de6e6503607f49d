//! Access session state machine.
//!
//! # States
//!
//! - `Idle`: between cycles
//! - `AwaitingCard`: polling the reader for a card
//! - `Authenticating`: authenticating the pass sector and reading the pass
//! - `AwaitingVerdict`: check request published, waiting for the verdict
//! - `Actuating`: driving lock and feedback for the verdict
//!
//! # Valid Transitions
//!
//! - Idle → AwaitingCard → Authenticating → AwaitingVerdict → Actuating → Idle
//! - AwaitingCard → Idle (shutdown while polling)
//! - Authenticating → Idle (no pass on the card)
//! - AwaitingVerdict → Idle (request could not be published)
//!
//! ```
//! use tapgate_scanner::{SessionState, SessionStateMachine};
//!
//! let mut machine = SessionStateMachine::new();
//! machine.transition_to(SessionState::AwaitingCard).unwrap();
//! assert!(machine.transition_to(SessionState::Actuating).is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tapgate_core::{Error, Result};
use tracing::trace;

/// Maximum number of transitions kept for diagnostics.
const MAX_HISTORY_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingCard,
    Authenticating,
    AwaitingVerdict,
    Actuating,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::AwaitingCard => "AwaitingCard",
            SessionState::Authenticating => "Authenticating",
            SessionState::AwaitingVerdict => "AwaitingVerdict",
            SessionState::Actuating => "Actuating",
        };
        write!(f, "{name}")
    }
}

impl SessionState {
    /// Check if moving to `target` is allowed from this state.
    ///
    /// ```
    /// use tapgate_scanner::SessionState;
    ///
    /// assert!(SessionState::Idle.can_transition_to(&SessionState::AwaitingCard));
    /// assert!(!SessionState::Idle.can_transition_to(&SessionState::AwaitingVerdict));
    /// ```
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Idle, SessionState::AwaitingCard)
                | (SessionState::AwaitingCard, SessionState::Authenticating | SessionState::Idle)
                | (SessionState::Authenticating, SessionState::AwaitingVerdict | SessionState::Idle)
                | (SessionState::AwaitingVerdict, SessionState::Actuating | SessionState::Idle)
                | (SessionState::Actuating, SessionState::Idle)
        )
    }
}

/// A recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,

    /// Not serialized; set to the deserialization time when read back.
    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: SessionState, to: SessionState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }
}

/// Tracks the controller's position in the access cycle.
///
/// Not thread-safe; owned by the controller.
#[derive(Debug)]
pub struct SessionStateMachine {
    current_state: SessionState,
    state_entered_at: Instant,
    history: VecDeque<StateTransition>,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: SessionState::Idle,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> SessionState {
        self.current_state
    }

    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Up to `count` of the most recent transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        let skip = self.history.len().saturating_sub(count);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Move to `new_state`.
    ///
    /// # Errors
    /// `Error::InvalidStateTransition` if the move is not allowed from the
    /// current state. The state is left unchanged.
    pub fn transition_to(&mut self, new_state: SessionState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        self.perform_state_change(new_state, transition.clone());
        Ok(transition)
    }

    /// Force the machine back to `Idle` from any state.
    pub fn reset(&mut self) -> StateTransition {
        let transition = StateTransition::new(self.current_state, SessionState::Idle);
        self.perform_state_change(SessionState::Idle, transition.clone());
        transition
    }

    fn perform_state_change(&mut self, new_state: SessionState, transition: StateTransition) {
        trace!(from = %transition.from, to = %transition.to, "Session state change");
        self.current_state = new_state;
        self.state_entered_at = Instant::now();
        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition);
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn advance(machine: &mut SessionStateMachine, path: &[SessionState]) {
        for state in path {
            machine.transition_to(*state).unwrap();
        }
    }

    #[test]
    fn test_new_machine_starts_idle() {
        let machine = SessionStateMachine::new();
        assert_eq!(machine.current_state(), SessionState::Idle);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_full_cycle() {
        let mut machine = SessionStateMachine::new();
        advance(
            &mut machine,
            &[
                SessionState::AwaitingCard,
                SessionState::Authenticating,
                SessionState::AwaitingVerdict,
                SessionState::Actuating,
                SessionState::Idle,
            ],
        );
        assert_eq!(machine.current_state(), SessionState::Idle);
        assert_eq!(machine.history().len(), 5);
        let last = machine.last_transitions(1);
        assert_eq!(last[0].from, SessionState::Actuating);
        assert_eq!(last[0].to, SessionState::Idle);
    }

    #[rstest]
    #[case(SessionState::Idle, SessionState::Authenticating)]
    #[case(SessionState::Idle, SessionState::Actuating)]
    #[case(SessionState::AwaitingCard, SessionState::AwaitingVerdict)]
    #[case(SessionState::Authenticating, SessionState::Actuating)]
    #[case(SessionState::Actuating, SessionState::AwaitingCard)]
    fn test_invalid_transitions(#[case] from: SessionState, #[case] to: SessionState) {
        assert!(!from.can_transition_to(&to));
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut machine = SessionStateMachine::new();
        let error = machine.transition_to(SessionState::Actuating).unwrap_err();
        assert_eq!(
            error,
            Error::InvalidStateTransition {
                from: "Idle".to_string(),
                to: "Actuating".to_string(),
            }
        );
        assert_eq!(machine.current_state(), SessionState::Idle);
    }

    #[test]
    fn test_no_pass_returns_to_idle() {
        let mut machine = SessionStateMachine::new();
        advance(
            &mut machine,
            &[SessionState::AwaitingCard, SessionState::Authenticating, SessionState::Idle],
        );
        assert_eq!(machine.current_state(), SessionState::Idle);
    }

    #[test]
    fn test_reset_from_any_state() {
        let mut machine = SessionStateMachine::new();
        advance(&mut machine, &[SessionState::AwaitingCard, SessionState::Authenticating]);
        let transition = machine.reset();
        assert_eq!(transition.from, SessionState::Authenticating);
        assert_eq!(machine.current_state(), SessionState::Idle);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut machine = SessionStateMachine::new();
        for _ in 0..60 {
            advance(&mut machine, &[SessionState::AwaitingCard, SessionState::Idle]);
        }
        assert_eq!(machine.history().len(), MAX_HISTORY_SIZE);
        assert_eq!(machine.last_transitions(3).len(), 3);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&SessionState::AwaitingVerdict).unwrap();
        assert_eq!(json, "\"awaiting_verdict\"");
    }
}
