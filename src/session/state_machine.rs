use crate::session::error::{SessionError, SessionResult};
use crate::session::types::{SessionEvent, SessionState};
use parking_lot::RwLock;
use std::sync::Arc;

/// Lifecycle of one realtime attempt. Clones share the same state, so a
/// handle can watch the session it was taken from.
#[derive(Clone)]
pub struct SessionStateMachine {
    state: Arc<RwLock<SessionState>>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::Idle)),
        }
    }

    /// Get current state
    pub fn current_state(&self) -> SessionState {
        *self.state.read()
    }

    /// Transition state based on event
    pub fn transition(&self, event: SessionEvent) -> SessionResult<SessionState> {
        let mut state = self.state.write();

        let new_state = match (&*state, &event) {
            (SessionState::Idle, SessionEvent::Start) => SessionState::Negotiating,

            // Channel is up and the server accepted the name
            (SessionState::Negotiating, SessionEvent::NameAccepted) => SessionState::Transferring,

            (SessionState::Transferring, SessionEvent::SliceSent { .. }) => {
                SessionState::Transferring
            }

            (SessionState::Transferring, SessionEvent::TransferEnded) => SessionState::Completed,

            (SessionState::Negotiating | SessionState::Transferring, SessionEvent::Fail(reason)) => {
                SessionState::Failed(*reason)
            }

            // Invalid transition
            _ => {
                return Err(SessionError::InvalidStateTransition(format!(
                    "Cannot handle {:?} in state {:?}",
                    event, *state
                )));
            }
        };

        *state = new_state;
        Ok(new_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::FailureReason;

    #[test]
    fn test_state_machine_creation() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.current_state(), SessionState::Idle);
    }

    #[test]
    fn test_happy_path() {
        let sm = SessionStateMachine::new();
        sm.transition(SessionEvent::Start).unwrap();
        assert_eq!(sm.current_state(), SessionState::Negotiating);

        sm.transition(SessionEvent::NameAccepted).unwrap();
        sm.transition(SessionEvent::SliceSent { index: 0 }).unwrap();
        sm.transition(SessionEvent::SliceSent { index: 1 }).unwrap();
        assert!(sm.current_state().is_active());

        sm.transition(SessionEvent::TransferEnded).unwrap();
        assert_eq!(sm.current_state(), SessionState::Completed);
        assert!(sm.current_state().is_terminal());
    }

    #[test]
    fn test_fail_while_negotiating() {
        let sm = SessionStateMachine::new();
        sm.transition(SessionEvent::Start).unwrap();
        sm.transition(SessionEvent::Fail(FailureReason::NoChannel))
            .unwrap();

        assert_eq!(
            sm.current_state(),
            SessionState::Failed(FailureReason::NoChannel)
        );
    }

    #[test]
    fn test_terminal_states_are_final() {
        let sm = SessionStateMachine::new();
        sm.transition(SessionEvent::Start).unwrap();
        sm.transition(SessionEvent::Fail(FailureReason::InvalidSource))
            .unwrap();

        assert!(sm.transition(SessionEvent::Fail(FailureReason::Timeout)).is_err());
        assert!(sm.transition(SessionEvent::Start).is_err());
    }

    #[test]
    fn test_invalid_transition() {
        let sm = SessionStateMachine::new();

        // Cannot send a slice before negotiating
        let result = sm.transition(SessionEvent::SliceSent { index: 0 });
        assert!(result.is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let sm = SessionStateMachine::new();
        let observer = sm.clone();
        sm.transition(SessionEvent::Start).unwrap();
        assert_eq!(observer.current_state(), SessionState::Negotiating);
    }
}
