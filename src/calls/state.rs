//! Call state machine implementation.

use chrono::{DateTime, Utc};
use gccore::ParticipantId;
use serde::Serialize;

use super::error::ErrorClass;

/// Why a call session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EndReason {
    /// The local user left.
    UserLeft,
    /// The SFU no longer knows the call.
    CallEnded,
    /// The join sequence failed before the call was joined.
    JoinFailed { class: String, message: String },
    /// A fatal error ended a joined call.
    Failed { class: String, message: String },
}

impl EndReason {
    pub fn join_failed(class: ErrorClass, message: impl Into<String>) -> Self {
        Self::JoinFailed {
            class: format!("{class:?}"),
            message: message.into(),
        }
    }

    pub fn failed(class: ErrorClass, message: impl Into<String>) -> Self {
        Self::Failed {
            class: format!("{class:?}"),
            message: message.into(),
        }
    }
}

/// Current state of the local participation in a call.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub enum CallState {
    #[default]
    NotJoined,
    /// Fetching credentials and building the peer connection.
    Connecting { started_at: DateTime<Utc> },
    /// The SFU accepted the join; negotiating media and waiting for its hello.
    Joining {
        started_at: DateTime<Utc>,
        participant_id: ParticipantId,
    },
    Joined {
        joined_at: DateTime<Utc>,
        participant_id: ParticipantId,
    },
    Ending { reason: EndReason },
}

impl CallState {
    pub fn is_joined(&self) -> bool {
        matches!(self, Self::Joined { .. })
    }

    pub fn is_ending(&self) -> bool {
        matches!(self, Self::Ending { .. })
    }

    pub fn participant_id(&self) -> Option<ParticipantId> {
        match self {
            Self::Joining { participant_id, .. } | Self::Joined { participant_id, .. } => {
                Some(*participant_id)
            }
            _ => None,
        }
    }
}

/// State transitions for calls.
#[derive(Debug, Clone)]
pub enum CallTransition {
    Connect,
    JoinAccepted { participant_id: ParticipantId },
    Established,
    /// Abandons a join that has not completed.
    Abort,
    Leave { reason: EndReason },
    TornDown,
}

/// Tracks [`CallState`] and rejects transitions that skip a phase.
#[derive(Debug, Default)]
pub struct CallStateMachine {
    state: CallState,
}

impl CallStateMachine {
    pub fn state(&self) -> &CallState {
        &self.state
    }

    /// Apply a state transition. Returns error if transition is invalid.
    pub fn apply_transition(
        &mut self,
        transition: CallTransition,
    ) -> Result<&CallState, InvalidTransition> {
        let new_state = match (&self.state, transition) {
            (CallState::NotJoined, CallTransition::Connect) => CallState::Connecting {
                started_at: Utc::now(),
            },
            (
                CallState::Connecting { started_at },
                CallTransition::JoinAccepted { participant_id },
            ) => CallState::Joining {
                started_at: *started_at,
                participant_id,
            },
            (CallState::Joining { participant_id, .. }, CallTransition::Established) => {
                CallState::Joined {
                    joined_at: Utc::now(),
                    participant_id: *participant_id,
                }
            }
            (CallState::Connecting { .. } | CallState::Joining { .. }, CallTransition::Abort) => {
                CallState::NotJoined
            }
            (
                CallState::Connecting { .. } | CallState::Joining { .. } | CallState::Joined { .. },
                CallTransition::Leave { reason },
            ) => CallState::Ending { reason },
            (CallState::Ending { .. }, CallTransition::TornDown) => CallState::NotJoined,
            (current, transition) => {
                return Err(InvalidTransition {
                    current_state: format!("{:?}", current),
                    attempted: format!("{:?}", transition),
                });
            }
        };
        self.state = new_state;
        Ok(&self.state)
    }
}

#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub current_state: String,
    pub attempted: String,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} in state {}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test the full lifecycle.
    /// Flow: NotJoined → Connecting → Joining → Joined → Ending → NotJoined
    #[test]
    fn test_join_and_leave_flow() {
        let mut machine = CallStateMachine::default();
        assert_eq!(machine.state(), &CallState::NotJoined);

        machine.apply_transition(CallTransition::Connect).unwrap();
        assert!(matches!(machine.state(), CallState::Connecting { .. }));

        machine
            .apply_transition(CallTransition::JoinAccepted {
                participant_id: ParticipantId(4),
            })
            .unwrap();
        assert_eq!(machine.state().participant_id(), Some(ParticipantId(4)));

        machine.apply_transition(CallTransition::Established).unwrap();
        assert!(machine.state().is_joined());

        machine
            .apply_transition(CallTransition::Leave {
                reason: EndReason::UserLeft,
            })
            .unwrap();
        assert!(machine.state().is_ending());

        machine.apply_transition(CallTransition::TornDown).unwrap();
        assert_eq!(machine.state(), &CallState::NotJoined);
    }

    /// Test that a join can be abandoned before it completes.
    #[test]
    fn test_abort_while_connecting() {
        let mut machine = CallStateMachine::default();
        machine.apply_transition(CallTransition::Connect).unwrap();
        machine.apply_transition(CallTransition::Abort).unwrap();
        assert_eq!(machine.state(), &CallState::NotJoined);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut machine = CallStateMachine::default();
        let err = machine
            .apply_transition(CallTransition::Established)
            .unwrap_err();
        assert!(err.to_string().contains("Established"));

        machine.apply_transition(CallTransition::Connect).unwrap();
        machine
            .apply_transition(CallTransition::JoinAccepted {
                participant_id: ParticipantId(1),
            })
            .unwrap();
        machine.apply_transition(CallTransition::Established).unwrap();
        assert!(machine.apply_transition(CallTransition::Abort).is_err());
        assert!(machine.state().is_joined());
    }
}
