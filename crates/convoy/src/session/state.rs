//! Session lifecycle as an explicit state, and the transition rule.

use crate::config::WorkflowConfig;
use crate::model::Session;

/// A conversation's session, as seen at the start of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No active session.
    NoSession,
    /// Active, but the backend has not reported a resume token yet.
    Unresumed(Session),
    /// Active with a resume token.
    Resumable { session: Session, token: String },
}

impl SessionState {
    /// Classify the conversation's active session record.
    pub fn from_active(active: Option<Session>) -> Self {
        match active {
            None => Self::NoSession,
            Some(session) => match session.assistant_session_id.clone() {
                Some(token) => Self::Resumable { session, token },
                None => Self::Unresumed(session),
            },
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::NoSession => None,
            Self::Unresumed(session) | Self::Resumable { session, .. } => Some(session),
        }
    }

    pub fn resume_token(&self) -> Option<&str> {
        match self {
            Self::Resumable { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn last_command(&self) -> Option<&str> {
        self.session().and_then(|s| s.last_command.as_deref())
    }
}

/// What to do with the session before running the assistant.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// No active session: open one.
    Create,
    /// Keep the active session, resuming its token when it has one.
    Continue(Session),
    /// Planning phase is over: deactivate this session and open a fresh one.
    Rotate(Session),
}

/// Decide the session transition for a message.
///
/// `invoked` is the command name when the message is a `/command-invoke`,
/// `None` for freeform prompts.
pub fn plan_transition(
    state: SessionState,
    invoked: Option<&str>,
    workflow: &WorkflowConfig,
) -> Transition {
    let rotate = state.last_command() == Some(workflow.plan_command.as_str())
        && invoked == Some(workflow.execute_command.as_str());

    match state {
        SessionState::NoSession => Transition::Create,
        SessionState::Unresumed(session) | SessionState::Resumable { session, .. } if rotate => {
            Transition::Rotate(session)
        }
        SessionState::Unresumed(session) | SessionState::Resumable { session, .. } => {
            Transition::Continue(session)
        }
    }
}
