//! Per-message orchestration: classify, pick a session, run the assistant,
//! deliver its output.
//!
//! The orchestrator is always called with the conversation's admission slot
//! held, so the read-modify-write sequences on conversation and session
//! records below never interleave for the same conversation.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::assistant::{AssistantRegistry, ChunkStream};
use crate::command::CommandHandler;
use crate::command::parse::{self, INVOKE_COMMAND};
use crate::config::WorkflowConfig;
use crate::gateway::MessageSender;
use crate::model::{Codebase, Conversation, Session};
use crate::store::{CodebaseStore, ConversationStore, SessionStore};

use super::error::OrchestratorError;
use super::reconcile::Reconciler;
use super::state::{SessionState, Transition, plan_transition};

/// Reply for any failure that is not the user's to fix.
pub const GENERIC_ERROR_MESSAGE: &str = "⚠️ An error occurred. Try /reset to start a fresh session.";

const NO_CODEBASE_MESSAGE: &str =
    "No codebase configured. Use /clone <url> to set up a repository first.";

/// A normalized inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Gateway name.
    pub platform: String,
    /// Platform conversation key. Replies are addressed to it.
    pub conversation_key: String,
    pub text: String,
    /// Trailing context from the platform, appended to invoked command prompts.
    pub context: Option<String>,
}

impl InboundMessage {
    pub fn new(
        platform: impl Into<String>,
        conversation_key: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            conversation_key: conversation_key.into(),
            text: text.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Collaborators and policy for the orchestrator.
pub struct OrchestratorDeps {
    pub conversations: Arc<dyn ConversationStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub codebases: Arc<dyn CodebaseStore>,
    pub commands: Arc<dyn CommandHandler>,
    pub assistants: AssistantRegistry,
    /// Assistant type stored on newly created conversations.
    pub default_assistant: String,
    pub workflow: WorkflowConfig,
    /// Upper bound on consuming one assistant stream. `None` waits forever.
    pub stream_timeout: Option<Duration>,
}

/// Drives one inbound message from text to delivered replies.
pub struct Orchestrator {
    conversations: Arc<dyn ConversationStore>,
    sessions: Arc<dyn SessionStore>,
    codebases: Arc<dyn CodebaseStore>,
    commands: Arc<dyn CommandHandler>,
    assistants: AssistantRegistry,
    default_assistant: String,
    workflow: WorkflowConfig,
    stream_timeout: Option<Duration>,
}

/// What the message asks the assistant to do.
struct Prompt {
    text: String,
    /// Name of the invoked command, for `/command-invoke` messages.
    invoked: Option<String>,
    codebase: Codebase,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            conversations: deps.conversations,
            sessions: deps.sessions,
            codebases: deps.codebases,
            commands: deps.commands,
            assistants: deps.assistants,
            default_assistant: deps.default_assistant,
            workflow: deps.workflow,
            stream_timeout: deps.stream_timeout,
        }
    }

    // ========================================================================
    // Entry point
    // ========================================================================

    /// Handle one inbound message. Never fails and never panics outward.
    ///
    /// User errors are sent verbatim; anything else is logged and answered
    /// with [`GENERIC_ERROR_MESSAGE`].
    pub async fn handle_message(&self, sender: &dyn MessageSender, message: &InboundMessage) {
        let outcome = AssertUnwindSafe(self.process(sender, message))
            .catch_unwind()
            .await;

        let reply = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(OrchestratorError::User(text))) => {
                debug!(
                    platform = %message.platform,
                    conversation_key = %message.conversation_key,
                    reply = %text,
                    "Rejected message"
                );
                text
            }
            Ok(Err(e)) => {
                error!(
                    platform = %message.platform,
                    conversation_key = %message.conversation_key,
                    error = ?e,
                    "Failed to handle message"
                );
                GENERIC_ERROR_MESSAGE.to_string()
            }
            Err(panic) => {
                error!(
                    platform = %message.platform,
                    conversation_key = %message.conversation_key,
                    panic = panic_message(&*panic),
                    "Message handling panicked"
                );
                GENERIC_ERROR_MESSAGE.to_string()
            }
        };

        deliver(sender, &message.conversation_key, &reply).await;
    }

    async fn process(
        &self,
        sender: &dyn MessageSender,
        message: &InboundMessage,
    ) -> Result<(), OrchestratorError> {
        let conversation = self
            .conversations
            .get_or_create(
                &message.platform,
                &message.conversation_key,
                &self.default_assistant,
            )
            .await?;

        let text = parse::normalize(&message.text);
        let invoked = parse::parse_command(&text).filter(|c| c.name == INVOKE_COMMAND);
        let prompt = match invoked {
            Some(command) => {
                self.invoke_prompt(&conversation, &command.args, message.context.as_deref())
                    .await?
            }
            None if parse::is_command(&text) => {
                debug!(
                    conversation_id = %conversation.id,
                    command = %text.trim(),
                    "Dispatching built-in command"
                );
                let result = self.commands.handle(&conversation, &text).await?;
                deliver(sender, &message.conversation_key, &result.message).await;
                return Ok(());
            }
            None => Prompt {
                text: message.text.clone(),
                invoked: None,
                codebase: self.require_codebase(&conversation).await?,
            },
        };

        self.run_assistant(sender, message, &conversation, prompt)
            .await
    }

    // ========================================================================
    // Classification
    // ========================================================================

    async fn require_codebase(
        &self,
        conversation: &Conversation,
    ) -> Result<Codebase, OrchestratorError> {
        let Some(id) = &conversation.codebase_id else {
            return Err(OrchestratorError::user(NO_CODEBASE_MESSAGE));
        };
        self.codebases
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::user(NO_CODEBASE_MESSAGE))
    }

    /// Build the prompt for `/command-invoke <name> [args...]`.
    async fn invoke_prompt(
        &self,
        conversation: &Conversation,
        args: &[String],
        context: Option<&str>,
    ) -> Result<Prompt, OrchestratorError> {
        let Some((name, command_args)) = args.split_first() else {
            return Err(OrchestratorError::user(
                "Usage: /command-invoke <name> [args...]",
            ));
        };

        let codebase = self.require_codebase(conversation).await?;
        let Some(def) = codebase.commands.get(name) else {
            return Err(OrchestratorError::user(format!(
                "Command not found: {name}\nUse /commands to list available commands."
            )));
        };

        let path = working_dir(conversation, &codebase).join(&def.path);
        let template = tokio::fs::read_to_string(&path).await.map_err(|e| {
            OrchestratorError::user(format!("Failed to read command file: {e}"))
        })?;

        let mut text = parse::substitute(&template, command_args);
        if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
            text.push_str("\n\n---\n\n");
            text.push_str(context);
        }

        debug!(
            conversation_id = %conversation.id,
            command = %name,
            path = %path.display(),
            "Invoking command"
        );
        Ok(Prompt {
            text,
            invoked: Some(name.clone()),
            codebase,
        })
    }

    // ========================================================================
    // Session and stream
    // ========================================================================

    async fn run_assistant(
        &self,
        sender: &dyn MessageSender,
        message: &InboundMessage,
        conversation: &Conversation,
        prompt: Prompt,
    ) -> Result<(), OrchestratorError> {
        let assistant = self.assistants.get(&conversation.assistant_type)?;

        let state = SessionState::from_active(self.sessions.active(&conversation.id).await?);
        let transition = plan_transition(state, prompt.invoked.as_deref(), &self.workflow);
        let mut session = self
            .apply_transition(transition, conversation, &prompt.codebase)
            .await?;

        let cwd = working_dir(conversation, &prompt.codebase);
        let stream = assistant
            .query(
                &prompt.text,
                &cwd,
                session.assistant_session_id.as_deref(),
            )
            .await?;

        let consume = self.consume(stream, sender, &message.conversation_key, &mut session);
        match self.stream_timeout {
            Some(limit) => tokio::time::timeout(limit, consume)
                .await
                .map_err(|_| OrchestratorError::StreamTimeout(limit))??,
            None => consume.await?,
        }

        if let Some(name) = prompt.invoked {
            session.last_command = Some(name);
            self.sessions.save(&session).await?;
        }
        Ok(())
    }

    async fn apply_transition(
        &self,
        transition: Transition,
        conversation: &Conversation,
        codebase: &Codebase,
    ) -> Result<Session, OrchestratorError> {
        match transition {
            Transition::Continue(session) => {
                debug!(
                    conversation_id = %conversation.id,
                    session_id = %session.id,
                    resumable = session.assistant_session_id.is_some(),
                    "Continuing session"
                );
                Ok(session)
            }
            Transition::Create => self.create_session(conversation, codebase).await,
            Transition::Rotate(mut previous) => {
                previous.deactivate();
                self.sessions.save(&previous).await?;
                info!(
                    conversation_id = %conversation.id,
                    previous_session_id = %previous.id,
                    "Planning finished, rotating to a fresh session"
                );
                self.create_session(conversation, codebase).await
            }
        }
    }

    async fn create_session(
        &self,
        conversation: &Conversation,
        codebase: &Codebase,
    ) -> Result<Session, OrchestratorError> {
        let session = Session::new(
            &conversation.id,
            Some(codebase.id.clone()),
            &conversation.assistant_type,
        );
        self.sessions.save(&session).await?;
        info!(
            conversation_id = %conversation.id,
            session_id = %session.id,
            "Session created"
        );
        Ok(session)
    }

    async fn consume(
        &self,
        mut stream: ChunkStream,
        sender: &dyn MessageSender,
        conversation_key: &str,
        session: &mut Session,
    ) -> Result<(), OrchestratorError> {
        let mut reconciler = Reconciler::new(sender.streaming_mode());

        while let Some(chunk) = stream.next().await {
            let effect = reconciler.accept(chunk?);

            if let Some(text) = effect.send {
                deliver(sender, conversation_key, &text).await;
            }
            if let Some(token) = effect.token
                && session.assistant_session_id.as_deref() != Some(token.as_str())
            {
                session.assistant_session_id = Some(token);
                self.sessions.save(session).await?;
                debug!(session_id = %session.id, "Session resume token updated");
            }
        }

        if let Some(summary) = reconciler.finish() {
            deliver(sender, conversation_key, &summary).await;
        }
        Ok(())
    }
}

/// Conversation cwd, falling back to the codebase's default directory.
fn working_dir(conversation: &Conversation, codebase: &Codebase) -> PathBuf {
    conversation
        .cwd
        .clone()
        .unwrap_or_else(|| codebase.default_cwd.clone())
}

/// Send, logging failures instead of aborting.
async fn deliver(sender: &dyn MessageSender, conversation_key: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Err(e) = sender.send(conversation_key, text).await {
        warn!(
            conversation_key = %conversation_key,
            error = %e,
            "Failed to send message"
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
