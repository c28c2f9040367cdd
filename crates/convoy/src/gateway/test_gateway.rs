//! In-process gateway for exercising Convoy without a chat platform.
//!
//! Outbound messages are recorded per conversation and can be read back or
//! cleared; inbound messages are injected as if a user had sent them. The
//! HTTP `/test` routes are a thin layer over this type.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use convoy_gateway_protocol::{
    GatewayCommand, GatewayEvent, MessageReceivedData, Sender, StreamingMode,
};

use super::manager::{GatewayManager, SendError};

/// One message Convoy sent to a test conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedMessage {
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Recording gateway registered under [`TestGateway::NAME`].
#[derive(Clone)]
pub struct TestGateway {
    events: mpsc::Sender<GatewayEvent>,
    messages: Arc<DashMap<String, Vec<RecordedMessage>>>,
}

impl TestGateway {
    pub const NAME: &'static str = "test";

    /// Register with the manager and start consuming commands.
    pub async fn start(manager: &GatewayManager, streaming_mode: StreamingMode) -> Self {
        let (commands, events) = manager.register(Self::NAME, streaming_mode).await;
        let messages = Arc::new(DashMap::new());

        tokio::spawn(run_commands(commands, events.clone(), Arc::clone(&messages)));

        let _ = events
            .send(GatewayEvent::Ready {
                gateway: Self::NAME.to_string(),
                version: crate::build_info::VERSION.to_string(),
                streaming_mode,
            })
            .await;

        info!(streaming_mode = %streaming_mode, "Test gateway started");
        Self { events, messages }
    }

    /// Deliver a message to Convoy as if a user sent it.
    ///
    /// Returns the generated message id.
    pub async fn inject(
        &self,
        conversation_id: &str,
        text: &str,
        context: Option<String>,
    ) -> Result<String, SendError> {
        let message_id = ulid::Ulid::new().to_string();
        let data = MessageReceivedData {
            message_id: message_id.clone(),
            conversation_id: conversation_id.to_string(),
            sender: Sender {
                id: "test-user".to_string(),
                username: Some("test".to_string()),
                display_name: None,
            },
            text: text.to_string(),
            context,
            timestamp: Some(Utc::now()),
        };

        self.events
            .send(GatewayEvent::MessageReceived(Box::new(data)))
            .await
            .map_err(|_| SendError::ChannelClosed)?;
        Ok(message_id)
    }

    /// Messages sent to a conversation, oldest first.
    pub fn messages(&self, conversation_id: &str) -> Vec<RecordedMessage> {
        self.messages
            .get(conversation_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Forget the recorded messages of a conversation.
    pub fn clear(&self, conversation_id: &str) {
        self.messages.remove(conversation_id);
    }
}

async fn run_commands(
    mut commands: mpsc::Receiver<GatewayCommand>,
    events: mpsc::Sender<GatewayEvent>,
    messages: Arc<DashMap<String, Vec<RecordedMessage>>>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            GatewayCommand::SendMessage {
                request_id,
                conversation_id,
                content,
            } => {
                debug!(conversation_id = %conversation_id, "Test gateway recorded message");
                messages
                    .entry(conversation_id)
                    .or_default()
                    .push(RecordedMessage {
                        content,
                        sent_at: Utc::now(),
                    });
                let _ = events.send(GatewayEvent::CommandOk { request_id }).await;
            }
            GatewayCommand::SendTyping { .. } => {}
            GatewayCommand::Shutdown => {
                let _ = events
                    .send(GatewayEvent::Shutdown {
                        reason: "shutdown requested".to_string(),
                    })
                    .await;
                break;
            }
        }
    }
}
