//! Outbound message delivery as seen by the orchestrator.

use async_trait::async_trait;

use convoy_gateway_protocol::StreamingMode;

use super::manager::{GatewayManager, SendError};

/// Delivers text to a conversation.
///
/// Calls are awaited one at a time, so delivery order is call order.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, conversation_id: &str, text: &str) -> Result<(), SendError>;

    /// How the recipient wants assistant output delivered.
    fn streaming_mode(&self) -> StreamingMode;
}

/// `MessageSender` bound to one registered gateway.
#[derive(Clone)]
pub struct GatewaySender {
    manager: GatewayManager,
    gateway: String,
    streaming_mode: StreamingMode,
}

impl GatewaySender {
    pub fn new(
        manager: GatewayManager,
        gateway: impl Into<String>,
        streaming_mode: StreamingMode,
    ) -> Self {
        Self {
            manager,
            gateway: gateway.into(),
            streaming_mode,
        }
    }
}

#[async_trait]
impl MessageSender for GatewaySender {
    async fn send(&self, conversation_id: &str, text: &str) -> Result<(), SendError> {
        self.manager
            .send_message(&self.gateway, conversation_id, text)
            .await
    }

    fn streaming_mode(&self) -> StreamingMode {
        self.streaming_mode
    }
}
