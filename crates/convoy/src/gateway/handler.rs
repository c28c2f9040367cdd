//! Gateway message handler: admission, then orchestration.
//!
//! Every inbound message runs inside
//! `AdmissionController::acquire_lock(conversation_id, ...)`, so messages of
//! one conversation are handled one at a time in arrival order while the
//! total number of running conversations stays under the configured ceiling.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use convoy_gateway_protocol::MessageReceivedData;

use super::manager::{GatewayManager, MessageHandler};
use super::sender::GatewaySender;
use crate::admission::AdmissionController;
use crate::session::{InboundMessage, Orchestrator};

// ============================================================================
// Gateway Message Handler
// ============================================================================

/// Routes gateway messages through admission control into the orchestrator.
#[derive(Clone)]
pub struct GatewayMessageHandler {
    orchestrator: Arc<Orchestrator>,
    admission: AdmissionController,
    gateways: GatewayManager,
}

impl GatewayMessageHandler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        admission: AdmissionController,
        gateways: GatewayManager,
    ) -> Self {
        Self {
            orchestrator,
            admission,
            gateways,
        }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }
}

impl MessageHandler for GatewayMessageHandler {
    fn dispatch(&self, gateway: &str, data: MessageReceivedData) -> BoxFuture<'static, ()> {
        if data.text.trim().is_empty() {
            debug!(
                gateway = %gateway,
                message_id = %data.message_id,
                "Ignoring empty message"
            );
            return Box::pin(async {});
        }

        // The queue position is taken here, before the work is spawned.
        let ticket = match self.admission.enqueue(&data.conversation_id) {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(
                    gateway = %gateway,
                    message_id = %data.message_id,
                    error = %e,
                    "Dropping message"
                );
                return Box::pin(async {});
            }
        };

        let depth = self.admission.queue_depth(&data.conversation_id);
        if depth > 1 {
            debug!(
                gateway = %gateway,
                conversation_id = %data.conversation_id,
                queue_depth = depth,
                "Conversation busy, message queued"
            );
        }

        let mut message = InboundMessage::new(gateway, &data.conversation_id, &data.text);
        message.context = data.context.clone();

        let this = self.clone();
        let gateway = gateway.to_string();
        Box::pin(async move {
            let result = ticket
                .run(|| async {
                    let streaming_mode = this
                        .gateways
                        .streaming_mode(&gateway)
                        .await
                        .unwrap_or_default();
                    let sender =
                        GatewaySender::new(this.gateways.clone(), &gateway, streaming_mode);

                    if let Err(e) = this
                        .gateways
                        .send_typing(&gateway, &message.conversation_key)
                        .await
                    {
                        debug!(gateway = %gateway, error = %e, "Failed to send typing indicator");
                    }
                    this.orchestrator.handle_message(&sender, &message).await;
                })
                .await;

            if let Err(e) = result {
                warn!(
                    gateway = %gateway,
                    message_id = %data.message_id,
                    error = %e,
                    "Dropping message"
                );
            }
        })
    }
}
