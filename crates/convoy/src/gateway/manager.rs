//! Gateway Manager: registration, event routing and outbound commands.
//!
//! The Gateway Manager provides a unified interface for:
//! - Registering gateways and handing them their command/event channels
//! - Routing received messages to the [`MessageHandler`]
//! - Sending messages and typing indicators back through a gateway
//! - Shutting gateways down

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};

use convoy_gateway_protocol::{GatewayCommand, GatewayEvent, MessageReceivedData, StreamingMode};

/// Capacity of each gateway's command and event channels.
const CHANNEL_CAPACITY: usize = 100;

/// Seconds a typing indicator stays visible.
const TYPING_DURATION_SECS: u32 = 5;

// ============================================================================
// Gateway Manager
// ============================================================================

/// Manager for all registered gateways.
#[derive(Clone)]
pub struct GatewayManager {
    inner: Arc<RwLock<GatewayManagerInner>>,
}

struct GatewayManagerInner {
    /// Registered gateways by name.
    gateways: HashMap<String, GatewayHandle>,

    /// Message handler for incoming messages.
    handler: Option<Arc<dyn MessageHandler>>,

    /// JoinHandles for event handler tasks, awaited at shutdown.
    event_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl GatewayManager {
    /// Create a manager with no gateways and no handler.
    ///
    /// Messages from different conversations are handled concurrently; the
    /// message handler is responsible for per-conversation ordering.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(GatewayManagerInner {
                gateways: HashMap::new(),
                handler: None,
                event_handles: Vec::new(),
            })),
        }
    }

    /// Set the message handler for incoming gateway messages.
    pub async fn set_handler(&self, handler: Arc<dyn MessageHandler>) {
        let mut inner = self.inner.write().await;
        inner.handler = Some(handler);
    }

    /// Register a gateway and get channels for communication.
    ///
    /// Returns:
    /// - `Receiver<GatewayCommand>`: Gateway receives commands from Convoy
    /// - `Sender<GatewayEvent>`: Gateway sends events to Convoy
    pub async fn register(
        &self,
        name: impl Into<String>,
        streaming_mode: StreamingMode,
    ) -> (mpsc::Receiver<GatewayCommand>, mpsc::Sender<GatewayEvent>) {
        let name = name.into();
        let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (evt_tx, evt_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let handle = GatewayHandle {
            command_tx: cmd_tx,
            streaming_mode,
        };

        let manager = self.clone();
        let gateway_name = name.clone();
        let join_handle = tokio::spawn(async move {
            manager.handle_events(gateway_name, evt_rx).await;
        });

        {
            let mut inner = self.inner.write().await;
            inner.gateways.insert(name.clone(), handle);
            inner.event_handles.push(join_handle);
        }

        info!(gateway = %name, streaming_mode = %streaming_mode, "Gateway registered");
        (cmd_rx, evt_tx)
    }

    /// Unregister a gateway.
    pub async fn unregister(&self, name: &str) {
        let mut inner = self.inner.write().await;
        if inner.gateways.remove(name).is_some() {
            info!(gateway = %name, "Gateway unregistered");
        }
    }

    /// List all registered gateways.
    pub async fn list(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut names: Vec<_> = inner.gateways.keys().cloned().collect();
        names.sort();
        names
    }

    /// Declared streaming mode of a gateway.
    pub async fn streaming_mode(&self, name: &str) -> Option<StreamingMode> {
        let inner = self.inner.read().await;
        inner.gateways.get(name).map(|h| h.streaming_mode)
    }

    async fn command_tx(&self, gateway: &str) -> Result<mpsc::Sender<GatewayCommand>, SendError> {
        let inner = self.inner.read().await;
        inner
            .gateways
            .get(gateway)
            .map(|h| h.command_tx.clone())
            .ok_or_else(|| SendError::UnknownGateway(gateway.to_string()))
    }

    /// Send a message through a gateway.
    pub async fn send_message(
        &self,
        gateway: &str,
        conversation_id: &str,
        content: &str,
    ) -> Result<(), SendError> {
        let tx = self.command_tx(gateway).await?;

        let command = GatewayCommand::SendMessage {
            request_id: ulid::Ulid::new().to_string(),
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
        };

        tx.send(command).await.map_err(|_| SendError::ChannelClosed)
    }

    /// Send typing indicator through a gateway.
    pub async fn send_typing(&self, gateway: &str, conversation_id: &str) -> Result<(), SendError> {
        let tx = self.command_tx(gateway).await?;

        let command = GatewayCommand::SendTyping {
            conversation_id: conversation_id.to_string(),
            duration: TYPING_DURATION_SECS,
        };

        tx.send(command).await.map_err(|_| SendError::ChannelClosed)
    }

    /// Shutdown all gateways gracefully.
    ///
    /// Waits for every event loop to finish, including in-flight messages.
    pub async fn shutdown(&self) {
        let gateways = {
            let inner = self.inner.read().await;
            inner
                .gateways
                .iter()
                .map(|(k, v)| (k.clone(), v.command_tx.clone()))
                .collect::<Vec<_>>()
        };

        for (name, tx) in gateways {
            debug!(gateway = %name, "Sending shutdown to gateway");
            let _ = tx.send(GatewayCommand::Shutdown).await;
        }

        let handles = {
            let mut inner = self.inner.write().await;
            std::mem::take(&mut inner.event_handles)
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Handle events from a gateway.
    async fn handle_events(&self, gateway: String, mut rx: mpsc::Receiver<GatewayEvent>) {
        let mut inflight = tokio::task::JoinSet::new();

        while let Some(event) = rx.recv().await {
            // Reap completed handler tasks
            while inflight.try_join_next().is_some() {}

            match event {
                GatewayEvent::Ready {
                    gateway: reported_name,
                    version,
                    streaming_mode,
                } => {
                    info!(
                        gateway = %gateway,
                        reported_name = %reported_name,
                        version = %version,
                        streaming_mode = %streaming_mode,
                        "Gateway ready"
                    );
                    let mut inner = self.inner.write().await;
                    if let Some(handle) = inner.gateways.get_mut(&gateway) {
                        handle.streaming_mode = streaming_mode;
                    }
                }

                GatewayEvent::MessageReceived(data) => {
                    debug!(
                        gateway = %gateway,
                        message_id = %data.message_id,
                        conversation_id = %data.conversation_id,
                        sender_id = %data.sender.id,
                        "Message received from gateway"
                    );

                    let handler = {
                        let inner = self.inner.read().await;
                        inner.handler.clone()
                    };

                    match handler {
                        // `dispatch` runs here, in arrival order; only the
                        // returned work is spawned.
                        Some(handler) => {
                            inflight.spawn(handler.dispatch(&gateway, *data));
                        }
                        None => warn!(gateway = %gateway, "No message handler registered"),
                    }
                }

                GatewayEvent::CommandOk { request_id } => {
                    debug!(gateway = %gateway, request_id = %request_id, "Command completed");
                }

                GatewayEvent::CommandError {
                    request_id,
                    code,
                    message,
                } => {
                    error!(
                        gateway = %gateway,
                        request_id = %request_id,
                        code = %code,
                        message = %message,
                        "Command failed"
                    );
                }

                GatewayEvent::Error {
                    code,
                    message,
                    fatal,
                } => {
                    if fatal {
                        error!(
                            gateway = %gateway,
                            code = %code,
                            message = %message,
                            "Fatal gateway error"
                        );
                        self.unregister(&gateway).await;
                    } else {
                        warn!(
                            gateway = %gateway,
                            code = %code,
                            message = %message,
                            "Gateway error"
                        );
                    }
                }

                GatewayEvent::Shutdown { reason } => {
                    info!(gateway = %gateway, reason = %reason, "Gateway shutdown");
                    self.unregister(&gateway).await;
                    break;
                }
            }
        }

        // Wait for in-flight handlers to complete
        while inflight.join_next().await.is_some() {}

        debug!(gateway = %gateway, "Gateway event handler stopped");
    }
}

impl Default for GatewayManager {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Message Handler
// ============================================================================

/// Handler for incoming gateway messages.
///
/// `dispatch` is called synchronously on the gateway's event loop, once per
/// message and in arrival order. Anything that must follow arrival order (a
/// queue position) has to be claimed before it returns. The returned future
/// runs on its own task. Replies are sent through the manager, not returned.
pub trait MessageHandler: Send + Sync {
    fn dispatch(&self, gateway: &str, data: MessageReceivedData) -> BoxFuture<'static, ()>;
}

// ============================================================================
// Gateway Handle
// ============================================================================

/// Manager-side handle for one registered gateway.
struct GatewayHandle {
    /// Channel to send commands to the gateway.
    command_tx: mpsc::Sender<GatewayCommand>,

    /// Delivery policy the gateway asked for.
    streaming_mode: StreamingMode,
}

/// Error sending a command to a gateway.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("gateway channel closed")]
    ChannelClosed,

    #[error("gateway not registered: {0}")]
    UnknownGateway(String),
}
