//! Gateway system for platform integrations.
//!
//! A gateway connects Convoy to one chat platform. Gateways talk to the core
//! through the Gateway Protocol over channels, so in-process gateways (like
//! [`TestGateway`]) and out-of-process ones look the same to the manager.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Convoy Core                         │
//! │                                                              │
//! │  ┌──────────────────┐  MessageReceived  ┌─────────────────┐  │
//! │  │  GatewayManager  │──────────────────▶│ GatewayMessage- │  │
//! │  │ (name → handle)  │                   │ Handler         │  │
//! │  └────────▲─────────┘                   └────────┬────────┘  │
//! │           │ SendMessage / SendTyping             │ admission │
//! │           │                                      ▼           │
//! │  ┌────────┴─────────┐      send()       ┌─────────────────┐  │
//! │  │  GatewaySender   │◀──────────────────│  Orchestrator   │  │
//! │  └──────────────────┘                   └─────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol
//!
//! - [`GatewayCommand`]: Convoy → gateway (send message, typing, shutdown)
//! - [`GatewayEvent`]: gateway → Convoy (ready, message received, acks, errors)

pub mod handler;
pub mod manager;
pub mod sender;
pub mod test_gateway;

pub use convoy_gateway_protocol::{
    GatewayCommand, GatewayEvent, MessageReceivedData, Sender, StreamingMode,
};

pub use handler::GatewayMessageHandler;
pub use manager::{GatewayManager, MessageHandler, SendError};
pub use sender::{GatewaySender, MessageSender};
pub use test_gateway::{RecordedMessage, TestGateway};
