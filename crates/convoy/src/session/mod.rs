//! Conversation sessions and the per-message orchestrator.
//!
//! # Architecture
//!
//! ```text
//!  inbound message
//!        │
//!        ▼
//!  ┌──────────────┐  /cmd   ┌────────────────┐
//!  │ Orchestrator │────────▶│ CommandHandler │  (no session, no backend)
//!  └──────┬───────┘         └────────────────┘
//!         │ prompt (freeform or /command-invoke)
//!         ▼
//!  ┌──────────────┐  Create / Continue / Rotate
//!  │ SessionState │──────────────────────────────▶ SessionStore
//!  └──────┬───────┘
//!         │ query(prompt, cwd, resume token)
//!         ▼
//!  ┌──────────────┐  chunks   ┌────────────┐  send   ┌───────────────┐
//!  │ Assistant    │──────────▶│ Reconciler │────────▶│ MessageSender │
//!  └──────────────┘           └────────────┘         └───────────────┘
//! ```
//!
//! - **SessionState** classifies the active session once per message
//!   (no session / unresumed / resumable). `plan_transition` is the only
//!   place that decides between creating, continuing and rotating.
//! - **Reconciler** applies the gateway's streaming mode to the chunk stream.
//! - **Orchestrator** owns the control flow and the top-level error policy.

mod error;
mod orchestrator;
pub mod reconcile;
mod state;

pub use error::OrchestratorError;
pub use orchestrator::{GENERIC_ERROR_MESSAGE, InboundMessage, Orchestrator, OrchestratorDeps};
pub use reconcile::{Reconciler, TOOL_INDICATORS, summarize};
pub use state::{SessionState, Transition, plan_transition};
