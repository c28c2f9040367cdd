//! Convoy routes chat conversations to an AI coding assistant.
//!
//! Each conversation is processed one message at a time, and the number of
//! conversations running at once is bounded (see [`admission`]). Messages
//! are classified, matched to an assistant session and streamed back by the
//! [`session`] orchestrator.

pub mod admission;
pub mod assistant;
pub mod build_info;
pub mod command;
pub mod config;
pub mod gateway;
pub mod handlers;
pub mod model;
pub mod server;
pub mod session;
pub mod store;
pub mod sync;
