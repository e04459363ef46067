//! Shared domain types for Parlance.
//!
//! This crate contains the core domain types used across the Parlance
//! conversation engine: Chat, Session, Message, the turn event protocol,
//! single-table key construction, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod key;
pub mod whatsapp;

pub use chat::{Chat, Message, MessageRole, Page, Session, preview_from, title_from_question};
pub use config::{Settings, WhatsAppSettings};
pub use error::{AgentError, OutboundError, RepositoryError, TurnError};
pub use event::TurnEvent;
pub use whatsapp::{InboundMessage, WebhookPayload};
