//! Core conversation orchestration for Parlance.
//!
//! This crate owns the domain logic and the trait seams the outer crates
//! plug into:
//!
//! - [`chat::ChatStore`]: persistence contract for chats, sessions, and
//!   messages (implemented over SQLite in parlance-infra)
//! - [`agent::AgentExecutor`]: the external agent capability that turns a
//!   question into a stream of cumulative response snapshots
//! - [`chat::ChatOrchestrator`]: drives one conversation turn end to end and
//!   emits the [`parlance_types::TurnEvent`] sequence
//! - [`session::SessionResolver`]: maps channel identities (phone numbers)
//!   to user/chat/session ids with inactivity expiry
//! - [`channel::WhatsAppChannel`]: the non-streaming webhook adapter

pub mod agent;
pub mod channel;
pub mod chat;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;
