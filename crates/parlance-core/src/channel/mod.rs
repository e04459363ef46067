//! Channel adapters that bridge transports onto the orchestrator.

mod whatsapp;

pub use whatsapp::{OutboundSender, WhatsAppChannel};
