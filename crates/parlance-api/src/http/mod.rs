//! HTTP layer for Parlance.
//!
//! Axum-based surface with three faces: a realtime WebSocket at `/ws/chat`,
//! the WhatsApp webhook at `/webhook/whatsapp`, and management REST under
//! `/api/`.

pub mod error;
pub mod handlers;
pub mod router;
