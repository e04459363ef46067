//! HTTP request handlers.

pub mod chat;
pub mod webhook;
pub mod ws;
