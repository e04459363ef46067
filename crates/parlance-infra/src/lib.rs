//! Infrastructure implementations for Parlance.
//!
//! Concrete backends for the trait seams in parlance-core:
//!
//! - [`sqlite`]: single-table SQLite storage behind `ChatStore`
//! - [`agent`]: HTTP client for the external agent capability
//! - [`whatsapp`]: WhatsApp Cloud API outbound client
//! - [`config`]: data-directory resolution and settings loading

pub mod agent;
pub mod config;
pub mod sqlite;
pub mod whatsapp;
