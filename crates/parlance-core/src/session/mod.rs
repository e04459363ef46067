//! Channel-identity to session resolution for non-streaming channels.

mod cache;
mod resolver;

pub use cache::{CachedSession, InMemorySessionCache, SessionCache};
pub use resolver::{Resolution, SessionResolver};
