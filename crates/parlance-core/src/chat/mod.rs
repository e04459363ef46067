//! Chat domain: persistence contract and turn orchestration.

mod orchestrator;
mod store;

pub use orchestrator::{ChatOrchestrator, Turn, TurnRequest};
pub use store::ChatStore;
