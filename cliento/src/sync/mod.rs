pub mod agent;
pub mod state;
pub mod types;
pub mod ws_client;

pub use agent::{AgentEvent, ButtonOutcome, SyncAgent};
