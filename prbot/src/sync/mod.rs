pub mod orchestrator;
pub mod state;

pub use orchestrator::{SyncOrchestrator, SyncOutcome};
pub use state::{SyncState, SyncStateBuilder};
