//! Login, refresh, logout and claims flows.

mod keys;
mod orchestrator;
mod results;

pub use keys::SessionKeys;
pub use orchestrator::{AuthOrchestrator, OrchestratorConfig};
pub use results::{LoginResult, LogoutResult, RefreshResult};
