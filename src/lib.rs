// Library exports for query-pilot
// This allows the modules to be imported in tests and external code

pub mod actions;
pub mod agent;
pub mod config;
pub mod error;
pub mod gates;
pub mod history;
pub mod host;
pub mod persistence;
pub mod planner;
pub mod store;
pub mod utils;

pub use actions::{ActionController, ActionDefinition, ActionMeta, ActionRegistry};
pub use agent::{AgentEvent, AgentLoop, NoopTelemetry, NotifyLevel, TelemetrySink};
pub use config::{AgentConfig, ModelSettings};
pub use error::AgentError;
pub use gates::{ClarificationGate, ConfirmationGate};
pub use history::{normalize_sql, HistoryMatcher};
pub use host::HostStateProvider;
pub use planner::{PlanRequest, PlanResponse, Planner};
pub use store::{ConversationStore, SharedStore};
