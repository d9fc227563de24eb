//! Planner seam
//!
//! The LLM call is a black box behind the [`Planner`] trait: it receives the
//! rendered conversation plus the current host-application state and returns
//! one round's worth of tool-call proposals. Implementations must observe
//! the cancellation token and fail with [`AgentError::Cancelled`] when it is
//! already cancelled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::actions::ActionDefinition;
use crate::config::ModelSettings;
use crate::error::AgentError;
use crate::store::{Message, Task, ToolCall};

/// Everything a planner needs for one planning round.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// Full message history of the active thread
    pub messages: Vec<Message>,
    /// Opaque, JSON-serializable snapshot of the host application
    pub host_state: serde_json::Value,
    /// Actions the planner may propose
    pub available_actions: Vec<ActionDefinition>,
    pub model: ModelSettings,
}

/// One round's planning output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    pub tool_calls: Vec<ToolCall>,
    /// Prose accompanying the tool calls
    pub content: String,
    #[serde(default)]
    pub finish_reason: Option<String>,
    /// Optional reported task tree for display
    #[serde(default)]
    pub tasks: Option<Vec<Task>>,
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        request: PlanRequest,
        cancel: &CancellationToken,
    ) -> Result<PlanResponse, AgentError>;
}
