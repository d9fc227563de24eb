//! Action seam
//!
//! The host application's effects live behind [`ActionController`]: a
//! dispatch-by-name entry point that performs one action and returns its
//! text/markdown result. The [`ActionRegistry`] is an explicit static map of
//! presentation metadata, built at startup and consulted by name; it plays
//! no part in control flow.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AgentConfig;

/// Planner-facing description of one available action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Human-readable labels for one action, keyed by name in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionMeta {
    pub label_running: String,
    pub label_done: String,
}

/// Static `name -> metadata` lookup for the event/presentation layer.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    entries: HashMap<String, ActionMeta>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, meta: ActionMeta) {
        self.entries.insert(name.into(), meta);
    }

    pub fn get(&self, name: &str) -> Option<&ActionMeta> {
        self.entries.get(name)
    }

    /// Running label for an action, falling back to the bare name.
    pub fn label_running(&self, name: &str) -> String {
        self.entries
            .get(name)
            .map(|m| m.label_running.clone())
            .unwrap_or_else(|| name.to_string())
    }

    /// Done label for an action, falling back to the bare name.
    pub fn label_done(&self, name: &str) -> String {
        self.entries
            .get(name)
            .map(|m| m.label_done.clone())
            .unwrap_or_else(|| name.to_string())
    }
}

/// Performs one named action against the host application.
#[async_trait]
pub trait ActionController: Send + Sync {
    /// Dispatch `name` with parsed arguments; the returned string is the
    /// action's result content. Errors abort the rest of the plan.
    async fn dispatch(&self, name: &str, args: Value) -> Result<String>;
}

/// Normalize an action's argument payload into a JSON object.
///
/// Planners emit arguments either as a structured object or as a
/// string-encoded one. A string that fails to parse is only an error for
/// ordinary actions; for the configured free-text action the raw string
/// becomes the value of a single named field instead.
pub fn parse_action_args(name: &str, raw: &Value, config: &AgentConfig) -> Result<Value> {
    match raw {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed) if parsed.is_object() => Ok(parsed),
            _ if name == config.free_text_action => {
                let mut map = serde_json::Map::new();
                map.insert(config.free_text_field.clone(), Value::String(s.clone()));
                Ok(Value::Object(map))
            }
            Ok(parsed) => anyhow::bail!(
                "arguments for '{}' parsed to {} instead of an object",
                name,
                parsed
            ),
            Err(e) => anyhow::bail!("failed to parse arguments for '{}': {}", name, e),
        },
        Value::Object(_) => Ok(raw.clone()),
        Value::Null => Ok(serde_json::json!({})),
        other => anyhow::bail!("unsupported argument payload for '{}': {}", name, other),
    }
}
