use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Model parameters forwarded verbatim to the planner each round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.0
}

fn default_max_tokens() -> usize {
    4096
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Tunables for the agent loop, the gates, and the history matcher.
///
/// The terminal/query action name lists are part of the planner contract,
/// not a structural invariant, so they live in configuration rather than
/// in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard ceiling on planning rounds per user turn
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Action names whose occurrence as the last message stops the
    /// continuation loop
    #[serde(default = "default_terminal_actions")]
    pub terminal_actions: Vec<String>,

    /// Action names whose query argument is fingerprinted by the history
    /// matcher
    #[serde(default = "default_query_actions")]
    pub query_actions: Vec<String>,

    /// Bounded ring size for retained threads
    #[serde(default = "default_thread_capacity")]
    pub thread_capacity: usize,

    /// Poll interval for the confirmation/clarification gates, in ms
    #[serde(default = "default_gate_poll_ms")]
    pub gate_poll_ms: u64,

    /// Action whose arguments fall back to a single free-text field when
    /// they do not parse as JSON
    #[serde(default = "default_free_text_action")]
    pub free_text_action: String,

    /// Field name used by the free-text fallback
    #[serde(default = "default_free_text_field")]
    pub free_text_field: String,

    #[serde(default)]
    pub model: ModelSettings,
}

fn default_max_rounds() -> usize {
    8
}

fn default_terminal_actions() -> Vec<String> {
    vec!["finish_task".to_string(), "reply".to_string()]
}

fn default_query_actions() -> Vec<String> {
    vec!["run_query".to_string()]
}

fn default_thread_capacity() -> usize {
    20
}

fn default_gate_poll_ms() -> u64 {
    100
}

fn default_free_text_action() -> String {
    "reply".to_string()
}

fn default_free_text_field() -> String {
    "text".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            terminal_actions: default_terminal_actions(),
            query_actions: default_query_actions(),
            thread_capacity: default_thread_capacity(),
            gate_poll_ms: default_gate_poll_ms(),
            free_text_action: default_free_text_action(),
            free_text_field: default_free_text_field(),
            model: ModelSettings::default(),
        }
    }
}

impl AgentConfig {
    pub fn gate_poll_interval(&self) -> Duration {
        Duration::from_millis(self.gate_poll_ms)
    }

    pub fn is_terminal_action(&self, name: &str) -> bool {
        self.terminal_actions.iter().any(|a| a == name)
    }

    pub fn is_query_action(&self, name: &str) -> bool {
        self.query_actions.iter().any(|a| a == name)
    }
}
