//! Plan/execute/continue loop
//!
//! The event-driven controller for one conversation turn: wake on a user
//! message, call the planner, hand the plan to the executor, decide whether
//! to loop, and always leave the thread FINISHED. Owns the cancellation
//! token for the turn; a deliberate abort unwinds silently while every
//! other failure surfaces as a bounded notification plus a telemetry
//! report.

pub mod executor;

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionController, ActionDefinition, ActionRegistry};
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::history::HistoryMatcher;
use crate::host::HostStateProvider;
use crate::planner::{PlanRequest, Planner};
use crate::store::{Message, SharedStore, ThreadStatus};
use crate::utils::truncate_str;

use executor::ActionExecutor;

/// Ceiling for user-visible error text
pub const MAX_NOTIFICATION_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
}

/// Events emitted to the UI during a turn, mirroring store transitions.
/// All sends are best-effort; a closed receiver never affects the turn.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A plan was appended; actions are about to run
    PlanReady { content: String, action_count: usize },
    ActionStarted { name: String, label: String },
    ActionFinished { name: String, label: String, success: bool },
    Notification { level: NotifyLevel, message: String },
    /// The turn is over and the thread is FINISHED
    TurnFinished,
}

/// Fire-and-forget diagnostic reporting. Failures to report are ignored.
pub trait TelemetrySink: Send + Sync {
    fn report(&self, message: &str);
}

/// Default sink that drops every report.
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn report(&self, _message: &str) {}
}

/// The turn controller. One instance per conversation surface; reacts to
/// `handle_user_message` and `abort`.
pub struct AgentLoop {
    store: SharedStore,
    planner: Arc<dyn Planner>,
    controller: Arc<dyn ActionController>,
    host: Arc<dyn HostStateProvider>,
    registry: ActionRegistry,
    available_actions: Vec<ActionDefinition>,
    config: AgentConfig,
    event_tx: mpsc::UnboundedSender<AgentEvent>,
    telemetry: Arc<dyn TelemetrySink>,
    /// Cancellation token of the in-flight turn, if any
    current_turn: Mutex<Option<CancellationToken>>,
}

impl AgentLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: SharedStore,
        planner: Arc<dyn Planner>,
        controller: Arc<dyn ActionController>,
        host: Arc<dyn HostStateProvider>,
        registry: ActionRegistry,
        available_actions: Vec<ActionDefinition>,
        config: AgentConfig,
        event_tx: mpsc::UnboundedSender<AgentEvent>,
    ) -> Self {
        Self {
            store,
            planner,
            controller,
            host,
            registry,
            available_actions,
            config,
            event_tx,
            telemetry: Arc::new(NoopTelemetry),
            current_turn: Mutex::new(None),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    fn emit(&self, event: AgentEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_turn_token(&self, token: Option<CancellationToken>) {
        let mut slot = match self.current_turn.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = token;
    }

    /// Open a thread for the host's current query: resume a prior thread if
    /// the query was seen before, otherwise start an empty one. Never
    /// fails; fingerprint extraction errors degrade to a plain new thread.
    pub async fn open_for_current_query(&self) -> usize {
        let matcher = HistoryMatcher::new(&self.config);
        let fingerprint = self.host.current_query().await;
        matcher.resume_or_start(&self.store, fingerprint)
    }

    /// Abort the in-flight turn, if any. The turn's steps observe the token
    /// and unwind via `AgentError::Cancelled`, which is swallowed.
    pub fn abort(&self) {
        let token = {
            let slot = match self.current_turn.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.clone()
        };
        if let Some(token) = token {
            tracing::info!("abort requested");
            self.store.with(|s| s.mark_interrupted());
            token.cancel();
        }
    }

    /// Run one full user turn: append the message, then plan and execute
    /// rounds until the continuation decision says stop or the round
    /// ceiling is reached. Whatever happens, the thread ends FINISHED.
    pub async fn handle_user_message(&self, text: impl Into<String>, images: Vec<String>) {
        let cancel = CancellationToken::new();
        self.set_turn_token(Some(cancel.clone()));

        self.store.with(|s| {
            s.add_user_message(text, images);
        });

        match self.run_turn(&cancel).await {
            Ok(rounds) => {
                tracing::info!(rounds, "turn complete");
            }
            Err(AgentError::Cancelled) => {
                // Deliberate abort: never surfaced as an error
                tracing::info!("turn aborted");
            }
            Err(e) => {
                let message = truncate_str(&e.to_string(), MAX_NOTIFICATION_CHARS).to_string();
                tracing::error!(error = %message, "turn failed");
                self.emit(AgentEvent::Notification {
                    level: NotifyLevel::Error,
                    message: message.clone(),
                });
                self.telemetry.report(&message);
            }
        }

        // The thread must never stay stuck in PLANNING/EXECUTING
        self.store.with(|s| s.set_thread_status(ThreadStatus::Finished));
        self.set_turn_token(None);
        self.emit(AgentEvent::TurnFinished);
    }

    async fn run_turn(&self, cancel: &CancellationToken) -> Result<usize, AgentError> {
        for round in 0..self.config.max_rounds {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            self.store.with(|s| s.set_thread_status(ThreadStatus::Planning));
            let request = self.build_plan_request().await;
            let started = Instant::now();
            let response = self.planner.plan(request, cancel).await?;
            tracing::info!(
                elapsed = ?started.elapsed(),
                tool_calls = response.tool_calls.len(),
                "planner responded"
            );

            let action_count = response.tool_calls.len();
            let plan_id = self.store.with(|s| {
                s.add_plan_message(
                    response.tool_calls,
                    response.content.clone(),
                    response.tasks.unwrap_or_default(),
                )
            });
            self.emit(AgentEvent::PlanReady {
                content: response.content,
                action_count,
            });

            self.store.with(|s| s.set_thread_status(ThreadStatus::Executing));
            let executor = ActionExecutor::new(
                &self.store,
                self.controller.as_ref(),
                &self.registry,
                &self.config,
                &self.event_tx,
            );
            executor.execute_plan(plan_id, cancel).await?;

            if !self.should_continue() {
                return Ok(round + 1);
            }
        }

        tracing::warn!(
            max_rounds = self.config.max_rounds,
            "continuation ceiling reached, stopping with partial completion"
        );
        Ok(self.config.max_rounds)
    }

    /// Continuation decision, re-examining the last message:
    /// an assistant message with zero tool calls stops (nothing ran), a
    /// terminal action stops, anything else plans another round.
    fn should_continue(&self) -> bool {
        self.store.with(|s| match s.active_thread().last_message() {
            Some(Message::Assistant(plan)) => !plan.tool_calls.is_empty(),
            Some(Message::Tool(action)) => !self.config.is_terminal_action(&action.name),
            _ => false,
        })
    }

    async fn build_plan_request(&self) -> PlanRequest {
        // Host state is advisory context; an unavailable surface must not
        // kill the turn
        let host_state = match self.host.snapshot().await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("host state unavailable: {e}");
                serde_json::Value::Null
            }
        };
        PlanRequest {
            messages: self.store.with(|s| s.active_thread().messages.clone()),
            host_state,
            available_actions: self.available_actions.clone(),
            model: self.config.model.clone(),
        }
    }
}
