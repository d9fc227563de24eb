//! Action executor
//!
//! Walks a plan's actions strictly in declaration order, one at a time, and
//! reconciles their status in the store. Actions mutate a shared, stateful
//! host surface with no isolation mechanism, so ordering stands in for
//! transactionality. First failure aborts every remaining sibling action.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::actions::{parse_action_args, ActionController, ActionRegistry};
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::store::{ActionStatus, Message, SharedStore};
use crate::utils::truncate_str;

use super::{AgentEvent, NotifyLevel, MAX_NOTIFICATION_CHARS};

pub struct ActionExecutor<'a> {
    store: &'a SharedStore,
    controller: &'a dyn ActionController,
    registry: &'a ActionRegistry,
    config: &'a AgentConfig,
    event_tx: &'a mpsc::UnboundedSender<AgentEvent>,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(
        store: &'a SharedStore,
        controller: &'a dyn ActionController,
        registry: &'a ActionRegistry,
        config: &'a AgentConfig,
        event_tx: &'a mpsc::UnboundedSender<AgentEvent>,
    ) -> Self {
        Self {
            store,
            controller,
            registry,
            config,
            event_tx,
        }
    }

    fn emit(&self, event: AgentEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Execute the unfinished actions of the plan at `plan_id`.
    ///
    /// Fail-fast: an action failure finishes that action as FAILURE, force-
    /// finishes its remaining siblings as INTERRUPTED, surfaces a warning,
    /// and returns Ok — the failure stays local to the plan. Only a
    /// deliberate abort propagates as an error.
    pub async fn execute_plan(
        &self,
        plan_id: usize,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let action_ids: Vec<usize> = self.store.with(|s| {
            s.active_thread()
                .messages
                .get(plan_id)
                .and_then(Message::as_plan)
                .map(|p| p.action_message_ids.clone())
                .unwrap_or_default()
        });

        // The assistant talked but proposed nothing: treat the plan as
        // vacuously complete so the loop stops cleanly.
        if action_ids.is_empty() {
            self.store
                .with(|s| s.interrupt_plan(plan_id, ActionStatus::Interrupted));
            return Ok(());
        }

        for id in action_ids {
            if cancel.is_cancelled() {
                self.store
                    .with(|s| s.interrupt_plan(plan_id, ActionStatus::Interrupted));
                return Err(AgentError::Cancelled);
            }

            let pending = self.store.with(|s| {
                s.active_thread()
                    .messages
                    .get(id)
                    .and_then(Message::as_action)
                    .filter(|a| !a.finished)
                    .map(|a| (a.name.clone(), a.arguments.clone()))
            });
            let Some((name, raw_args)) = pending else {
                continue;
            };

            let args = match parse_action_args(&name, &raw_args, self.config) {
                Ok(args) => args,
                Err(e) => {
                    self.fail_fast(plan_id, id, &name, &e.to_string());
                    return Ok(());
                }
            };

            self.store.with(|s| s.start_action(id));
            self.emit(AgentEvent::ActionStarted {
                name: name.clone(),
                label: self.registry.label_running(&name),
            });
            tracing::info!(action = %name, "dispatching action");

            match self.controller.dispatch(&name, args).await {
                Ok(output) => {
                    self.store
                        .with(|s| s.finish_action(id, ActionStatus::Success, Some(output)));
                    self.emit(AgentEvent::ActionFinished {
                        name: name.clone(),
                        label: self.registry.label_done(&name),
                        success: true,
                    });
                }
                Err(e) => {
                    self.fail_fast(plan_id, id, &name, &e.to_string());
                    self.emit(AgentEvent::ActionFinished {
                        name: name.clone(),
                        label: self.registry.label_done(&name),
                        success: false,
                    });
                    return Ok(());
                }
            }

            if cancel.is_cancelled() {
                self.store
                    .with(|s| s.interrupt_plan(plan_id, ActionStatus::Interrupted));
                return Err(AgentError::Cancelled);
            }
        }

        Ok(())
    }

    /// Mark one action failed, interrupt its unfinished siblings, and
    /// surface a bounded warning.
    fn fail_fast(&self, plan_id: usize, id: usize, name: &str, message: &str) {
        tracing::warn!(action = %name, error = %message, "action failed, aborting plan");
        self.store.with(|s| {
            s.finish_action(id, ActionStatus::Failure, None);
            s.interrupt_plan(plan_id, ActionStatus::Interrupted);
        });
        self.emit(AgentEvent::Notification {
            level: NotifyLevel::Warning,
            message: truncate_str(
                &format!("Action '{name}' failed: {message}"),
                MAX_NOTIFICATION_CHARS,
            )
            .to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    use crate::store::ToolCall;

    /// Records every dispatched action name; fails when asked to.
    struct ScriptedController {
        calls: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl ScriptedController {
        fn new(fail_on: Option<&str>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: fail_on.map(str::to_string),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActionController for ScriptedController {
        async fn dispatch(&self, name: &str, _args: Value) -> Result<String> {
            self.calls.lock().unwrap().push(name.to_string());
            if self.fail_on.as_deref() == Some(name) {
                anyhow::bail!("boom");
            }
            Ok(format!("{name} ok"))
        }
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: json!({"sql": "select 1"}),
        }
    }

    struct Harness {
        store: SharedStore,
        registry: ActionRegistry,
        config: AgentConfig,
        event_tx: mpsc::UnboundedSender<AgentEvent>,
        _event_rx: mpsc::UnboundedReceiver<AgentEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let (event_tx, _event_rx) = mpsc::unbounded_channel();
            Self {
                store: SharedStore::new(10),
                registry: ActionRegistry::new(),
                config: AgentConfig::default(),
                event_tx,
                _event_rx,
            }
        }

        fn executor<'a>(&'a self, controller: &'a dyn ActionController) -> ActionExecutor<'a> {
            ActionExecutor::new(
                &self.store,
                controller,
                &self.registry,
                &self.config,
                &self.event_tx,
            )
        }

        fn status_of(&self, id: usize) -> ActionStatus {
            self.store
                .with(|s| s.active_thread().messages[id].as_action().unwrap().status)
        }
    }

    #[tokio::test]
    async fn test_all_actions_succeed_in_order() {
        let h = Harness::new();
        let controller = ScriptedController::new(None);
        let plan_id = h.store.with(|s| {
            s.add_plan_message(vec![call("a", "edit_query"), call("b", "run_query")], "", vec![])
        });
        h.executor(&controller)
            .execute_plan(plan_id, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(controller.calls(), vec!["edit_query", "run_query"]);
        assert_eq!(h.status_of(1), ActionStatus::Success);
        assert_eq!(h.status_of(2), ActionStatus::Success);
        assert!(h
            .store
            .with(|s| s.active_thread().messages[plan_id].as_plan().unwrap().finished));
    }

    #[tokio::test]
    async fn test_fail_fast_skips_remaining_actions() {
        let h = Harness::new();
        let controller = ScriptedController::new(Some("run_query"));
        let plan_id = h.store.with(|s| {
            s.add_plan_message(
                vec![
                    call("a", "edit_query"),
                    call("b", "run_query"),
                    call("c", "finish_task"),
                ],
                "",
                vec![],
            )
        });
        h.executor(&controller)
            .execute_plan(plan_id, &CancellationToken::new())
            .await
            .unwrap();
        // Third action was never dispatched
        assert_eq!(controller.calls(), vec!["edit_query", "run_query"]);
        assert_eq!(h.status_of(1), ActionStatus::Success);
        assert_eq!(h.status_of(2), ActionStatus::Failure);
        assert_eq!(h.status_of(3), ActionStatus::Interrupted);
        assert!(h
            .store
            .with(|s| s.active_thread().messages[plan_id].as_plan().unwrap().finished));
    }

    #[tokio::test]
    async fn test_zero_call_plan_is_interrupted_immediately() {
        let h = Harness::new();
        let controller = ScriptedController::new(None);
        let plan_id = h.store.with(|s| s.add_plan_message(vec![], "just words", vec![]));
        h.executor(&controller)
            .execute_plan(plan_id, &CancellationToken::new())
            .await
            .unwrap();
        assert!(controller.calls().is_empty());
        assert!(h
            .store
            .with(|s| s.active_thread().messages[plan_id].as_plan().unwrap().finished));
    }

    #[tokio::test]
    async fn test_cancelled_token_interrupts_remaining() {
        let h = Harness::new();
        let controller = ScriptedController::new(None);
        let plan_id = h
            .store
            .with(|s| s.add_plan_message(vec![call("a", "run_query")], "", vec![]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = h.executor(&controller).execute_plan(plan_id, &cancel).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert!(controller.calls().is_empty());
        assert_eq!(h.status_of(1), ActionStatus::Interrupted);
    }

    #[tokio::test]
    async fn test_parse_failure_is_action_failure() {
        let h = Harness::new();
        let controller = ScriptedController::new(None);
        let plan_id = h.store.with(|s| {
            s.add_plan_message(
                vec![
                    ToolCall {
                        id: "a".into(),
                        name: "run_query".into(),
                        arguments: json!("this is not json"),
                    },
                    call("b", "run_query"),
                ],
                "",
                vec![],
            )
        });
        h.executor(&controller)
            .execute_plan(plan_id, &CancellationToken::new())
            .await
            .unwrap();
        assert!(controller.calls().is_empty());
        assert_eq!(h.status_of(1), ActionStatus::Failure);
        assert_eq!(h.status_of(2), ActionStatus::Interrupted);
    }

    #[tokio::test]
    async fn test_free_text_fallback_dispatches() {
        let h = Harness::new();
        let controller = ScriptedController::new(None);
        let plan_id = h.store.with(|s| {
            s.add_plan_message(
                vec![ToolCall {
                    id: "a".into(),
                    name: "reply".into(),
                    arguments: json!("plain prose answer"),
                }],
                "",
                vec![],
            )
        });
        h.executor(&controller)
            .execute_plan(plan_id, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(controller.calls(), vec!["reply"]);
        assert_eq!(h.status_of(1), ActionStatus::Success);
    }
}
