use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::store::{ClarifyAnswer, ClarifyQuestion, SharedStore};

/// Sequential multi-question gate.
///
/// Publishes a question list, then waits until every question has an
/// answer. The UI answers one question at a time via
/// `set_clarification_answer`; a user cancel goes through
/// `cancel_clarification`, which fills the remaining slots with a sentinel,
/// so the gate always terminates once cancel is invoked.
pub struct ClarificationGate {
    store: SharedStore,
    poll_interval: Duration,
}

impl ClarificationGate {
    pub fn new(store: SharedStore, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    /// Block until all `questions` are answered and return the full
    /// question/answer list in order.
    pub async fn ask(
        &self,
        questions: Vec<ClarifyQuestion>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ClarifyAnswer>, AgentError> {
        if questions.is_empty() {
            return Ok(Vec::new());
        }
        self.store
            .with(|s| s.toggle_clarification(true, questions));
        tracing::info!("clarification requested");

        loop {
            if cancel.is_cancelled() {
                self.store.with(|s| s.toggle_clarification(false, vec![]));
                return Err(AgentError::Cancelled);
            }

            let done = self.store.with(|s| {
                let state = &s.active_thread().clarification;
                state.is_completed().then(|| state.answers.clone())
            });

            if let Some(answers) = done {
                self.store.with(|s| s.toggle_clarification(false, vec![]));
                return Ok(answers);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
