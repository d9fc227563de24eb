use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::store::{ConfirmationAnswer, SharedStore};

/// Single-slot approve/reject gate.
///
/// `request` publishes the confirmation content, then waits until the UI
/// stores an answer. The wait only accepts an answer while the stored
/// content still equals the requested content, so a stale answer left over
/// from an earlier request can never resolve a newer one. Callers must not
/// issue overlapping confirmations within one thread.
pub struct ConfirmationGate {
    store: SharedStore,
    poll_interval: Duration,
}

impl ConfirmationGate {
    pub fn new(store: SharedStore, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    /// Block until the user approves or rejects `content`. Returns `true`
    /// on approval. An aborted turn releases the wait with
    /// [`AgentError::Cancelled`] and closes the dialog.
    pub async fn request(
        &self,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, AgentError> {
        self.store.with(|s| s.toggle_confirmation(true, content));
        tracing::info!("confirmation requested");

        loop {
            if cancel.is_cancelled() {
                self.store.with(|s| s.toggle_confirmation(false, ""));
                return Err(AgentError::Cancelled);
            }

            let answer = self.store.with(|s| {
                let state = &s.active_thread().confirmation;
                if state.content == content {
                    state.user_input
                } else {
                    // A different confirmation owns the slot now; keep waiting
                    None
                }
            });

            if let Some(answer) = answer {
                self.store.with(|s| s.toggle_confirmation(false, ""));
                return Ok(answer == ConfirmationAnswer::Approve);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(store: &SharedStore) -> ConfirmationGate {
        ConfirmationGate::new(store.clone(), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_approve_resolves_true() {
        let store = SharedStore::new(10);
        let gate = gate(&store);
        let answering = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                store.with(|s| s.set_confirmation_input(ConfirmationAnswer::Approve));
            })
        };
        let approved = gate
            .request("drop table temp?", &CancellationToken::new())
            .await
            .unwrap();
        assert!(approved);
        assert!(!store.with(|s| s.active_thread().confirmation.show));
        answering.await.unwrap();
    }

    #[tokio::test]
    async fn test_reject_resolves_false() {
        let store = SharedStore::new(10);
        let gate = gate(&store);
        store.with(|s| s.toggle_confirmation(true, "unused"));
        let answering = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                store.with(|s| s.set_confirmation_input(ConfirmationAnswer::Reject));
            })
        };
        let approved = gate
            .request("truncate logs?", &CancellationToken::new())
            .await
            .unwrap();
        assert!(!approved);
        answering.await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_answer_does_not_resolve_newer_request() {
        let store = SharedStore::new(10);

        // Simulate an answer meant for an older request: replace the slot
        // content, store the answer, then restore the newer request before
        // the waiter polls again.
        let waiter = {
            let store = store.clone();
            let gate = ConfirmationGate::new(store.clone(), Duration::from_millis(5));
            tokio::spawn(async move { gate.request("second?", &CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(15)).await;

        // Slot temporarily shows different content with an answer; the
        // waiter must keep waiting because the content does not match.
        store.with(|s| {
            s.toggle_confirmation(true, "first?");
            s.set_confirmation_input(ConfirmationAnswer::Approve);
        });
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(!waiter.is_finished());

        // Now re-publish the waiter's content and answer it for real
        store.with(|s| {
            s.toggle_confirmation(true, "second?");
            s.set_confirmation_input(ConfirmationAnswer::Reject);
        });
        let approved = waiter.await.unwrap().unwrap();
        assert!(!approved);
    }

    #[tokio::test]
    async fn test_cancel_releases_wait() {
        let store = SharedStore::new(10);
        let gate = gate(&store);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = gate.request("anything?", &cancel).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert!(!store.with(|s| s.active_thread().confirmation.show));
    }
}
