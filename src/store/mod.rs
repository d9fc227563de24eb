//! Conversation store
//!
//! Holds the ordered list of threads and every state transition the rest of
//! the system is allowed to perform on them. All operations are pure and
//! synchronous; I/O and awaiting happen in the agent loop, never here.
//! External components (planner, action controller, UI) read thread state
//! and call these operations; nothing else writes message fields.

pub mod types;

use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::error::AgentError;

pub use types::{
    ActionMessage, ActionStatus, ClarificationState, ClarifyAnswer, ClarifyQuestion,
    ConfirmationAnswer, ConfirmationState, Message, PlanMessage, Reaction, Task, Thread,
    ThreadStatus, ToolCall, UserMessage,
};

/// Sentinel answer used when a clarification is cancelled with questions
/// still open.
pub const CLARIFICATION_CANCEL_ANSWER: &str = "figure it out";

/// Ordered thread list plus the active-thread cursor. A bounded ring:
/// the oldest thread is evicted once `capacity` is exceeded.
#[derive(Debug)]
pub struct ConversationStore {
    threads: Vec<Thread>,
    active: usize,
    capacity: usize,
    /// Seed for thread id derivation; ids are `<seed>-v<counter>` so a
    /// clone or an eviction never reuses an id.
    id_seed: String,
    id_counter: u64,
}

impl ConversationStore {
    pub fn new(capacity: usize) -> Self {
        let mut store = Self {
            threads: Vec::new(),
            active: 0,
            capacity: capacity.max(1),
            id_seed: uuid::Uuid::new_v4().to_string(),
            id_counter: 0,
        };
        store.start_new_thread();
        store
    }

    fn next_thread_id(&mut self) -> String {
        self.id_counter += 1;
        format!("{}-v{}", self.id_seed, self.id_counter)
    }

    /// Evict oldest threads until within capacity, then renumber indices.
    fn enforce_capacity(&mut self) {
        while self.threads.len() > self.capacity {
            self.threads.remove(0);
            self.active = self.active.saturating_sub(1);
        }
        for (i, t) in self.threads.iter_mut().enumerate() {
            t.index = i;
        }
    }

    // --- read surface ---

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_thread(&self) -> &Thread {
        &self.threads[self.active]
    }

    fn active_thread_mut(&mut self) -> &mut Thread {
        &mut self.threads[self.active]
    }

    // --- thread lifecycle ---

    /// Append a fresh empty thread and make it active. Returns its index.
    pub fn start_new_thread(&mut self) -> usize {
        let id = self.next_thread_id();
        let index = self.threads.len();
        self.threads.push(Thread::new(id, index));
        self.active = index;
        self.enforce_capacity();
        self.active
    }

    /// Make an existing thread active. Out-of-range indices are a hard
    /// error; callers must validate bounds first.
    pub fn switch_to_thread(&mut self, index: usize) -> Result<(), AgentError> {
        if index >= self.threads.len() {
            return Err(AgentError::InvalidThread(index));
        }
        self.active = index;
        Ok(())
    }

    /// Clone messages `[0..=message_index]` of `thread_index` into a new
    /// active thread with a fresh id. Nothing after the match point is
    /// carried over; gate sub-states start clean.
    pub fn clone_thread_from_history(
        &mut self,
        thread_index: usize,
        message_index: usize,
    ) -> Result<usize, AgentError> {
        let source = self
            .threads
            .get(thread_index)
            .ok_or(AgentError::InvalidThread(thread_index))?;
        let messages: Vec<Message> = if source.messages.is_empty() {
            Vec::new()
        } else {
            let end = message_index.min(source.messages.len() - 1);
            source.messages[..=end].to_vec()
        };

        let id = self.next_thread_id();
        let index = self.threads.len();
        let mut thread = Thread::new(id, index);
        thread.messages = messages;
        self.threads.push(thread);
        self.active = index;
        self.enforce_capacity();
        Ok(self.active)
    }

    /// Drop up to `count` trailing messages of the active thread. Only legal
    /// on a FINISHED thread; interior removal is never supported.
    pub fn truncate_finished_thread(&mut self, count: usize) {
        let thread = self.active_thread_mut();
        if thread.status != ThreadStatus::Finished {
            tracing::warn!("refusing to truncate a thread that is still running");
            return;
        }
        let keep = thread.messages.len().saturating_sub(count);
        thread.messages.truncate(keep);
    }

    pub fn set_thread_status(&mut self, status: ThreadStatus) {
        self.active_thread_mut().status = status;
    }

    pub fn mark_interrupted(&mut self) {
        self.active_thread_mut().interrupted = true;
    }

    // --- message log ---

    /// Append a user message; clears the interrupted flag for the new turn.
    pub fn add_user_message(&mut self, text: impl Into<String>, images: Vec<String>) -> usize {
        let thread = self.active_thread_mut();
        let index = thread.messages.len();
        thread.messages.push(Message::User(UserMessage {
            index,
            text: text.into(),
            images,
            reaction: None,
            created_at: Utc::now(),
        }));
        thread.interrupted = false;
        index
    }

    /// Append one assistant (plan) message plus one tool message per tool
    /// call, all pre-seeded `Todo`, and replace the thread's task tree.
    /// Returns the plan's message index.
    pub fn add_plan_message(
        &mut self,
        tool_calls: Vec<ToolCall>,
        content: impl Into<String>,
        tasks: Vec<Task>,
    ) -> usize {
        let now = Utc::now();
        let thread = self.active_thread_mut();
        let plan_index = thread.messages.len();
        let action_ids: Vec<usize> = (0..tool_calls.len()).map(|i| plan_index + 1 + i).collect();

        thread.messages.push(Message::Assistant(PlanMessage {
            index: plan_index,
            tool_calls: tool_calls.clone(),
            action_message_ids: action_ids.clone(),
            content: content.into(),
            finished: false,
            created_at: now,
        }));

        for (i, call) in tool_calls.into_iter().enumerate() {
            thread.messages.push(Message::Tool(ActionMessage {
                index: action_ids[i],
                tool_call_id: call.id,
                name: call.name,
                arguments: call.arguments,
                plan_id: plan_index,
                status: ActionStatus::Todo,
                finished: false,
                content: None,
                created_at: now,
            }));
        }

        thread.tasks = tasks;
        plan_index
    }

    /// The only mutation allowed on a user message after creation.
    pub fn set_message_reaction(&mut self, message_index: usize, reaction: Option<Reaction>) {
        if let Some(Message::User(m)) = self.active_thread_mut().messages.get_mut(message_index) {
            m.reaction = reaction;
        }
    }

    // --- action transitions ---

    /// `Todo -> Doing`; no-op once the action is finished.
    pub fn start_action(&mut self, id: usize) {
        if let Some(Message::Tool(action)) = self.active_thread_mut().messages.get_mut(id) {
            if !action.finished && action.status == ActionStatus::Todo {
                action.status = ActionStatus::Doing;
            }
        }
    }

    /// Finish one action with a terminal status and optional result content,
    /// then refresh the owning plan's `finished` flag. Idempotent: a second
    /// call on an already-finished action changes nothing.
    pub fn finish_action(&mut self, id: usize, status: ActionStatus, content: Option<String>) {
        debug_assert!(status.is_terminal());
        let plan_id = {
            let thread = self.active_thread_mut();
            match thread.messages.get_mut(id) {
                Some(Message::Tool(action)) if !action.finished => {
                    action.finished = true;
                    action.status = status;
                    if content.is_some() {
                        action.content = content;
                    }
                    action.plan_id
                }
                _ => return,
            }
        };
        self.refresh_plan_finished(plan_id);
    }

    /// Force-finish every unfinished action of a plan with `status` and mark
    /// the plan itself finished. Used when the assistant proposed nothing,
    /// when a sibling action failed, and on abort.
    pub fn interrupt_plan(&mut self, plan_id: usize, status: ActionStatus) {
        debug_assert!(status.is_terminal());
        let action_ids = {
            let thread = self.active_thread_mut();
            match thread.messages.get(plan_id) {
                Some(Message::Assistant(plan)) => plan.action_message_ids.clone(),
                _ => return,
            }
        };
        for id in action_ids {
            if let Some(Message::Tool(action)) = self.active_thread_mut().messages.get_mut(id) {
                if !action.finished {
                    action.finished = true;
                    action.status = status;
                }
            }
        }
        if let Some(Message::Assistant(plan)) = self.active_thread_mut().messages.get_mut(plan_id) {
            plan.finished = true;
        }
    }

    /// A plan is finished iff all of its action messages are finished. The
    /// flag is monotonic: this only ever flips it to true.
    fn refresh_plan_finished(&mut self, plan_id: usize) {
        let thread = self.active_thread_mut();
        let action_ids = match thread.messages.get(plan_id) {
            Some(Message::Assistant(plan)) => plan.action_message_ids.clone(),
            _ => return,
        };
        let all_finished = action_ids.iter().all(|&id| {
            matches!(thread.messages.get(id), Some(Message::Tool(a)) if a.finished)
        });
        if all_finished {
            if let Some(Message::Assistant(plan)) = thread.messages.get_mut(plan_id) {
                plan.finished = true;
            }
        }
    }

    // --- confirmation gate state ---

    /// Open (or close) the single confirmation slot. Opening stashes the
    /// previous content so a stale answer can be told apart from a current
    /// one, and clears any prior answer.
    pub fn toggle_confirmation(&mut self, show: bool, content: impl Into<String>) {
        let thread = self.active_thread_mut();
        let previous = std::mem::take(&mut thread.confirmation.content);
        thread.confirmation = ConfirmationState {
            show,
            content: content.into(),
            old_content: if previous.is_empty() { None } else { Some(previous) },
            user_input: None,
        };
    }

    pub fn set_confirmation_input(&mut self, answer: ConfirmationAnswer) {
        self.active_thread_mut().confirmation.user_input = Some(answer);
    }

    // --- clarification gate state ---

    /// Open the clarification dialog with a fresh question list, or close it.
    pub fn toggle_clarification(&mut self, show: bool, questions: Vec<ClarifyQuestion>) {
        let thread = self.active_thread_mut();
        thread.clarification = ClarificationState {
            show,
            questions,
            answers: Vec::new(),
            current_question_index: 0,
        };
    }

    /// Record the answer to the current question. Answers accumulate
    /// positionally; an answer whose question text does not match the
    /// current question is ignored.
    pub fn set_clarification_answer(&mut self, question: &str, answer: impl Into<String>) {
        let state = &mut self.active_thread_mut().clarification;
        let matches_current = state
            .questions
            .get(state.answers.len())
            .map(|q| q.question == question)
            .unwrap_or(false);
        if !matches_current {
            tracing::warn!(question, "clarification answer does not match current question");
            return;
        }
        state.answers.push(ClarifyAnswer {
            question: question.to_string(),
            answer: answer.into(),
        });
        state.current_question_index = state.answers.len();
    }

    /// Cancel path: fill every remaining question (including the current
    /// one) with the sentinel answer so the gate always terminates.
    pub fn cancel_clarification(&mut self) {
        let state = &mut self.active_thread_mut().clarification;
        for i in state.answers.len()..state.questions.len() {
            state.answers.push(ClarifyAnswer {
                question: state.questions[i].question.clone(),
                answer: CLARIFICATION_CANCEL_ANSWER.to_string(),
            });
        }
        state.current_question_index = state.answers.len();
    }

    // --- persistence boundary ---

    /// Replace the whole thread list from a restored snapshot. Indices are
    /// renumbered and the newest thread becomes active.
    pub fn restore_threads(&mut self, mut threads: Vec<Thread>) {
        if threads.is_empty() {
            return;
        }
        for (i, t) in threads.iter_mut().enumerate() {
            t.index = i;
        }
        self.active = threads.len() - 1;
        self.threads = threads;
        self.enforce_capacity();
    }
}

/// Shared handle to the store: the one legal writer surface for the agent
/// loop, the gates, and the UI callbacks. Locks are held only for the
/// duration of a single synchronous transition, never across an await.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<ConversationStore>>,
}

impl SharedStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConversationStore::new(capacity))),
        }
    }

    /// Run one transition (or read) against the store.
    pub fn with<R>(&self, f: impl FnOnce(&mut ConversationStore) -> R) -> R {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Clone of the active thread for rendering.
    pub fn active_thread_view(&self) -> Thread {
        self.with(|s| s.active_thread().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: json!({"sql": "select 1"}),
        }
    }

    #[test]
    fn test_user_message_clears_interrupted() {
        let mut store = ConversationStore::new(10);
        store.mark_interrupted();
        assert!(store.active_thread().interrupted);
        store.add_user_message("hi", vec![]);
        assert!(!store.active_thread().interrupted);
        assert_eq!(store.active_thread().messages.len(), 1);
    }

    #[test]
    fn test_plan_message_preseeds_todo_actions() {
        let mut store = ConversationStore::new(10);
        store.add_user_message("hi", vec![]);
        let plan_id = store.add_plan_message(
            vec![call("c1", "run_query"), call("c2", "run_query")],
            "two calls",
            vec![],
        );
        assert_eq!(plan_id, 1);
        let thread = store.active_thread();
        assert_eq!(thread.messages.len(), 4);
        let plan = thread.messages[1].as_plan().unwrap();
        assert_eq!(plan.action_message_ids, vec![2, 3]);
        assert!(!plan.finished);
        for id in &plan.action_message_ids {
            let action = thread.messages[*id].as_action().unwrap();
            assert_eq!(action.status, ActionStatus::Todo);
            assert_eq!(action.plan_id, 1);
            assert!(!action.finished);
        }
    }

    #[test]
    fn test_finish_action_is_monotonic() {
        let mut store = ConversationStore::new(10);
        let plan_id = store.add_plan_message(vec![call("c1", "run_query")], "", vec![]);
        store.finish_action(1, ActionStatus::Success, Some("ok".into()));
        // A second finish must not change anything
        store.finish_action(1, ActionStatus::Failure, Some("nope".into()));
        let action = store.active_thread().messages[1].as_action().unwrap();
        assert_eq!(action.status, ActionStatus::Success);
        assert_eq!(action.content.as_deref(), Some("ok"));
        assert!(store.active_thread().messages[plan_id].as_plan().unwrap().finished);
    }

    #[test]
    fn test_plan_finished_iff_all_actions_finished() {
        let mut store = ConversationStore::new(10);
        let plan_id = store.add_plan_message(
            vec![call("c1", "run_query"), call("c2", "run_query")],
            "",
            vec![],
        );
        store.finish_action(1, ActionStatus::Success, None);
        assert!(!store.active_thread().messages[plan_id].as_plan().unwrap().finished);
        store.finish_action(2, ActionStatus::Failure, None);
        assert!(store.active_thread().messages[plan_id].as_plan().unwrap().finished);
    }

    #[test]
    fn test_interrupt_plan_finishes_remaining_only() {
        let mut store = ConversationStore::new(10);
        let plan_id = store.add_plan_message(
            vec![call("a", "x"), call("b", "x"), call("c", "x")],
            "",
            vec![],
        );
        store.finish_action(1, ActionStatus::Success, None);
        store.interrupt_plan(plan_id, ActionStatus::Interrupted);
        let thread = store.active_thread();
        assert_eq!(thread.messages[1].as_action().unwrap().status, ActionStatus::Success);
        assert_eq!(thread.messages[2].as_action().unwrap().status, ActionStatus::Interrupted);
        assert_eq!(thread.messages[3].as_action().unwrap().status, ActionStatus::Interrupted);
        assert!(thread.messages[plan_id].as_plan().unwrap().finished);
    }

    #[test]
    fn test_interrupt_empty_plan_marks_it_finished() {
        let mut store = ConversationStore::new(10);
        let plan_id = store.add_plan_message(vec![], "just talk", vec![]);
        store.interrupt_plan(plan_id, ActionStatus::Interrupted);
        assert!(store.active_thread().messages[plan_id].as_plan().unwrap().finished);
    }

    #[test]
    fn test_start_action_noop_after_finish() {
        let mut store = ConversationStore::new(10);
        store.add_plan_message(vec![call("c1", "run_query")], "", vec![]);
        store.finish_action(1, ActionStatus::Success, None);
        store.start_action(1);
        assert_eq!(
            store.active_thread().messages[1].as_action().unwrap().status,
            ActionStatus::Success
        );
    }

    #[test]
    fn test_switch_to_missing_thread_is_error() {
        let mut store = ConversationStore::new(10);
        assert!(matches!(
            store.switch_to_thread(5),
            Err(AgentError::InvalidThread(5))
        ));
    }

    #[test]
    fn test_thread_ring_evicts_oldest() {
        let mut store = ConversationStore::new(3);
        let first_id = store.active_thread().id.clone();
        for _ in 0..4 {
            store.start_new_thread();
        }
        assert_eq!(store.thread_count(), 3);
        assert!(store.threads().iter().all(|t| t.id != first_id));
        // Indices stay contiguous after eviction
        for (i, t) in store.threads().iter().enumerate() {
            assert_eq!(t.index, i);
        }
        assert_eq!(store.active_index(), 2);
    }

    #[test]
    fn test_clone_thread_copies_prefix_only() {
        let mut store = ConversationStore::new(10);
        store.add_user_message("run it", vec![]);
        store.add_plan_message(vec![call("c1", "run_query")], "", vec![]);
        store.finish_action(2, ActionStatus::Success, Some("rows".into()));
        store.add_user_message("and more", vec![]);
        assert_eq!(store.active_thread().messages.len(), 4);

        let source = store.active_index();
        let cloned = store.clone_thread_from_history(source, 2).unwrap();
        assert_eq!(store.active_index(), cloned);
        let thread = store.active_thread();
        assert_eq!(thread.messages.len(), 3);
        assert_eq!(thread.messages[2].as_action().unwrap().content.as_deref(), Some("rows"));
        assert_ne!(thread.id, store.threads()[source].id);
    }

    #[test]
    fn test_truncate_only_applies_to_finished_threads() {
        let mut store = ConversationStore::new(10);
        store.add_user_message("one", vec![]);
        store.add_user_message("two", vec![]);
        store.set_thread_status(ThreadStatus::Executing);
        store.truncate_finished_thread(1);
        assert_eq!(store.active_thread().messages.len(), 2);
        store.set_thread_status(ThreadStatus::Finished);
        store.truncate_finished_thread(1);
        assert_eq!(store.active_thread().messages.len(), 1);
    }

    #[test]
    fn test_confirmation_slot_is_last_writer_wins() {
        let mut store = ConversationStore::new(10);
        store.toggle_confirmation(true, "drop table a?");
        store.set_confirmation_input(ConfirmationAnswer::Approve);
        store.toggle_confirmation(true, "drop table b?");
        let state = &store.active_thread().confirmation;
        assert_eq!(state.content, "drop table b?");
        assert_eq!(state.old_content.as_deref(), Some("drop table a?"));
        assert_eq!(state.user_input, None);
    }

    #[test]
    fn test_clarification_answers_accumulate_positionally() {
        let mut store = ConversationStore::new(10);
        let questions = vec![
            ClarifyQuestion { question: "which table?".into(), options: vec![] },
            ClarifyQuestion { question: "which column?".into(), options: vec![] },
        ];
        store.toggle_clarification(true, questions);
        // Wrong question text for the current slot is ignored
        store.set_clarification_answer("which column?", "price");
        assert!(store.active_thread().clarification.answers.is_empty());

        store.set_clarification_answer("which table?", "orders");
        store.set_clarification_answer("which column?", "price");
        let state = &store.active_thread().clarification;
        assert!(state.is_completed());
        assert_eq!(state.current_question_index, 2);
        assert_eq!(state.answers[1].answer, "price");
    }

    #[test]
    fn test_clarification_cancel_fills_sentinel() {
        let mut store = ConversationStore::new(10);
        let questions = vec![
            ClarifyQuestion { question: "a?".into(), options: vec![] },
            ClarifyQuestion { question: "b?".into(), options: vec![] },
            ClarifyQuestion { question: "c?".into(), options: vec![] },
        ];
        store.toggle_clarification(true, questions);
        store.set_clarification_answer("a?", "one");
        store.cancel_clarification();
        let state = &store.active_thread().clarification;
        assert!(state.is_completed());
        assert_eq!(state.answers[0].answer, "one");
        assert_eq!(state.answers[1].answer, CLARIFICATION_CANCEL_ANSWER);
        assert_eq!(state.answers[2].answer, CLARIFICATION_CANCEL_ANSWER);
    }

    #[test]
    fn test_reaction_is_only_user_message_mutation() {
        let mut store = ConversationStore::new(10);
        store.add_user_message("hello", vec![]);
        store.set_message_reaction(0, Some(Reaction::Like));
        match &store.active_thread().messages[0] {
            Message::User(m) => assert_eq!(m.reaction, Some(Reaction::Like)),
            _ => panic!("expected user message"),
        }
    }
}
