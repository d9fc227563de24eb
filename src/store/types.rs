use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a conversation thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Planning,
    Executing,
    Finished,
}

/// Execution status of a single action record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Todo,
    Doing,
    Interrupted,
    Failure,
    Success,
}

impl ActionStatus {
    /// Statuses that are legal terminal values for `finish_action`
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Interrupted | ActionStatus::Failure | ActionStatus::Success
        )
    }
}

/// One tool call proposed by the planner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw argument payload; may be a JSON object or a string-encoded object
    pub arguments: serde_json::Value,
}

/// Reaction feedback on a user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Like,
    Dislike,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessage {
    pub index: usize,
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
    /// The only field that may change after creation
    #[serde(default)]
    pub reaction: Option<Reaction>,
    pub created_at: DateTime<Utc>,
}

/// One planning round: the assistant's proposed tool calls plus any
/// accompanying prose. `action_message_ids` point at the tool messages
/// appended immediately after this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMessage {
    pub index: usize,
    pub tool_calls: Vec<ToolCall>,
    pub action_message_ids: Vec<usize>,
    pub content: String,
    pub finished: bool,
    pub created_at: DateTime<Utc>,
}

/// Execution record for one tool call. Created in `Todo` state at plan
/// creation time so the plan's shape is fixed before execution starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionMessage {
    pub index: usize,
    pub tool_call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    /// Index of the owning plan message in the same thread
    pub plan_id: usize,
    pub status: ActionStatus,
    pub finished: bool,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A message in a thread's append-only log, tagged by role
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User(UserMessage),
    Assistant(PlanMessage),
    Tool(ActionMessage),
}

impl Message {
    pub fn index(&self) -> usize {
        match self {
            Message::User(m) => m.index,
            Message::Assistant(m) => m.index,
            Message::Tool(m) => m.index,
        }
    }

    pub fn as_plan(&self) -> Option<&PlanMessage> {
        match self {
            Message::Assistant(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_action(&self) -> Option<&ActionMessage> {
        match self {
            Message::Tool(m) => Some(m),
            _ => None,
        }
    }
}

/// Display-only progress node for nested sub-agent reporting. Replaced
/// wholesale on each new plan; never consulted by the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub child_ids: Vec<String>,
    pub agent: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub debug: Option<String>,
}

/// User's answer to a pending confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationAnswer {
    Approve,
    Reject,
}

/// Single-slot confirmation sub-state; last writer wins, one outstanding
/// confirmation per thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfirmationState {
    pub show: bool,
    pub content: String,
    #[serde(default)]
    pub old_content: Option<String>,
    #[serde(default)]
    pub user_input: Option<ConfirmationAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyQuestion {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyAnswer {
    pub question: String,
    pub answer: String,
}

/// Multi-question clarification sub-state; questions are answered one at a
/// time and answers accumulate positionally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClarificationState {
    pub show: bool,
    pub questions: Vec<ClarifyQuestion>,
    pub answers: Vec<ClarifyAnswer>,
    pub current_question_index: usize,
}

impl ClarificationState {
    /// Derived: every question has an answer
    pub fn is_completed(&self) -> bool {
        !self.questions.is_empty() && self.answers.len() == self.questions.len()
    }
}

/// One independent conversation: an append-only message log plus its
/// lifecycle status and gate sub-states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    /// Monotonically-derived version string, unique across clones/evictions
    pub id: String,
    /// Position in the store's thread list
    pub index: usize,
    pub messages: Vec<Message>,
    pub status: ThreadStatus,
    pub interrupted: bool,
    #[serde(default)]
    pub confirmation: ConfirmationState,
    #[serde(default)]
    pub clarification: ClarificationState,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Thread {
    pub fn new(id: String, index: usize) -> Self {
        Self {
            id,
            index,
            messages: Vec::new(),
            status: ThreadStatus::Finished,
            interrupted: false,
            confirmation: ConfirmationState::default(),
            clarification: ClarificationState::default(),
            tasks: Vec::new(),
        }
    }

    /// The last message in the log, if any
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}
