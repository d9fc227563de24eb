//! Thread history matching
//!
//! When the host surface shows a query the user already explored in an
//! earlier thread, the matcher clones that thread's prefix into a new
//! thread instead of re-planning from scratch. Matching is an exact
//! comparison of normalized query text; the scan runs newest-first over
//! threads and messages.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::config::AgentConfig;
use crate::store::{ConversationStore, Message, SharedStore};

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref AROUND_PUNCT: Regex = Regex::new(r"\s*([(),])\s*").unwrap();
}

/// Normalize query text into a comparison fingerprint: trim, lowercase,
/// collapse whitespace, drop space around parentheses and commas, strip
/// trailing statement terminators. Idempotent by construction.
pub fn normalize_sql(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let collapsed = WHITESPACE.replace_all(&lowered, " ");
    let tightened = AROUND_PUNCT.replace_all(&collapsed, "$1");
    let mut out = tightened.trim().to_string();
    // Strip every trailing terminator, not just the last run, so that
    // re-normalizing the output is a fixed point
    while out.ends_with(';') {
        out.pop();
        out.truncate(out.trim_end().len());
    }
    out
}

/// Position of a history match: (thread index, message index).
pub type HistoryMatch = (usize, usize);

/// Scans prior threads for a query-execution action whose normalized query
/// equals the current fingerprint.
#[derive(Debug, Clone)]
pub struct HistoryMatcher {
    query_actions: Vec<String>,
}

impl HistoryMatcher {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            query_actions: config.query_actions.clone(),
        }
    }

    /// Extract the query argument from a tool message's payload, tolerating
    /// a string-encoded object.
    fn query_argument(arguments: &Value) -> Option<String> {
        let object = match arguments {
            Value::String(s) => serde_json::from_str::<Value>(s).ok()?,
            other => other.clone(),
        };
        object.get("sql").and_then(|v| v.as_str()).map(str::to_string)
    }

    /// Newest-first scan for the first prior query action matching
    /// `fingerprint`. Returns `None` when the fingerprint is empty or no
    /// message matches.
    pub fn find_match(&self, store: &ConversationStore, fingerprint: &str) -> Option<HistoryMatch> {
        let target = normalize_sql(fingerprint);
        if target.is_empty() {
            return None;
        }
        for thread in store.threads().iter().rev() {
            for message in thread.messages.iter().rev() {
                let action = match message {
                    Message::Tool(action) => action,
                    _ => continue,
                };
                if !self.query_actions.iter().any(|a| a == &action.name) {
                    continue;
                }
                let Some(query) = Self::query_argument(&action.arguments) else {
                    continue;
                };
                if normalize_sql(&query) == target {
                    return Some((thread.index, action.index));
                }
            }
        }
        None
    }

    /// Resume from history when the current query was seen before, or start
    /// an empty thread. `current_query` is the host fingerprint extraction,
    /// which may fail; any failure falls back to a plain new thread. This
    /// path never errors.
    pub fn resume_or_start(
        &self,
        store: &SharedStore,
        current_query: Result<String, anyhow::Error>,
    ) -> usize {
        let fingerprint = match current_query {
            Ok(q) => q,
            Err(e) => {
                tracing::warn!("could not extract host query fingerprint: {e}");
                return store.with(|s| s.start_new_thread());
            }
        };
        store.with(|s| match self.find_match(s, &fingerprint) {
            Some((thread_index, message_index)) => s
                .clone_thread_from_history(thread_index, message_index)
                .unwrap_or_else(|_| s.start_new_thread()),
            None => s.start_new_thread(),
        })
    }
}
