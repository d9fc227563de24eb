//! Snapshot persistence
//!
//! The whole thread list is the unit of persistence. The only compatibility
//! contract is a monotonically increasing schema version plus an ordered
//! list of forward-only migrations: each one lifts a snapshot to its target
//! version, is total (never errors), and is skipped for snapshots already
//! at or above that version. The storage medium itself is the caller's
//! concern; this module only encodes, decodes, and migrates.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{ConversationStore, Thread};

/// Current schema version written by `encode_snapshot`.
pub const SNAPSHOT_VERSION: u32 = 3;

/// Version-tagged snapshot of the full thread list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub threads: Value,
}

type Migration = fn(&mut Value);

/// Ordered migration table. Each entry lifts `threads` to the paired
/// version; entries run in sequence and only when the snapshot is older.
fn migrations() -> &'static [(u32, Migration)] {
    &[(2, add_reaction_field), (3, add_task_tree)]
}

/// v1 -> v2: user messages gained the `reaction` slot.
fn add_reaction_field(threads: &mut Value) {
    let Some(threads) = threads.as_array_mut() else {
        return;
    };
    for thread in threads {
        let Some(messages) = thread.get_mut("messages").and_then(Value::as_array_mut) else {
            continue;
        };
        for message in messages {
            if message.get("role").and_then(Value::as_str) == Some("user")
                && message.get("reaction").is_none()
            {
                if let Some(obj) = message.as_object_mut() {
                    obj.insert("reaction".to_string(), Value::Null);
                }
            }
        }
    }
}

/// v2 -> v3: threads gained the reported task tree.
fn add_task_tree(threads: &mut Value) {
    let Some(threads) = threads.as_array_mut() else {
        return;
    };
    for thread in threads {
        if let Some(obj) = thread.as_object_mut() {
            obj.entry("tasks").or_insert_with(|| Value::Array(vec![]));
        }
    }
}

/// Lift a snapshot to the current schema version in place.
pub fn migrate(snapshot: &mut Snapshot) {
    for (version, migration) in migrations() {
        if snapshot.version < *version {
            migration(&mut snapshot.threads);
            snapshot.version = *version;
        }
    }
}

/// Serialize the store's thread list into a current-version snapshot.
pub fn encode_snapshot(store: &ConversationStore) -> Result<Snapshot> {
    Ok(Snapshot {
        version: SNAPSHOT_VERSION,
        threads: serde_json::to_value(store.threads()).context("failed to serialize threads")?,
    })
}

/// Migrate and decode a snapshot back into a thread list.
pub fn decode_snapshot(mut snapshot: Snapshot) -> Result<Vec<Thread>> {
    migrate(&mut snapshot);
    serde_json::from_value(snapshot.threads).context("failed to deserialize threads")
}
