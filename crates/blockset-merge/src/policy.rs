use blockset_types::ContentHash;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::MergeError;

/// Everything a policy may consult when merging two heads.
#[derive(Clone, Debug)]
pub struct MergeInput<'a> {
    /// Payload at the merge base; `None` if the histories share no commit.
    pub base: Option<&'a Value>,
    pub local: &'a Value,
    pub remote: &'a Value,
    /// Commits on the local side since the merge base.
    pub local_ahead: usize,
    /// Commits on the remote side since the merge base.
    pub remote_ahead: usize,
    pub local_head: ContentHash,
    pub remote_head: ContentHash,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeSide {
    Local,
    Remote,
}

impl MergeInput<'_> {
    /// The side that wins conflicting edits: the one with more commits since
    /// the base, then the greater head id. Both devices of a sync pair
    /// compute the same winner.
    pub fn preferred_side(&self) -> MergeSide {
        if (self.local_ahead, self.local_head) >= (self.remote_ahead, self.remote_head) {
            MergeSide::Local
        } else {
            MergeSide::Remote
        }
    }
}

/// Produces the payload of a merge commit.
pub trait MergePolicy: Send + Sync {
    fn merge(&self, input: &MergeInput<'_>) -> Result<Value, MergeError>;
}

/// Three-way merge of top-level object fields.
///
/// Fields changed on one side only take that side's value; a field removed
/// on one side and untouched on the other is removed. Fields changed on
/// both sides to different values go to [`MergeInput::preferred_side`].
/// A payload that is not a JSON object is merged as a single field, and a
/// missing base behaves like an empty object.
#[derive(Clone, Copy, Debug, Default)]
pub struct FieldMerge;

/// Resolve one field. `None` means absent.
fn merge_field<'v>(
    base: Option<&'v Value>,
    local: Option<&'v Value>,
    remote: Option<&'v Value>,
    winner: MergeSide,
) -> (Option<&'v Value>, bool) {
    if local == remote || remote == base {
        (local, false)
    } else if local == base {
        (remote, false)
    } else {
        let chosen = match winner {
            MergeSide::Local => local,
            MergeSide::Remote => remote,
        };
        (chosen, true)
    }
}

impl MergePolicy for FieldMerge {
    fn merge(&self, input: &MergeInput<'_>) -> Result<Value, MergeError> {
        let winner = input.preferred_side();

        let (Value::Object(local), Value::Object(remote)) = (input.local, input.remote) else {
            let (merged, _) = merge_field(input.base, Some(input.local), Some(input.remote), winner);
            return Ok(merged.cloned().unwrap_or(Value::Null));
        };

        let empty = Map::new();
        let base = match input.base {
            Some(Value::Object(base)) => base,
            _ => &empty,
        };

        let mut merged = Map::new();
        let mut conflicts = 0usize;
        let keys = base.keys().chain(local.keys()).chain(remote.keys());
        for key in keys {
            if merged.contains_key(key) {
                continue;
            }
            let (value, conflict) = merge_field(base.get(key), local.get(key), remote.get(key), winner);
            conflicts += usize::from(conflict);
            if let Some(value) = value {
                merged.insert(key.clone(), value.clone());
            }
        }

        debug!(conflicts, ?winner, "field merge");
        Ok(Value::Object(merged))
    }
}

/// Keep the local payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreferLocal;

impl MergePolicy for PreferLocal {
    fn merge(&self, input: &MergeInput<'_>) -> Result<Value, MergeError> {
        Ok(input.local.clone())
    }
}

/// Keep the remote payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreferRemote;

impl MergePolicy for PreferRemote {
    fn merge(&self, input: &MergeInput<'_>) -> Result<Value, MergeError> {
        Ok(input.remote.clone())
    }
}
