//! Rotation cursors for classification-based selection
//!
//! One cursor per classification key, lazily created on first use and owned
//! by the pool. The filtered account list is recomputed fresh by the caller
//! on every rotation, so cursors are not stable across membership changes;
//! a cursor that ran past the end of the current view wraps to zero.

use std::collections::HashMap;
use std::sync::Arc;

use account_session::SessionHandle;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum RotationKey {
    Kind(String),
    Subkind(String, String),
}

impl RotationKey {
    pub(crate) fn describe(&self) -> String {
        match self {
            RotationKey::Kind(kind) => format!("kind {kind}"),
            RotationKey::Subkind(kind, subkind) => format!("kind {kind}, subkind {subkind}"),
        }
    }
}

#[derive(Default)]
struct Cursor {
    pos: usize,
    repeats: u32,
}

#[derive(Default)]
pub(crate) struct Rotations {
    cursors: Mutex<HashMap<RotationKey, Cursor>>,
}

impl Rotations {
    /// Pick the next account from the current filtered view.
    ///
    /// With `repeat = N` the same element is returned for N further calls
    /// before the cursor advances. Returns `None` on an empty view.
    pub(crate) async fn next(
        &self,
        key: RotationKey,
        matching: &[Arc<SessionHandle>],
        repeat: u32,
    ) -> Option<Arc<SessionHandle>> {
        if matching.is_empty() {
            return None;
        }

        let mut cursors = self.cursors.lock().await;
        let cursor = cursors.entry(key).or_default();
        if cursor.pos >= matching.len() {
            cursor.pos = 0;
        }
        if cursor.repeats >= repeat {
            cursor.repeats = 0;
            let chosen = matching[cursor.pos].clone();
            cursor.pos += 1;
            Some(chosen)
        } else {
            cursor.repeats += 1;
            Some(matching[cursor.pos].clone())
        }
    }
}
