//! Positional text edits against the authoritative content of a file.
//!
//! Edits are applied in the order the server receives them, with no transform
//! against edits that other users made concurrently (last write wins). Two users
//! editing overlapping ranges at the same time get a deterministic result that
//! depends only on arrival order. Offsets are counted in Unicode scalar values.

use tracing::debug;

use crate::db::store::{FileStore, StoreError};
use crate::models::TextChangeMessage;

/// Remove `[start, start + delete_count)` from `content` and insert `insert` at `start`.
///
/// Offsets past the end are clamped to the content length instead of failing,
/// since the document may have changed since the client computed the edit.
pub fn splice_content(content: &str, start: usize, delete_count: usize, insert: &str) -> String {
    let len = content.chars().count();
    let start = start.min(len);
    let end = start.saturating_add(delete_count).min(len);

    let mut out = String::with_capacity(content.len() + insert.len());
    out.extend(content.chars().take(start));
    out.push_str(insert);
    out.extend(content.chars().skip(end));
    out
}

/// Apply a text change to a file and persist it before returning.
///
/// Returns the new content, or `None` when the file has been deleted.
pub async fn apply_edit(
    store: &FileStore,
    file_id: i64,
    change: &TextChangeMessage,
) -> Result<Option<String>, StoreError> {
    let TextChangeMessage { start, delete_count, insert } = change.clone();
    let updated = store
        .edit_content(file_id, move |content| splice_content(content, start, delete_count, &insert))
        .await?;

    if updated.is_some() {
        debug!("Applied edit to file {}: start={}, delete_count={}", file_id, start, delete_count);
    }
    Ok(updated)
}
