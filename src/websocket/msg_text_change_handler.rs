use tracing::info;

use super::session::SessionCtx;
use crate::db::store::StoreError;
use crate::models::{SendMessage, TextChangeMessage};
use crate::services::doc_edit_service;

/// Apply a text change to the stored content, then relay it to the other participants.
///
/// The edit is persisted before it is relayed. A file deleted mid-session is skipped.
pub async fn handle_text_change_message(ctx: &SessionCtx, change: TextChangeMessage) -> Result<(), StoreError> {
    match doc_edit_service::apply_edit(&ctx.store, ctx.file_id, &change).await? {
        Some(_) => {
            ctx.relay(&SendMessage::TextChange(ctx.stamp(change)));
        }
        None => {
            info!(
                "File {} no longer exists, skipping edit from user {}",
                ctx.file_id, ctx.user_id
            );
        }
    }
    Ok(())
}
