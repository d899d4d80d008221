use tracing::debug;

use super::session::SessionCtx;
use crate::models::{CursorPositionMessage, HighlightMessage, SendMessage};

/// Relay a cursor move; nothing is stored
pub fn handle_cursor_message(ctx: &SessionCtx, cursor: CursorPositionMessage) {
    debug!("Cursor of user {} on file {} at {}", ctx.user_id, ctx.file_id, cursor.position);
    ctx.relay(&SendMessage::CursorPosition(ctx.stamp(cursor)));
}

/// Relay a highlighted range; nothing is stored
pub fn handle_highlight_message(ctx: &SessionCtx, highlight: HighlightMessage) {
    debug!(
        "Highlight of user {} on file {}: {}..{}",
        ctx.user_id, ctx.file_id, highlight.start, highlight.end
    );
    ctx.relay(&SendMessage::Highlight(ctx.stamp(highlight)));
}
