use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TextChangeMessage {
    pub start: usize,
    pub delete_count: usize,
    pub insert: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CursorPositionMessage {
    pub position: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HighlightMessage {
    pub start: usize,
    pub end: usize,
}

/// Messages a client may send on a file connection.
///
/// Identity fields are never read from the client; the server stamps them before relaying.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ReceivedMessage {
    #[serde(rename = "text_change")]
    TextChange(TextChangeMessage),
    #[serde(rename = "cursor_position")]
    CursorPosition(CursorPositionMessage),
    #[serde(rename = "highlight")]
    Highlight(HighlightMessage),
    #[serde(other)]
    Unknown,
}

/// A client message after the server stamped the originator onto it
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    #[serde(flatten)]
    pub body: T,
    pub user_id: i64,
    pub file_id: i64,
}

/// Messages the server sends on a file connection
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum SendMessage {
    #[serde(rename = "user_joined")]
    UserJoined { user_id: i64, email: String },
    #[serde(rename = "initial_content")]
    InitialContent { content: String },
    #[serde(rename = "text_change")]
    TextChange(Stamped<TextChangeMessage>),
    #[serde(rename = "cursor_position")]
    CursorPosition(Stamped<CursorPositionMessage>),
    #[serde(rename = "highlight")]
    Highlight(Stamped<HighlightMessage>),
    #[serde(rename = "user_left")]
    UserLeft { user_id: i64 },
}

/// Query parameters of the collaboration upgrade request
#[derive(Deserialize, Debug, Default)]
pub struct ConnectParams {
    pub token: Option<String>,
}
