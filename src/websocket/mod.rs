pub mod handler;
pub mod msg_presence_handler;
pub mod msg_text_change_handler;
pub mod session;
