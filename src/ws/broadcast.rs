use std::sync::Arc;
use tracing::{debug, error};

use super::registry::{Channel, ConnectionRegistry};
use crate::models::SendMessage;

/// Fans messages out to the connections registered on a file
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver `msg` to every connection on `file_id` except the one of `exclude_user_id`.
    ///
    /// Delivery is best effort per connection; a failing connection is closed and the
    /// rest still receive the message. Returns the number of successful deliveries.
    pub fn broadcast(&self, file_id: i64, msg: &SendMessage, exclude_user_id: Option<i64>) -> usize {
        let Some(text) = encode(msg) else {
            return 0;
        };

        let mut delivered = 0;
        for (user_id, channel) in self.registry.channels_for(file_id) {
            if Some(user_id) == exclude_user_id {
                continue;
            }
            if channel.try_deliver(text.clone()) {
                delivered += 1;
            }
        }
        debug!("Broadcast on file {} reached {} connection(s)", file_id, delivered);
        delivered
    }

    /// Deliver `msg` to exactly one connection
    pub fn send_direct(&self, channel: &Channel, msg: &SendMessage) -> bool {
        match encode(msg) {
            Some(text) => channel.try_deliver(text),
            None => false,
        }
    }
}

fn encode(msg: &SendMessage) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Failed to serialize outbound message: {}", e);
            None
        }
    }
}
