use crate::domain::ports::{RealtimeChannel, SessionEvent};
use crate::domain::session::{Session, SessionId};
use crate::domain::user::UserId;
use serde::Serialize;
use tokio::sync::broadcast;

/// Default number of buffered events per subscriber.
pub const DEFAULT_CAPACITY: usize = 256;

/// An event addressed to the live room of one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomBroadcast {
    pub session_id: SessionId,
    pub recipients: [UserId; 2],
    pub payload: SessionEvent,
}

/// Fan-out hub for live-session events.
///
/// Created at server start and handed to the services that broadcast; the
/// media layer subscribes and forwards to connected participants.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<RoomBroadcast>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomBroadcast> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RealtimeChannel for BroadcastHub {
    fn emit_to_session_room(&self, session: &Session, event: SessionEvent) {
        let message = RoomBroadcast {
            session_id: session.id,
            recipients: session.participants(),
            payload: event,
        };
        if self.sender.send(message).is_err() {
            tracing::debug!(session_id = %session.id, "No live-room subscribers, event dropped");
        }
    }
}
