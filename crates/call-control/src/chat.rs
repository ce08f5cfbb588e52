//! Peer-broadcast text chat for one call session.
//!
//! The message log is append-only and in-memory; it lives exactly as long as
//! the owning [`CallChat`] value, so changing rooms drops the history with it.

use std::sync::Arc;
use std::time::SystemTime;

use call_proto::{ParticipantMetadata, SignalEnvelope};
use call_sync::DataFrame;
use call_transport::RoomHandle;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub text: String,
    pub created_at: SystemTime,
    pub is_local: bool,
}

pub struct CallChat {
    room: Arc<dyn RoomHandle>,
    log: Arc<Mutex<Vec<ChatMessage>>>,
    task: JoinHandle<()>,
}

impl CallChat {
    /// Start the receive loop over the reconciler's data-frame feed.
    pub fn spawn(room: Arc<dyn RoomHandle>, frames: broadcast::Receiver<DataFrame>) -> Self {
        let log = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(receive_task(room.clone(), log.clone(), frames));
        Self { room, log, task }
    }

    /// Broadcast `text` and append the local echo. The echo lands before the
    /// broadcast is attempted, so the sender sees their message regardless of
    /// whether delivery succeeds. Whitespace-only text is a no-op.
    pub fn send_message(&self, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }

        let local = self.room.local_participant();
        let metadata = ParticipantMetadata::decode(&local.identity(), local.metadata().as_deref());
        self.log.lock().push(ChatMessage {
            id: Uuid::new_v4().to_string(),
            user_id: metadata.user_id.clone(),
            name: metadata.name.clone(),
            text: trimmed.to_string(),
            created_at: SystemTime::now(),
            is_local: true,
        });

        let envelope = SignalEnvelope::Chat {
            text: trimmed.to_string(),
            user_id: metadata.user_id,
            name: metadata.name,
        };
        let bytes = match envelope.to_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(target = "call.chat", error = %err, "chat envelope encode failed");
                return;
            }
        };
        if let Err(err) = self.room.publish_data(bytes, true) {
            warn!(target = "call.chat", error = %err, "chat broadcast not delivered");
        }
    }

    /// The append-only log, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.log.lock().clone()
    }

    /// The local session id, read live — it changes across reconnects.
    pub fn own_sid(&self) -> String {
        self.room.local_participant().sid()
    }
}

impl Drop for CallChat {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn receive_task(
    room: Arc<dyn RoomHandle>,
    log: Arc<Mutex<Vec<ChatMessage>>>,
    mut frames: broadcast::Receiver<DataFrame>,
) {
    loop {
        match frames.recv().await {
            Ok(frame) => {
                // Loopback copy of our own send; the echo already covers it.
                // The sid is re-read per frame because the transport assigns
                // a fresh one on reconnect.
                if frame.sid == room.local_participant().sid() {
                    continue;
                }
                match SignalEnvelope::from_bytes(&frame.payload) {
                    Ok(SignalEnvelope::Chat {
                        text,
                        user_id,
                        name,
                    }) => {
                        let name = if name.trim().is_empty() {
                            frame.identity.clone()
                        } else {
                            name
                        };
                        let user_id = if user_id.trim().is_empty() {
                            frame.identity
                        } else {
                            user_id
                        };
                        log.lock().push(ChatMessage {
                            id: Uuid::new_v4().to_string(),
                            user_id,
                            name,
                            text,
                            created_at: SystemTime::now(),
                            is_local: false,
                        });
                    }
                    Ok(_) => {}
                    Err(err) => {
                        debug!(target = "call.chat", error = %err, "unrecognized data frame, ignored");
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(target = "call.chat", skipped, "chat feed lagged, messages lost");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
