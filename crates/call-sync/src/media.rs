//! Local-session media intent.
//!
//! The store's `mic_enabled` / `camera_enabled` flags are the authoritative
//! record of what the user asked for; the transport call that applies them is
//! best-effort. A rejected call is logged and swallowed, so the intent flag
//! can briefly lead the actual publish state until the next user retry.

use std::sync::Arc;

use call_proto::ParticipantMetadata;
use call_state::CallStore;
use call_transport::RoomHandle;
use tracing::warn;

pub struct MediaControls {
    store: Arc<CallStore>,
    room: Arc<dyn RoomHandle>,
}

impl MediaControls {
    pub fn new(store: Arc<CallStore>, room: Arc<dyn RoomHandle>) -> Self {
        Self { store, room }
    }

    pub fn set_microphone(&self, enabled: bool) {
        self.store.set_mic_enabled(enabled);
        if let Err(err) = self.room.set_microphone_enabled(enabled) {
            warn!(target = "call.media", error = %err, enabled, "microphone toggle not applied");
        }
    }

    pub fn set_camera(&self, enabled: bool) {
        self.store.set_camera_enabled(enabled);
        if let Err(err) = self.room.set_camera_enabled(enabled) {
            warn!(target = "call.media", error = %err, enabled, "camera toggle not applied");
        }
    }

    /// Writes the metadata envelope onto the local participant after connect.
    pub fn publish_local_metadata(&self, metadata: &ParticipantMetadata) {
        if let Err(err) = self.room.set_local_metadata(metadata.encode()) {
            warn!(target = "call.media", error = %err, "local metadata not applied");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_proto::Role;
    use call_transport::{
        LocalParticipant, LocalRoom, ParticipantHandle, RoomEvent, TransportError,
        TransportResult,
    };
    use bytes::Bytes;
    use tokio::sync::broadcast;

    #[test]
    fn toggles_write_intent_and_transport_state() {
        let room = LocalRoom::new(LocalParticipant::new("sid-1", "user-1"));
        let store = CallStore::new();
        let controls = MediaControls::new(store.clone(), room.clone());

        controls.set_microphone(false);
        controls.set_camera(false);
        assert!(!store.mic_enabled());
        assert!(!store.camera_enabled());
        assert!(!room.local_participant().is_microphone_enabled());
        assert!(!room.local_participant().is_camera_enabled());
    }

    #[test]
    fn metadata_publish_lands_on_local_participant() {
        let room = LocalRoom::new(LocalParticipant::new("sid-1", "user-1"));
        let controls = MediaControls::new(CallStore::new(), room.clone());
        controls.publish_local_metadata(&ParticipantMetadata {
            user_id: "user-1".into(),
            name: "Ann".into(),
            avatar: None,
            role: Role::Member,
        });
        let decoded = ParticipantMetadata::decode(
            "user-1",
            room.local_participant().metadata().as_deref(),
        );
        assert_eq!(decoded.name, "Ann");
        assert_eq!(decoded.role, Role::Member);
    }

    /// Room whose control surface always rejects.
    struct DeadRoom {
        local: Arc<LocalParticipant>,
        events: broadcast::Sender<RoomEvent>,
    }

    impl DeadRoom {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                local: LocalParticipant::new("sid-1", "user-1"),
                events: broadcast::channel(8).0,
            })
        }
    }

    impl RoomHandle for DeadRoom {
        fn local_participant(&self) -> Arc<dyn ParticipantHandle> {
            self.local.clone()
        }

        fn remote_participants(&self) -> Vec<Arc<dyn ParticipantHandle>> {
            Vec::new()
        }

        fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
            self.events.subscribe()
        }

        fn publish_data(&self, _payload: Bytes, _reliable: bool) -> TransportResult<()> {
            Err(TransportError::Closed)
        }

        fn set_microphone_enabled(&self, _enabled: bool) -> TransportResult<()> {
            Err(TransportError::Closed)
        }

        fn set_camera_enabled(&self, _enabled: bool) -> TransportResult<()> {
            Err(TransportError::Closed)
        }

        fn set_local_metadata(&self, _metadata: String) -> TransportResult<()> {
            Err(TransportError::Closed)
        }
    }

    #[test]
    fn intent_flag_sticks_when_transport_rejects() {
        let store = CallStore::new();
        let controls = MediaControls::new(store.clone(), DeadRoom::new());
        controls.set_microphone(false);
        assert!(!store.mic_enabled());
    }
}
