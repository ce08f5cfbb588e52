//! Host-side control broadcasts and the recipient-side camera-on prompt.

use std::sync::Arc;
use std::time::SystemTime;

use call_proto::{
    HostAction, HostRequestKind, ParticipantMetadata, Role, SignalEnvelope,
};
use call_state::CallStore;
use call_sync::DataFrame;
use call_transport::RoomHandle;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Sends host-only control envelopes over the reliable data channel.
///
/// The `is_host` gate is re-derived from the local participant's own metadata
/// on every send. It is a UX guard, not a security boundary: the channel has
/// no server-side sender verification, so the UI above must also keep host
/// controls away from non-hosts.
pub struct HostControls {
    store: Arc<CallStore>,
    room: Arc<dyn RoomHandle>,
}

impl HostControls {
    pub fn new(store: Arc<CallStore>, room: Arc<dyn RoomHandle>) -> Self {
        Self { store, room }
    }

    fn local_metadata(&self) -> ParticipantMetadata {
        let local = self.room.local_participant();
        ParticipantMetadata::decode(&local.identity(), local.metadata().as_deref())
    }

    /// Request `action` against the session `target_sid`. Non-hosts and
    /// unknown targets produce no broadcast.
    pub fn send_host_action(&self, action: HostAction, target_sid: &str) {
        match self.local_metadata().role {
            Role::Host => {}
            Role::Guest | Role::Member => {
                debug!(target = "call.host", ?action, "host action from non-host, dropped");
                return;
            }
        }
        let Some(target) = self.store.participant(target_sid) else {
            debug!(target = "call.host", target_sid, "host action for unknown session, dropped");
            return;
        };
        self.broadcast(SignalEnvelope::HostAction {
            action,
            target: target.identity,
        });
    }

    /// The transport cannot force a remote camera on, so this is request-only:
    /// the target sees a prompt (via [`CameraRequestListener`]) and decides.
    pub fn send_camera_on_request(&self, target_sid: &str) {
        let metadata = self.local_metadata();
        match metadata.role {
            Role::Host => {}
            Role::Guest | Role::Member => {
                debug!(target = "call.host", "camera request from non-host, dropped");
                return;
            }
        }
        let Some(target) = self.store.participant(target_sid) else {
            debug!(target = "call.host", target_sid, "camera request for unknown session, dropped");
            return;
        };
        let from = self.room.local_participant().identity();
        let message = format!("{} asked you to turn your camera on", metadata.name);
        self.broadcast(SignalEnvelope::HostRequest {
            request: HostRequestKind::CameraOn,
            from,
            from_name: metadata.name,
            target: target.identity,
            message: Some(message),
        });
    }

    fn broadcast(&self, envelope: SignalEnvelope) {
        let bytes = match envelope.to_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(target = "call.host", error = %err, "envelope encode failed");
                return;
            }
        };
        if let Err(err) = self.room.publish_data(bytes, true) {
            warn!(target = "call.host", error = %err, "host broadcast not delivered");
        }
    }
}

/// A camera-on request surfaced to the local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraPrompt {
    pub from_name: String,
    pub message: Option<String>,
    pub received_at: SystemTime,
}

/// Watches the data-frame feed for `host_request` envelopes addressed to our
/// own identity; anything else is ignored. Holds a single prompt slot, newest
/// request wins, clearable by the recipient.
pub struct CameraRequestListener {
    prompt: Arc<Mutex<Option<CameraPrompt>>>,
    task: JoinHandle<()>,
}

impl CameraRequestListener {
    pub fn spawn(own_identity: String, mut frames: broadcast::Receiver<DataFrame>) -> Self {
        let prompt = Arc::new(Mutex::new(None));
        let slot = prompt.clone();
        let task = tokio::spawn(async move {
            loop {
                match frames.recv().await {
                    Ok(frame) => match SignalEnvelope::from_bytes(&frame.payload) {
                        Ok(SignalEnvelope::HostRequest {
                            request: HostRequestKind::CameraOn,
                            from_name,
                            target,
                            message,
                            ..
                        }) if target == own_identity => {
                            *slot.lock() = Some(CameraPrompt {
                                from_name,
                                message,
                                received_at: SystemTime::now(),
                            });
                        }
                        Ok(_) => {}
                        Err(err) => {
                            debug!(target = "call.host", error = %err, "unrecognized data frame, ignored");
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Self { prompt, task }
    }

    pub fn prompt(&self) -> Option<CameraPrompt> {
        self.prompt.lock().clone()
    }

    pub fn clear(&self) {
        *self.prompt.lock() = None;
    }
}

impl Drop for CameraRequestListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_transport::{LocalParticipant, LocalRoom};

    fn metadata(name: &str, role: Role) -> String {
        ParticipantMetadata {
            user_id: format!("uid-{name}"),
            name: name.into(),
            avatar: None,
            role,
        }
        .encode()
    }

    fn room_as(role: Role) -> Arc<LocalRoom> {
        let local = LocalParticipant::new("local-sid", "local-user");
        local.set_metadata(Some(metadata("Ann", role)));
        let room = LocalRoom::new(local);
        room.add_remote(LocalParticipant::new("sid-t", "user-t"));
        room
    }

    fn store_with_target() -> Arc<CallStore> {
        let store = CallStore::new();
        store.upsert_participant(call_state::ParticipantState {
            session_id: "sid-t".into(),
            identity: "user-t".into(),
            user_id: "user-t".into(),
            display_name: "Tia".into(),
            avatar_url: None,
            role: Role::Member,
            is_muted: false,
            is_camera_off: false,
            is_hand_raised: false,
            is_speaking: false,
        });
        store
    }

    #[test]
    fn non_host_sends_produce_no_broadcast() {
        for role in [Role::Guest, Role::Member] {
            let room = room_as(role);
            let controls = HostControls::new(store_with_target(), room.clone());
            controls.send_host_action(HostAction::Mute, "sid-t");
            controls.send_camera_on_request("sid-t");
            assert!(room.published().is_empty());
        }
    }

    #[test]
    fn host_action_targets_stable_identity() {
        let room = room_as(Role::Host);
        let controls = HostControls::new(store_with_target(), room.clone());
        controls.send_host_action(HostAction::Mute, "sid-t");

        let published = room.published();
        assert_eq!(published.len(), 1);
        assert!(published[0].1, "host actions go over the reliable channel");
        let envelope = SignalEnvelope::from_bytes(&published[0].0).expect("decode");
        assert_eq!(
            envelope,
            SignalEnvelope::HostAction {
                action: HostAction::Mute,
                target: "user-t".into(),
            }
        );
    }

    #[test]
    fn unknown_target_session_is_a_no_op() {
        let room = room_as(Role::Host);
        let controls = HostControls::new(store_with_target(), room.clone());
        controls.send_host_action(HostAction::Kick, "sid-ghost");
        assert!(room.published().is_empty());
    }

    #[test]
    fn camera_request_carries_requester_name() {
        let room = room_as(Role::Host);
        let controls = HostControls::new(store_with_target(), room.clone());
        controls.send_camera_on_request("sid-t");

        let published = room.published();
        assert_eq!(published.len(), 1);
        match SignalEnvelope::from_bytes(&published[0].0).expect("decode") {
            SignalEnvelope::HostRequest {
                request,
                from_name,
                target,
                message,
                ..
            } => {
                assert_eq!(request, HostRequestKind::CameraOn);
                assert_eq!(from_name, "Ann");
                assert_eq!(target, "user-t");
                assert!(message.expect("message").contains("Ann"));
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[tokio::test]
    async fn listener_surfaces_only_requests_addressed_to_us() {
        let (frames_tx, frames_rx) = broadcast::channel(16);
        let listener = CameraRequestListener::spawn("user-me".into(), frames_rx);

        let misaddressed = SignalEnvelope::HostRequest {
            request: HostRequestKind::CameraOn,
            from: "host-1".into(),
            from_name: "Ann".into(),
            target: "user-other".into(),
            message: None,
        };
        frames_tx
            .send(DataFrame {
                sid: "sid-h".into(),
                identity: "host-1".into(),
                payload: misaddressed.to_bytes().expect("encode"),
            })
            .expect("send");
        tokio::task::yield_now().await;
        assert!(listener.prompt().is_none());

        let addressed = SignalEnvelope::HostRequest {
            request: HostRequestKind::CameraOn,
            from: "host-1".into(),
            from_name: "Ann".into(),
            target: "user-me".into(),
            message: Some("please".into()),
        };
        frames_tx
            .send(DataFrame {
                sid: "sid-h".into(),
                identity: "host-1".into(),
                payload: addressed.to_bytes().expect("encode"),
            })
            .expect("send");
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        let prompt = listener.prompt().expect("prompt set");
        assert_eq!(prompt.from_name, "Ann");
        assert_eq!(prompt.message.as_deref(), Some("please"));

        listener.clear();
        assert!(listener.prompt().is_none());
    }

    #[tokio::test]
    async fn listener_ignores_undecodable_frames() {
        let (frames_tx, frames_rx) = broadcast::channel(16);
        let listener = CameraRequestListener::spawn("user-me".into(), frames_rx);
        frames_tx
            .send(DataFrame {
                sid: "sid-x".into(),
                identity: "user-x".into(),
                payload: bytes::Bytes::from_static(b"{\"type\":\"mystery\"}"),
            })
            .expect("send");
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert!(listener.prompt().is_none());
    }
}
