//! Boundary traits for the hosted real-time media transport.
//!
//! Connection establishment, media routing and SFU behavior all live in the
//! provider's SDK; this crate models only the surface the call core consumes:
//! a room handle exposing participants, a lifecycle event stream, and
//! best-effort local controls. [`LocalRoom`] is the in-memory twin used by
//! tests and in-process wiring.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport channel closed")]
    Closed,
    #[error("transport error: {0}")]
    Transport(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// One connected session, local or remote. `sid` is assigned per connection
/// instance and changes across reconnects; `identity` is the stable logical
/// identity (the application user id).
pub trait ParticipantHandle: Send + Sync {
    fn sid(&self) -> String;
    fn identity(&self) -> String;
    fn metadata(&self) -> Option<String>;
    fn is_microphone_enabled(&self) -> bool;
    fn is_camera_enabled(&self) -> bool;
    fn is_speaking(&self) -> bool;
}

/// Participant/track lifecycle events delivered by the transport, in the
/// order the provider emits them.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    ParticipantConnected { sid: String },
    ParticipantDisconnected { sid: String },
    TrackSubscribed { sid: String },
    TrackUnsubscribed { sid: String },
    TrackMuted { sid: String },
    TrackUnmuted { sid: String },
    TrackPublished { sid: String },
    LocalTrackPublished,
    LocalTrackUnpublished,
    Reconnected,
    DataReceived { sid: String, payload: Bytes },
}

/// Handle to one active room session. All control methods are best-effort:
/// callers log failures and move on rather than retrying.
pub trait RoomHandle: Send + Sync {
    fn local_participant(&self) -> Arc<dyn ParticipantHandle>;
    fn remote_participants(&self) -> Vec<Arc<dyn ParticipantHandle>>;
    fn subscribe(&self) -> broadcast::Receiver<RoomEvent>;
    fn publish_data(&self, payload: Bytes, reliable: bool) -> TransportResult<()>;
    fn set_microphone_enabled(&self, enabled: bool) -> TransportResult<()>;
    fn set_camera_enabled(&self, enabled: bool) -> TransportResult<()>;
    fn set_local_metadata(&self, metadata: String) -> TransportResult<()>;
}

/// Scriptable participant record backing [`LocalRoom`].
pub struct LocalParticipant {
    sid: String,
    identity: String,
    metadata: RwLock<Option<String>>,
    microphone: AtomicBool,
    camera: AtomicBool,
    speaking: AtomicBool,
}

impl LocalParticipant {
    pub fn new(sid: impl Into<String>, identity: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            sid: sid.into(),
            identity: identity.into(),
            metadata: RwLock::new(None),
            microphone: AtomicBool::new(true),
            camera: AtomicBool::new(true),
            speaking: AtomicBool::new(false),
        })
    }

    pub fn set_metadata(&self, metadata: Option<String>) {
        *self.metadata.write() = metadata;
    }

    pub fn set_microphone(&self, enabled: bool) {
        self.microphone.store(enabled, Ordering::SeqCst);
    }

    pub fn set_camera(&self, enabled: bool) {
        self.camera.store(enabled, Ordering::SeqCst);
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.speaking.store(speaking, Ordering::SeqCst);
    }
}

impl ParticipantHandle for LocalParticipant {
    fn sid(&self) -> String {
        self.sid.clone()
    }

    fn identity(&self) -> String {
        self.identity.clone()
    }

    fn metadata(&self) -> Option<String> {
        self.metadata.read().clone()
    }

    fn is_microphone_enabled(&self) -> bool {
        self.microphone.load(Ordering::SeqCst)
    }

    fn is_camera_enabled(&self) -> bool {
        self.camera.load(Ordering::SeqCst)
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }
}

/// In-memory room for tests and in-process wiring. Events are emitted
/// manually; `publish_data` records every payload and loops it back to
/// subscribers as [`RoomEvent::DataReceived`] from the local sid, so two
/// components attached to the same `LocalRoom` can talk to each other.
pub struct LocalRoom {
    local: Arc<LocalParticipant>,
    remotes: RwLock<HashMap<String, Arc<LocalParticipant>>>,
    events: broadcast::Sender<RoomEvent>,
    published: Mutex<Vec<(Bytes, bool)>>,
    fail_publishes: AtomicBool,
    remote_reads: AtomicUsize,
}

impl LocalRoom {
    pub fn new(local: Arc<LocalParticipant>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            local,
            remotes: RwLock::new(HashMap::new()),
            events,
            published: Mutex::new(Vec::new()),
            fail_publishes: AtomicBool::new(false),
            remote_reads: AtomicUsize::new(0),
        })
    }

    pub fn add_remote(&self, participant: Arc<LocalParticipant>) {
        self.remotes
            .write()
            .insert(participant.sid.clone(), participant);
    }

    pub fn remove_remote(&self, sid: &str) {
        self.remotes.write().remove(sid);
    }

    pub fn emit(&self, event: RoomEvent) {
        let _ = self.events.send(event);
    }

    /// Payloads recorded by `publish_data`, in send order.
    pub fn published(&self) -> Vec<(Bytes, bool)> {
        self.published.lock().clone()
    }

    /// When set, `publish_data` rejects every payload without recording it.
    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Number of `remote_participants` reads so far; lets tests count full
    /// room derivation passes.
    pub fn remote_participant_reads(&self) -> usize {
        self.remote_reads.load(Ordering::SeqCst)
    }
}

impl RoomHandle for LocalRoom {
    fn local_participant(&self) -> Arc<dyn ParticipantHandle> {
        self.local.clone()
    }

    fn remote_participants(&self) -> Vec<Arc<dyn ParticipantHandle>> {
        self.remote_reads.fetch_add(1, Ordering::SeqCst);
        self.remotes
            .read()
            .values()
            .map(|p| p.clone() as Arc<dyn ParticipantHandle>)
            .collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    fn publish_data(&self, payload: Bytes, reliable: bool) -> TransportResult<()> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(TransportError::Transport("publish rejected".into()));
        }
        self.published.lock().push((payload.clone(), reliable));
        let _ = self.events.send(RoomEvent::DataReceived {
            sid: self.local.sid(),
            payload,
        });
        Ok(())
    }

    fn set_microphone_enabled(&self, enabled: bool) -> TransportResult<()> {
        self.local.set_microphone(enabled);
        Ok(())
    }

    fn set_camera_enabled(&self, enabled: bool) -> TransportResult<()> {
        self.local.set_camera(enabled);
        Ok(())
    }

    fn set_local_metadata(&self, metadata: String) -> TransportResult<()> {
        self.local.set_metadata(Some(metadata));
        Ok(())
    }
}
