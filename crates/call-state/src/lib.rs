//! Single source of truth for room presence UI.
//!
//! [`CallStore`] holds one [`ParticipantState`] per connected session plus the
//! room-level singletons (spotlight, screen share, waiting room, hard host
//! mode, local media intent). The reconciler in `call-sync` is the sole writer
//! of participant records; UI consumers read snapshots and watch the revision
//! channel for changes. Everything here is synchronous and idempotent.

use std::collections::BTreeMap;
use std::sync::Arc;

use call_proto::Role;
use call_transport::RoomHandle;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Derived presentation state for one connected session.
///
/// `is_muted` / `is_camera_off` / `is_speaking` are pure functions of the
/// last-seen transport track state; upserts replace the whole record so a
/// stale flag cannot survive a resync. `is_hand_raised` is store-local and
/// survives upserts until explicitly lowered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantState {
    pub session_id: String,
    pub identity: String,
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub is_muted: bool,
    pub is_camera_off: bool,
    pub is_hand_raised: bool,
    pub is_speaking: bool,
}

/// A user waiting for admission; not yet a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingGuest {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

struct Inner {
    room: Option<Arc<dyn RoomHandle>>,
    participants: BTreeMap<String, ParticipantState>,
    spotlight_sid: Option<String>,
    screen_share_sid: Option<String>,
    is_local_screen_sharing: bool,
    waiting_room: Vec<WaitingGuest>,
    hard_host_mode: bool,
    mic_enabled: bool,
    camera_enabled: bool,
}

impl Inner {
    fn initial() -> Self {
        Self {
            room: None,
            participants: BTreeMap::new(),
            spotlight_sid: None,
            screen_share_sid: None,
            is_local_screen_sharing: false,
            waiting_room: Vec::new(),
            hard_host_mode: false,
            mic_enabled: true,
            camera_enabled: true,
        }
    }
}

/// Observable in-memory store for one room session. Created empty when the
/// session's UI mounts, fully reset on room exit and before the next
/// reconciler attaches.
pub struct CallStore {
    inner: RwLock<Inner>,
    revision: watch::Sender<u64>,
}

impl CallStore {
    pub fn new() -> Arc<Self> {
        let (revision, _) = watch::channel(0);
        Arc::new(Self {
            inner: RwLock::new(Inner::initial()),
            revision,
        })
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Receiver that changes whenever any store mutation lands.
    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn set_room(&self, room: Option<Arc<dyn RoomHandle>>) {
        self.inner.write().room = room;
        self.bump();
    }

    pub fn room(&self) -> Option<Arc<dyn RoomHandle>> {
        self.inner.read().room.clone()
    }

    /// Upsert keyed by session id. Full record replacement, except the
    /// store-local hand-raise flag which is carried over from the existing
    /// record.
    pub fn upsert_participant(&self, mut state: ParticipantState) {
        let mut guard = self.inner.write();
        if let Some(existing) = guard.participants.get(&state.session_id) {
            state.is_hand_raised = existing.is_hand_raised;
        }
        guard.participants.insert(state.session_id.clone(), state);
        drop(guard);
        self.bump();
    }

    /// Delete by session id; a no-op when absent. Singletons pointing at the
    /// removed session are cleared alongside it.
    pub fn remove_participant(&self, sid: &str) {
        let mut guard = self.inner.write();
        if guard.participants.remove(sid).is_none() {
            return;
        }
        if guard.spotlight_sid.as_deref() == Some(sid) {
            guard.spotlight_sid = None;
        }
        if guard.screen_share_sid.as_deref() == Some(sid) {
            guard.screen_share_sid = None;
        }
        drop(guard);
        self.bump();
    }

    pub fn promote_to_host(&self, sid: &str) {
        self.set_role(sid, Role::Host);
    }

    pub fn demote_to_member(&self, sid: &str) {
        self.set_role(sid, Role::Member);
    }

    fn set_role(&self, sid: &str, role: Role) {
        let mut guard = self.inner.write();
        let Some(participant) = guard.participants.get_mut(sid) else {
            debug!(target = "call.store", sid, "role change for unknown session");
            return;
        };
        participant.role = role;
        drop(guard);
        self.bump();
    }

    /// `None` clears the spotlight; an unknown sid is a no-op.
    pub fn set_spotlight(&self, sid: Option<&str>) {
        let mut guard = self.inner.write();
        match sid {
            Some(sid) if !guard.participants.contains_key(sid) => return,
            _ => guard.spotlight_sid = sid.map(str::to_string),
        }
        drop(guard);
        self.bump();
    }

    pub fn raise_hand(&self, sid: &str) {
        self.set_hand(sid, true);
    }

    pub fn lower_hand(&self, sid: &str) {
        self.set_hand(sid, false);
    }

    fn set_hand(&self, sid: &str, raised: bool) {
        let mut guard = self.inner.write();
        let Some(participant) = guard.participants.get_mut(sid) else {
            return;
        };
        participant.is_hand_raised = raised;
        drop(guard);
        self.bump();
    }

    pub fn set_screen_share(&self, sid: Option<&str>) {
        self.inner.write().screen_share_sid = sid.map(str::to_string);
        self.bump();
    }

    pub fn set_local_screen_sharing(&self, sharing: bool) {
        self.inner.write().is_local_screen_sharing = sharing;
        self.bump();
    }

    /// Append to the waiting room; duplicate user ids are ignored so a
    /// re-knock cannot occupy two slots.
    pub fn enqueue_waiting(&self, guest: WaitingGuest) {
        let mut guard = self.inner.write();
        if guard.waiting_room.iter().any(|g| g.user_id == guest.user_id) {
            return;
        }
        guard.waiting_room.push(guest);
        drop(guard);
        self.bump();
    }

    pub fn dequeue_waiting(&self, user_id: &str) -> Option<WaitingGuest> {
        let mut guard = self.inner.write();
        let index = guard
            .waiting_room
            .iter()
            .position(|g| g.user_id == user_id)?;
        let guest = guard.waiting_room.remove(index);
        drop(guard);
        self.bump();
        Some(guest)
    }

    pub fn set_hard_host_mode(&self, enabled: bool) {
        self.inner.write().hard_host_mode = enabled;
        self.bump();
    }

    /// Intent flags for the local session's own publish state. The transport
    /// call that applies them lives in `call-sync`; the store only records
    /// what the user asked for.
    pub fn set_mic_enabled(&self, enabled: bool) {
        self.inner.write().mic_enabled = enabled;
        self.bump();
    }

    pub fn set_camera_enabled(&self, enabled: bool) {
        self.inner.write().camera_enabled = enabled;
        self.bump();
    }

    pub fn participant(&self, sid: &str) -> Option<ParticipantState> {
        self.inner.read().participants.get(sid).cloned()
    }

    /// All participants ordered by session id for stable iteration.
    pub fn participants(&self) -> Vec<ParticipantState> {
        self.inner.read().participants.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().participants.is_empty()
    }

    pub fn spotlight(&self) -> Option<ParticipantState> {
        let guard = self.inner.read();
        let sid = guard.spotlight_sid.as_deref()?;
        guard.participants.get(sid).cloned()
    }

    pub fn screen_share_sid(&self) -> Option<String> {
        self.inner.read().screen_share_sid.clone()
    }

    pub fn is_local_screen_sharing(&self) -> bool {
        self.inner.read().is_local_screen_sharing
    }

    pub fn waiting_room(&self) -> Vec<WaitingGuest> {
        self.inner.read().waiting_room.clone()
    }

    pub fn hard_host_mode(&self) -> bool {
        self.inner.read().hard_host_mode
    }

    pub fn mic_enabled(&self) -> bool {
        self.inner.read().mic_enabled
    }

    pub fn camera_enabled(&self) -> bool {
        self.inner.read().camera_enabled
    }

    /// Total reset to the initial empty shape. The primary defense against
    /// stale participants leaking across rejoins and reconnects: the whole
    /// store is cleared, never incrementally torn down.
    pub fn reset_room(&self) {
        *self.inner.write() = Inner::initial();
        self.bump();
    }
}
