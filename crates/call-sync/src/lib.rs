//! Room event reconciler: translates the transport's participant/track
//! lifecycle events into [`CallStore`] mutations.
//!
//! One [`RoomSync`] owns one active room attachment. Attach resets the store,
//! snapshots the local participant and every remote already present, then
//! spawns a task that reacts to events. Track-level events never touch the
//! store directly; they arm a single-slot debounce whose expiry runs one full
//! room derivation, so bursts collapse into a single pass. Teardown flips the
//! active guard before anything else so a late event or pending debounce is
//! discarded instead of resurrecting state into the next session.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use call_proto::ParticipantMetadata;
use call_state::{CallStore, ParticipantState};
use call_transport::{ParticipantHandle, RoomEvent, RoomHandle};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

mod media;

pub use media::MediaControls;

/// Data-channel payload surfaced to `call-control` listeners, with the
/// sender's stable identity already resolved from the roster.
#[derive(Debug, Clone)]
pub struct DataFrame {
    pub sid: String,
    pub identity: String,
    pub payload: Bytes,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Quiet window before a burst of track events is folded into one resync.
    pub debounce: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(80),
        }
    }
}

/// Handle to one active room attachment. Dropping it tears the attachment
/// down; [`RoomSync::detach`] does the same but waits for the task to stop
/// before the final store reset.
pub struct RoomSync {
    store: Arc<CallStore>,
    active: Arc<AtomicBool>,
    close_tx: broadcast::Sender<()>,
    data_tx: broadcast::Sender<DataFrame>,
    task: Option<JoinHandle<()>>,
}

impl RoomSync {
    /// Attach to a room session. The store is reset, then populated from the
    /// room's current roster before this returns: a room may already hold
    /// participants when our listeners register, and all of them must be
    /// visible without waiting for a future event.
    pub fn attach(store: Arc<CallStore>, room: Arc<dyn RoomHandle>, options: SyncOptions) -> Self {
        store.reset_room();
        store.set_room(Some(room.clone()));

        let events = room.subscribe();
        sync_full_room(&store, &room);

        let active = Arc::new(AtomicBool::new(true));
        let (close_tx, close_rx) = broadcast::channel(1);
        let (data_tx, _) = broadcast::channel(64);
        let task = tokio::spawn(sync_task(
            store.clone(),
            room,
            active.clone(),
            events,
            close_rx,
            data_tx.clone(),
            options.debounce,
        ));

        Self {
            store,
            active,
            close_tx,
            data_tx,
            task: Some(task),
        }
    }

    /// Receiver for data-channel payloads observed on this attachment.
    pub fn data_frames(&self) -> broadcast::Receiver<DataFrame> {
        self.data_tx.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Tear down: deactivate first (synchronously), wait for the task to
    /// stop, then reset the store for the next session.
    pub async fn detach(&mut self) {
        self.deactivate();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.store.reset_room();
    }

    fn deactivate(&self) {
        // The guard must flip before any other cleanup so in-flight handlers
        // observe it before their next store mutation.
        self.active.store(false, Ordering::SeqCst);
        let _ = self.close_tx.send(());
    }
}

impl Drop for RoomSync {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.deactivate();
            task.abort();
            self.store.reset_room();
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn sync_task(
    store: Arc<CallStore>,
    room: Arc<dyn RoomHandle>,
    active: Arc<AtomicBool>,
    mut events: broadcast::Receiver<RoomEvent>,
    mut close_rx: broadcast::Receiver<()>,
    data_tx: broadcast::Sender<DataFrame>,
    debounce: Duration,
) {
    // Single-slot pending resync; re-arming replaces the deadline.
    let mut resync_at: Option<Instant> = None;

    loop {
        // Copy the deadline out so the armed future does not borrow the slot
        // the event handlers rewrite.
        let deadline = resync_at;
        let pending_resync = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    handle_event(&store, &room, &active, &data_tx, &mut resync_at, debounce, event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target = "call.sync", skipped, "event stream lagged, forcing resync");
                    if active.load(Ordering::SeqCst) {
                        resync_at = None;
                        sync_full_room(&store, &room);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = pending_resync => {
                resync_at = None;
                if active.load(Ordering::SeqCst) {
                    sync_full_room(&store, &room);
                }
            }
            _ = close_rx.recv() => break,
        }
    }
}

fn handle_event(
    store: &Arc<CallStore>,
    room: &Arc<dyn RoomHandle>,
    active: &AtomicBool,
    data_tx: &broadcast::Sender<DataFrame>,
    resync_at: &mut Option<Instant>,
    debounce: Duration,
    event: RoomEvent,
) {
    if !active.load(Ordering::SeqCst) {
        debug!(target = "call.sync", ?event, "event after teardown, dropped");
        return;
    }

    match event {
        RoomEvent::ParticipantConnected { sid } => {
            match find_participant(room, &sid) {
                Some(participant) => store.upsert_participant(snapshot(participant.as_ref())),
                // Not in the roster yet; the next resync pass derives it.
                None => *resync_at = Some(Instant::now() + debounce),
            }
        }
        RoomEvent::ParticipantDisconnected { sid } => {
            store.remove_participant(&sid);
        }
        RoomEvent::TrackSubscribed { .. }
        | RoomEvent::TrackUnsubscribed { .. }
        | RoomEvent::TrackMuted { .. }
        | RoomEvent::TrackUnmuted { .. }
        | RoomEvent::TrackPublished { .. }
        | RoomEvent::LocalTrackPublished
        | RoomEvent::LocalTrackUnpublished => {
            *resync_at = Some(Instant::now() + debounce);
        }
        RoomEvent::Reconnected => {
            // Refresh, not a fresh join: identities are already present, so
            // no reset precedes this pass.
            *resync_at = None;
            sync_full_room(store, room);
        }
        RoomEvent::DataReceived { sid, payload } => {
            let identity = find_participant(room, &sid)
                .map(|p| p.identity())
                .unwrap_or_else(|| sid.clone());
            let _ = data_tx.send(DataFrame {
                sid,
                identity,
                payload,
            });
        }
    }
}

/// One full derivation pass: snapshot-upsert the local participant and every
/// remote, then drop store entries whose session is no longer in the room.
fn sync_full_room(store: &Arc<CallStore>, room: &Arc<dyn RoomHandle>) {
    let local = room.local_participant();
    let remotes = room.remote_participants();

    let mut live: HashSet<String> = HashSet::with_capacity(remotes.len() + 1);
    live.insert(local.sid());
    store.upsert_participant(snapshot(local.as_ref()));
    for participant in &remotes {
        live.insert(participant.sid());
        store.upsert_participant(snapshot(participant.as_ref()));
    }

    for existing in store.participants() {
        if !live.contains(&existing.session_id) {
            store.remove_participant(&existing.session_id);
        }
    }
}

fn find_participant(room: &Arc<dyn RoomHandle>, sid: &str) -> Option<Arc<dyn ParticipantHandle>> {
    let local = room.local_participant();
    if local.sid() == sid {
        return Some(local);
    }
    room.remote_participants()
        .into_iter()
        .find(|p| p.sid() == sid)
}

/// Full derived state for one participant, read live from the transport at
/// call time. Hand-raise is store-local; the store preserves it on upsert.
fn snapshot(participant: &dyn ParticipantHandle) -> ParticipantState {
    let identity = participant.identity();
    let metadata = ParticipantMetadata::decode(&identity, participant.metadata().as_deref());
    ParticipantState {
        session_id: participant.sid(),
        identity,
        user_id: metadata.user_id,
        display_name: metadata.name,
        avatar_url: metadata.avatar,
        role: metadata.role,
        is_muted: !participant.is_microphone_enabled(),
        is_camera_off: !participant.is_camera_enabled(),
        is_hand_raised: false,
        is_speaking: participant.is_speaking(),
    }
}
