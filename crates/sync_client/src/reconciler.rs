//! Merges polled snapshots with push deltas into one room view.
//!
//! Two independent writers feed the same state: a timer-driven snapshot poll
//! and push deltas arriving through the dispatcher. The merge rule is
//! timestamp-based — a push delta wins unless the snapshot's fetch timestamp
//! is strictly newer than the delta's arrival timestamp — which stops a
//! network-delayed snapshot response from clobbering fresher push updates.

use crate::snapshot::{PlayerProgress, PlayerStatus, RoomDetails, RoomDirectory, RoomSnapshot};
use crate::types::{RoomCode, UserId};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tessera_events::{events, EventDispatcher, Frame, Subscription};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Minimum participants before the host may start the game.
const MIN_PLAYERS_TO_START: usize = 2;

/// Read-only merged view handed to consumers.
///
/// The derived flags are recomputed from the merged state on every call to
/// [`RoomReconciler::view`]; they are never cached.
#[derive(Debug, Clone)]
pub struct RoomView {
    /// Latest known room metadata, if any source has reported it yet.
    pub room: Option<RoomDetails>,
    /// Merged player list, ordered by user id for determinism.
    pub players: Vec<PlayerProgress>,
    /// Whether the local user is the room host.
    pub is_host: bool,
    /// Whether the local user may start the game right now.
    pub can_start: bool,
    /// Fetch timestamp of the last applied snapshot.
    pub last_snapshot_at: Option<DateTime<Utc>>,
}

struct PlayerEntry {
    progress: PlayerProgress,
    /// Arrival time of the last push delta that wrote this entry.
    delta_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct ReconcilerState {
    room: Option<RoomDetails>,
    room_delta_at: Option<DateTime<Utc>>,
    players: HashMap<UserId, PlayerEntry>,
    /// Tombstones for players removed by push, so a stale snapshot cannot
    /// resurrect them.
    departed: HashMap<UserId, DateTime<Utc>>,
    last_snapshot_at: Option<DateTime<Utc>>,
}

/// Payload of `player_joined` / `attempt_made` deltas.
#[derive(Debug, Deserialize)]
struct PlayerDelta {
    user_id: UserId,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    status: Option<PlayerStatus>,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    ready: Option<bool>,
}

/// Payload of `player_left` deltas.
#[derive(Debug, Deserialize)]
struct DepartureDelta {
    user_id: UserId,
}

/// Maintains the merged room/player state for one session.
pub struct RoomReconciler {
    room_code: RoomCode,
    local_user: UserId,
    directory: Arc<dyn RoomDirectory>,
    poll_interval: Duration,
    state: StdMutex<ReconcilerState>,
    shutdown_tx: watch::Sender<bool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl RoomReconciler {
    /// Creates a reconciler with empty state; nothing is polled until
    /// [`start_polling`](RoomReconciler::start_polling).
    pub fn new(
        room_code: RoomCode,
        local_user: UserId,
        directory: Arc<dyn RoomDirectory>,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            room_code,
            local_user,
            directory,
            poll_interval,
            state: StdMutex::new(ReconcilerState::default()),
            shutdown_tx,
            poll_task: Mutex::new(None),
        }
    }

    /// Subscribes the delta handlers; the session owner holds the returned
    /// subscriptions and drops them at teardown.
    pub fn attach(self: Arc<Self>, dispatcher: &EventDispatcher) -> Vec<Subscription> {
        let mut subscriptions = Vec::new();

        let reconciler = Arc::clone(&self);
        subscriptions.push(dispatcher.on(
            events::PLAYER_JOINED,
            move |delta: PlayerDelta, _: &Frame| {
                reconciler.apply_player_delta(delta, Utc::now());
                Ok(())
            },
        ));

        let reconciler = Arc::clone(&self);
        subscriptions.push(dispatcher.on(
            events::ATTEMPT_MADE,
            move |delta: PlayerDelta, _: &Frame| {
                reconciler.apply_player_delta(delta, Utc::now());
                Ok(())
            },
        ));

        let reconciler = Arc::clone(&self);
        subscriptions.push(dispatcher.on(
            events::PLAYER_LEFT,
            move |delta: DepartureDelta, _: &Frame| {
                reconciler.apply_departure(delta.user_id, Utc::now());
                Ok(())
            },
        ));

        let reconciler = Arc::clone(&self);
        subscriptions.push(dispatcher.on(
            events::GAME_STARTED,
            move |_: serde_json::Value, _: &Frame| {
                reconciler.apply_game_started(Utc::now());
                Ok(())
            },
        ));

        let reconciler = Arc::clone(&self);
        subscriptions.push(dispatcher.on(
            events::ROOM_STATE,
            move |room: RoomDetails, _: &Frame| {
                reconciler.apply_room_delta(room, Utc::now());
                Ok(())
            },
        ));

        subscriptions
    }

    /// Spawns the snapshot poll loop (first poll fires immediately).
    ///
    /// The loop is independently cancellable via [`stop`](RoomReconciler::stop);
    /// a failed poll logs a warning, keeps existing state, and retries on
    /// the next tick.
    pub async fn start_polling(self: Arc<Self>) {
        let mut guard = self.poll_task.lock().await;
        if guard.is_some() {
            return;
        }
        self.shutdown_tx.send_replace(false);

        let reconciler = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut shutdown_rx = reconciler.shutdown_tx.subscribe();
            let mut ticker = interval(reconciler.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_requested(&mut shutdown_rx) => {
                        debug!("room {}: snapshot polling stopped", reconciler.room_code);
                        return;
                    }
                    _ = ticker.tick() => reconciler.poll_once().await,
                }
            }
        });
        *guard = Some(handle);
    }

    /// Cancels the poll loop; idempotent.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);
        let handle = self.poll_task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Runs one poll cycle against the directory.
    pub async fn poll_once(&self) {
        // Stamped before the request leaves, so any delta arriving while the
        // response is in flight outranks it.
        let fetched_at = Utc::now();
        let result = tokio::try_join!(
            self.directory.fetch_room(&self.room_code),
            self.directory.fetch_players(&self.room_code),
        );
        match result {
            Ok((room, players)) => self.apply_snapshot(RoomSnapshot {
                room,
                players,
                fetched_at,
            }),
            Err(e) => warn!(
                "room {}: snapshot poll failed, keeping existing state: {}",
                self.room_code, e
            ),
        }
    }

    /// Applies one full snapshot under the merge rule.
    pub fn apply_snapshot(&self, snapshot: RoomSnapshot) {
        let mut state = self.state.lock().expect("reconciler lock poisoned");
        let fetched_at = snapshot.fetched_at;

        // Room metadata: the snapshot only wins when strictly newer than the
        // last room-level delta.
        let delta_holds = state.room_delta_at.is_some_and(|t| t >= fetched_at);
        if !delta_holds {
            state.room = Some(snapshot.room);
            state.room_delta_at = None;
        }

        let mut listed: HashSet<UserId> = HashSet::new();
        for progress in snapshot.players {
            let user_id = progress.user_id;
            listed.insert(user_id);

            // A departure delta newer than this snapshot keeps the player out.
            if state.departed.get(&user_id).is_some_and(|t| *t >= fetched_at) {
                continue;
            }
            state.departed.remove(&user_id);

            match state.players.entry(user_id) {
                Entry::Occupied(mut occupied) => {
                    let entry = occupied.get_mut();
                    if entry.delta_at.map_or(true, |t| fetched_at > t) {
                        entry.progress = progress;
                        entry.delta_at = None;
                    }
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(PlayerEntry {
                        progress,
                        delta_at: None,
                    });
                }
            }
        }

        // Players the snapshot omits survive only while their delta outranks it.
        state
            .players
            .retain(|user_id, entry| {
                listed.contains(user_id) || entry.delta_at.is_some_and(|t| t >= fetched_at)
            });

        // Tombstones older than this snapshot have served their purpose.
        state.departed.retain(|_, t| *t >= fetched_at);
        state.last_snapshot_at = Some(fetched_at);
    }

    /// Builds the merged view; derived flags recomputed on every call.
    pub fn view(&self) -> RoomView {
        let state = self.state.lock().expect("reconciler lock poisoned");
        let mut players: Vec<PlayerProgress> =
            state.players.values().map(|e| e.progress.clone()).collect();
        players.sort_by(|a, b| a.user_id.0.cmp(&b.user_id.0));

        let is_host = state
            .room
            .as_ref()
            .is_some_and(|r| r.host_id == self.local_user);
        let can_start = state.room.as_ref().is_some_and(|r| {
            is_host
                && !r.started
                && players.len() >= MIN_PLAYERS_TO_START
                && players.len() <= r.capacity
        });

        RoomView {
            room: state.room.clone(),
            players,
            is_host,
            can_start,
            last_snapshot_at: state.last_snapshot_at,
        }
    }

    fn apply_player_delta(&self, delta: PlayerDelta, arrived_at: DateTime<Utc>) {
        let mut state = self.state.lock().expect("reconciler lock poisoned");
        state.departed.remove(&delta.user_id);
        match state.players.entry(delta.user_id) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if let Some(username) = delta.username {
                    entry.progress.username = Some(username);
                }
                if let Some(status) = delta.status {
                    entry.progress.status = status;
                }
                if let Some(score) = delta.score {
                    entry.progress.score = score;
                }
                if let Some(ready) = delta.ready {
                    entry.progress.ready = ready;
                }
                entry.delta_at = Some(arrived_at);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PlayerEntry {
                    progress: PlayerProgress {
                        user_id: delta.user_id,
                        username: delta.username,
                        status: delta.status.unwrap_or_default(),
                        score: delta.score.unwrap_or(0),
                        ready: delta.ready.unwrap_or(false),
                    },
                    delta_at: Some(arrived_at),
                });
            }
        }
    }

    fn apply_departure(&self, user_id: UserId, arrived_at: DateTime<Utc>) {
        let mut state = self.state.lock().expect("reconciler lock poisoned");
        state.players.remove(&user_id);
        state.departed.insert(user_id, arrived_at);
    }

    fn apply_game_started(&self, arrived_at: DateTime<Utc>) {
        let mut state = self.state.lock().expect("reconciler lock poisoned");
        // Before any snapshot there is no room to mark; the next poll will
        // report the started flag itself.
        if let Some(room) = state.room.as_mut() {
            room.started = true;
            state.room_delta_at = Some(arrived_at);
        }
    }

    fn apply_room_delta(&self, room: RoomDetails, arrived_at: DateTime<Utc>) {
        let mut state = self.state.lock().expect("reconciler lock poisoned");
        state.room = Some(room);
        state.room_delta_at = Some(arrived_at);
    }
}

impl std::fmt::Debug for RoomReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomReconciler")
            .field("room", &self.room_code)
            .field("local_user", &self.local_user)
            .finish_non_exhaustive()
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|requested| *requested).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use serde_json::json;
    use tessera_events::create_dispatcher;

    struct NullDirectory;

    #[async_trait]
    impl RoomDirectory for NullDirectory {
        async fn fetch_room(&self, _: &RoomCode) -> Result<RoomDetails, SyncError> {
            Err(SyncError::Connection("unused".into()))
        }

        async fn fetch_players(&self, _: &RoomCode) -> Result<Vec<PlayerProgress>, SyncError> {
            Err(SyncError::Connection("unused".into()))
        }
    }

    fn reconciler(local_user: UserId) -> Arc<RoomReconciler> {
        Arc::new(RoomReconciler::new(
            RoomCode::new("ROOM1"),
            local_user,
            Arc::new(NullDirectory),
            Duration::from_secs(5),
        ))
    }

    fn room(host: UserId, capacity: usize, started: bool) -> RoomDetails {
        RoomDetails {
            code: RoomCode::new("ROOM1"),
            host_id: host,
            capacity,
            started,
        }
    }

    fn player(user_id: UserId, score: i64) -> PlayerProgress {
        PlayerProgress {
            user_id,
            username: Some("p".into()),
            status: PlayerStatus::Waiting,
            score,
            ready: false,
        }
    }

    #[test]
    fn snapshot_seeds_empty_state() {
        let host = UserId::new();
        let r = reconciler(host);
        let other = UserId::new();

        r.apply_snapshot(RoomSnapshot {
            room: room(host, 4, false),
            players: vec![player(host, 0), player(other, 0)],
            fetched_at: Utc::now(),
        });

        let view = r.view();
        assert_eq!(view.players.len(), 2);
        assert!(view.is_host);
        assert!(view.can_start);
    }

    #[test]
    fn newer_delta_survives_stale_snapshot() {
        let host = UserId::new();
        let r = reconciler(host);
        let other = UserId::new();
        let now = Utc::now();

        // Delta arrives "now": the player scored 50.
        r.apply_player_delta(
            PlayerDelta {
                user_id: other,
                username: None,
                status: None,
                score: Some(50),
                ready: None,
            },
            now,
        );

        // A snapshot fetched one second earlier claims score 10.
        r.apply_snapshot(RoomSnapshot {
            room: room(host, 4, false),
            players: vec![player(other, 10)],
            fetched_at: now - TimeDelta::seconds(1),
        });

        let view = r.view();
        assert_eq!(view.players[0].score, 50);
    }

    #[test]
    fn strictly_newer_snapshot_overrides_delta() {
        let host = UserId::new();
        let r = reconciler(host);
        let other = UserId::new();
        let now = Utc::now();

        r.apply_player_delta(
            PlayerDelta {
                user_id: other,
                username: None,
                status: None,
                score: Some(50),
                ready: None,
            },
            now - TimeDelta::seconds(2),
        );

        r.apply_snapshot(RoomSnapshot {
            room: room(host, 4, false),
            players: vec![player(other, 99)],
            fetched_at: now,
        });

        assert_eq!(r.view().players[0].score, 99);
    }

    #[test]
    fn stale_snapshot_cannot_resurrect_departed_player() {
        let host = UserId::new();
        let r = reconciler(host);
        let other = UserId::new();
        let now = Utc::now();

        r.apply_snapshot(RoomSnapshot {
            room: room(host, 4, false),
            players: vec![player(host, 0), player(other, 0)],
            fetched_at: now - TimeDelta::seconds(5),
        });
        r.apply_departure(other, now);

        // Snapshot fetched before the departure still lists the player.
        r.apply_snapshot(RoomSnapshot {
            room: room(host, 4, false),
            players: vec![player(host, 0), player(other, 0)],
            fetched_at: now - TimeDelta::seconds(1),
        });

        let view = r.view();
        assert_eq!(view.players.len(), 1);
        assert_eq!(view.players[0].user_id, host);
    }

    #[test]
    fn newer_snapshot_clears_departure_tombstone() {
        let host = UserId::new();
        let r = reconciler(host);
        let other = UserId::new();
        let now = Utc::now();

        r.apply_departure(other, now - TimeDelta::seconds(3));

        r.apply_snapshot(RoomSnapshot {
            room: room(host, 4, false),
            players: vec![player(host, 0), player(other, 0)],
            fetched_at: now,
        });

        assert_eq!(r.view().players.len(), 2);
    }

    #[test]
    fn snapshot_removes_players_without_newer_deltas() {
        let host = UserId::new();
        let r = reconciler(host);
        let other = UserId::new();
        let now = Utc::now();

        r.apply_snapshot(RoomSnapshot {
            room: room(host, 4, false),
            players: vec![player(host, 0), player(other, 0)],
            fetched_at: now - TimeDelta::seconds(2),
        });

        // Next snapshot no longer lists `other`.
        r.apply_snapshot(RoomSnapshot {
            room: room(host, 4, false),
            players: vec![player(host, 0)],
            fetched_at: now,
        });

        assert_eq!(r.view().players.len(), 1);
    }

    #[test]
    fn can_start_requires_host_capacity_and_unstarted_room() {
        let host = UserId::new();
        let guest = UserId::new();
        let now = Utc::now();

        // Not the host.
        let r = reconciler(guest);
        r.apply_snapshot(RoomSnapshot {
            room: room(host, 4, false),
            players: vec![player(host, 0), player(guest, 0)],
            fetched_at: now,
        });
        assert!(!r.view().is_host);
        assert!(!r.view().can_start);

        // Host, but alone.
        let r = reconciler(host);
        r.apply_snapshot(RoomSnapshot {
            room: room(host, 4, false),
            players: vec![player(host, 0)],
            fetched_at: now,
        });
        assert!(r.view().is_host);
        assert!(!r.view().can_start);

        // Host, enough players, but already started.
        let r = reconciler(host);
        r.apply_snapshot(RoomSnapshot {
            room: room(host, 4, true),
            players: vec![player(host, 0), player(guest, 0)],
            fetched_at: now,
        });
        assert!(!r.view().can_start);

        // Over capacity.
        let r = reconciler(host);
        r.apply_snapshot(RoomSnapshot {
            room: room(host, 1, false),
            players: vec![player(host, 0), player(guest, 0)],
            fetched_at: now,
        });
        assert!(!r.view().can_start);
    }

    #[test]
    fn game_started_delta_flips_room_and_outranks_stale_snapshot() {
        let host = UserId::new();
        let guest = UserId::new();
        let r = reconciler(host);
        let now = Utc::now();

        r.apply_snapshot(RoomSnapshot {
            room: room(host, 4, false),
            players: vec![player(host, 0), player(guest, 0)],
            fetched_at: now - TimeDelta::seconds(3),
        });
        r.apply_game_started(now);

        // Stale snapshot still claims the room has not started.
        r.apply_snapshot(RoomSnapshot {
            room: room(host, 4, false),
            players: vec![player(host, 0), player(guest, 0)],
            fetched_at: now - TimeDelta::seconds(1),
        });

        let view = r.view();
        assert!(view.room.as_ref().unwrap().started);
        assert!(!view.can_start);
    }

    #[test]
    fn deltas_flow_through_dispatcher_subscriptions() {
        let host = UserId::new();
        let r = reconciler(host);
        let dispatcher = create_dispatcher();
        let _subs = Arc::clone(&r).attach(&dispatcher);

        let other = UserId::new();
        dispatcher.publish(&Frame::new(
            events::PLAYER_JOINED,
            json!({ "user_id": other, "username": "dana" }),
        ));
        assert_eq!(r.view().players.len(), 1);

        dispatcher.publish(&Frame::new(
            events::ATTEMPT_MADE,
            json!({ "user_id": other, "score": 120 }),
        ));
        assert_eq!(r.view().players[0].score, 120);

        dispatcher.publish(&Frame::new(
            events::PLAYER_LEFT,
            json!({ "user_id": other }),
        ));
        assert!(r.view().players.is_empty());
    }

    #[test]
    fn room_state_push_replaces_room_metadata() {
        let host = UserId::new();
        let r = reconciler(host);
        let now = Utc::now();

        r.apply_room_delta(room(host, 6, false), now);
        let view = r.view();
        assert_eq!(view.room.as_ref().unwrap().capacity, 6);

        // Snapshot fetched before the push must not shrink the room back.
        r.apply_snapshot(RoomSnapshot {
            room: room(host, 4, false),
            players: vec![],
            fetched_at: now - TimeDelta::seconds(1),
        });
        assert_eq!(r.view().room.as_ref().unwrap().capacity, 6);
    }
}
