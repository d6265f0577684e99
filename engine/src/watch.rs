//! Observation fan-out
//!
//! Runner clients, the display and the admin all observe a race through the
//! same read-only handle. Delivery is eventually consistent: rapid updates
//! coalesce into the newest snapshot, and no ordering is promised across
//! independent observers — but each observer sees a given race's committed
//! states in commit order. Nothing writes through this layer; mutation goes
//! through the engine operations only.

use crate::doc::race_path;
use serde_json::Value;
use shared::{Participant, RaceDoc, RaceSession};
use store::{Store, StoreError, Subtree};

/// Point-in-time view of one race: the session plus the roster in lane
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceSnapshot {
    pub session: RaceSession,
    pub participants: Vec<Participant>,
}

impl RaceSnapshot {
    fn from_value(value: &Value) -> Option<Self> {
        let doc: RaceDoc = serde_json::from_value(value.clone()).ok()?;
        let participants = doc.lanes();
        Some(Self {
            session: doc.session,
            participants,
        })
    }
}

/// Read-only subscription to one race session.
pub struct RaceWatcher {
    sub: Subtree,
}

impl RaceWatcher {
    pub fn new(store: &Store, session_id: &str) -> Self {
        Self {
            sub: store.watch(&race_path(session_id)),
        }
    }

    /// Waits for a snapshot newer than the last one seen. Errors here are
    /// transport level (the subscription ended); business errors never
    /// travel this path.
    pub async fn changed(&mut self) -> Result<(), StoreError> {
        self.sub.changed().await
    }

    /// Latest view of the race, or `None` once the room is gone (or was
    /// never created).
    pub fn snapshot(&mut self) -> Option<RaceSnapshot> {
        RaceSnapshot::from_value(&self.sub.latest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::RoomManager;
    use crate::{race, steps};
    use shared::RaceStatus;

    #[tokio::test]
    async fn test_snapshot_absent_until_room_exists() {
        let store = Store::new();
        let mut watcher = RaceWatcher::new(&store, "race1");
        assert!(watcher.snapshot().is_none());

        let rooms = RoomManager::new(store.clone());
        rooms.create_room_with_id("race1", 100).unwrap();

        watcher.changed().await.unwrap();
        let snapshot = watcher.snapshot().unwrap();
        assert_eq!(snapshot.session.status, RaceStatus::Waiting);
        assert!(snapshot.participants.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_lists_lanes_in_join_order() {
        let store = Store::new();
        let rooms = RoomManager::new(store.clone());
        rooms.create_room_with_id("race1", 100).unwrap();
        rooms.join_room("race1", "zoe", "Zoe").unwrap();
        rooms.join_room("race1", "amir", "Amir").unwrap();

        let mut watcher = RaceWatcher::new(&store, "race1");
        let snapshot = watcher.snapshot().unwrap();
        let ids: Vec<&str> = snapshot
            .participants
            .iter()
            .map(|p| p.user_id.as_str())
            .collect();
        assert_eq!(ids, vec!["zoe", "amir"]);
    }

    #[tokio::test]
    async fn test_burst_of_steps_coalesces_to_newest_state() {
        let store = Store::new();
        let rooms = RoomManager::new(store.clone());
        rooms.create_room_with_id("race1", 1000).unwrap();
        rooms.join_room("race1", "u1", "u1").unwrap();
        race::start_countdown(&store, "race1").unwrap();
        race::begin_race(&store, "race1").unwrap();

        let mut watcher = RaceWatcher::new(&store, "race1");
        watcher.snapshot();

        for _ in 0..10 {
            steps::submit_step(&store, "race1", "u1", 6).unwrap();
        }

        watcher.changed().await.unwrap();
        let snapshot = watcher.snapshot().unwrap();
        // Intermediate positions may be skipped; the newest is delivered
        assert_eq!(snapshot.participants[0].position, 60);
    }

    #[tokio::test]
    async fn test_snapshot_none_after_room_removed() {
        let store = Store::new();
        let rooms = RoomManager::new(store.clone());
        rooms.create_room_with_id("race1", 100).unwrap();

        let mut watcher = RaceWatcher::new(&store, "race1");
        watcher.snapshot();

        store.remove(&race_path("race1"));
        watcher.changed().await.unwrap();
        assert!(watcher.snapshot().is_none());
    }
}
