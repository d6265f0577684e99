//! Engine facade
//!
//! [`RaceService`] is the surface UI collaborators talk to: room lifecycle,
//! countdown, step submission, force-finish and read-only observation, all
//! over one shared store handle. Cloning the service is cheap and every
//! clone operates on the same documents, so one process can host runners,
//! a display and the background watchers side by side.

use crate::countdown;
use crate::doc::{decode, race_path};
use crate::error::RaceError;
use crate::race;
use crate::rooms::RoomManager;
use crate::steps::{self, AcceptedStep};
use crate::watch::RaceWatcher;
use shared::{Participant, RaceSession};
use std::time::Duration;
use store::Store;
use tokio::task::JoinHandle;

/// Default cadence of the expiration sweep. A periodic scan, not a
/// continuous one.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct RaceService {
    store: Store,
    rooms: RoomManager,
}

impl RaceService {
    pub fn new(store: Store) -> Self {
        Self {
            rooms: RoomManager::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn create_room(&self, finish_distance: u32) -> Result<RaceSession, RaceError> {
        self.rooms.create_room(finish_distance)
    }

    pub fn create_room_with_id(
        &self,
        session_id: &str,
        finish_distance: u32,
    ) -> Result<RaceSession, RaceError> {
        self.rooms.create_room_with_id(session_id, finish_distance)
    }

    pub fn join_room(
        &self,
        session_id: &str,
        user_id: &str,
        nickname: &str,
    ) -> Result<Participant, RaceError> {
        self.rooms.join_room(session_id, user_id, nickname)
    }

    pub fn leave_room(&self, session_id: &str, user_id: &str) -> Result<(), RaceError> {
        self.rooms.leave_room(session_id, user_id)
    }

    pub fn touch(&self, session_id: &str) -> Result<(), RaceError> {
        self.rooms.touch(session_id)
    }

    pub fn start_countdown(&self, session_id: &str) -> Result<RaceSession, RaceError> {
        race::start_countdown(&self.store, session_id)
    }

    pub fn countdown_remaining_ms(&self, session_id: &str) -> Result<u64, RaceError> {
        countdown::remaining_ms(&self.store, session_id)
    }

    pub fn submit_step(
        &self,
        session_id: &str,
        user_id: &str,
        step_value: u32,
    ) -> Result<AcceptedStep, RaceError> {
        steps::submit_step(&self.store, session_id, user_id, step_value)
    }

    pub fn force_finish(&self, session_id: &str) -> Result<RaceSession, RaceError> {
        race::force_finish(&self.store, session_id)
    }

    /// Current session record, read-only.
    pub fn session(&self, session_id: &str) -> Result<RaceSession, RaceError> {
        let value = self
            .store
            .read(&race_path(session_id))
            .ok_or_else(|| RaceError::RoomClosed(session_id.to_string()))?;
        decode(&value)
            .map(|doc| doc.session)
            .ok_or_else(|| RaceError::RoomClosed(session_id.to_string()))
    }

    /// Current roster in lane order, read-only.
    pub fn participants(&self, session_id: &str) -> Result<Vec<Participant>, RaceError> {
        let value = self
            .store
            .read(&race_path(session_id))
            .ok_or_else(|| RaceError::RoomClosed(session_id.to_string()))?;
        decode(&value)
            .map(|doc| doc.lanes())
            .ok_or_else(|| RaceError::RoomClosed(session_id.to_string()))
    }

    /// Read-only subscription handle for any observer of this session.
    pub fn watch(&self, session_id: &str) -> RaceWatcher {
        RaceWatcher::new(&self.store, session_id)
    }

    /// Spawns the server-side deadline watcher for one session.
    pub fn spawn_countdown_watcher(&self, session_id: &str) -> JoinHandle<()> {
        countdown::spawn_watcher(
            self.store.clone(),
            session_id.to_string(),
            countdown::COUNTDOWN_POLL_INTERVAL,
        )
    }

    /// Spawns the periodic room-expiration sweep.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.rooms.spawn_sweeper(SWEEP_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::RaceStatus;
    use store::Clock;

    #[test]
    fn test_full_race_through_the_facade() {
        let store = Store::with_clock(Clock::manual(0));
        let service = RaceService::new(store.clone());

        let session = service.create_room_with_id("race1", 12).unwrap();
        service.join_room(&session.id, "a", "Runner A").unwrap();
        service.join_room(&session.id, "b", "Runner B").unwrap();

        service.start_countdown(&session.id).unwrap();
        assert_eq!(service.countdown_remaining_ms(&session.id).unwrap(), 3_000);

        store.clock().advance(Duration::from_millis(3_000));
        assert!(countdown::try_begin_if_due(&store, &session.id).unwrap());

        service.submit_step(&session.id, "a", 6).unwrap();
        service.submit_step(&session.id, "a", 6).unwrap();
        service.submit_step(&session.id, "b", 6).unwrap();
        let last = service.submit_step(&session.id, "b", 6).unwrap();
        assert_eq!(last.rank, Some(2));

        let session = service.session(&session.id).unwrap();
        assert_eq!(session.status, RaceStatus::Finished);

        let standings = service.participants(&session.id).unwrap();
        assert!(standings.iter().all(|p| p.has_finished()));
    }

    #[test]
    fn test_reads_on_missing_room() {
        let service = RaceService::new(Store::new());
        assert!(matches!(
            service.session("ghost"),
            Err(RaceError::RoomClosed(_))
        ));
        assert!(matches!(
            service.participants("ghost"),
            Err(RaceError::RoomClosed(_))
        ));
    }
}
