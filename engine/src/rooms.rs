//! Room lifecycle management
//!
//! This module handles the creation, roster maintenance and expiration of
//! race rooms:
//! - Room creation with generated or caller-supplied ids
//! - Joining and leaving while the room is still waiting
//! - Activity tracking used by the expiration policy
//! - A periodic sweep that deletes rooms idle past the expiration window
//!
//! The sweep and `join_room` may race: removal is idempotent, and a join
//! whose room vanished mid-operation re-fails with
//! [`RaceError::RoomClosed`], never resurrects the room.

use crate::doc::{decode, encode, race_path, update_race, RACES_ROOT};
use crate::error::RaceError;
use log::{info, warn};
use rand::Rng;
use shared::{Participant, RaceDoc, RaceSession, RaceStatus};
use std::time::Duration;
use store::{Store, TxDecision};
use tokio::task::JoinHandle;

const ROOM_ID_LEN: usize = 6;
const ROOM_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn generate_room_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_ID_LEN)
        .map(|_| ROOM_ID_CHARSET[rng.gen_range(0..ROOM_ID_CHARSET.len())] as char)
        .collect()
}

/// Creates, fills and expires race rooms on top of the shared store.
#[derive(Clone)]
pub struct RoomManager {
    store: Store,
}

impl RoomManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Opens a new room in `waiting` under a generated id.
    pub fn create_room(&self, finish_distance: u32) -> Result<RaceSession, RaceError> {
        if finish_distance == 0 {
            return Err(RaceError::Precondition(
                "finish distance must be positive".to_string(),
            ));
        }
        loop {
            let id = generate_room_id();
            if self.store.read(&race_path(&id)).is_some() {
                continue;
            }
            match self.create_room_with_id(&id, finish_distance) {
                // Lost the id to a concurrent creator; roll again
                Err(RaceError::Precondition(_)) => continue,
                other => return other,
            }
        }
    }

    /// Opens a new room under a caller-supplied id. Fails with
    /// [`RaceError::Precondition`] if the id is already in use.
    pub fn create_room_with_id(
        &self,
        session_id: &str,
        finish_distance: u32,
    ) -> Result<RaceSession, RaceError> {
        if finish_distance == 0 {
            return Err(RaceError::Precondition(
                "finish distance must be positive".to_string(),
            ));
        }

        let now = self.store.now_ms();
        let doc = RaceDoc::new(RaceSession::new(session_id, finish_distance, now));
        let Some(value) = encode(&doc) else {
            return Err(RaceError::Precondition(
                "race document failed to serialize".to_string(),
            ));
        };

        let committed = self.store.transact(&race_path(session_id), |current| {
            if current.is_some() {
                TxDecision::Abort
            } else {
                TxDecision::Commit(value.clone())
            }
        })?;

        if committed.is_none() {
            return Err(RaceError::Precondition(format!(
                "room id '{}' is already in use",
                session_id
            )));
        }

        info!(
            "room {} created (finish distance {})",
            session_id, finish_distance
        );
        Ok(doc.session)
    }

    /// Adds a participant to a waiting room. Any room past `waiting` —
    /// including one the sweeper deleted mid-operation — is closed to
    /// joiners.
    pub fn join_room(
        &self,
        session_id: &str,
        user_id: &str,
        nickname: &str,
    ) -> Result<Participant, RaceError> {
        let now = self.store.now_ms();
        let doc = update_race(&self.store, session_id, |doc| {
            if doc.session.status != RaceStatus::Waiting {
                return Err(RaceError::RoomClosed(session_id.to_string()));
            }
            if doc.participants.contains_key(user_id) {
                return Err(RaceError::Precondition(format!(
                    "user '{}' already joined",
                    user_id
                )));
            }
            doc.participants.insert(
                user_id.to_string(),
                Participant::new(user_id, nickname, now),
            );
            doc.session.last_activity_at = now;
            Ok(())
        })?;

        info!("{} joined room {}", user_id, session_id);
        doc.participants.get(user_id).cloned().ok_or_else(|| {
            RaceError::Precondition(format!("user '{}' missing after join", user_id))
        })
    }

    /// Removes a participant from a waiting room. A running race keeps its
    /// roster: positions and ranks of the remaining field depend on it.
    pub fn leave_room(&self, session_id: &str, user_id: &str) -> Result<(), RaceError> {
        let now = self.store.now_ms();
        update_race(&self.store, session_id, |doc| {
            if doc.session.status != RaceStatus::Waiting {
                return Err(RaceError::InvalidState {
                    status: doc.session.status,
                });
            }
            if doc.participants.remove(user_id).is_none() {
                return Err(RaceError::Precondition(format!(
                    "user '{}' is not in this race",
                    user_id
                )));
            }
            doc.session.last_activity_at = now;
            Ok(())
        })?;

        info!("{} left room {}", user_id, session_id);
        Ok(())
    }

    /// Marks participant activity, deferring expiration.
    pub fn touch(&self, session_id: &str) -> Result<(), RaceError> {
        let now = self.store.now_ms();
        update_race(&self.store, session_id, |doc| {
            doc.session.last_activity_at = now;
            Ok(())
        })?;
        Ok(())
    }

    /// One expiration pass: deletes every room idle longer than the
    /// expiration window, participants included. Returns the removed room
    /// ids. Safe to run concurrently with itself — removal is idempotent.
    pub fn sweep_once(&self) -> Vec<String> {
        let now = self.store.now_ms();
        let mut removed = Vec::new();

        for (path, value) in self.store.list(RACES_ROOT) {
            let Some(doc) = decode(&value) else {
                warn!("removing undecodable race document at {}", path);
                self.store.remove(&path);
                continue;
            };
            if doc.session.is_expired(now) && self.store.remove(&path) {
                info!(
                    "room {} expired after {}ms idle, removed",
                    doc.session.id,
                    doc.session.idle_for_ms(now)
                );
                removed.push(doc.session.id);
            }
        }

        removed
    }

    /// Spawns the periodic background sweep.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                manager.sweep_once();
            }
        })
    }
}
