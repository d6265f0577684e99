//! Countdown orchestration
//!
//! Remaining time is always derived from the shared `countdown_started_at`
//! anchor and the server clock, never from a locally started timer. Clients
//! joining mid-countdown therefore converge on the same deadline with no
//! broadcast tick, and a reconnecting client recovers the correct deadline
//! without replaying anything.
//!
//! Any number of triggers may observe the deadline; the state machine's
//! precondition guard turns every attempt after the first into a no-op.

use crate::doc::{decode, race_path};
use crate::error::RaceError;
use crate::race;
use log::{debug, warn};
use shared::{countdown_remaining_ms, RaceStatus};
use std::time::Duration;
use store::Store;
use tokio::task::JoinHandle;

/// How often the background watcher re-checks the deadline.
pub const COUNTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Remaining countdown milliseconds for a session, clamped at zero.
/// Only meaningful while the session is in `countdown`.
pub fn remaining_ms(store: &Store, session_id: &str) -> Result<u64, RaceError> {
    let value = store
        .read(&race_path(session_id))
        .ok_or_else(|| RaceError::RoomClosed(session_id.to_string()))?;
    let doc = decode(&value).ok_or_else(|| RaceError::RoomClosed(session_id.to_string()))?;

    match (doc.session.status, doc.session.countdown_started_at) {
        (RaceStatus::Countdown, Some(anchor)) => Ok(countdown_remaining_ms(anchor, store.now_ms())),
        (status, _) => Err(RaceError::InvalidState { status }),
    }
}

/// Fires countdown → started if the shared deadline has passed. Returns
/// whether this caller performed the transition; losing the race to another
/// trigger is a no-op, not an error.
pub fn try_begin_if_due(store: &Store, session_id: &str) -> Result<bool, RaceError> {
    let value = store
        .read(&race_path(session_id))
        .ok_or_else(|| RaceError::RoomClosed(session_id.to_string()))?;
    let doc = decode(&value).ok_or_else(|| RaceError::RoomClosed(session_id.to_string()))?;

    match (doc.session.status, doc.session.countdown_started_at) {
        (RaceStatus::Countdown, Some(anchor))
            if countdown_remaining_ms(anchor, store.now_ms()) == 0 =>
        {
            match race::begin_race(store, session_id) {
                Ok(_) => Ok(true),
                // Another trigger committed first
                Err(RaceError::IllegalTransition { .. }) => Ok(false),
                Err(err) => Err(err),
            }
        }
        _ => Ok(false),
    }
}

/// Server-side deadline watcher. Polls the shared anchor and attempts the
/// transition once the countdown runs out, then exits. Exits quietly if the
/// room disappears or someone else starts the race first.
pub fn spawn_watcher(store: Store, session_id: String, poll: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll);
        loop {
            interval.tick().await;

            let Some(value) = store.read(&race_path(&session_id)) else {
                debug!("countdown watcher: room {} is gone", session_id);
                return;
            };
            let Some(doc) = decode(&value) else {
                return;
            };

            match (doc.session.status, doc.session.countdown_started_at) {
                (RaceStatus::Waiting, _) => {}
                (RaceStatus::Countdown, Some(anchor)) => {
                    if countdown_remaining_ms(anchor, store.now_ms()) == 0 {
                        match race::begin_race(&store, &session_id) {
                            Ok(_) | Err(RaceError::IllegalTransition { .. }) => {}
                            Err(err) => {
                                warn!("countdown watcher for {}: {}", session_id, err);
                            }
                        }
                    }
                }
                (RaceStatus::Countdown, None) => {
                    warn!("race {} is in countdown without an anchor", session_id);
                    return;
                }
                (RaceStatus::Started | RaceStatus::Finished, _) => return,
            }
        }
    })
}
