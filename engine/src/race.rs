//! Race lifecycle state machine
//!
//! The authoritative lifecycle of a race session moves through the fixed
//! order waiting → countdown → started → finished, never backwards. Every
//! transition here is a conflict-safe read-modify-write guarded by a
//! precondition on the current status, so two concurrent triggers of the
//! same transition produce it exactly once: the loser observes the new
//! status and fails with [`RaceError::IllegalTransition`] instead of
//! re-stamping a timestamp.

use crate::doc::update_race;
use crate::error::RaceError;
use log::info;
use shared::{RaceSession, RaceStatus};
use store::Store;

/// waiting → countdown. Requires at least one participant; stamps
/// `countdown_started_at` exactly once with the server clock.
pub fn start_countdown(store: &Store, session_id: &str) -> Result<RaceSession, RaceError> {
    let now = store.now_ms();
    let doc = update_race(store, session_id, |doc| {
        if doc.session.status != RaceStatus::Waiting {
            return Err(RaceError::IllegalTransition {
                from: doc.session.status,
                to: RaceStatus::Countdown,
            });
        }
        if doc.participants.is_empty() {
            return Err(RaceError::Precondition(
                "cannot start a countdown with an empty roster".to_string(),
            ));
        }
        doc.session.status = RaceStatus::Countdown;
        doc.session.countdown_started_at = Some(now);
        doc.session.last_activity_at = now;
        Ok(())
    })?;

    info!(
        "race {} entered countdown with {} runner(s)",
        session_id,
        doc.participants.len()
    );
    Ok(doc.session)
}

/// countdown → started. Fired by whichever countdown trigger observes the
/// deadline first; stamps `started_at`.
pub fn begin_race(store: &Store, session_id: &str) -> Result<RaceSession, RaceError> {
    let now = store.now_ms();
    let doc = update_race(store, session_id, |doc| {
        if doc.session.status != RaceStatus::Countdown {
            return Err(RaceError::IllegalTransition {
                from: doc.session.status,
                to: RaceStatus::Started,
            });
        }
        doc.session.status = RaceStatus::Started;
        doc.session.started_at = Some(now);
        doc.session.last_activity_at = now;
        Ok(())
    })?;

    info!("race {} started", session_id);
    Ok(doc.session)
}

/// started → finished, administratively. The organic path is the step
/// protocol finishing the race when the last rank lands; this one exists
/// for an admin pulling the plug on a race that will never complete.
pub fn force_finish(store: &Store, session_id: &str) -> Result<RaceSession, RaceError> {
    let now = store.now_ms();
    let doc = update_race(store, session_id, |doc| {
        if doc.session.status != RaceStatus::Started {
            return Err(RaceError::IllegalTransition {
                from: doc.session.status,
                to: RaceStatus::Finished,
            });
        }
        doc.session.status = RaceStatus::Finished;
        doc.session.finished_at = Some(now);
        doc.session.last_activity_at = now;
        Ok(())
    })?;

    info!("race {} force-finished", session_id);
    Ok(doc.session)
}
