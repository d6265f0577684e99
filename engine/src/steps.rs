//! Progress counter protocol
//!
//! Step submissions are the only writes with real fan-in: every runner
//! hammers the same race document with no central sequencer. Each submission
//! is a conflict-safe read-modify-write — read the current position, add the
//! step, commit only if nobody else wrote in between, retry otherwise — so
//! no increment is ever lost or double-applied.
//!
//! Crossing the finish line rides the same transaction: the next free rank
//! is read and assigned in the same commit as the position update, which
//! makes rank order first-committer-wins even when several runners finish
//! in the same instant. The rank that completes the roster also flips the
//! session to finished in that same commit.

use crate::doc::update_race;
use crate::error::RaceError;
use log::{debug, info};
use shared::{is_valid_step, RaceStatus, StepKind, MAX_STEP, MIN_STEP};
use store::Store;

/// Echo of one accepted step: the committed position, the derived
/// presentation hint, and the participant's rank if they have crossed the
/// line (now or earlier).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedStep {
    pub position: u32,
    pub kind: StepKind,
    pub rank: Option<u32>,
}

/// Applies one step for `user_id`. Legal only while the race is started;
/// any other state rejects with [`RaceError::InvalidState`] and changes
/// nothing.
pub fn submit_step(
    store: &Store,
    session_id: &str,
    user_id: &str,
    step_value: u32,
) -> Result<AcceptedStep, RaceError> {
    if !is_valid_step(step_value) {
        return Err(RaceError::Precondition(format!(
            "step value {} outside {}..={}",
            step_value, MIN_STEP, MAX_STEP
        )));
    }

    let now = store.now_ms();
    let doc = update_race(store, session_id, |doc| {
        if doc.session.status != RaceStatus::Started {
            return Err(RaceError::InvalidState {
                status: doc.session.status,
            });
        }

        let finish_distance = doc.session.finish_distance;
        let next_rank = doc.next_rank();
        let Some(participant) = doc.participants.get_mut(user_id) else {
            return Err(RaceError::Precondition(format!(
                "user '{}' is not in this race",
                user_id
            )));
        };

        participant.position = participant.position.saturating_add(step_value);
        participant.last_step_at = Some(now);

        // Finish condition is >=, so a dash or boost may overshoot the line
        if participant.position >= finish_distance && participant.rank.is_none() {
            participant.rank = Some(next_rank);
        }

        if doc.all_ranked() {
            doc.session.status = RaceStatus::Finished;
            doc.session.finished_at = Some(now);
        }
        doc.session.last_activity_at = now;
        Ok(())
    })?;

    let participant = doc.participants.get(user_id).ok_or_else(|| {
        RaceError::Precondition(format!("user '{}' is not in this race", user_id))
    })?;
    let accepted = AcceptedStep {
        position: participant.position,
        kind: StepKind::from_value(step_value),
        rank: participant.rank,
    };

    debug!(
        "{} stepped {} in race {} -> {}m",
        user_id, step_value, session_id, accepted.position
    );
    let crossed_now = participant.rank.is_some()
        && accepted.position.saturating_sub(step_value) < doc.session.finish_distance;
    if crossed_now {
        if let Some(rank) = participant.rank {
            info!("{} finished race {} as #{}", user_id, session_id, rank);
        }
    }
    if doc.session.status == RaceStatus::Finished {
        info!("race {} finished: every runner is ranked", session_id);
    }

    Ok(accepted)
}
