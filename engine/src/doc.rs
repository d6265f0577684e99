//! Document layout and typed access to race documents.
//!
//! Each race lives in exactly one document at `races/{id}` holding the
//! session record and the full roster. Keeping them in one document means
//! the store's single-document atomicity covers position, rank and status
//! together; no cross-document transaction is ever needed.

use crate::error::RaceError;
use log::warn;
use serde_json::Value;
use shared::RaceDoc;
use store::{Store, TxDecision};

pub const RACES_ROOT: &str = "races";

pub fn race_path(session_id: &str) -> String {
    format!("{}/{}", RACES_ROOT, session_id)
}

pub(crate) fn decode(value: &Value) -> Option<RaceDoc> {
    match serde_json::from_value(value.clone()) {
        Ok(doc) => Some(doc),
        Err(err) => {
            warn!("undecodable race document: {}", err);
            None
        }
    }
}

pub(crate) fn encode(doc: &RaceDoc) -> Option<Value> {
    match serde_json::to_value(doc) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("race document failed to serialize: {}", err);
            None
        }
    }
}

/// Guarded read-modify-write on one race document.
///
/// Decodes the current document, lets `mutate` rewrite it, and commits the
/// result through the store's conflict-safe primitive. The closure may run
/// several times (once per retry), always against a fresh snapshot; its
/// error from the committing attempt is returned verbatim, so lifecycle
/// guards expressed inside it hold under any interleaving of writers.
pub(crate) fn update_race<F>(
    store: &Store,
    session_id: &str,
    mut mutate: F,
) -> Result<RaceDoc, RaceError>
where
    F: FnMut(&mut RaceDoc) -> Result<(), RaceError>,
{
    let path = race_path(session_id);
    let mut op_err: Option<RaceError> = None;

    let committed = store.transact(&path, |current| {
        op_err = None;
        let Some(value) = current else {
            op_err = Some(RaceError::RoomClosed(session_id.to_string()));
            return TxDecision::Abort;
        };
        let Some(mut doc) = decode(value) else {
            op_err = Some(RaceError::RoomClosed(session_id.to_string()));
            return TxDecision::Abort;
        };
        if let Err(err) = mutate(&mut doc) {
            op_err = Some(err);
            return TxDecision::Abort;
        }
        match encode(&doc) {
            Some(value) => TxDecision::Commit(value),
            None => {
                op_err = Some(RaceError::Precondition(
                    "race document failed to serialize".to_string(),
                ));
                TxDecision::Abort
            }
        }
    })?;

    if let Some(err) = op_err {
        return Err(err);
    }
    committed
        .as_ref()
        .and_then(decode)
        .ok_or_else(|| RaceError::RoomClosed(session_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::{RaceSession, RaceStatus};

    fn seed_race(store: &Store, id: &str) {
        let doc = RaceDoc::new(RaceSession::new(id, 100, 0));
        store.write(&race_path(id), encode(&doc).unwrap());
    }

    #[test]
    fn test_race_path_layout() {
        assert_eq!(race_path("abc123"), "races/abc123");
    }

    #[test]
    fn test_update_race_commits_mutation() {
        let store = Store::new();
        seed_race(&store, "r1");

        let doc = update_race(&store, "r1", |doc| {
            doc.session.status = RaceStatus::Countdown;
            Ok(())
        })
        .unwrap();

        assert_eq!(doc.session.status, RaceStatus::Countdown);
        let stored = decode(&store.read(&race_path("r1")).unwrap()).unwrap();
        assert_eq!(stored.session.status, RaceStatus::Countdown);
    }

    #[test]
    fn test_update_race_missing_room() {
        let store = Store::new();

        let err = update_race(&store, "nope", |_| Ok(())).unwrap_err();
        assert!(matches!(err, RaceError::RoomClosed(id) if id == "nope"));
    }

    #[test]
    fn test_update_race_propagates_closure_error_without_writing() {
        let store = Store::new();
        seed_race(&store, "r1");
        let before = store.read(&race_path("r1")).unwrap();

        let err = update_race(&store, "r1", |doc| {
            doc.session.status = RaceStatus::Finished;
            Err(RaceError::Precondition("nope".to_string()))
        })
        .unwrap_err();

        assert!(matches!(err, RaceError::Precondition(_)));
        assert_eq!(store.read(&race_path("r1")).unwrap(), before);
    }

    #[test]
    fn test_update_race_rejects_corrupt_document() {
        let store = Store::new();
        store.write(&race_path("r1"), json!("not a race"));

        let err = update_race(&store, "r1", |_| Ok(())).unwrap_err();
        assert!(matches!(err, RaceError::RoomClosed(_)));
    }
}
