//! Transport-level errors raised by the document store.

/// Errors surfaced by store operations. These describe store mechanics
/// (contention, lost subscriptions), never race rules; business errors are
/// the engine's own.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A conflict-safe write kept losing to concurrent writers and gave up
    /// after exhausting its retry budget.
    #[error("transaction on '{path}' still conflicted after {attempts} attempts")]
    Contended { path: String, attempts: u32 },

    /// The watcher's store side went away; no further notifications will
    /// arrive. Already-committed writes are unaffected.
    #[error("subscription closed")]
    SubscriptionClosed,
}
