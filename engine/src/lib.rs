//! # Race Synchronization Engine
//!
//! This library coordinates a multiplayer sprint race among concurrently
//! connected participants. Each runner advances a lane by submitting
//! discrete step inputs; every runner, the display and the admin observe a
//! consistent, low-latency view of progress, countdown timing and finish
//! order — despite all of them writing shared state independently, with no
//! central sequencer at the input layer.
//!
//! ## Core Responsibilities
//!
//! ### Conflict-Safe Progress Counters
//! Step submissions mutate a shared per-race document through the store's
//! optimistic read-modify-write primitive: read, compute, commit only if
//! unchanged, retry on conflict within a bounded budget. Final positions
//! are exactly the sum of accepted steps — nothing lost, nothing doubled.
//!
//! ### Authoritative Lifecycle
//! A race session moves through the fixed order waiting → countdown →
//! started → finished and never backwards. Every transition is guarded by
//! a precondition on the current status inside the same conflict-safe
//! write, so concurrent duplicate triggers commit exactly once.
//!
//! ### Shared-Deadline Countdown
//! The countdown is anchored to a single server timestamp rather than a
//! broadcast tick. Every client derives the remaining time from the same
//! anchor, so late joiners and reconnecting clients converge on the same
//! deadline for free.
//!
//! ### Room Expiration
//! Rooms idle past the expiration window are swept away, roster and all.
//! The sweep races safely against joins: removal is idempotent, and a join
//! that loses the race fails with a closed-room error instead of
//! resurrecting the room.
//!
//! ## Module Organization
//!
//! - [`steps`] — the progress counter protocol, including in-transaction
//!   rank assignment (first committer wins under concurrent finishes)
//! - [`race`] — the lifecycle state machine and its guarded transitions
//! - [`countdown`] — deadline derivation and the background deadline watcher
//! - [`rooms`] — creation, roster maintenance and the expiration sweep
//! - [`watch`] — read-only, coalescing observation handles for any number
//!   of runners, displays and admins
//! - [`service`] — the facade wiring all of the above over one store handle
//! - [`doc`] — single-document race layout and typed transactional access
//! - [`error`] — the recoverable error taxonomy shared by every operation

pub mod countdown;
pub mod doc;
pub mod error;
pub mod race;
pub mod rooms;
pub mod service;
pub mod steps;
pub mod watch;

pub use error::RaceError;
pub use service::RaceService;
pub use steps::AcceptedStep;
pub use watch::{RaceSnapshot, RaceWatcher};
