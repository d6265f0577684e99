use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const FINISH_DISTANCE: u32 = 1000;
pub const DISTANCE_OPTIONS: [u32; 3] = [100, 500, 1000];
pub const MIN_STEP: u32 = 1;
pub const MAX_STEP: u32 = 6;
pub const DASH_STEP: u32 = 3;
pub const BOOST_STEP: u32 = 6;
pub const COUNTDOWN_DURATION_MS: u64 = 3000;
pub const ROOM_EXPIRATION_MS: u64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaceStatus {
    Waiting,
    Countdown,
    Started,
    Finished,
}

impl RaceStatus {
    /// Position of this status in the fixed lifecycle order. Statuses only
    /// ever move to a higher index, never back.
    pub fn stage_index(&self) -> u8 {
        match self {
            RaceStatus::Waiting => 0,
            RaceStatus::Countdown => 1,
            RaceStatus::Started => 2,
            RaceStatus::Finished => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RaceStatus::Finished)
    }
}

impl fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RaceStatus::Waiting => "waiting",
            RaceStatus::Countdown => "countdown",
            RaceStatus::Started => "started",
            RaceStatus::Finished => "finished",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceSession {
    pub id: String,
    pub status: RaceStatus,
    pub finish_distance: u32,
    pub countdown_started_at: Option<u64>,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    pub created_at: u64,
    pub last_activity_at: u64,
}

impl RaceSession {
    pub fn new(id: impl Into<String>, finish_distance: u32, now_ms: u64) -> Self {
        Self {
            id: id.into(),
            status: RaceStatus::Waiting,
            finish_distance,
            countdown_started_at: None,
            started_at: None,
            finished_at: None,
            created_at: now_ms,
            last_activity_at: now_ms,
        }
    }

    pub fn idle_for_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_activity_at)
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.idle_for_ms(now_ms) > ROOM_EXPIRATION_MS
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub nickname: String,
    pub position: u32,
    pub last_step_at: Option<u64>,
    pub rank: Option<u32>,
    pub joined_at: u64,
}

impl Participant {
    pub fn new(user_id: impl Into<String>, nickname: impl Into<String>, now_ms: u64) -> Self {
        Self {
            user_id: user_id.into(),
            nickname: nickname.into(),
            position: 0,
            last_step_at: None,
            rank: None,
            joined_at: now_ms,
        }
    }

    pub fn has_finished(&self) -> bool {
        self.rank.is_some()
    }
}

/// Presentation hint derived from a step value. Carries no persisted state;
/// any observer recomputes it from the step value alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Plain,
    Dash,
    Boost,
}

impl StepKind {
    pub fn from_value(step_value: u32) -> Self {
        match step_value {
            BOOST_STEP => StepKind::Boost,
            DASH_STEP => StepKind::Dash,
            _ => StepKind::Plain,
        }
    }
}

pub fn is_valid_step(step_value: u32) -> bool {
    (MIN_STEP..=MAX_STEP).contains(&step_value)
}

/// Remaining countdown time derived from the shared server-assigned anchor.
/// Every client computes the same value from `countdown_started_at` instead of
/// running a local timer, so a client joining mid-countdown converges on the
/// same deadline without any broadcast tick.
pub fn countdown_remaining_ms(countdown_started_at: u64, now_ms: u64) -> u64 {
    (countdown_started_at + COUNTDOWN_DURATION_MS).saturating_sub(now_ms)
}

/// One race document as stored: the session record plus its roster, keyed by
/// user id. Everything that must change atomically lives in this one tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceDoc {
    pub session: RaceSession,
    #[serde(default)]
    pub participants: BTreeMap<String, Participant>,
}

impl RaceDoc {
    pub fn new(session: RaceSession) -> Self {
        Self {
            session,
            participants: BTreeMap::new(),
        }
    }

    /// Next free finishing rank: one past the highest assigned so far.
    /// Ranks start at 1 and stay gap-free because assignment always goes
    /// through this under the race document's transaction.
    pub fn next_rank(&self) -> u32 {
        self.participants
            .values()
            .filter_map(|p| p.rank)
            .max()
            .unwrap_or(0)
            + 1
    }

    pub fn all_ranked(&self) -> bool {
        !self.participants.is_empty() && self.participants.values().all(|p| p.rank.is_some())
    }

    /// Roster in lane order (join order, user id as tie-breaker).
    pub fn lanes(&self) -> Vec<Participant> {
        let mut lanes: Vec<Participant> = self.participants.values().cloned().collect();
        lanes.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        lanes
    }
}
