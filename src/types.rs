use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::service::Tournament;

// ── Constants ──────────────────────────────────────────────────────────

pub const DEFAULT_MAX_INNINGS: u32 = 6;
pub const MAX_INNINGS_LIMIT: u32 = 30;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_DEDUP_TTL_SECS: u64 = 60;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:17890";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const SCHEDULE_TIME_FORMAT: &str = "%H:%M";

pub const HELP_TEXT: &str = "Commands:\n\
Start: A 1 start RedTeam BlueTeam\n\
Score: A 1 3Top 4\n\
Finish: A 1 finish\n\
Reopen: A 1 reopen\n\
Tiebreak: A 1 tiebreak RedTeam";

// ── Shared state type aliases ──────────────────────────────────────────

pub type SharedTournament = Arc<Tournament>;

// ── Match identity ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchKey {
    pub court: String,
    pub game_number: u32,
}

impl MatchKey {
    pub fn new(court: impl Into<String>, game_number: u32) -> Self {
        MatchKey {
            court: court.into(),
            game_number,
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Court {} game {}", self.court, self.game_number)
    }
}

/// One of the two team positions in a match. Top bats first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    Top,
    Bottom,
}

impl Slot {
    pub fn opposite(self) -> Slot {
        match self {
            Slot::Top => Slot::Bottom,
            Slot::Bottom => Slot::Top,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Slot::Top => "Top",
            Slot::Bottom => "Bottom",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Slot::Top => "top",
            Slot::Bottom => "bottom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MatchStatus {
    #[default]
    Standby,
    Playing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecidedBy {
    Score,
    Tiebreak,
}

/// Routes a finished match's winner or loser into a slot of a later game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketEdge {
    pub game_number: u32,
    pub slot: Slot,
}

// ── Match ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub court: String,
    pub game_number: u32,
    #[serde(default)]
    pub top_team: Option<String>,
    #[serde(default)]
    pub bottom_team: Option<String>,
    #[serde(default)]
    pub status: MatchStatus,
    #[serde(default)]
    pub scheduled_start: Option<NaiveTime>,
    #[serde(default)]
    pub winner_next: Option<BracketEdge>,
    #[serde(default)]
    pub loser_next: Option<BracketEdge>,
    #[serde(default)]
    pub winner: Option<Slot>,
    #[serde(default)]
    pub decided_by: Option<DecidedBy>,
}

impl Match {
    /// A freshly referenced match: no teams, no edges, waiting to start.
    pub fn new(key: &MatchKey) -> Self {
        Match {
            court: key.court.clone(),
            game_number: key.game_number,
            top_team: None,
            bottom_team: None,
            status: MatchStatus::Standby,
            scheduled_start: None,
            winner_next: None,
            loser_next: None,
            winner: None,
            decided_by: None,
        }
    }

    pub fn key(&self) -> MatchKey {
        MatchKey::new(self.court.clone(), self.game_number)
    }

    pub fn team(&self, slot: Slot) -> Option<&str> {
        match slot {
            Slot::Top => self.top_team.as_deref(),
            Slot::Bottom => self.bottom_team.as_deref(),
        }
        .filter(|name| !name.is_empty())
    }

    pub fn set_team(&mut self, slot: Slot, name: impl Into<String>) {
        let name = Some(name.into());
        match slot {
            Slot::Top => self.top_team = name,
            Slot::Bottom => self.bottom_team = name,
        }
    }

    /// Display name for a slot, falling back to the slot label while the team is unknown.
    pub fn team_or_label(&self, slot: Slot) -> String {
        self.team(slot)
            .map(|name| name.to_string())
            .unwrap_or_else(|| slot.label().to_string())
    }

    pub fn has_both_teams(&self) -> bool {
        self.team(Slot::Top).is_some() && self.team(Slot::Bottom).is_some()
    }

    pub fn slot_of(&self, team: &str) -> Option<Slot> {
        if self.team(Slot::Top) == Some(team) {
            Some(Slot::Top)
        } else if self.team(Slot::Bottom) == Some(team) {
            Some(Slot::Bottom)
        } else {
            None
        }
    }

    pub fn edge(&self, outcome: Outcome) -> Option<BracketEdge> {
        match outcome {
            Outcome::Winner => self.winner_next,
            Outcome::Loser => self.loser_next,
        }
    }

    /// Finished on equal totals and still waiting for a tiebreak.
    pub fn is_draw(&self) -> bool {
        self.status == MatchStatus::Finished && self.winner.is_none()
    }

    pub fn winner_team(&self) -> Option<&str> {
        self.winner.and_then(|slot| self.team(slot))
    }

    pub fn loser_team(&self) -> Option<&str> {
        self.winner.and_then(|slot| self.team(slot.opposite()))
    }

    pub fn start_label(&self) -> String {
        self.scheduled_start
            .map(|time| time.format(SCHEDULE_TIME_FORMAT).to_string())
            .unwrap_or_else(|| "TBD".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Winner,
    Loser,
}

// ── Ledger and decisions ───────────────────────────────────────────────

/// Per-inning runs for both halves, `None` where nothing has been reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSnapshot {
    pub top: Vec<Option<u32>>,
    pub bottom: Vec<Option<u32>>,
    pub top_total: u32,
    pub bottom_total: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "slot")]
pub enum Decision {
    Undetermined,
    Win(Slot),
    Draw,
}

// ── Transport payloads ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    #[serde(default)]
    pub event_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub sender_id: Option<String>,
}

/// What the transport relays back: a reply to the sender and, optionally,
/// text for the audience channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReply {
    pub ok: bool,
    pub message: String,
    pub broadcast: Option<String>,
}

impl CommandReply {
    pub fn success(message: impl Into<String>, broadcast: Option<String>) -> Self {
        CommandReply {
            ok: true,
            message: message.into(),
            broadcast,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        CommandReply {
            ok: false,
            message: message.into(),
            broadcast: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    #[serde(rename = "match")]
    pub game: Match,
    pub score: ScoreSnapshot,
    pub decision: Decision,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentState {
    pub matches: Vec<MatchView>,
    pub max_innings: u32,
    pub generated_at: String,
}

/// Audit row appended to the store log for every applied mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRow {
    pub timestamp: String,
    pub court: String,
    pub game_number: u32,
    pub inning: Option<u32>,
    pub half: Option<Slot>,
    pub runs: Option<u32>,
    pub sender_id: String,
    pub kind: String,
}

// ── Config types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub data_dir: String,
    pub bracket_path: String,
    pub broadcast_url: String,
    pub max_innings: u32,
    pub lock_timeout_ms: u64,
    pub dedup_ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
            bracket_path: String::new(),
            broadcast_url: String::new(),
            max_innings: DEFAULT_MAX_INNINGS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            dedup_ttl_secs: DEFAULT_DEDUP_TTL_SECS,
        }
    }
}
