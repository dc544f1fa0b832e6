//! Wire and domain types shared between `swarm-core` and `swarm-server`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Unique identifier for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a task, stable across the task's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteId(pub Uuid);

impl VoteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Orchestrator,
    Executor,
    Observer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Idle,
    Paused,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub platform: String,
    pub role: AgentRole,
    pub status: AgentStatus,
    pub current_file: Option<String>,
    pub current_task: Option<TaskId>,
    pub last_heartbeat_ts: DateTime<Utc>,
    pub connection_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Auctioning,
    InProgress,
    NeedsReview,
    Done,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub assignee: Option<String>,
    pub priority: TaskPriority,
    pub depends_on: BTreeSet<TaskId>,
    pub files: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub external_ref: Option<String>,
}

impl Task {
    /// A task is ready when it is open and unassigned; dependency readiness
    /// itself is checked against the task board, not on the struct alone.
    pub fn is_open_and_unassigned(&self) -> bool {
        self.status == TaskStatus::Open && self.assignee.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLease {
    pub path: String,
    pub holder: String,
    pub exclusive: bool,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub task_id: Option<TaskId>,
}

/// Per-path projection returned by `file_forecast`: purely informational,
/// takes no locks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileForecast {
    pub path: String,
    pub holder: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub claimed_by_in_progress_task: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorRecord {
    pub agent_id: AgentId,
    pub agent_name: String,
    pub epoch: u64,
    pub elected_at: DateTime<Utc>,
    pub last_heartbeat_ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub agent: String,
    pub score: f32,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub task_id: TaskId,
    pub opened_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub bids: Vec<Bid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Yes,
    No,
    Abstain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ballot {
    pub choice: VoteChoice,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub subject: String,
    pub kind: String,
    pub opened_by: String,
    pub opened_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub ballots: HashMap<String, Ballot>,
    pub quorum: u32,
    pub threshold: f32,
}

impl Vote {
    /// Whether the vote has already reached quorum and threshold.
    pub fn has_passed(&self) -> bool {
        let yes = self
            .ballots
            .values()
            .filter(|b| b.choice == VoteChoice::Yes)
            .count() as u32;
        let no = self
            .ballots
            .values()
            .filter(|b| b.choice == VoteChoice::No)
            .count() as u32;
        let cast = yes + no;
        if cast == 0 || cast < self.quorum {
            return false;
        }
        (yes as f32 / cast as f32) >= self.threshold
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopFlag {
    pub stopped: bool,
    pub reason: Option<String>,
    pub by: Option<String>,
    pub ts: DateTime<Utc>,
}

impl Default for StopFlag {
    fn default() -> Self {
        Self {
            stopped: false,
            reason: None,
            by: None,
            ts: Utc::now(),
        }
    }
}

/// Closed set of event kinds, per SPEC_FULL.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentRegistered,
    AgentOffline,
    AgentResumed,
    OrchestratorChanged,
    TaskCreated,
    TaskUpdated,
    TaskClaimed,
    TaskCompleted,
    TaskAssigned,
    AuctionOpened,
    AuctionBid,
    AuctionAwarded,
    FileLocked,
    FileUnlocked,
    Message,
    Chat,
    VoteOpened,
    VoteCast,
    VoteClosed,
    SwarmStopped,
    SwarmResumed,
    EventGap,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| "unknown".to_string());
        write!(f, "{s}")
    }
}

/// A single entry in a project's append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub ts: DateTime<Utc>,
    pub kind: EventKind,
    pub payload: serde_json::Value,
}

/// A message delivered through the inbox (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxMessage {
    pub seq: u64,
    pub from: String,
    pub to: String,
    pub thread: Option<String>,
    pub body: serde_json::Value,
    pub ts: DateTime<Utc>,
}

/// One accepted WebSocket connection, as tracked by the hub (C3, expansion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub connection_id: Uuid,
    pub project_id: String,
    pub agent_name: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub outbound_queue_len: usize,
}

/// The full JSON projection written by the snapshot store (C1, expansion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub seq: u64,
    pub agents: Vec<Agent>,
    pub tasks: Vec<Task>,
    pub leases: Vec<FileLease>,
    pub orchestrator: Option<OrchestratorRecord>,
    pub auctions: Vec<Auction>,
    pub votes: Vec<Vote>,
    pub stop_flag: StopFlag,
}

// ---------------------------------------------------------------------
// Wire frame envelopes
// ---------------------------------------------------------------------

/// `{"type": <string>, "id": <string>, ...params}` — the request envelope.
/// `params` carries whatever fields a given `type` needs; request handlers
/// deserialize it into a typed struct once the `type` is known.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(flatten)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseFrame {
    Ok {
        id: String,
        result: serde_json::Value,
    },
    Err {
        id: String,
        error: ErrorBody,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Event {
        seq: u64,
        kind: EventKind,
        ts: DateTime<Utc>,
        payload: serde_json::Value,
    },
    Welcome {
        seq: u64,
    },
    EventGap {
        last_delivered_seq: u64,
    },
}
