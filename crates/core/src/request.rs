//! The typed request/response surface a [`crate::ProjectHandle`] accepts.
//!
//! `Request` derives `Deserialize` directly against the wire frame object
//! (`{"type": "...", "id": "...", ...}`): serde's tagged-enum matching picks
//! the variant off `type` and ignores the extra `id` field, so
//! `swarm-server` can deserialize a whole frame into a `Request` in one
//! step.

use serde::{Deserialize, Serialize};
use swarm_common::{AgentId, AgentRole, EventKind, TaskId, TaskPriority, TaskStatus, VoteChoice};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Register {
        /// Stable identity for idempotent re-registration; a reconnecting
        /// agent that never learned its id leaves this unset and is minted
        /// a fresh one.
        #[serde(default)]
        agent_id: Option<AgentId>,
        name: Option<String>,
        platform: String,
        role: AgentRole,
    },
    Heartbeat {
        agent: String,
        current_file: Option<String>,
        current_task: Option<TaskId>,
        status: Option<swarm_common::AgentStatus>,
    },
    AgentList,

    Elect {
        agent: String,
    },
    OrchHeartbeat {
        agent: String,
        epoch: u64,
    },
    Resign {
        agent: String,
        epoch: u64,
    },

    TaskCreate {
        title: String,
        description: String,
        #[serde(default)]
        priority: Option<TaskPriority>,
        #[serde(default)]
        depends_on: Vec<TaskId>,
        #[serde(default)]
        files: Vec<String>,
        #[serde(default)]
        external_ref: Option<String>,
    },
    TaskList,
    TaskUpdate {
        task_id: TaskId,
        caller: String,
        #[serde(default)]
        epoch: Option<u64>,
        #[serde(default)]
        status: Option<TaskStatus>,
        #[serde(default)]
        assignee: Option<String>,
    },
    TaskAssign {
        task_id: TaskId,
        agent: String,
        caller: String,
        #[serde(default)]
        epoch: Option<u64>,
    },

    AuctionAnnounce {
        task_id: TaskId,
        caller: String,
        #[serde(default)]
        duration_ms: Option<u64>,
    },
    AuctionBid {
        task_id: TaskId,
        agent: String,
        score: f32,
    },

    FileReserve {
        path: String,
        agent: String,
        #[serde(default)]
        ttl_ms: Option<u64>,
        #[serde(default)]
        exclusive: Option<bool>,
        #[serde(default)]
        task_id: Option<TaskId>,
    },
    FileRelease {
        path: String,
        agent: String,
    },
    FileRenew {
        path: String,
        agent: String,
        #[serde(default)]
        ttl_ms: Option<u64>,
    },
    FileList,
    FileForecast {
        files: Vec<String>,
    },

    MessageSend {
        from: String,
        to: String,
        #[serde(default)]
        thread: Option<String>,
        body: serde_json::Value,
    },
    MessageInbox {
        agent: String,
        #[serde(default)]
        since: Option<u64>,
    },
    Broadcast {
        from: String,
        #[serde(default)]
        channel: Option<String>,
        body: serde_json::Value,
    },

    VoteStart {
        kind: String,
        subject: String,
        opened_by: String,
        #[serde(default)]
        quorum: Option<u32>,
        #[serde(default)]
        threshold: Option<f32>,
        #[serde(default)]
        duration_ms: Option<u64>,
    },
    VoteCast {
        vote_id: swarm_common::VoteId,
        agent: String,
        choice: VoteChoice,
    },

    Stop {
        reason: String,
        by: String,
    },
    Resume {
        by: String,
    },

    Status,
    Subscribe {
        #[serde(default)]
        kinds: Option<Vec<EventKind>>,
    },
    Replay {
        since_seq: u64,
        #[serde(default)]
        max: Option<usize>,
    },
}

/// What a request yields on success. Most requests resolve to a JSON
/// projection of whatever they touched; `Subscribe` hands back a live
/// receiver instead, since a `oneshot::Sender<Outcome>` can carry any type
/// just as well as one that only ever carries JSON.
pub enum Outcome {
    Value(serde_json::Value),
    Subscribed {
        receiver: broadcast::Receiver<swarm_common::Event>,
        current_seq: u64,
    },
}

impl Outcome {
    pub fn value(v: impl Serialize) -> Self {
        Self::Value(serde_json::to_value(v).unwrap_or(serde_json::Value::Null))
    }

    pub fn unit() -> Self {
        Self::Value(serde_json::json!({}))
    }
}

pub type ActorResponse = swarm_common::CoreResult<Outcome>;
