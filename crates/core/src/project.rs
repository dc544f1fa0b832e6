//! The project actor: a single `tokio::select!` loop owning all state for
//! one coordinated project, plus the handle other crates talk to it
//! through.
//!
//! Every request — mutating or not — is processed one at a time off a
//! single mpsc channel, so the order in which an operation observes state
//! and the order in which it emits events is never ambiguous. Nothing
//! else is allowed to touch `Project`'s fields directly.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, SystemTime, UNIX_EPOCH};

use serde_json::json;
use swarm_common::{CoreConfig, CoreError, CoreResult, EventKind, ProjectSnapshot};
use tokio::sync::{mpsc, oneshot};

use crate::agents::AgentRegistry;
use crate::election::Election;
use crate::event_log::EventLog;
use crate::leases::LeaseTable;
use crate::messaging::Inboxes;
use crate::request::{ActorResponse, Outcome, Request};
use crate::safety::SafetyGate;
use crate::tasks::TaskBoard;

type Envelope = (Request, oneshot::Sender<ActorResponse>);

pub struct Project {
    id: String,
    config: CoreConfig,
    agents: AgentRegistry,
    leases: LeaseTable,
    tasks: TaskBoard,
    election: Election,
    inboxes: Inboxes,
    safety: SafetyGate,
    log: EventLog,
    requests: mpsc::Receiver<Envelope>,
}

/// The cloneable, cheap-to-hold handle a registry or a WebSocket hub uses
/// to talk to a running project actor.
#[derive(Clone)]
pub struct ProjectHandle {
    id: String,
    tx: mpsc::Sender<Envelope>,
    last_activity_ms: Arc<AtomicI64>,
}

impl ProjectHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn request(&self, req: Request) -> ActorResponse {
        self.touch();
        let (tx, rx) = oneshot::channel();
        self.tx
            .send((req, tx))
            .await
            .map_err(|_| CoreError::Internal("project actor is no longer running".to_string()))?;
        rx.await
            .map_err(|_| CoreError::Internal("project actor dropped the response".to_string()))?
    }

    fn touch(&self) {
        self.last_activity_ms.store(now_ms(), Ordering::Relaxed);
    }

    /// Milliseconds since this handle last sent a request, used by the
    /// registry's idle sweep.
    pub fn idle_for_ms(&self) -> i64 {
        (now_ms() - self.last_activity_ms.load(Ordering::Relaxed)).max(0)
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

const REQUEST_QUEUE_DEPTH: usize = 256;
const REAP_INTERVAL_MS: u64 = 1000;

impl Project {
    pub async fn spawn(id: String, config: CoreConfig) -> anyhow::Result<ProjectHandle> {
        let data_dir = Path::new(&config.data_dir).join(&id);
        let (log, snapshot) =
            EventLog::open(&data_dir, config.snapshot_every_n, config.max_event_queue).await?;

        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let mut project = Self {
            id: id.clone(),
            config,
            agents: AgentRegistry::default(),
            leases: LeaseTable::default(),
            tasks: TaskBoard::default(),
            election: Election::default(),
            inboxes: Inboxes::default(),
            safety: SafetyGate::default(),
            log,
            requests: rx,
        };

        if let Some(snapshot) = snapshot {
            project.restore(snapshot);
        }

        tracing::info!(project_id = %id, "project actor starting");
        tokio::spawn(async move { project.run().await });

        Ok(ProjectHandle {
            id,
            tx,
            last_activity_ms: Arc::new(AtomicI64::new(now_ms())),
        })
    }

    fn restore(&mut self, snapshot: ProjectSnapshot) {
        self.agents.restore(snapshot.agents);
        self.leases.restore(snapshot.leases);
        self.tasks.restore(snapshot.tasks, snapshot.auctions);
        self.election.restore(snapshot.orchestrator);
        self.safety.restore(snapshot.stop_flag, snapshot.votes);
    }

    async fn run(mut self) {
        let mut reap_interval = tokio::time::interval(StdDuration::from_millis(REAP_INTERVAL_MS));
        loop {
            tokio::select! {
                incoming = self.requests.recv() => {
                    match incoming {
                        Some((req, reply)) => {
                            let response = self.handle(req);
                            let _ = reply.send(response);
                            self.maybe_snapshot();
                        }
                        None => break,
                    }
                }
                _ = reap_interval.tick() => {
                    self.reap();
                    self.maybe_snapshot();
                }
            }
        }
        tracing::info!(project_id = %self.id, "project actor stopped");
    }

    fn emit(&mut self, kind: EventKind, payload: serde_json::Value) {
        self.log.append(kind, payload);
    }

    fn maybe_snapshot(&mut self) {
        if !self.log.should_snapshot() {
            return;
        }
        let snapshot = self.build_snapshot();
        if let Err(e) = self.log.write_snapshot(snapshot) {
            tracing::error!(project_id = %self.id, error = %e, "failed to write project snapshot");
        }
    }

    fn build_snapshot(&self) -> ProjectSnapshot {
        let (tasks, auctions) = self.tasks.snapshot();
        ProjectSnapshot {
            seq: self.log.current_seq(),
            agents: self.agents.snapshot(),
            tasks,
            leases: self.leases.list(),
            orchestrator: self.election.current().cloned(),
            auctions,
            votes: self.safety.list(),
            stop_flag: self.safety.stop_flag().clone(),
        }
    }

    /// Time-driven housekeeping: expired leases, closed auctions, a timed
    /// out orchestrator, and offline agents.
    fn reap(&mut self) {
        for lease in self.leases.reap_expired() {
            self.emit(
                EventKind::FileUnlocked,
                json!({ "path": lease.path, "holder": lease.holder, "reason": "expired" }),
            );
        }

        for task_id in self.tasks.due_auctions() {
            match self.tasks.close_auction(task_id) {
                Ok(Some((auction, winner))) => {
                    self.emit(
                        EventKind::AuctionAwarded,
                        json!({ "task_id": task_id, "winner": winner, "bids": auction.bids.len() }),
                    );
                    self.emit(
                        EventKind::TaskAssigned,
                        json!({ "task_id": task_id, "agent": winner }),
                    );
                }
                Ok(None) => {
                    self.emit(EventKind::AuctionAwarded, json!({ "task_id": task_id, "winner": null }));
                }
                Err(e) => tracing::warn!(project_id = %self.id, error = %e, "failed to close due auction"),
            }
        }

        if let Some(vacated) = self.election.reap(self.config.orch_timeout_ms) {
            self.emit(
                EventKind::OrchestratorChanged,
                json!({ "previous": vacated.agent_name, "reason": "heartbeat_timeout" }),
            );
        }

        for name in self.agents.overdue(self.config.heartbeat_timeout_ms) {
            if let Some(agent) = self.agents.mark_offline(&name) {
                let released = self.leases.release_all_for(&name);
                for lease in &released {
                    self.emit(
                        EventKind::FileUnlocked,
                        json!({ "path": lease.path, "holder": lease.holder, "reason": "agent_offline" }),
                    );
                }
                self.emit(EventKind::AgentOffline, json!({ "agent": agent.name }));
            }
        }

        for vote_id in self.safety.due_votes() {
            if let Some(vote) = self.safety.close(vote_id) {
                self.emit(
                    EventKind::VoteClosed,
                    json!({ "vote_id": vote.id, "passed": vote.has_passed() }),
                );
            }
        }
    }

    fn handle(&mut self, req: Request) -> ActorResponse {
        match req {
            Request::Register { agent_id, name, platform, role } => {
                let id = agent_id.unwrap_or_else(swarm_common::AgentId::new);
                let (agent, is_new) = self.agents.register(id, name, platform, role)?;
                if is_new {
                    self.emit(
                        EventKind::AgentRegistered,
                        json!({ "agent": agent.name, "role": agent.role }),
                    );
                }
                Ok(Outcome::value(agent))
            }
            Request::Heartbeat { agent, current_file, current_task, status } => {
                let updated = self.agents.heartbeat(&agent, current_file, current_task, status)?;
                Ok(Outcome::value(updated))
            }
            Request::AgentList => Ok(Outcome::value(self.agents.list())),

            Request::Elect { agent } => {
                let record = self.agents.get(&agent)?;
                let (agent_id, agent_name) = (record.id, record.name.clone());
                let elected = self.election.elect(agent_id, agent_name, self.config.orch_timeout_ms)?;
                self.emit(
                    EventKind::OrchestratorChanged,
                    json!({ "agent": elected.agent_name, "epoch": elected.epoch }),
                );
                Ok(Outcome::value(elected))
            }
            Request::OrchHeartbeat { agent, epoch } => {
                self.election.heartbeat(&agent, epoch)?;
                Ok(Outcome::unit())
            }
            Request::Resign { agent, epoch } => {
                self.election.resign(&agent, epoch)?;
                self.emit(EventKind::OrchestratorChanged, json!({ "agent": agent, "reason": "resigned" }));
                Ok(Outcome::unit())
            }

            Request::TaskCreate { title, description, priority, depends_on, files, external_ref } => {
                self.safety.check_mutation_allowed()?;
                let task = self.tasks.create(
                    title,
                    description,
                    priority.unwrap_or(swarm_common::TaskPriority::Normal),
                    depends_on,
                    files,
                    external_ref,
                )?;
                self.emit(EventKind::TaskCreated, json!({ "task_id": task.id, "title": task.title }));
                Ok(Outcome::value(task))
            }
            Request::TaskList => Ok(Outcome::value(self.tasks.list())),
            Request::TaskUpdate { task_id, caller, epoch, status, assignee } => {
                self.safety.check_mutation_allowed()?;
                let current = self.tasks.get(task_id)?.clone();
                self.authorize_task_mutation(&current, &caller, epoch)?;
                let task = self.tasks.update(task_id, status, assignee)?;
                let kind = match task.status {
                    swarm_common::TaskStatus::Done => EventKind::TaskCompleted,
                    _ => EventKind::TaskUpdated,
                };
                if matches!(task.status, swarm_common::TaskStatus::Done | swarm_common::TaskStatus::Canceled) {
                    for lease in self.leases.release_all_for_task(task_id) {
                        self.emit(
                            EventKind::FileUnlocked,
                            json!({ "path": lease.path, "holder": lease.holder, "reason": "task_closed" }),
                        );
                    }
                }
                self.emit(kind, json!({ "task_id": task.id, "status": task.status }));
                Ok(Outcome::value(task))
            }
            Request::TaskAssign { task_id, agent, caller, epoch } => {
                self.safety.check_mutation_allowed()?;
                self.agents.get(&caller)?;
                let current = self.tasks.get(task_id)?.clone();
                let is_self_claim = caller == agent
                    && current.is_open_and_unassigned()
                    && self.tasks.dependencies_satisfied(task_id);
                if !is_self_claim {
                    self.authorize_orchestrator(&caller, epoch)?;
                }
                let task = self.tasks.assign(task_id, agent.clone())?;
                self.emit(EventKind::TaskAssigned, json!({ "task_id": task.id, "agent": agent }));
                self.emit(EventKind::TaskClaimed, json!({ "task_id": task.id, "agent": agent }));
                Ok(Outcome::value(task))
            }

            Request::AuctionAnnounce { task_id, caller, duration_ms } => {
                self.safety.check_mutation_allowed()?;
                self.agents.get(&caller)?;
                let auction = self
                    .tasks
                    .open_auction(task_id, duration_ms.unwrap_or(self.config.auction_default_ms))?;
                self.emit(EventKind::AuctionOpened, json!({ "task_id": task_id, "closes_at": auction.closes_at }));
                Ok(Outcome::value(auction))
            }
            Request::AuctionBid { task_id, agent, score } => {
                self.safety.check_mutation_allowed()?;
                self.agents.get(&agent)?;
                let auction = self.tasks.bid(task_id, agent.clone(), score)?;
                self.emit(EventKind::AuctionBid, json!({ "task_id": task_id, "agent": agent, "score": score }));
                Ok(Outcome::value(auction))
            }

            Request::FileReserve { path, agent, ttl_ms, exclusive, task_id } => {
                self.safety.check_mutation_allowed()?;
                self.agents.get(&agent)?;
                let lease = self.leases.reserve(
                    path,
                    agent,
                    exclusive.unwrap_or(true),
                    ttl_ms.unwrap_or(self.config.min_lease_ttl_ms),
                    task_id,
                    self.config.min_lease_ttl_ms,
                    self.config.max_lease_ttl_ms,
                )?;
                self.emit(
                    EventKind::FileLocked,
                    json!({ "path": lease.path, "holder": lease.holder, "expires_at": lease.expires_at }),
                );
                Ok(Outcome::value(lease))
            }
            Request::FileRelease { path, agent } => {
                self.safety.check_mutation_allowed()?;
                let lease = self.leases.release(&path, &agent)?;
                self.emit(EventKind::FileUnlocked, json!({ "path": lease.path, "holder": lease.holder, "reason": "released" }));
                Ok(Outcome::unit())
            }
            Request::FileRenew { path, agent, ttl_ms } => {
                self.safety.check_mutation_allowed()?;
                let lease = self.leases.renew(
                    &path,
                    &agent,
                    ttl_ms.unwrap_or(self.config.min_lease_ttl_ms),
                    self.config.min_lease_ttl_ms,
                    self.config.max_lease_ttl_ms,
                )?;
                Ok(Outcome::value(lease))
            }
            Request::FileList => Ok(Outcome::value(self.leases.list())),
            Request::FileForecast { files } => {
                let in_progress_files: std::collections::HashSet<String> = self
                    .tasks
                    .list()
                    .into_iter()
                    .filter(|t| t.status == swarm_common::TaskStatus::InProgress)
                    .flat_map(|t| t.files.into_iter())
                    .collect();
                let forecast = self.leases.forecast(&files, &in_progress_files)?;
                Ok(Outcome::value(forecast))
            }

            Request::MessageSend { from, to, thread, body } => {
                let message = self.inboxes.send(from, to, thread, body);
                self.emit(EventKind::Message, json!({ "from": message.from, "to": message.to, "seq": message.seq }));
                Ok(Outcome::value(message))
            }
            Request::MessageInbox { agent, since } => {
                Ok(Outcome::value(self.inboxes.fetch(&agent, since.unwrap_or(0))))
            }
            Request::Broadcast { from, channel, body } => {
                self.emit(EventKind::Chat, json!({ "from": from, "channel": channel, "body": body }));
                Ok(Outcome::unit())
            }

            Request::VoteStart { kind, subject, opened_by, quorum, threshold, duration_ms } => {
                self.agents.get(&opened_by)?;
                let vote = self.safety.open_vote(kind, subject, opened_by, quorum, threshold, duration_ms);
                self.emit(EventKind::VoteOpened, json!({ "vote_id": vote.id, "subject": vote.subject }));
                Ok(Outcome::value(vote))
            }
            Request::VoteCast { vote_id, agent, choice } => {
                self.agents.get(&agent)?;
                let vote = self.safety.cast(vote_id, agent.clone(), choice)?;
                self.emit(EventKind::VoteCast, json!({ "vote_id": vote_id, "agent": agent, "choice": choice }));
                Ok(Outcome::value(vote))
            }

            Request::Stop { reason, by } => {
                self.agents.get(&by)?;
                let flag = self.safety.stop(reason, by);
                self.emit(EventKind::SwarmStopped, json!({ "by": flag.by, "reason": flag.reason }));
                Ok(Outcome::value(flag))
            }
            Request::Resume { by } => {
                self.agents.get(&by)?;
                let flag = self.safety.resume(by);
                self.emit(EventKind::SwarmResumed, json!({ "by": flag.by }));
                Ok(Outcome::value(flag))
            }

            Request::Status => Ok(Outcome::value(self.build_snapshot())),
            Request::Subscribe { kinds: _kinds } => Ok(Outcome::Subscribed {
                receiver: self.log.subscribe(),
                current_seq: self.log.current_seq(),
            }),
            Request::Replay { since_seq, max } => {
                Ok(Outcome::value(self.log.replay(since_seq, max.unwrap_or(500))))
            }
        }
    }

    /// A task mutation is allowed without the caller holding the
    /// orchestrator seat when the caller is the task's own assignee
    /// (self-completion, self-status-update). Anything else falls back to
    /// [`Self::authorize_orchestrator`].
    fn authorize_task_mutation(&self, task: &swarm_common::Task, caller: &str, epoch: Option<u64>) -> CoreResult<()> {
        self.agents.get(caller)?;
        if task.assignee.as_deref() == Some(caller) {
            return Ok(());
        }
        self.authorize_orchestrator(caller, epoch)
    }

    /// Requires the caller to be the current orchestrator presenting the
    /// current epoch, once an orchestrator has ever been elected. Projects
    /// that never elect one stay permissive.
    fn authorize_orchestrator(&self, caller: &str, epoch: Option<u64>) -> CoreResult<()> {
        self.agents.get(caller)?;
        let Some(current) = self.election.current() else {
            return Ok(());
        };
        if current.agent_name != caller {
            return Err(CoreError::Forbidden(format!(
                "{caller} is not the current orchestrator"
            )));
        }
        match epoch {
            Some(epoch) => self.election.check_epoch(epoch),
            None => Err(CoreError::InvalidRequest("epoch is required once an orchestrator is elected".to_string())),
        }
    }
}
