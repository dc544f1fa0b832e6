//! Agent registry and pulse tracking (C4).
//!
//! Two indexes over the same `Agent` records — by id and by name — mirror
//! the teacher's `AgentPool`. Names are the operator-facing handle agents
//! heartbeat and claim tasks with, so lookups by name are the hot path.

use std::collections::HashMap;

use chrono::Utc;
use swarm_common::{Agent, AgentId, AgentRole, AgentStatus, CoreError, CoreResult};

/// Fixed dictionary for deterministic name assignment (§4.4): an agent id
/// always hashes to the same adjective-noun pair, so a reconnect before
/// dedup reproduces the same name.
const ADJECTIVES: &[&str] = &[
    "brave", "quiet", "swift", "lucky", "clever", "gentle", "bold", "calm",
    "eager", "fuzzy", "jolly", "keen", "lively", "merry", "nimble", "proud",
];
const NOUNS: &[&str] = &[
    "falcon", "otter", "comet", "maple", "ember", "harbor", "lynx", "meadow",
    "nova", "quartz", "raven", "summit", "tundra", "willow", "zephyr", "canyon",
];

fn dictionary_name(id: AgentId) -> String {
    let hash = id
        .0
        .as_bytes()
        .iter()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as u64));
    let adjective = ADJECTIVES[(hash as usize) % ADJECTIVES.len()];
    let noun = NOUNS[((hash >> 32) as usize) % NOUNS.len()];
    format!("{adjective}-{noun}")
}

#[derive(Default)]
pub struct AgentRegistry {
    by_id: HashMap<AgentId, Agent>,
    by_name: HashMap<String, AgentId>,
}

impl AgentRegistry {
    /// Registers `id` for the first time, or returns its existing record
    /// unchanged if it has already registered (idempotent identity, §8).
    /// The `bool` is whether this call actually created a new record.
    pub fn register(
        &mut self,
        id: AgentId,
        name: Option<String>,
        platform: String,
        role: AgentRole,
    ) -> CoreResult<(Agent, bool)> {
        if let Some(existing) = self.by_id.get(&id) {
            return Ok((existing.clone(), false));
        }

        let name = match name {
            Some(name) => {
                if self.by_name.contains_key(&name) {
                    return Err(CoreError::Conflict(format!("agent name {name} is already registered")));
                }
                name
            }
            None => self.assign_name(id),
        };

        let agent = Agent {
            id,
            name: name.clone(),
            platform,
            role,
            status: AgentStatus::Active,
            current_file: None,
            current_task: None,
            last_heartbeat_ts: Utc::now(),
            connection_id: None,
        };
        self.by_name.insert(name, id);
        self.by_id.insert(id, agent.clone());
        Ok((agent, true))
    }

    /// Picks the dictionary name for `id`, disambiguating with a short id
    /// suffix in the rare case two ids hash to the same pair.
    fn assign_name(&self, id: AgentId) -> String {
        let base = dictionary_name(id);
        if !self.by_name.contains_key(&base) {
            return base;
        }
        format!("{base}-{}", &id.to_string()[..4])
    }

    pub fn get_mut(&mut self, name: &str) -> CoreResult<&mut Agent> {
        let id = *self
            .by_name
            .get(name)
            .ok_or_else(|| CoreError::NotRegistered(name.to_string()))?;
        self.by_id
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotRegistered(name.to_string()))
    }

    pub fn get(&self, name: &str) -> CoreResult<&Agent> {
        let id = self
            .by_name
            .get(name)
            .ok_or_else(|| CoreError::NotRegistered(name.to_string()))?;
        self.by_id
            .get(id)
            .ok_or_else(|| CoreError::NotRegistered(name.to_string()))
    }

    pub fn heartbeat(
        &mut self,
        name: &str,
        current_file: Option<String>,
        current_task: Option<swarm_common::TaskId>,
        status: Option<AgentStatus>,
    ) -> CoreResult<Agent> {
        let agent = self.get_mut(name)?;
        agent.last_heartbeat_ts = Utc::now();
        if current_file.is_some() {
            agent.current_file = current_file;
        }
        if current_task.is_some() {
            agent.current_task = current_task;
        }
        agent.status = status.unwrap_or(AgentStatus::Active);
        Ok(agent.clone())
    }

    pub fn mark_offline(&mut self, name: &str) -> Option<Agent> {
        if let Ok(agent) = self.get_mut(name) {
            agent.status = AgentStatus::Offline;
            return Some(agent.clone());
        }
        None
    }

    pub fn list(&self) -> Vec<Agent> {
        self.by_id.values().cloned().collect()
    }

    /// Agents whose last heartbeat is older than `timeout_ms` and who
    /// aren't already marked offline.
    pub fn overdue(&self, timeout_ms: u64) -> Vec<String> {
        let now = Utc::now();
        self.by_id
            .values()
            .filter(|a| a.status != AgentStatus::Offline)
            .filter(|a| {
                now.signed_duration_since(a.last_heartbeat_ts).num_milliseconds() as u64
                    > timeout_ms
            })
            .map(|a| a.name.clone())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Agent> {
        self.list()
    }

    pub fn restore(&mut self, agents: Vec<Agent>) {
        for agent in agents {
            self.by_name.insert(agent.name.clone(), agent.id);
            self.by_id.insert(agent.id, agent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_one() -> (AgentRegistry, String) {
        let mut registry = AgentRegistry::default();
        let (agent, is_new) = registry
            .register(AgentId::new(), Some("ada".to_string()), "vscode".to_string(), AgentRole::Executor)
            .unwrap();
        assert!(is_new);
        (registry, agent.name)
    }

    #[test]
    fn register_assigns_a_dictionary_name_when_none_given() {
        let mut registry = AgentRegistry::default();
        let id = AgentId::new();
        let (agent, is_new) = registry
            .register(id, None, "vscode".to_string(), AgentRole::Executor)
            .unwrap();
        assert!(is_new);
        assert!(agent.name.contains('-'));
        assert_eq!(registry.get(&agent.name).unwrap().id, agent.id);
        assert_eq!(dictionary_name(id), agent.name);
    }

    #[test]
    fn registering_the_same_id_twice_is_idempotent() {
        let mut registry = AgentRegistry::default();
        let id = AgentId::new();
        let (first, first_is_new) = registry
            .register(id, None, "vscode".to_string(), AgentRole::Executor)
            .unwrap();
        let (second, second_is_new) = registry
            .register(id, Some("someone-else".to_string()), "cli".to_string(), AgentRole::Observer)
            .unwrap();
        assert!(first_is_new);
        assert!(!second_is_new);
        assert_eq!(first.name, second.name);
        assert_eq!(first.platform, second.platform);
    }

    #[test]
    fn registering_a_different_id_with_a_taken_name_conflicts() {
        let mut registry = AgentRegistry::default();
        registry
            .register(AgentId::new(), Some("ada".to_string()), "vscode".to_string(), AgentRole::Executor)
            .unwrap();
        let err = registry
            .register(AgentId::new(), Some("ada".to_string()), "cli".to_string(), AgentRole::Executor)
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn heartbeat_updates_status_and_pulse() {
        let (mut registry, name) = registry_with_one();
        let before = registry.get(&name).unwrap().last_heartbeat_ts;
        let updated = registry
            .heartbeat(&name, Some("src/lib.rs".to_string()), None, Some(AgentStatus::Idle))
            .unwrap();
        assert_eq!(updated.current_file.as_deref(), Some("src/lib.rs"));
        assert_eq!(updated.status, AgentStatus::Idle);
        assert!(updated.last_heartbeat_ts >= before);
    }

    #[test]
    fn heartbeat_on_unknown_agent_is_not_registered() {
        let mut registry = AgentRegistry::default();
        assert!(matches!(
            registry.heartbeat("ghost", None, None, None),
            Err(CoreError::NotRegistered(_))
        ));
    }

    #[test]
    fn overdue_excludes_already_offline_agents() {
        let (mut registry, name) = registry_with_one();
        assert!(registry.overdue(0).contains(&name));
        registry.mark_offline(&name);
        assert!(!registry.overdue(0).contains(&name));
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let (registry, name) = registry_with_one();
        let snapshot = registry.snapshot();

        let mut restored = AgentRegistry::default();
        restored.restore(snapshot);
        assert_eq!(restored.get(&name).unwrap().name, name);
    }
}
