//! Project registry (C2): creates project actors on first use and idles
//! them out after a period of inactivity.
//!
//! A `DashMap` gives lock-free reads for the hot path (look up an
//! existing project), and a `tokio::sync::OnceCell` per key collapses
//! concurrent first-touches of the same project id into a single spawn,
//! the same init-gate pattern the teacher used for its agent pool.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use dashmap::DashMap;
use swarm_common::CoreConfig;
use tokio::sync::OnceCell;

use crate::project::{Project, ProjectHandle};

#[derive(Default)]
pub struct ProjectRegistry {
    projects: DashMap<String, Arc<OnceCell<ProjectHandle>>>,
    config: CoreConfig,
}

impl ProjectRegistry {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            projects: DashMap::new(),
            config,
        }
    }

    /// Returns the running actor for `project_id`, spawning one if this is
    /// the first request to see it. Concurrent callers racing on the same
    /// unseen id all await the same `OnceCell` and get the same handle.
    pub async fn get_or_spawn(&self, project_id: &str) -> anyhow::Result<ProjectHandle> {
        let cell = self
            .projects
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let config = self.config.clone();
        let id = project_id.to_string();
        cell.get_or_try_init(|| async move { Project::spawn(id, config).await })
            .await
            .map(|handle| handle.clone())
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.projects.iter().map(|e| e.key().clone()).collect()
    }

    /// Spawn the background sweep that evicts idle project actors. Because
    /// a `ProjectHandle` keeps its actor alive only through the registry's
    /// own clone, dropping the registry entry here shuts the actor down
    /// once the sender side of its request channel is dropped.
    pub fn spawn_idle_sweep(self: Arc<Self>) {
        let interval_ms = self.config.project_idle_ms.max(1000);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(StdDuration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                self.sweep_idle().await;
            }
        });
    }

    async fn sweep_idle(&self) {
        let idle_ids: Vec<String> = self
            .projects
            .iter()
            .filter_map(|entry| {
                let handle = entry.value().get()?;
                if handle.idle_for_ms() as u64 > self.config.project_idle_ms {
                    Some(entry.key().clone())
                } else {
                    None
                }
            })
            .collect();
        for id in idle_ids {
            self.projects.remove(&id);
            tracing::info!(project_id = %id, "evicted idle project actor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(data_dir: &std::path::Path) -> CoreConfig {
        CoreConfig {
            data_dir: data_dir.to_string_lossy().to_string(),
            ..CoreConfig::default()
        }
    }

    #[tokio::test]
    async fn get_or_spawn_returns_the_same_handle_for_the_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProjectRegistry::new(test_config(dir.path()));
        let a = registry.get_or_spawn("proj-1").await.unwrap();
        let b = registry.get_or_spawn("proj-1").await.unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(registry.list_ids(), vec!["proj-1".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_first_touches_collapse_into_one_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ProjectRegistry::new(test_config(dir.path())));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move { registry.get_or_spawn("proj-race").await.unwrap() }));
        }
        let results: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert!(results.windows(2).all(|w| w[0].id() == w[1].id()));
    }

    #[tokio::test]
    async fn sweep_idle_evicts_projects_past_the_idle_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.project_idle_ms = 0;
        let registry = ProjectRegistry::new(config);
        registry.get_or_spawn("proj-1").await.unwrap();
        assert_eq!(registry.list_ids().len(), 1);

        tokio::time::sleep(StdDuration::from_millis(5)).await;
        registry.sweep_idle().await;
        assert!(registry.list_ids().is_empty());
    }
}
