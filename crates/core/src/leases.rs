//! File-lease manager (C5).
//!
//! One lease per path, keyed by the path string itself. TTLs are clamped
//! to `[min_lease_ttl_ms, max_lease_ttl_ms]` rather than rejected outright,
//! matching the teacher's `filelocks.rs` clamp-not-reject stance. A reaper
//! sweep (driven by the project actor's interval tick) evicts expired
//! leases and emits `file_unlocked` for each.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use swarm_common::{CoreError, CoreResult, FileForecast, FileLease, TaskId};

#[derive(Default)]
pub struct LeaseTable {
    leases: HashMap<String, FileLease>,
}

/// Normalizes a lease path to forward slashes, repo-relative, with `.`
/// segments and a trailing slash collapsed and `..` resolved only against
/// the project root. Any attempt to escape the root fails with
/// `invalid_path`.
fn normalize_path(path: &str) -> CoreResult<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.replace('\\', "/").split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if parts.pop().is_none() {
                    return Err(CoreError::InvalidPath(format!("{path} escapes the project root")));
                }
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Err(CoreError::InvalidPath(format!("{path} does not name a file")));
    }
    Ok(parts.join("/"))
}

impl LeaseTable {
    pub fn reserve(
        &mut self,
        path: String,
        holder: String,
        exclusive: bool,
        ttl_ms: u64,
        task_id: Option<TaskId>,
        min_ttl_ms: u64,
        max_ttl_ms: u64,
    ) -> CoreResult<FileLease> {
        let path = normalize_path(&path)?;
        if let Some(existing) = self.leases.get(&path) {
            if existing.holder != holder && existing.expires_at > Utc::now() {
                return Err(CoreError::Conflict(format!(
                    "{path} is held by {}",
                    existing.holder
                )));
            }
        }
        let clamped_ttl = ttl_ms.clamp(min_ttl_ms, max_ttl_ms);
        let now = Utc::now();
        let lease = FileLease {
            path: path.clone(),
            holder,
            exclusive,
            acquired_at: now,
            expires_at: now + Duration::milliseconds(clamped_ttl as i64),
            task_id,
        };
        self.leases.insert(path, lease.clone());
        Ok(lease)
    }

    pub fn release(&mut self, path: &str, holder: &str) -> CoreResult<FileLease> {
        let path = normalize_path(path)?;
        let lease = self
            .leases
            .get(&path)
            .ok_or_else(|| CoreError::not_found("file_lease", &path))?;
        if lease.holder != holder {
            return Err(CoreError::Forbidden(format!(
                "{holder} does not hold the lease on {path}"
            )));
        }
        Ok(self.leases.remove(&path).expect("checked above"))
    }

    pub fn renew(
        &mut self,
        path: &str,
        holder: &str,
        ttl_ms: u64,
        min_ttl_ms: u64,
        max_ttl_ms: u64,
    ) -> CoreResult<FileLease> {
        let path = normalize_path(path)?;
        let lease = self
            .leases
            .get_mut(&path)
            .ok_or_else(|| CoreError::not_found("file_lease", &path))?;
        if lease.holder != holder {
            return Err(CoreError::Forbidden(format!(
                "{holder} does not hold the lease on {path}"
            )));
        }
        let clamped_ttl = ttl_ms.clamp(min_ttl_ms, max_ttl_ms);
        lease.expires_at = Utc::now() + Duration::milliseconds(clamped_ttl as i64);
        Ok(lease.clone())
    }

    pub fn list(&self) -> Vec<FileLease> {
        self.leases.values().cloned().collect()
    }

    pub fn release_all_for(&mut self, holder: &str) -> Vec<FileLease> {
        let paths: Vec<String> = self
            .leases
            .iter()
            .filter(|(_, l)| l.holder == holder)
            .map(|(p, _)| p.clone())
            .collect();
        paths
            .into_iter()
            .filter_map(|p| self.leases.remove(&p))
            .collect()
    }

    pub fn release_all_for_task(&mut self, task_id: TaskId) -> Vec<FileLease> {
        let paths: Vec<String> = self
            .leases
            .iter()
            .filter(|(_, l)| l.task_id == Some(task_id))
            .map(|(p, _)| p.clone())
            .collect();
        paths
            .into_iter()
            .filter_map(|p| self.leases.remove(&p))
            .collect()
    }

    /// Forecast which of `paths` are currently free, who holds the rest,
    /// when they're expected to free up, and whether an `in_progress` task
    /// declares the path in its `files` set. `in_progress_files` is
    /// precomputed by the caller from the task board; this table has no
    /// visibility into tasks. Purely informational; takes no locks.
    pub fn forecast(
        &self,
        paths: &[String],
        in_progress_files: &std::collections::HashSet<String>,
    ) -> CoreResult<Vec<FileForecast>> {
        paths
            .iter()
            .map(|p| {
                let path = normalize_path(p)?;
                let lease = self.leases.get(&path);
                Ok(FileForecast {
                    holder: lease.map(|l| l.holder.clone()),
                    expires_at: lease.map(|l| l.expires_at),
                    claimed_by_in_progress_task: in_progress_files.contains(&path),
                    path,
                })
            })
            .collect()
    }

    /// Remove and return leases whose TTL has elapsed.
    pub fn reap_expired(&mut self) -> Vec<FileLease> {
        let now = Utc::now();
        let expired: Vec<String> = self
            .leases
            .iter()
            .filter(|(_, l)| l.expires_at <= now)
            .map(|(p, _)| p.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|p| self.leases.remove(&p))
            .collect()
    }

    pub fn restore(&mut self, leases: Vec<FileLease>) {
        for lease in leases {
            self.leases.insert(lease.path.clone(), lease);
        }
    }
}
