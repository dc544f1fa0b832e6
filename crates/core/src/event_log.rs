//! Append-only event log with periodic snapshotting (C1).
//!
//! Events are kept in memory for replay and fan-out, mirrored to an
//! on-disk `events.log` (one JSON object per line) by a dedicated writer
//! task so a slow disk never blocks the project actor, and folded into a
//! `snapshot.json` every `snapshot_every_n` events so recovery doesn't
//! have to replay the log from the beginning. An advisory `.lock` file
//! guards against two processes opening the same project directory.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use swarm_common::{Event, EventKind, ProjectSnapshot};
use tokio::sync::{broadcast, mpsc};

const BROADCAST_CAPACITY: usize = 1024;

pub struct EventLog {
    events: Vec<Event>,
    seq: u64,
    tx: broadcast::Sender<Event>,
    writer: mpsc::Sender<Event>,
    events_since_snapshot: u64,
    snapshot_every_n: u64,
    data_dir: PathBuf,
    _lock: LockFile,
}

/// Holds the project directory's advisory lock for the process lifetime;
/// the file is removed when this is dropped.
struct LockFile(PathBuf);

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

impl EventLog {
    /// Opens (creating if absent) the project directory at `data_dir`,
    /// replays `events.log` past the last snapshot, and spawns the disk
    /// writer task. Returns the log plus the restored snapshot, if any.
    pub async fn open(
        data_dir: impl AsRef<Path>,
        snapshot_every_n: u64,
        max_event_queue: usize,
    ) -> anyhow::Result<(Self, Option<ProjectSnapshot>)> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let lock_path = data_dir.join(".lock");
        if lock_path.exists() {
            anyhow::bail!(
                "project directory {} is already locked by another process (found {})",
                data_dir.display(),
                lock_path.display(),
            );
        }
        std::fs::write(&lock_path, std::process::id().to_string())?;

        let snapshot_path = data_dir.join("snapshot.json");
        let snapshot: Option<ProjectSnapshot> = if snapshot_path.exists() {
            let raw = std::fs::read_to_string(&snapshot_path)?;
            Some(serde_json::from_str(&raw)?)
        } else {
            None
        };
        let snapshot_seq = snapshot.as_ref().map(|s| s.seq).unwrap_or(0);

        let log_path = data_dir.join("events.log");
        let mut events = Vec::new();
        let mut max_seq = snapshot_seq;
        if log_path.exists() {
            let raw = std::fs::read_to_string(&log_path)?;
            for line in raw.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let event: Event = serde_json::from_str(line)?;
                if event.seq > snapshot_seq {
                    max_seq = max_seq.max(event.seq);
                    events.push(event);
                }
            }
        }

        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        let writer = spawn_writer(log_path, max_event_queue.max(1));

        Ok((
            Self {
                events,
                seq: max_seq,
                tx,
                writer,
                events_since_snapshot: 0,
                snapshot_every_n: snapshot_every_n.max(1),
                data_dir,
                _lock: LockFile(lock_path),
            },
            snapshot,
        ))
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        let (writer, mut rx) = mpsc::channel(256);
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        Self {
            events: Vec::new(),
            seq: 0,
            tx,
            writer,
            events_since_snapshot: 0,
            snapshot_every_n: 500,
            data_dir: PathBuf::from("."),
            _lock: LockFile(PathBuf::from("/dev/null")),
        }
    }

    pub fn append(&mut self, kind: EventKind, payload: serde_json::Value) -> Event {
        self.seq += 1;
        let event = Event {
            seq: self.seq,
            ts: Utc::now(),
            kind,
            payload,
        };
        self.events.push(event.clone());
        self.events_since_snapshot += 1;
        let _ = self.tx.send(event.clone());
        if let Err(e) = self.writer.try_send(event.clone()) {
            tracing::warn!(seq = event.seq, error = %e, "event log writer queue full, dropping disk write");
        }
        event
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn current_seq(&self) -> u64 {
        self.seq
    }

    pub fn replay(&self, since_seq: u64, max: usize) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| e.seq > since_seq)
            .take(max)
            .cloned()
            .collect()
    }

    /// Whether enough events have accumulated to warrant a fresh snapshot.
    pub fn should_snapshot(&self) -> bool {
        self.events_since_snapshot >= self.snapshot_every_n
    }

    pub fn write_snapshot(&mut self, mut snapshot: ProjectSnapshot) -> anyhow::Result<()> {
        snapshot.seq = self.seq;
        let tmp_path = self.data_dir.join("snapshot.json.tmp");
        let final_path = self.data_dir.join("snapshot.json");
        std::fs::write(&tmp_path, serde_json::to_vec_pretty(&snapshot)?)?;
        std::fs::rename(&tmp_path, &final_path)?;

        // Events folded into the snapshot no longer need to live in the
        // on-disk log; keep the in-memory tail for replay/backfill.
        self.events_since_snapshot = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_bumps_seq_and_notifies_subscribers() {
        let mut log = EventLog::in_memory();
        let mut rx = log.subscribe();
        let event = log.append(EventKind::TaskCreated, serde_json::json!({"title": "t"}));
        assert_eq!(event.seq, 1);
        assert_eq!(log.current_seq(), 1);
        assert_eq!(rx.recv().await.unwrap().seq, 1);
    }

    #[tokio::test]
    async fn replay_returns_a_strict_suffix() {
        let mut log = EventLog::in_memory();
        for i in 0..5 {
            log.append(EventKind::Message, serde_json::json!(i));
        }
        let suffix = log.replay(2, 10);
        assert_eq!(suffix.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn replay_respects_max() {
        let mut log = EventLog::in_memory();
        for i in 0..5 {
            log.append(EventKind::Message, serde_json::json!(i));
        }
        assert_eq!(log.replay(0, 2).len(), 2);
    }

    #[tokio::test]
    async fn should_snapshot_flips_once_threshold_reached() {
        let mut log = EventLog::in_memory();
        log.snapshot_every_n = 2;
        assert!(!log.should_snapshot());
        log.append(EventKind::Message, serde_json::json!(1));
        assert!(!log.should_snapshot());
        log.append(EventKind::Message, serde_json::json!(2));
        assert!(log.should_snapshot());
    }

    #[tokio::test]
    async fn open_replays_events_written_past_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (mut log, snapshot) = EventLog::open(dir.path(), 500, 256).await.unwrap();
        assert!(snapshot.is_none());
        log.append(EventKind::TaskCreated, serde_json::json!({"n": 1}));
        log.append(EventKind::TaskCreated, serde_json::json!({"n": 2}));

        // give the background writer task a chance to flush to disk
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(log);

        let (reopened, snapshot) = EventLog::open(dir.path(), 500, 256).await.unwrap();
        assert!(snapshot.is_none());
        assert_eq!(reopened.current_seq(), 2);
        assert_eq!(reopened.replay(0, 10).len(), 2);
    }

    #[tokio::test]
    async fn open_fails_fast_when_the_directory_is_already_locked() {
        let dir = tempfile::tempdir().unwrap();
        let (log, _snapshot) = EventLog::open(dir.path(), 500, 256).await.unwrap();
        let err = EventLog::open(dir.path(), 500, 256).await.unwrap_err();
        assert!(err.to_string().contains("already locked"));
        drop(log);
    }
}

fn spawn_writer(log_path: PathBuf, max_event_queue: usize) -> mpsc::Sender<Event> {
    let (tx, mut rx) = mpsc::channel::<Event>(max_event_queue);
    tokio::spawn(async move {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path);
        let mut file = match file {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(error = %e, path = %log_path.display(), "failed to open event log for append");
                return;
            }
        };
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => {
                    if let Err(e) = writeln!(file, "{line}") {
                        tracing::error!(error = %e, "failed to append event to disk log");
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to serialize event"),
            }
        }
    });
    tx
}
