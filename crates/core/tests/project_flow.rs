//! End-to-end exercise of a single project actor across registration,
//! task assignment, file leases, and orchestrator election.

use swarm_common::{AgentRole, CoreConfig, TaskId};
use swarm_core::request::Request;
use swarm_core::request::Outcome;
use swarm_core::Project;

fn config(data_dir: &std::path::Path) -> CoreConfig {
    CoreConfig {
        data_dir: data_dir.to_string_lossy().to_string(),
        ..CoreConfig::default()
    }
}

fn value(outcome: Outcome) -> serde_json::Value {
    match outcome {
        Outcome::Value(v) => v,
        Outcome::Subscribed { .. } => panic!("expected a value outcome"),
    }
}

#[tokio::test]
async fn agents_register_and_claim_a_task_through_an_auction() {
    let dir = tempfile::tempdir().unwrap();
    let handle = Project::spawn("proj-1".to_string(), config(dir.path())).await.unwrap();

    let ada = value(
        handle
            .request(Request::Register {
                agent_id: None,
                name: Some("ada".to_string()),
                platform: "cli".to_string(),
                role: AgentRole::Executor,
            })
            .await
            .unwrap(),
    );
    assert_eq!(ada["name"], "ada");

    let task = value(
        handle
            .request(Request::TaskCreate {
                title: "index the repo".to_string(),
                description: "build a search index".to_string(),
                priority: None,
                depends_on: vec![],
                files: vec![],
                external_ref: None,
            })
            .await
            .unwrap(),
    );
    let task_id: TaskId = serde_json::from_value(task["id"].clone()).unwrap();

    handle
        .request(Request::AuctionAnnounce {
            task_id,
            caller: "ada".to_string(),
            duration_ms: Some(10_000),
        })
        .await
        .unwrap();
    handle
        .request(Request::AuctionBid {
            task_id,
            agent: "ada".to_string(),
            score: 0.9,
        })
        .await
        .unwrap();

    let assigned = value(
        handle
            .request(Request::TaskAssign {
                task_id,
                agent: "ada".to_string(),
                caller: "ada".to_string(),
                epoch: None,
            })
            .await
            .unwrap(),
    );
    assert_eq!(assigned["assignee"], "ada");
    assert_eq!(assigned["status"], "in_progress");
}

#[tokio::test]
async fn file_lease_conflicts_are_rejected_until_released() {
    let dir = tempfile::tempdir().unwrap();
    let handle = Project::spawn("proj-2".to_string(), config(dir.path())).await.unwrap();

    for name in ["ada", "grace"] {
        handle
            .request(Request::Register {
                agent_id: None,
                name: Some(name.to_string()),
                platform: "cli".to_string(),
                role: AgentRole::Executor,
            })
            .await
            .unwrap();
    }

    handle
        .request(Request::FileReserve {
            path: "src/main.rs".to_string(),
            agent: "ada".to_string(),
            ttl_ms: None,
            exclusive: Some(true),
            task_id: None,
        })
        .await
        .unwrap();

    let conflict = handle
        .request(Request::FileReserve {
            path: "src/main.rs".to_string(),
            agent: "grace".to_string(),
            ttl_ms: None,
            exclusive: Some(true),
            task_id: None,
        })
        .await;
    assert!(conflict.is_err());

    handle
        .request(Request::FileRelease {
            path: "src/main.rs".to_string(),
            agent: "ada".to_string(),
        })
        .await
        .unwrap();

    let reserved = handle
        .request(Request::FileReserve {
            path: "src/main.rs".to_string(),
            agent: "grace".to_string(),
            ttl_ms: None,
            exclusive: Some(true),
            task_id: None,
        })
        .await;
    assert!(reserved.is_ok());
}

#[tokio::test]
async fn election_gates_privileged_task_updates_by_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let handle = Project::spawn("proj-3".to_string(), config(dir.path())).await.unwrap();

    handle
        .request(Request::Register {
            agent_id: None,
            name: Some("ada".to_string()),
            platform: "cli".to_string(),
            role: AgentRole::Orchestrator,
        })
        .await
        .unwrap();
    let task = value(
        handle
            .request(Request::TaskCreate {
                title: "review PR".to_string(),
                description: "".to_string(),
                priority: None,
                depends_on: vec![],
                files: vec![],
                external_ref: None,
            })
            .await
            .unwrap(),
    );
    let task_id: TaskId = serde_json::from_value(task["id"].clone()).unwrap();

    let elected = value(
        handle
            .request(Request::Elect { agent: "ada".to_string() })
            .await
            .unwrap(),
    );
    let epoch = elected["epoch"].as_u64().unwrap();

    let stale = handle
        .request(Request::TaskUpdate {
            task_id,
            caller: "ada".to_string(),
            epoch: Some(epoch + 1), // deliberately wrong once an orchestrator exists
            status: Some(swarm_common::TaskStatus::InProgress),
            assignee: None,
        })
        .await;
    assert!(stale.is_err());

    let ok = handle
        .request(Request::TaskUpdate {
            task_id,
            caller: "ada".to_string(),
            epoch: Some(epoch),
            status: Some(swarm_common::TaskStatus::InProgress),
            assignee: None,
        })
        .await;
    assert!(ok.is_ok());
}

#[tokio::test]
async fn replay_returns_events_after_the_requested_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let handle = Project::spawn("proj-4".to_string(), config(dir.path())).await.unwrap();

    handle
        .request(Request::Register {
            agent_id: None,
            name: Some("ada".to_string()),
            platform: "cli".to_string(),
            role: AgentRole::Executor,
        })
        .await
        .unwrap();
    handle
        .request(Request::TaskCreate {
            title: "t".to_string(),
            description: "d".to_string(),
            priority: None,
            depends_on: vec![],
            files: vec![],
            external_ref: None,
        })
        .await
        .unwrap();

    let replayed = value(
        handle
            .request(Request::Replay { since_seq: 0, max: None })
            .await
            .unwrap(),
    );
    let events = replayed.as_array().unwrap();
    assert!(events.len() >= 2);
}
