//! One-shot command execution: build a request, print the result, exit.

use anyhow::Result;
use serde_json::json;

use crate::api_client::ApiClient;
use crate::Command;

pub async fn dispatch(server: &str, token: &str, project: &str, command: Command) -> Result<()> {
    let client = ApiClient::new(server, token);

    let result = match command {
        Command::Status => client.status(project).await?,
        Command::Agents => client.agents(project).await?,
        Command::Tasks => client.tasks(project).await?,
        Command::Leases => client.leases(project).await?,
        Command::Replay { since_seq, max } => client.replay(project, since_seq, max).await?,
        Command::Stop { reason, by } => {
            client
                .ws_request(project, json!({"type": "stop", "reason": reason, "by": by}))
                .await?
        }
        Command::Resume { by } => {
            client.ws_request(project, json!({"type": "resume", "by": by})).await?
        }
        Command::Elect { agent } => {
            client.ws_request(project, json!({"type": "elect", "agent": agent})).await?
        }
        Command::TaskCreate { title, description } => {
            client
                .ws_request(
                    project,
                    json!({"type": "task_create", "title": title, "description": description}),
                )
                .await?
        }
        Command::VoteStart { kind, subject, opened_by } => {
            client
                .ws_request(
                    project,
                    json!({"type": "vote_start", "kind": kind, "subject": subject, "opened_by": opened_by}),
                )
                .await?
        }
        Command::Completions { .. } => unreachable!("completions are handled before dispatch"),
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
