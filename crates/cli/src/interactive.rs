//! Interactive REPL. One background task tails live events over a
//! persistent WebSocket connection while the prompt loop issues commands
//! as their own short-lived requests.

use futures::StreamExt;
use rustyline::DefaultEditor;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::api_client::ApiClient;

pub async fn run(server: &str, token: &str, project: &str) -> anyhow::Result<()> {
    let client = ApiClient::new(server, token);

    let event_request = client.subscribe_request(project, None)?;
    let tail_project = project.to_string();
    tokio::spawn(async move {
        match connect_async(event_request).await {
            Ok((mut socket, _)) => {
                while let Some(msg) = socket.next().await {
                    match msg {
                        Ok(Message::Text(text)) => println!("[{tail_project}] {text}"),
                        Ok(Message::Close(_)) | Err(_) => break,
                        _ => {}
                    }
                }
            }
            Err(e) => eprintln!("event stream failed to connect: {e}"),
        }
    });

    let mut rl = DefaultEditor::new()?;
    println!("swarmctl interactive -- project '{project}'. Type 'help' for commands, 'exit' to quit.");

    loop {
        match rl.readline("swarmctl> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);
                if line == "exit" || line == "quit" {
                    break;
                }
                if let Err(e) = dispatch_line(&client, project, line).await {
                    eprintln!("error: {e}");
                }
            }
            Err(_) => break,
        }
    }

    Ok(())
}

async fn dispatch_line(client: &ApiClient, project: &str, line: &str) -> anyhow::Result<()> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or("");

    match cmd {
        "help" => println!(
            "status | agents | tasks | leases | replay <since_seq> | stop <reason> <by> | resume <by> | elect <agent>"
        ),
        "status" => print_json(client.status(project).await?),
        "agents" => print_json(client.agents(project).await?),
        "tasks" => print_json(client.tasks(project).await?),
        "leases" => print_json(client.leases(project).await?),
        "replay" => {
            let since_seq: u64 = parts.next().unwrap_or("0").parse().unwrap_or(0);
            print_json(client.replay(project, since_seq, None).await?);
        }
        "stop" => {
            let reason = parts.next().unwrap_or("operator stop").to_string();
            let by = parts.next().unwrap_or("operator").to_string();
            print_json(
                client
                    .ws_request(project, serde_json::json!({"type": "stop", "reason": reason, "by": by}))
                    .await?,
            );
        }
        "resume" => {
            let by = parts.next().unwrap_or("operator").to_string();
            print_json(
                client
                    .ws_request(project, serde_json::json!({"type": "resume", "by": by}))
                    .await?,
            );
        }
        "elect" => {
            let agent = match parts.next() {
                Some(a) => a.to_string(),
                None => anyhow::bail!("usage: elect <agent>"),
            };
            print_json(
                client
                    .ws_request(project, serde_json::json!({"type": "elect", "agent": agent}))
                    .await?,
            );
        }
        other => println!("unknown command '{other}', type 'help'"),
    }

    Ok(())
}

fn print_json(value: serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()));
}
