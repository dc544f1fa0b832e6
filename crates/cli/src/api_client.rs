//! HTTP + WebSocket client for talking to a running coordination server.
//!
//! Reads go over the documented HTTP surface; mutations have no HTTP
//! counterpart (everything that changes project state goes through the
//! `/ws/:project_id` hub), so [`ApiClient::ws_request`] opens a short-lived
//! connection, sends one request frame, and waits for the matching
//! response, discarding any events delivered in the meantime.

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

pub struct ApiClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    fn ws_url(&self, project_id: &str) -> String {
        let ws_base = self
            .base_url
            .replacen("http://", "ws://", 1)
            .replacen("https://", "wss://", 1);
        format!("{ws_base}/ws/{project_id}")
    }

    /// Builds the upgrade request with the bearer token in the
    /// `Authorization` header rather than the query string.
    fn ws_request_handshake(&self, url: &str) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
        let mut request = url.into_client_request().context("invalid websocket url")?;
        request.headers_mut().insert(
            tokio_tungstenite::tungstenite::http::header::AUTHORIZATION,
            format!("Bearer {}", self.token).parse().context("invalid token header value")?,
        );
        Ok(request)
    }

    /// WebSocket URL for a long-lived subscriber, e.g. the interactive REPL's
    /// background event tail.
    pub fn subscribe_url(&self, project_id: &str, since_seq: Option<u64>) -> String {
        match since_seq {
            Some(seq) => format!("{}?since_seq={seq}", self.ws_url(project_id)),
            None => self.ws_url(project_id),
        }
    }

    /// Handshake request for `subscribe_url`, carrying the bearer token.
    pub fn subscribe_request(
        &self,
        project_id: &str,
        since_seq: Option<u64>,
    ) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
        self.ws_request_handshake(&self.subscribe_url(project_id, since_seq))
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.get(&url).send().await.context("request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("{status}: {body}");
        }
        Ok(response.json().await?)
    }

    pub async fn status(&self, project: &str) -> Result<Value> {
        self.get_json(&format!("/api/projects/{project}/status")).await
    }

    pub async fn agents(&self, project: &str) -> Result<Value> {
        self.get_json(&format!("/api/projects/{project}/agents")).await
    }

    pub async fn tasks(&self, project: &str) -> Result<Value> {
        self.get_json(&format!("/api/projects/{project}/tasks")).await
    }

    pub async fn leases(&self, project: &str) -> Result<Value> {
        self.get_json(&format!("/api/projects/{project}/leases")).await
    }

    pub async fn replay(&self, project: &str, since_seq: u64, max: Option<usize>) -> Result<Value> {
        let mut path = format!("/api/projects/{project}/logs?since_seq={since_seq}");
        if let Some(max) = max {
            path.push_str(&format!("&max={max}"));
        }
        self.get_json(&path).await
    }

    /// Send one mutating request and return its `result` once the matching
    /// response frame arrives.
    pub async fn ws_request(&self, project: &str, request: impl Serialize) -> Result<Value> {
        let handshake = self.ws_request_handshake(&self.ws_url(project))?;
        let (mut socket, _) = connect_async(handshake)
            .await
            .context("websocket connect failed")?;

        let id = Uuid::new_v4().to_string();
        let mut frame = serde_json::to_value(request)?;
        frame
            .as_object_mut()
            .context("request must serialize to a JSON object")?
            .insert("id".to_string(), Value::String(id.clone()));
        socket.send(Message::Text(frame.to_string())).await?;

        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    let parsed: Value = serde_json::from_str(&text)?;
                    let rid = parsed.get("id").and_then(Value::as_str);
                    match (parsed.get("type").and_then(Value::as_str), rid) {
                        (Some("ok"), Some(rid)) if rid == id => {
                            return Ok(parsed.get("result").cloned().unwrap_or(Value::Null))
                        }
                        (Some("err"), Some(rid)) if rid == id => {
                            let error = parsed.get("error").cloned().unwrap_or(Value::Null);
                            let code = error.get("code").and_then(Value::as_str).unwrap_or("unknown");
                            let message = error.get("message").and_then(Value::as_str).unwrap_or("");
                            bail!("{code}: {message}");
                        }
                        _ => continue,
                    }
                }
                Some(Ok(Message::Close(_))) | None => bail!("connection closed before a response arrived"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => bail!(e),
            }
        }
    }
}
