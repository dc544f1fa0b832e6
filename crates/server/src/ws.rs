//! WebSocket connection hub (C3).
//!
//! One connection per project. The upgrade handler validates the bearer
//! token before accepting, then `handle_socket` mirrors the teacher's
//! reader/writer/heartbeat-task triad: a forwarder relays project events
//! onto a bounded outbound queue (drop-newest under backpressure, with an
//! `event_gap` marker so the client knows it missed something), a writer
//! drains that queue onto the socket, and a reader decodes inbound frames
//! into [`swarm_core::Request`]s and dispatches them to the project actor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use swarm_common::{Event, ErrorBody, ResponseFrame, ServerFrame};
use swarm_core::{Outcome, Request};
use tokio::sync::mpsc;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub since_seq: Option<u64>,
}

/// Pulls the bearer token out of `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

#[derive(Serialize)]
#[serde(untagged)]
enum Outbound {
    Event(ServerFrame),
    Response(ResponseFrame),
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(project_id): Path<String>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    if bearer_token(&headers) != Some(state.config.auth_token.as_str()) {
        return (StatusCode::UNAUTHORIZED, "invalid or missing bearer token").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, project_id, params.since_seq, state))
}

async fn handle_socket(socket: WebSocket, project_id: String, since_seq: Option<u64>, state: AppState) {
    let handle = match state.registry.get_or_spawn(&project_id).await {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(project_id = %project_id, error = %e, "failed to spawn project actor");
            return;
        }
    };

    let (subscription, current_seq) = match handle.request(Request::Subscribe { kinds: None }).await {
        Ok(Outcome::Subscribed { receiver, current_seq }) => (receiver, current_seq),
        Ok(Outcome::Value(_)) | Err(_) => {
            tracing::error!(project_id = %project_id, "subscribe request did not return a receiver");
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = socket.split();

    if ws_sender
        .send(Message::Text(
            serde_json::to_string(&Outbound::Event(ServerFrame::Welcome { seq: current_seq })).unwrap(),
        ))
        .await
        .is_err()
    {
        return;
    }

    if let Some(since) = since_seq {
        if since < current_seq {
            if let Ok(Outcome::Value(v)) = handle
                .request(Request::Replay { since_seq: since, max: Some(state.config.max_event_queue) })
                .await
            {
                if let Ok(backlog) = serde_json::from_value::<Vec<Event>>(v) {
                    for event in backlog {
                        let frame = ServerFrame::Event {
                            seq: event.seq,
                            kind: event.kind,
                            ts: event.ts,
                            payload: event.payload,
                        };
                        if ws_sender
                            .send(Message::Text(serde_json::to_string(&Outbound::Event(frame)).unwrap()))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
            }
        }
    }

    let (resp_tx, mut resp_rx) = mpsc::unbounded_channel::<Outbound>();
    let (event_tx, mut event_rx) = mpsc::channel::<Outbound>(state.config.max_event_queue.max(16));
    let dropped = Arc::new(AtomicBool::new(false));

    let mut forward_task = {
        let event_tx = event_tx.clone();
        let dropped = dropped.clone();
        let mut subscription = subscription;
        tokio::spawn(async move {
            loop {
                match subscription.recv().await {
                    Ok(event) => {
                        if dropped.swap(false, Ordering::AcqRel) {
                            let _ = event_tx.try_send(Outbound::Event(ServerFrame::EventGap {
                                last_delivered_seq: event.seq.saturating_sub(1),
                            }));
                        }
                        let frame = ServerFrame::Event {
                            seq: event.seq,
                            kind: event.kind,
                            ts: event.ts,
                            payload: event.payload,
                        };
                        if event_tx.try_send(Outbound::Event(frame)).is_err() {
                            dropped.store(true, Ordering::Release);
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        dropped.store(true, Ordering::Release);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    let mut writer_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                resp = resp_rx.recv() => match resp {
                    Some(frame) => {
                        if ws_sender.send(Message::Text(serde_json::to_string(&frame).unwrap_or_default())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                evt = event_rx.recv() => match evt {
                    Some(frame) => {
                        if ws_sender.send(Message::Text(serde_json::to_string(&frame).unwrap_or_default())).await.is_err() {
                            break;
                        }
                    }
                    None => {}
                },
            }
        }
    });

    let mut reader_task = {
        let handle = handle.clone();
        tokio::spawn(async move {
            while let Some(received) = ws_receiver.next().await {
                let text = match received {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                handle_inbound_frame(&handle, &text, &resp_tx).await;
            }
        })
    };

    tokio::select! {
        _ = &mut writer_task => { reader_task.abort(); forward_task.abort(); }
        _ = &mut reader_task => { writer_task.abort(); forward_task.abort(); }
        _ = &mut forward_task => { writer_task.abort(); reader_task.abort(); }
    }
}

async fn handle_inbound_frame(
    handle: &swarm_core::ProjectHandle,
    text: &str,
    resp_tx: &mpsc::UnboundedSender<Outbound>,
) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            let _ = resp_tx.send(Outbound::Response(ResponseFrame::Err {
                id: "unknown".to_string(),
                error: ErrorBody { code: "invalid_request", message: format!("malformed json: {e}") },
            }));
            return;
        }
    };
    let id = value.get("id").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();

    let request: Request = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            let _ = resp_tx.send(Outbound::Response(ResponseFrame::Err {
                id,
                error: ErrorBody { code: "invalid_request", message: e.to_string() },
            }));
            return;
        }
    };

    let response = match handle.request(request).await {
        Ok(Outcome::Value(v)) => Outbound::Response(ResponseFrame::Ok { id, result: v }),
        Ok(Outcome::Subscribed { current_seq, .. }) => {
            Outbound::Response(ResponseFrame::Ok { id, result: serde_json::json!({ "seq": current_seq }) })
        }
        Err(e) => Outbound::Response(ResponseFrame::Err {
            id,
            error: ErrorBody { code: e.code(), message: e.to_string() },
        }),
    };
    let _ = resp_tx.send(response);
}
