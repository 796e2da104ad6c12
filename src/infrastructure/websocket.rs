//! WebSocket handler for project event streams
//!
//! A client connects to `/ws/projects/{id}` and receives every generation
//! event for that project as JSON. It may also cancel the live run and
//! acknowledge updated categories over the same socket.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::application::dto::AppEvent;
use crate::application::services::ProjectService;
use crate::domain::value_objects::{Category, ProjectId};
use crate::infrastructure::state::AppState;

/// Messages sent by the client
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CancelGeneration,
    AcknowledgeCategory { category: String },
    Ping,
}

/// Messages sent to the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        project_id: String,
        updated_categories: Vec<String>,
    },
    Event {
        event: AppEvent,
    },
    CancelRequested {
        found: bool,
    },
    CategoryAcknowledged {
        category: String,
        was_updated: bool,
    },
    Pong,
    Error {
        code: String,
        message: String,
    },
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let project_id = ProjectId::parse(&id)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid project ID".to_string()))?;
    state
        .project_service
        .get_project(project_id)
        .await
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, project_id)))
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, project_id: ProjectId) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create a channel for sending messages to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    tracing::info!(project_id = %project_id, "New WebSocket connection established");

    // Spawn a task to forward messages from the channel to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!("Failed to serialize server message: {}", e),
            }
        }
    });

    // Spawn a task to forward this project's events from the bus
    let events = state.event_bus.subscribe();
    let event_task = tokio::spawn(forward_events(events, project_id.to_string(), tx.clone()));

    let updated_categories = state
        .updated_categories(project_id)
        .await
        .iter()
        .map(|c| c.as_str().to_string())
        .collect();
    let _ = tx.send(ServerMessage::Connected {
        project_id: project_id.to_string(),
        updated_categories,
    });

    // Handle incoming messages
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let response = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => handle_message(msg, &state, project_id).await,
                    Err(e) => {
                        tracing::warn!("Failed to parse message: {}", e);
                        ServerMessage::Error {
                            code: "PARSE_ERROR".to_string(),
                            message: format!("Invalid message format: {}", e),
                        }
                    }
                };
                if tx.send(response).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                tracing::info!(project_id = %project_id, "WebSocket connection closed by client");
                break;
            }
            Err(e) => {
                tracing::error!(project_id = %project_id, "WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    event_task.abort();
    send_task.abort();

    tracing::info!(project_id = %project_id, "WebSocket connection terminated");
}

async fn handle_message(msg: ClientMessage, state: &AppState, project_id: ProjectId) -> ServerMessage {
    match msg {
        ClientMessage::CancelGeneration => ServerMessage::CancelRequested {
            found: state.cancel_generation(project_id).await,
        },
        ClientMessage::AcknowledgeCategory { category } => match category.parse::<Category>() {
            Ok(category) => ServerMessage::CategoryAcknowledged {
                category: category.as_str().to_string(),
                was_updated: state.acknowledge_category(project_id, category).await,
            },
            Err(e) => ServerMessage::Error {
                code: "UNKNOWN_CATEGORY".to_string(),
                message: e.to_string(),
            },
        },
        ClientMessage::Ping => ServerMessage::Pong,
    }
}

/// Relay bus events concerning `project_id` until either side closes
async fn forward_events(
    mut events: broadcast::Receiver<AppEvent>,
    project_id: String,
    tx: mpsc::UnboundedSender<ServerMessage>,
) {
    loop {
        match events.recv().await {
            Ok(event) if event.project_id() == project_id => {
                if tx.send(ServerMessage::Event { event }).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(project_id = %project_id, skipped, "WebSocket subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::outbound::EventBusPort;
    use crate::infrastructure::event_bus::BroadcastEventBus;

    #[test]
    fn test_client_messages_decode() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "acknowledge_category", "category": "place"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::AcknowledgeCategory {
                category: "place".to_string()
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "cancel_generation"}"#).unwrap();
        assert_eq!(msg, ClientMessage::CancelGeneration);
    }

    #[test]
    fn test_event_message_nests_app_event() {
        let msg = ServerMessage::Event {
            event: AppEvent::CategoryUpdated {
                run_id: "r".to_string(),
                project_id: "p".to_string(),
                category: "rule".to_string(),
            },
        };

        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "event");
        assert_eq!(json["event"]["type"], "category_updated");
    }

    #[tokio::test]
    async fn test_only_matching_project_events_are_forwarded() {
        let bus = BroadcastEventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(forward_events(bus.subscribe(), "mine".to_string(), tx));

        for project_id in ["other", "mine"] {
            bus.publish(AppEvent::CategoryUpdated {
                run_id: "r".to_string(),
                project_id: project_id.to_string(),
                category: "place".to_string(),
            })
            .await
            .unwrap();
        }

        let received = rx.recv().await.unwrap();
        assert!(matches!(
            received,
            ServerMessage::Event { event: AppEvent::CategoryUpdated { ref project_id, .. } } if project_id == "mine"
        ));
        task.abort();
    }
}
