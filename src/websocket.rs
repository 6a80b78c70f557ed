//! # Session WebSocket Bridge
//!
//! One WebSocket connection is one orchestrated voice session. The browser
//! owns the realtime voice transport; it forwards every transport event to
//! `/ws/session` as JSON and executes the `command` frames sent back.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: the actor spawns a [`SessionController`] task
//! 2. **Start**: client sends `{"type":"start","user":{...}}`
//! 3. **Events**: transport events (`message`, `speech_detection`,
//!    `function_call`, ...) are parsed into [`SessionEvent`]s and queued
//! 4. **Updates**: every [`SessionUpdate`] the controller emits is written
//!    back as a JSON text frame
//! 5. **Close**: dropping the actor closes the queue; the controller ends
//!    the session and destroys the transport
//!
//! ## Heartbeat:
//! The server sends `{"type":"ping"}` every 30 seconds and drops clients
//! silent for 60 seconds. Clients may also ping; the server answers `pong`.

use crate::session::{ClientTransport, SessionController, SessionEvent, SessionUpdate};
use crate::state::AppState;
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection-level frames handled by the actor itself.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HeartbeatFrame {
    Ping { timestamp: i64 },
    Pong { timestamp: i64 },
}

#[derive(Debug)]
enum ClientFrame {
    Heartbeat(HeartbeatFrame),
    Event(SessionEvent),
}

fn parse_frame(text: &str) -> Result<ClientFrame, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    match value.get("type").and_then(Value::as_str) {
        Some("ping") | Some("pong") => Ok(ClientFrame::Heartbeat(serde_json::from_value(value)?)),
        _ => Ok(ClientFrame::Event(serde_json::from_value(value)?)),
    }
}

/// WebSocket actor bridging one client to one session controller.
pub struct SessionWebSocket {
    app_state: web::Data<AppState>,

    /// Sending half of the controller queue; dropped on stop
    events: Option<UnboundedSender<SessionEvent>>,

    last_heartbeat: Instant,
}

impl SessionWebSocket {
    pub fn new(app_state: web::Data<AppState>) -> Self {
        Self {
            app_state,
            events: None,
            last_heartbeat: Instant::now(),
        }
    }

    fn forward(&mut self, event: SessionEvent, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(events) = &self.events else {
            warn!("Event received before the session controller started");
            return;
        };
        if events.send(event).is_err() {
            error!("Session controller stopped, closing connection");
            ctx.stop();
        }
    }

    fn send_json<T: Serialize>(&self, ctx: &mut ws::WebsocketContext<Self>, frame: &T) {
        match serde_json::to_string(frame) {
            Ok(json) => ctx.text(json),
            Err(err) => error!("Failed to serialize frame: {}", err),
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        warn!("WebSocket error {}: {}", code, message);
        self.send_json(
            ctx,
            &SessionUpdate::Error {
                code: code.to_string(),
                message: message.to_string(),
            },
        );
    }
}

impl Actor for SessionWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel::<SessionUpdate>();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<SessionEvent>();

        let transport = Arc::new(ClientTransport::new(updates_tx.clone()));
        let controller = SessionController::new(
            self.app_state.get_config(),
            transport,
            self.app_state.session_stores(),
            updates_tx,
            &events_tx,
        );
        tokio::spawn(controller.run(events_rx));

        ctx.add_stream(UnboundedReceiverStream::new(updates_rx));
        self.events = Some(events_tx);
        self.app_state.increment_active_sessions();
        info!("Session WebSocket connection started");

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            act.send_json(
                ctx,
                &HeartbeatFrame::Ping {
                    timestamp: chrono::Utc::now().timestamp_millis(),
                },
            );
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Closing the queue makes the controller end the session
        self.events = None;
        self.app_state.decrement_active_sessions();
        info!("Session WebSocket connection stopped");
    }
}

/// Updates from the controller, written straight to the client.
impl StreamHandler<SessionUpdate> for SessionWebSocket {
    fn handle(&mut self, update: SessionUpdate, ctx: &mut Self::Context) {
        self.app_state.record_update(&update);
        self.send_json(ctx, &update);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        debug!("Session controller finished");
        ctx.stop();
    }
}

/// Handle incoming WebSocket messages.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for SessionWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                match parse_frame(&text) {
                    Ok(ClientFrame::Heartbeat(HeartbeatFrame::Ping { timestamp })) => {
                        self.send_json(ctx, &HeartbeatFrame::Pong { timestamp });
                    }
                    Ok(ClientFrame::Heartbeat(HeartbeatFrame::Pong { .. })) => {}
                    Ok(ClientFrame::Event(event)) => self.forward(event, ctx),
                    Err(err) => self.send_error(ctx, "invalid_json", &format!("Invalid JSON: {}", err)),
                }
            }
            Ok(ws::Message::Binary(_)) => {
                self.send_error(
                    ctx,
                    "unsupported_frame",
                    "Binary frames are not accepted; audio stays on the client transport",
                );
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler for `/ws/session`.
pub async fn session_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!("New session WebSocket request from: {:?}", req.connection_info().peer_addr());
    ws::start(SessionWebSocket::new(app_state), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_frames_are_not_session_events() {
        let frame = parse_frame(r#"{"type":"ping","timestamp":42}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Heartbeat(HeartbeatFrame::Ping { timestamp: 42 })));

        let json = serde_json::to_value(HeartbeatFrame::Pong { timestamp: 42 }).unwrap();
        assert_eq!(json["type"], "pong");
    }

    #[test]
    fn test_session_events_are_parsed() {
        let frame = parse_frame(r#"{"type":"message","role":"user","text":"help","is_transcript":true}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Event(SessionEvent::Message { ref text, .. }) if text == "help"));

        let frame = parse_frame(r#"{"type":"connection_lost","attempt":2,"max_attempts":5}"#).unwrap();
        assert!(matches!(
            frame,
            ClientFrame::Event(SessionEvent::ConnectionLost { attempt: 2, max_attempts: 5 })
        ));
    }

    #[test]
    fn test_unknown_or_malformed_frames_are_rejected() {
        assert!(parse_frame("not json").is_err());
        assert!(parse_frame(r#"{"type":"audio_data"}"#).is_err());
        assert!(parse_frame(r#"{"type":"message","role":"narrator","text":"hi"}"#).is_err());
    }
}
