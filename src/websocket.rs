//! # WebSocket Landmark Streaming Handler
//!
//! Real-time sign recognition over a WebSocket. Clients connect to `/ws/vocab`, stream one
//! landmark frame per camera frame, and ask for a prediction when the sign is finished.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: The server assigns a session id and replies with `connected`
//! 2. **Frames**: `{"type": "vocab-landmarkers", "landmarks": {...}}`, one per video frame
//! 3. **Predict**: `{"type": "vocab-predict"}` runs the model over everything buffered so far
//! 4. **Result**: The server replies with `prediction` and clears the consumed frames
//! 5. **Disconnect**: Closing the socket (or missing heartbeats) drops the session buffer
//!
//! ## Message Format:
//! All messages are JSON text frames tagged by `type`. Binary frames are rejected.

use crate::error::PipelineError;
use crate::inference::ranker::PredictionOutcome;
use crate::landmarks::frame::RawFrameDetections;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// WebSocket message types for client-server communication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WebSocketMessage {
    /// One frame of detections from the client. `landmarks` may be null or absent.
    #[serde(rename = "vocab-landmarkers")]
    VocabLandmarkers {
        #[serde(default)]
        landmarks: Option<RawFrameDetections>,
    },

    /// Client asks for a prediction over the buffered frames
    #[serde(rename = "vocab-predict")]
    VocabPredict,

    /// Sent once the session is registered
    #[serde(rename = "connected")]
    Connected { session_id: String },

    /// Result of a predict cycle
    #[serde(rename = "prediction")]
    Prediction {
        session_id: String,
        outcome: PredictionOutcome,
    },

    /// Error messages
    #[serde(rename = "error")]
    Error {
        /// Machine-readable error code
        code: String,
        /// Human-readable error message
        message: String,
        /// Session the error belongs to, if one was assigned
        session_id: Option<String>,
    },

    /// Heartbeat/ping message
    #[serde(rename = "ping")]
    Ping {
        /// Timestamp for latency measurement
        timestamp: u64,
    },

    /// Heartbeat/pong response
    #[serde(rename = "pong")]
    Pong {
        /// Original timestamp from ping
        timestamp: u64,
    },
}

/// Error code sent to the client for a pipeline failure.
fn error_code(err: &PipelineError) -> &'static str {
    match err {
        PipelineError::UnknownSession(_) => "unknown_session",
        PipelineError::SessionLimit(_) => "session_limit",
        PipelineError::DuplicateSession(_) => "duplicate_session",
        PipelineError::Inference(_) => "inference_error",
        PipelineError::ShapeMismatch { .. } | PipelineError::EmptyInput => "shape_error",
        PipelineError::Normalization(_) => "normalization_error",
    }
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// WebSocket actor: one per connection, owning exactly one session.
pub struct VocabWebSocket {
    /// Assigned in `started`; None if the session could not be created
    session_id: Option<String>,

    state: web::Data<AppState>,

    /// Last time the client showed any sign of life
    last_heartbeat: Instant,

    heartbeat_interval: Duration,
    client_timeout: Duration,

    /// A predict is running on the blocking pool
    predict_in_flight: bool,
}

impl VocabWebSocket {
    pub fn new(state: web::Data<AppState>) -> Self {
        let performance = state.get_config().performance;
        Self {
            session_id: None,
            state,
            last_heartbeat: Instant::now(),
            heartbeat_interval: Duration::from_secs(performance.heartbeat_interval_secs),
            client_timeout: Duration::from_secs(performance.client_timeout_secs),
            predict_in_flight: false,
        }
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, msg: &WebSocketMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => ctx.text(json),
            Err(err) => error!("Failed to serialize websocket message: {}", err),
        }
    }

    /// Send error message to client.
    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        let error_msg = WebSocketMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
            session_id: self.session_id.clone(),
        };
        self.send(ctx, &error_msg);

        warn!("WebSocket error {}: {}", code, message);
    }

    fn handle_frame(
        &mut self,
        landmarks: Option<RawFrameDetections>,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let Some(session_id) = self.session_id.clone() else {
            self.send_error(ctx, "no_session", "Session was not created");
            return;
        };

        match self.state.sessions.frame(&session_id, landmarks.as_ref()) {
            Ok(Some(frame_number)) => {
                self.state.record_frame();
                debug!(session_id = %session_id, frame = frame_number, "Received landmarks");
            }
            Ok(None) => debug!(session_id = %session_id, "Ignored empty landmarks"),
            Err(err) => self.send_error(ctx, error_code(&err), &err.to_string()),
        }
    }

    /// Run the predict cycle off the actor thread and post the result back.
    fn handle_predict(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(session_id) = self.session_id.clone() else {
            self.send_error(ctx, "no_session", "Session was not created");
            return;
        };

        if self.predict_in_flight {
            self.send_error(ctx, "predict_in_progress", "A prediction is already running");
            return;
        }
        self.predict_in_flight = true;

        let sessions = self.state.sessions.clone();
        let top_k = self.state.top_k();
        let addr = ctx.address();

        actix_web::rt::spawn(async move {
            let id = session_id.clone();
            let result = match web::block(move || sessions.predict(&id, top_k)).await {
                Ok(result) => result,
                Err(err) => Err(PipelineError::Inference(format!("Prediction task failed: {}", err))),
            };

            addr.do_send(PredictionFinished { session_id, result });
        });
    }
}

/// Posted back to the actor when a predict cycle finishes.
#[derive(Message)]
#[rtype(result = "()")]
struct PredictionFinished {
    session_id: String,
    result: Result<PredictionOutcome, PipelineError>,
}

impl Actor for VocabWebSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Register the session and start the heartbeat.
    fn started(&mut self, ctx: &mut Self::Context) {
        match self.state.sessions.connect(None) {
            Ok(session_id) => {
                self.session_id = Some(session_id.clone());
                self.send(ctx, &WebSocketMessage::Connected { session_id });
            }
            Err(err) => {
                self.send_error(ctx, error_code(&err), &err.to_string());
                ctx.stop();
                return;
            }
        }

        let client_timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > client_timeout {
                warn!(session_id = ?act.session_id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                act.send(ctx, &WebSocketMessage::Ping { timestamp: now_millis() });
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(session_id) = self.session_id.take() {
            self.state.sessions.disconnect(&session_id);
        }
        info!("WebSocket connection stopped");
    }
}

/// Handle incoming WebSocket messages.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for VocabWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();

                match serde_json::from_str::<WebSocketMessage>(&text) {
                    Ok(WebSocketMessage::VocabLandmarkers { landmarks }) => {
                        self.handle_frame(landmarks, ctx);
                    }
                    Ok(WebSocketMessage::VocabPredict) => {
                        self.handle_predict(ctx);
                    }
                    Ok(WebSocketMessage::Ping { timestamp }) => {
                        self.send(ctx, &WebSocketMessage::Pong { timestamp });
                    }
                    Ok(WebSocketMessage::Pong { .. }) => {}
                    Ok(other) => {
                        warn!("Received server-only message type from client: {:?}", other);
                        self.send_error(ctx, "unexpected_message", "Message type not accepted from clients");
                    }
                    Err(err) => {
                        self.send_error(ctx, "invalid_json", &format!("Invalid JSON: {}", err));
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                self.send_error(ctx, "unsupported_binary", "Binary frames are not supported");
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

impl Handler<PredictionFinished> for VocabWebSocket {
    type Result = ();

    fn handle(&mut self, msg: PredictionFinished, ctx: &mut Self::Context) {
        self.predict_in_flight = false;

        match msg.result {
            Ok(outcome) => {
                self.state.record_outcome(&outcome);
                self.send(
                    ctx,
                    &WebSocketMessage::Prediction {
                        session_id: msg.session_id,
                        outcome,
                    },
                );
            }
            Err(err) => self.send_error(ctx, error_code(&err), &err.to_string()),
        }
    }
}

/// WebSocket endpoint handler: upgrades the request and hands it to a `VocabWebSocket` actor.
pub async fn vocab_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!("New WebSocket connection request from: {:?}", req.connection_info().peer_addr());
    ws::start(VocabWebSocket::new(app_state), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ranker::SignCandidate;
    use crate::landmarks::schema::LandmarkGroup;

    #[test]
    fn test_client_frame_message() {
        let json = r#"{
            "type": "vocab-landmarkers",
            "landmarks": {
                "rightHandLandmarks": [{"x": 0.1, "y": 0.2, "z": 0.3}],
                "faceLandmarks": null
            }
        }"#;

        match serde_json::from_str::<WebSocketMessage>(json).unwrap() {
            WebSocketMessage::VocabLandmarkers { landmarks: Some(landmarks) } => {
                assert_eq!(landmarks.group(LandmarkGroup::RightHand).map(<[_]>::len), Some(1));
                assert!(landmarks.group(LandmarkGroup::Face).is_none());
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_null_and_missing_landmarks() {
        let null = r#"{"type": "vocab-landmarkers", "landmarks": null}"#;
        let missing = r#"{"type": "vocab-landmarkers"}"#;
        for json in [null, missing] {
            assert_eq!(
                serde_json::from_str::<WebSocketMessage>(json).unwrap(),
                WebSocketMessage::VocabLandmarkers { landmarks: None }
            );
        }
    }

    #[test]
    fn test_predict_message() {
        let msg: WebSocketMessage = serde_json::from_str(r#"{"type": "vocab-predict"}"#).unwrap();
        assert_eq!(msg, WebSocketMessage::VocabPredict);
    }

    #[test]
    fn test_prediction_message_serialization() {
        let msg = WebSocketMessage::Prediction {
            session_id: "session123".to_string(),
            outcome: PredictionOutcome::Ranked(vec![SignCandidate {
                sign_id: 1,
                sign: "after".to_string(),
                confidence: 0.75,
            }]),
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "prediction");
        assert_eq!(json["outcome"]["status"], "ranked");
        assert_eq!(json["outcome"]["results"][0]["sign"], "after");

        let msg = WebSocketMessage::Prediction {
            session_id: "session123".to_string(),
            outcome: PredictionOutcome::NoFrames,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["outcome"], serde_json::json!({"status": "no_frames"}));
    }

    #[test]
    fn test_error_message_creation() {
        let error_msg = WebSocketMessage::Error {
            code: error_code(&PipelineError::SessionLimit(4)).to_string(),
            message: PipelineError::SessionLimit(4).to_string(),
            session_id: None,
        };

        let json = serde_json::to_string(&error_msg).unwrap();
        assert!(json.contains("session_limit"));
        assert!(json.contains("Maximum concurrent sessions (4) reached"));
    }
}
