//! JSON HTTP/WebSocket service around the transceiver.
//!
//! Requests arrive over the HTTP API; confirmed receptions and hardware
//! state changes are pushed to every connected WebSocket client.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use irtrans_core::{
    Broadcast, DataType, DriverEvent, FrameCodec, LastKnownCode, MemStore, ProtocolSpec,
    PulsePair, SendReport, ToleranceConfig, Transceiver,
};

use crate::driver::LoopbackDriver;

pub struct ServeOptions {
    pub port: u16,
    pub mem_file: Option<PathBuf>,
    pub ack_delay: Duration,
}

struct AppState {
    transceiver: Arc<Transceiver<LoopbackDriver>>,
    events: mpsc::Sender<DriverEvent>,
    broadcasts: broadcast::Sender<PubMessage>,
}

/// Message pushed to every WebSocket client.
#[derive(Debug, Clone, Serialize)]
struct PubMessage {
    host: String,
    #[serde(rename = "type")]
    kind: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    encoder: String,
    datatype: String,
    code: String,
}

#[derive(Debug, Serialize)]
struct CodeReport {
    encoder: String,
    code: String,
    error: String,
}

impl From<SendReport> for CodeReport {
    fn from(report: SendReport) -> Self {
        Self {
            encoder: report.encoder,
            code: report.code,
            error: report.error.map(|e| e.to_string()).unwrap_or_default(),
        }
    }
}

impl From<LastKnownCode> for CodeReport {
    fn from(record: LastKnownCode) -> Self {
        Self {
            encoder: record.encoder,
            code: record.code,
            error: record.error,
        }
    }
}

#[derive(Debug, Serialize)]
struct StateResponse {
    state: u8,
    error: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TolerancesBody {
    tolerance: u32,
    large: u32,
    maxout: u32,
}

#[derive(Debug, Serialize)]
struct TolerancesResponse {
    encoder: String,
    tolerances: Option<TolerancesBody>,
    error: String,
}

#[derive(Debug, Deserialize)]
struct InjectRequest {
    timings: String,
}

#[derive(Debug, Serialize)]
struct AckResponse {
    error: String,
}

pub async fn serve(options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let (events_tx, mut events_rx) = mpsc::channel::<DriverEvent>(64);
    let driver = LoopbackDriver::new(events_tx.clone(), options.ack_delay);

    let mut transceiver = Transceiver::new(driver);
    transceiver.register_encoder("DAIKIN", FrameCodec::new(ProtocolSpec::daikin())?);
    if let Some(path) = &options.mem_file {
        transceiver.set_store(MemStore::new(path));
    }
    let transceiver = Arc::new(transceiver);

    let (broadcasts, _) = broadcast::channel(16);
    let state = Arc::new(AppState {
        transceiver: Arc::clone(&transceiver),
        events: events_tx,
        broadcasts: broadcasts.clone(),
    });

    // driver events drain on one logical processing sequence
    let pump = Arc::clone(&transceiver);
    let pump_broadcasts = broadcasts.clone();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if let Some(message) = pump.handle_event(event) {
                publish(&pump_broadcasts, message);
            }
        }
    });

    // abandon pending acknowledgments past the absolute timeout
    let tick = Arc::clone(&transceiver);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            interval.tick().await;
            tick.poll_timeout(Instant::now());
        }
    });

    let app = Router::new()
        .route("/api/send", post(send_code))
        .route("/api/memcode", get(mem_code))
        .route("/api/state", get(get_state))
        .route(
            "/api/tolerances/{encoder}",
            get(get_tolerances).put(set_tolerances),
        )
        .route("/api/inject", post(inject))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], options.port));
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn send_code(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendRequest>,
) -> Json<CodeReport> {
    let Some(datatype) = DataType::parse(&request.datatype) else {
        warn!("send with unknown datatype {:?}", request.datatype);
        return Json(CodeReport {
            encoder: String::new(),
            code: request.code,
            error: format!("Code type {} unknown", request.datatype),
        });
    };

    // the transmit blocks until the ack resolves, bounded by the timeout
    let transceiver = Arc::clone(&state.transceiver);
    let task = tokio::task::spawn_blocking(move || {
        transceiver.send_ir_code(&request.encoder, datatype, &request.code)
    });
    match task.await {
        Ok(report) => Json(report.into()),
        Err(err) => {
            error!("send task failed: {err}");
            Json(CodeReport {
                encoder: String::new(),
                code: String::new(),
                error: "send task failed".to_string(),
            })
        }
    }
}

async fn mem_code(State(state): State<Arc<AppState>>) -> Json<CodeReport> {
    Json(state.transceiver.mem_ir_code().into())
}

async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    match state.transceiver.state().level {
        Some(level) => Json(StateResponse {
            state: level as u8,
            error: String::new(),
        }),
        None => Json(StateResponse {
            state: 0,
            error: "no ack line capability on this hardware".to_string(),
        }),
    }
}

async fn get_tolerances(
    State(state): State<Arc<AppState>>,
    Path(encoder): Path<String>,
) -> Json<TolerancesResponse> {
    match state.transceiver.get_tolerances(&encoder) {
        Ok(config) => Json(TolerancesResponse {
            encoder,
            tolerances: Some(TolerancesBody {
                tolerance: config.tolerance_us,
                large: config.large_multiplier,
                maxout: config.max_large_hits,
            }),
            error: String::new(),
        }),
        Err(err) => Json(TolerancesResponse {
            encoder,
            tolerances: None,
            error: err.to_string(),
        }),
    }
}

async fn set_tolerances(
    State(state): State<Arc<AppState>>,
    Path(encoder): Path<String>,
    Json(body): Json<TolerancesBody>,
) -> Json<AckResponse> {
    let config = ToleranceConfig {
        tolerance_us: body.tolerance,
        large_multiplier: body.large,
        max_large_hits: body.maxout,
    };
    match state.transceiver.set_tolerances(&encoder, config) {
        Ok(()) => Json(AckResponse {
            error: String::new(),
        }),
        Err(err) => Json(AckResponse {
            error: err.to_string(),
        }),
    }
}

/// Feed a raw pulse sequence as a capture event, standing in for the
/// hardware receiver.
async fn inject(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InjectRequest>,
) -> Json<AckResponse> {
    match PulsePair::parse_sequence(&request.timings) {
        Ok(pairs) => {
            if state.events.send(DriverEvent::Capture(pairs)).await.is_err() {
                error!("event channel closed, capture dropped");
                return Json(AckResponse {
                    error: "event channel closed".to_string(),
                });
            }
            Json(AckResponse {
                error: String::new(),
            })
        }
        Err(err) => Json(AckResponse {
            error: err.to_string(),
        }),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

async fn client_session(mut socket: WebSocket, state: Arc<AppState>) {
    let client = Uuid::new_v4();
    info!("ws client {client} connected");
    let mut messages = state.broadcasts.subscribe();
    loop {
        tokio::select! {
            message = messages.recv() => match message {
                Ok(message) => {
                    let Ok(text) = serde_json::to_string(&message) else {
                        continue;
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("ws client {client} lagged, {skipped} messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                // requests go over the HTTP API; inbound frames are ignored
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
    info!("ws client {client} disconnected");
}

fn publish(sender: &broadcast::Sender<PubMessage>, message: Broadcast) {
    let message = match message {
        Broadcast::CodeReceived(record) => PubMessage {
            host: hostname(),
            kind: "codereceived".to_string(),
            data: serde_json::json!({
                "encoder": record.encoder,
                "code": record.code,
                "error": record.error,
            }),
        },
        Broadcast::HardState { level } => PubMessage {
            host: hostname(),
            kind: "hardstate".to_string(),
            data: serde_json::json!({ "state": level as u8, "error": "" }),
        },
    };
    // nobody listening is fine
    let _ = sender.send(message);
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "irtrans".to_string())
}
