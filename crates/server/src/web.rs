use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use beacon_protocol::{BeaconConfig, Envelope};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use uuid::Uuid;

use crate::help::HelpDesk;
use crate::rooms::{Room, RoomRegistry};
use crate::sfu::PeerRole;
use crate::signaling;

/// Shared application state.
pub struct AppState {
    pub config: BeaconConfig,
    pub rooms: Arc<RoomRegistry>,
    pub help: HelpDesk,
    pub started_at: std::time::Instant,
}

/// Build the Axum router with all routes.
///
/// CORS is wide open: the broadcaster and viewer clients are served from
/// other origins (native apps, static hosting).
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        // Duress help flow
        .route("/duress/help", post(start_help_session))
        .route("/duress/listen", get(duress_listen))
        .route("/duress/give_help", post(give_help))
        .route("/duress/listen_for_helper", post(listen_for_helper))
        .route("/duress/help_completed", post(help_completed))
        .route("/duress/session_info", get(session_info))
        // HTTP signaling fallback for native clients
        .route("/duress/broadcast/sdp", post(broadcast_sdp))
        .route("/duress/broadcast/candidate", post(broadcast_candidate))
        .route("/duress/viewer/sdp", post(viewer_sdp))
        .route("/duress/viewer/candidate", post(viewer_candidate))
        // WebSocket media channels
        .route("/duress/{room_id}/websocket", get(duress_broadcaster_ws))
        .route("/duress/{room_id}/viewer/websocket", get(duress_viewer_ws))
        // Stream-id addressed variants
        .route("/stream/{stream_id}", get(stream_info))
        .route("/stream/{stream_id}/websocket", get(stream_broadcaster_ws))
        .route("/stream/{stream_id}/viewer/websocket", get(stream_viewer_ws))
        // Legacy room endpoints for internal tooling
        .route("/room/{room_id}/websocket", get(room_broadcaster_ws))
        .route("/room/{room_id}/viewer/websocket", get(room_presence_ws))
        .route("/api/health", get(health_check))
        .layer(RequestBodyLimitLayer::new(65_536)) // 64KB max request body
        .layer(cors)
        .with_state(state)
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Host for client-facing URLs, taken from the inbound request.
fn request_host(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost")
        .to_string()
}

/// Broadcaster and viewer WebSocket URLs for a room, with the scheme
/// selected by the deployment environment.
fn session_urls(config: &BeaconConfig, host: &str, room_id: &str) -> (String, String) {
    let scheme = config.environment.ws_scheme();
    (
        format!("{scheme}://{host}/duress/{room_id}/websocket"),
        format!("{scheme}://{host}/duress/{room_id}/viewer/websocket"),
    )
}

#[derive(Debug, Deserialize)]
struct StartHelpBody {
    name: String,
    zone: String,
    mobile: String,
}

/// POST /duress/help
///
/// Open a help request, mint a streaming room for it, and hand back the
/// WebSocket URLs both sides will use.
async fn start_help_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<StartHelpBody>,
) -> Response {
    if req.name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid request" })),
        )
            .into_response();
    }

    let room_id = Uuid::new_v4().to_string();
    let room = state.rooms.get_or_create(&room_id).await;
    state
        .help
        .open_request(&req.name, &req.zone, &req.mobile, &room_id, &room.stream_id)
        .await;

    tracing::info!(name = %req.name, %room_id, "help session started");

    let host = request_host(&headers);
    let (broadcaster_ws, viewer_ws) = session_urls(&state.config, &host, &room_id);
    Json(json!({
        "status": "success",
        "roomId": room_id,
        "streamId": room.stream_id.clone(),
        "timestamp": unix_timestamp(),
        "user": {
            "name": req.name,
            "zone": req.zone,
            "mobile": req.mobile,
        },
        "broadcasterWs": broadcaster_ws,
        "viewerWebsocketUrl": viewer_ws,
    }))
    .into_response()
}

/// GET /duress/listen
///
/// Latest open help request with its session URLs, or `null`.
async fn duress_listen(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(record) = state.help.latest_open().await else {
        return Json(serde_json::Value::Null).into_response();
    };
    let host = request_host(&headers);
    let (broadcaster_ws, viewer_ws) = session_urls(&state.config, &host, &record.room_id);
    Json(json!({
        "name": record.name,
        "zone": record.zone,
        "mobile": record.mobile,
        "status": record.status,
        "roomId": record.room_id,
        "streamId": record.stream_id,
        "broadcasterWs": broadcaster_ws,
        "viewerWebsocketUrl": viewer_ws,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct AcknowledgeBody {
    name: String,
    helper: String,
}

/// POST /duress/give_help
async fn give_help(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AcknowledgeBody>,
) -> Response {
    if req.name.is_empty() || req.helper.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing parameters" })),
        )
            .into_response();
    }
    if !state.help.acknowledge(&req.name, &req.helper).await {
        tracing::warn!(name = %req.name, "acknowledged help for unknown request");
    }
    Json(json!({ "status": "success" })).into_response()
}

#[derive(Debug, Deserialize)]
struct RequesterBody {
    name: String,
}

/// POST /duress/listen_for_helper
///
/// Assigned helper and request status for a requester, or `null` while no
/// helper has taken the request.
async fn listen_for_helper(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RequesterBody>,
) -> Response {
    if req.name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing requester name" })),
        )
            .into_response();
    }
    match state.help.helper_for(&req.name).await {
        Some((helper, status)) => Json(json!({
            "helper": helper,
            "status": status,
        }))
        .into_response(),
        None => Json(serde_json::Value::Null).into_response(),
    }
}

/// POST /duress/help_completed
///
/// Marks the request closed. The streaming room is deliberately left
/// running; remaining peers disconnect on their own.
async fn help_completed(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AcknowledgeBody>,
) -> Response {
    if req.name.is_empty() || req.helper.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing parameters" })),
        )
            .into_response();
    }
    state.help.complete(&req.name).await;
    tracing::info!(name = %req.name, helper = %req.helper, "help completed");
    Json(json!({ "status": "success" })).into_response()
}

#[derive(Debug, Deserialize)]
struct SessionInfoQuery {
    name: String,
}

/// GET /duress/session_info?name=
async fn session_info(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SessionInfoQuery>,
) -> Response {
    let Some(record) = state.help.session_for(&query.name).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "No session for that name" })),
        )
            .into_response();
    };
    let host = request_host(&headers);
    let (broadcaster_ws, viewer_ws) = session_urls(&state.config, &host, &record.room_id);
    Json(json!({
        "status": record.status,
        "roomId": record.room_id,
        "streamId": record.stream_id,
        "broadcasterWs": broadcaster_ws,
        "viewerWebsocketUrl": viewer_ws,
    }))
    .into_response()
}

fn room_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Room not found" })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct SdpRelayBody {
    #[serde(rename = "roomId")]
    room_id: String,
    sdp: String,
}

#[derive(Debug, Deserialize)]
struct CandidateRelayBody {
    #[serde(rename = "roomId")]
    room_id: String,
    candidate: String,
}

/// POST /duress/broadcast/sdp
///
/// HTTP fallback for broadcaster clients that cannot hold a signaling
/// WebSocket. Relays the SDP to the room's peers.
async fn broadcast_sdp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SdpRelayBody>,
) -> Response {
    let Some(room) = state.rooms.get(&req.room_id).await else {
        return room_not_found();
    };
    room.peers.broadcast(&Envelope::offer(req.sdp)).await;
    Json(json!({ "status": "success" })).into_response()
}

/// POST /duress/broadcast/candidate
async fn broadcast_candidate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CandidateRelayBody>,
) -> Response {
    let Some(room) = state.rooms.get(&req.room_id).await else {
        return room_not_found();
    };
    room.peers
        .broadcast(&Envelope::candidate(req.candidate))
        .await;
    Json(json!({ "status": "success" })).into_response()
}

/// POST /duress/viewer/sdp
async fn viewer_sdp(State(state): State<Arc<AppState>>, Json(req): Json<SdpRelayBody>) -> Response {
    let Some(room) = state.rooms.get(&req.room_id).await else {
        return room_not_found();
    };
    room.peers.broadcast(&Envelope::answer(req.sdp)).await;
    Json(json!({ "status": "success" })).into_response()
}

/// POST /duress/viewer/candidate
async fn viewer_candidate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CandidateRelayBody>,
) -> Response {
    let Some(room) = state.rooms.get(&req.room_id).await else {
        return room_not_found();
    };
    room.peers
        .broadcast(&Envelope::candidate(req.candidate))
        .await;
    Json(json!({ "status": "success" })).into_response()
}

/// GET /stream/{stream_id}
///
/// Stream metadata for tooling.
async fn stream_info(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(stream_id): Path<String>,
) -> Response {
    let Some(room) = state.rooms.get_by_stream(&stream_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "streamId": stream_id,
                "status": "not_found",
            })),
        )
            .into_response();
    };
    let host = request_host(&headers);
    let scheme = state.config.environment.ws_scheme();
    let stats = room.peers.connection_stats().await;
    let stream_ws = format!("{scheme}://{host}/stream/{stream_id}/websocket");
    let viewer_ws = format!("{scheme}://{host}/stream/{stream_id}/viewer/websocket");
    Json(json!({
        "streamId": stream_id,
        "status": "active",
        "timestamp": unix_timestamp(),
        "hostname": host,
        "type": "stream",
        "stats": stats,
        "streamWebSocket": stream_ws,
        "viewerWebSocket": viewer_ws,
    }))
    .into_response()
}

/// GET /duress/{room_id}/websocket
///
/// Broadcaster upgrade.
///
/// The room must already exist (minted by POST /duress/help). Viewers that
/// are waiting get a one-shot duress alert when the broadcaster attaches.
async fn duress_broadcaster_ws(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(room) = state.rooms.get(&room_id).await else {
        tracing::warn!(%room_id, "broadcaster upgrade for unknown room");
        return room_not_found();
    };
    let config = state.config.clone();
    ws.on_upgrade(move |socket| start_broadcaster(socket, room, config))
        .into_response()
}

async fn start_broadcaster(socket: WebSocket, room: Arc<Room>, config: BeaconConfig) {
    room.peers
        .broadcast_to_role(
            PeerRole::Viewer,
            &Envelope::duress_alert("Duress stream triggered"),
        )
        .await;
    signaling::broadcaster_session(socket, room, config).await;
}

/// GET /duress/{room_id}/viewer/websocket
///
/// Viewer upgrade.
async fn duress_viewer_ws(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(room) = state.rooms.get(&room_id).await else {
        tracing::warn!(%room_id, "viewer upgrade for unknown room");
        return room_not_found();
    };
    let config = state.config.clone();
    ws.on_upgrade(move |socket| signaling::viewer_session(socket, room, config))
        .into_response()
}

/// GET /stream/{stream_id}/websocket
///
/// Broadcaster upgrade addressed by stream id.
async fn stream_broadcaster_ws(
    State(state): State<Arc<AppState>>,
    Path(stream_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(room) = state.rooms.get_by_stream(&stream_id).await else {
        tracing::warn!(%stream_id, "broadcaster upgrade for unknown stream");
        return room_not_found();
    };
    let config = state.config.clone();
    ws.on_upgrade(move |socket| start_broadcaster(socket, room, config))
        .into_response()
}

/// GET /stream/{stream_id}/viewer/websocket
///
/// Viewer upgrade addressed by stream id.
async fn stream_viewer_ws(
    State(state): State<Arc<AppState>>,
    Path(stream_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(room) = state.rooms.get_by_stream(&stream_id).await else {
        tracing::warn!(%stream_id, "viewer upgrade for unknown stream");
        return room_not_found();
    };
    let config = state.config.clone();
    ws.on_upgrade(move |socket| signaling::viewer_session(socket, room, config))
        .into_response()
}

/// GET /room/{room_id}/websocket
///
/// Legacy broadcaster upgrade that creates the room on first reference.
async fn room_broadcaster_ws(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let room = state.rooms.get_or_create(&room_id).await;
    let config = state.config.clone();
    ws.on_upgrade(move |socket| start_broadcaster(socket, room, config))
        .into_response()
}

/// GET /room/{room_id}/viewer/websocket
///
/// Legacy tooling endpoint that reports the room's peer count once per
/// second.
async fn room_presence_ws(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(room) = state.rooms.get(&room_id).await else {
        tracing::warn!(%room_id, "presence upgrade for unknown room");
        return room_not_found();
    };
    ws.on_upgrade(move |socket| presence_ticker(socket, room))
        .into_response()
}

async fn presence_ticker(mut socket: WebSocket, room: Arc<Room>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let count = room.peers.connection_count().await;
        if socket
            .send(Message::Text(count.to_string().into()))
            .await
            .is_err()
        {
            return;
        }
    }
}

/// GET /api/health
async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "rooms": state.rooms.room_count().await,
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Build a test `AppState` with an isolated room registry and help desk.
    fn test_app_state() -> Arc<AppState> {
        let config: BeaconConfig = toml::from_str("").expect("default config");
        Arc::new(AppState {
            config,
            rooms: Arc::new(RoomRegistry::new()),
            help: HelpDesk::new(),
            started_at: std::time::Instant::now(),
        })
    }

    /// Helper: parse a response body as `serde_json::Value`.
    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to read response body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("response body is not valid JSON")
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("host", "duress.test")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header("host", "duress.test")
            .body(Body::empty())
            .unwrap()
    }

    async fn open_help_session(state: &Arc<AppState>, name: &str) -> serde_json::Value {
        let app = build_router(Arc::clone(state));
        let response = app
            .oneshot(json_request(
                "POST",
                "/duress/help",
                json!({ "name": name, "zone": "Z1", "mobile": "1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = build_router(test_app_state());
        let response = app.oneshot(get_request("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn help_session_mints_room_and_urls() {
        let state = test_app_state();
        let body = open_help_session(&state, "alice").await;

        assert_eq!(body["status"], "success");
        let room_id = body["roomId"].as_str().unwrap();
        let stream_id = body["streamId"].as_str().unwrap();
        assert_eq!(stream_id, crate::rooms::stream_id(room_id));
        assert_eq!(body["user"]["name"], "alice");

        // Development environment hands out plain ws:// URLs with the
        // request host.
        let broadcaster_ws = body["broadcasterWs"].as_str().unwrap();
        assert_eq!(
            broadcaster_ws,
            format!("ws://duress.test/duress/{room_id}/websocket")
        );
        let viewer_ws = body["viewerWebsocketUrl"].as_str().unwrap();
        assert!(viewer_ws.ends_with(&format!("/duress/{room_id}/viewer/websocket")));

        // The room is seeded in both registries.
        assert!(state.rooms.get(room_id).await.is_some());
        assert!(state.rooms.get_by_stream(stream_id).await.is_some());
    }

    #[tokio::test]
    async fn production_environment_hands_out_wss_urls() {
        let config: BeaconConfig =
            toml::from_str(r#"environment = "production""#).expect("config");
        let state = Arc::new(AppState {
            config,
            rooms: Arc::new(RoomRegistry::new()),
            help: HelpDesk::new(),
            started_at: std::time::Instant::now(),
        });
        let body = open_help_session(&state, "alice").await;
        assert!(body["broadcasterWs"].as_str().unwrap().starts_with("wss://"));
    }

    #[tokio::test]
    async fn help_lifecycle_flows_open_taken_closed() {
        let state = test_app_state();
        open_help_session(&state, "alice").await;

        // listen sees the open request
        let app = build_router(Arc::clone(&state));
        let response = app.oneshot(get_request("/duress/listen")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["name"], "alice");
        assert_eq!(body["status"], "open");

        // bob takes it
        let app = build_router(Arc::clone(&state));
        let response = app
            .oneshot(json_request(
                "POST",
                "/duress/give_help",
                json!({ "name": "alice", "helper": "bob" }),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["status"], "success");

        let app = build_router(Arc::clone(&state));
        let response = app
            .oneshot(json_request(
                "POST",
                "/duress/listen_for_helper",
                json!({ "name": "alice" }),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["helper"], "bob");
        assert_eq!(body["status"], "taken");

        // completion closes the request; listen goes back to null
        let app = build_router(Arc::clone(&state));
        let response = app
            .oneshot(json_request(
                "POST",
                "/duress/help_completed",
                json!({ "name": "alice", "helper": "bob" }),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["status"], "success");

        let app = build_router(Arc::clone(&state));
        let response = app.oneshot(get_request("/duress/listen")).await.unwrap();
        assert_eq!(body_json(response).await, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn session_info_round_trips_room_id() {
        let state = test_app_state();
        let created = open_help_session(&state, "alice").await;

        let app = build_router(Arc::clone(&state));
        let response = app
            .oneshot(get_request("/duress/session_info?name=alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["roomId"], created["roomId"]);
        assert_eq!(body["streamId"], created["streamId"]);
    }

    #[tokio::test]
    async fn session_info_unknown_name_is_404() {
        let app = build_router(test_app_state());
        let response = app
            .oneshot(get_request("/duress/session_info?name=ghost"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn give_help_rejects_empty_parameters() {
        let app = build_router(test_app_state());
        let response = app
            .oneshot(json_request(
                "POST",
                "/duress/give_help",
                json!({ "name": "", "helper": "bob" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sdp_relay_to_unknown_room_is_404() {
        let app = build_router(test_app_state());
        let response = app
            .oneshot(json_request(
                "POST",
                "/duress/broadcast/sdp",
                json!({ "roomId": "missing", "sdp": "v=0\r\n" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sdp_relay_to_known_room_succeeds() {
        let state = test_app_state();
        let created = open_help_session(&state, "alice").await;
        let room_id = created["roomId"].as_str().unwrap();

        for (uri, body) in [
            ("/duress/broadcast/sdp", json!({ "roomId": room_id, "sdp": "v=0\r\n" })),
            (
                "/duress/broadcast/candidate",
                json!({ "roomId": room_id, "candidate": "candidate:1" }),
            ),
            ("/duress/viewer/sdp", json!({ "roomId": room_id, "sdp": "v=0\r\n" })),
            (
                "/duress/viewer/candidate",
                json!({ "roomId": room_id, "candidate": "candidate:1" }),
            ),
        ] {
            let app = build_router(Arc::clone(&state));
            let response = app.oneshot(json_request("POST", uri, body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "relay {uri} failed");
        }
    }

    #[tokio::test]
    async fn stream_info_reports_unknown_stream() {
        let app = build_router(test_app_state());
        let response = app.oneshot(get_request("/stream/deadbeef")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["status"], "not_found");
        assert_eq!(body["streamId"], "deadbeef");
    }

    #[tokio::test]
    async fn stream_info_reports_active_stream_with_stats() {
        let state = test_app_state();
        let created = open_help_session(&state, "alice").await;
        let stream_id = created["streamId"].as_str().unwrap();

        let app = build_router(Arc::clone(&state));
        let response = app
            .oneshot(get_request(&format!("/stream/{stream_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "active");
        assert_eq!(body["stats"]["totalConnections"], 0);
        assert_eq!(body["stats"]["activeTracks"], 0);
        assert!(
            body["streamWebSocket"]
                .as_str()
                .unwrap()
                .ends_with(&format!("/stream/{stream_id}/websocket"))
        );
    }
}
