mod common;

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{TestRelay, WAIT};
use futures::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use scoreboard_relay::{
    dto::{
        game::{GameState, Team},
        ws::PushMessage,
    },
    routes,
    state::{AppState, DeliveryPolicy},
};
use serde_json::{Value, json};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};
use tower::ServiceExt;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn app() -> Router {
    routes::router(AppState::with_policy(DeliveryPolicy::IncludeOrigin))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_game(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/game")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn lions_lead() -> GameState {
    GameState::default()
        .start_game("Lions", "Tigers")
        .unwrap()
        .update_score(Team::TeamA, 2)
}

async fn next_game_frame(socket: &mut Socket) -> GameState {
    timeout(WAIT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    return PushMessage::from_json_str(text.as_str()).unwrap().into_state();
                }
                Some(Ok(_)) => continue,
                other => panic!("push channel ended unexpectedly: {other:?}"),
            }
        }
    })
    .await
    .expect("no gameData frame received")
}

async fn send_update(socket: &mut Socket, state: GameState) {
    let frame = serde_json::to_string(&PushMessage::UpdateGameData(state)).unwrap();
    socket.send(Message::Text(frame.into())).await.unwrap();
}

#[tokio::test]
async fn cold_start_serves_default_document() {
    let response = app().oneshot(get("/api/game")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "gameStarted": false,
            "teamNames": { "teamA": "", "teamB": "" },
            "scores": { "teamA": 0, "teamB": 0 },
            "winner": null,
        })
    );
}

#[tokio::test]
async fn posted_document_is_returned_by_get() {
    let app = app();
    let update = lions_lead();

    let response = app
        .clone()
        .oneshot(post_game(serde_json::to_string(&update).unwrap()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "success": true }));

    let response = app.oneshot(get("/api/game")).await.unwrap();
    let stored: GameState = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(stored, update);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let response = app().oneshot(post_game("{ not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["message"].is_string());
}

#[tokio::test]
async fn healthcheck_reports_ok() {
    let response = app().oneshot(get("/healthcheck")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["observers"], 0);
    assert!(body["started_at"].is_string());
}

#[tokio::test]
async fn openapi_document_lists_game_routes() {
    let response = app().oneshot(get("/api-doc/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["paths"]["/api/game"].is_object());
    assert!(body["paths"]["/socket"].is_object());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_socket_receives_current_document() {
    let relay = TestRelay::start();
    relay.state().store().write(lions_lead()).await;

    let (mut socket, _) = connect_async(relay.push_url()).await.unwrap();
    assert_eq!(next_game_frame(&mut socket).await, lions_lead());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn push_update_reaches_every_socket_including_writer() {
    let relay = TestRelay::start();
    let (mut writer, _) = connect_async(relay.push_url()).await.unwrap();
    let (mut viewer, _) = connect_async(relay.push_url()).await.unwrap();
    next_game_frame(&mut writer).await;
    next_game_frame(&mut viewer).await;

    send_update(&mut writer, lions_lead()).await;

    assert_eq!(next_game_frame(&mut viewer).await, lions_lead());
    assert_eq!(next_game_frame(&mut writer).await, lions_lead());
    assert_eq!(relay.stored().await, lions_lead());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exclude_origin_skips_the_writer() {
    let relay = TestRelay::with_policy(DeliveryPolicy::ExcludeOrigin);
    let (mut writer, _) = connect_async(relay.push_url()).await.unwrap();
    let (mut viewer, _) = connect_async(relay.push_url()).await.unwrap();
    next_game_frame(&mut writer).await;
    next_game_frame(&mut viewer).await;

    send_update(&mut writer, lions_lead()).await;
    assert_eq!(next_game_frame(&mut viewer).await, lions_lead());

    let echo = timeout(Duration::from_millis(300), writer.next()).await;
    assert!(echo.is_err(), "writer should not receive its own update");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_write_is_pushed_to_sockets() {
    let relay = TestRelay::start();
    let (mut viewer, _) = connect_async(relay.push_url()).await.unwrap();
    next_game_frame(&mut viewer).await;

    let ack: Value = reqwest::Client::new()
        .post(format!("{}/api/game", relay.endpoint()))
        .json(&lions_lead())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ack, json!({ "success": true }));

    assert_eq!(next_game_frame(&mut viewer).await, lions_lead());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn event_stream_carries_snapshot_and_updates() {
    let relay = TestRelay::start();
    let mut response = reqwest::get(format!("{}/api/game/events", relay.endpoint()))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let mut received = String::new();
    read_until(&mut response, &mut received, "event: gameData").await;
    assert!(received.contains("\"gameStarted\":false"));

    reqwest::Client::new()
        .post(format!("{}/api/game", relay.endpoint()))
        .json(&lions_lead())
        .send()
        .await
        .unwrap();
    read_until(&mut response, &mut received, "\"teamA\":\"Lions\"").await;
}

async fn read_until(response: &mut reqwest::Response, received: &mut String, needle: &str) {
    timeout(WAIT, async {
        while !received.contains(needle) {
            let chunk = response.chunk().await.unwrap().expect("stream ended");
            received.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .expect("event not received");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn observers_are_counted_and_pruned() {
    let relay = TestRelay::start();
    let (mut socket, _) = connect_async(relay.push_url()).await.unwrap();
    next_game_frame(&mut socket).await;
    assert_eq!(relay.state().hub().observer_count(), 1);

    socket.close(None).await.unwrap();
    drop(socket);

    timeout(WAIT, async {
        while relay.state().hub().observer_count() != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("observer was never removed");
}
