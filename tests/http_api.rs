use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use tournament_scorekeeper_lib::notify::BroadcastNotifier;
use tournament_scorekeeper_lib::service::{EngineSettings, Tournament};
use tournament_scorekeeper_lib::store::MemoryRowStore;
use tournament_scorekeeper_lib::{router, AppState};

fn app() -> Router {
    let tournament = Tournament::new(Arc::new(MemoryRowStore::new()), EngineSettings::default());
    router(AppState {
        tournament: Arc::new(tournament),
        notifier: BroadcastNotifier::disabled(),
    })
}

fn post_event(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/events")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn events_reply_and_duplicates_are_silent() {
    let app = app();

    let response = app
        .clone()
        .oneshot(post_event(json!({
            "eventId": "evt-1",
            "text": "A 1 start RedTeam BlueTeam",
            "senderId": "staff-1"
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reply = json_body(response).await;
    assert_eq!(reply["ok"], true);
    assert!(reply["broadcast"].as_str().unwrap().contains("RedTeam (top)"));

    let again = app
        .clone()
        .oneshot(post_event(json!({
            "eventId": "evt-1",
            "text": "A 1 start RedTeam BlueTeam"
        })))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NO_CONTENT);

    let bad = app
        .oneshot(post_event(json!({ "text": "hello there" })))
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::OK);
    let reply = json_body(bad).await;
    assert_eq!(reply["ok"], false);
    assert!(reply["broadcast"].is_null());
}

#[tokio::test]
async fn state_and_match_views() {
    let app = app();
    for (id, text) in [("s1", "A 1 start Red Blue"), ("s2", "A 1 2Top 3")] {
        app.clone()
            .oneshot(post_event(json!({ "eventId": id, "text": text })))
            .await
            .unwrap();
    }

    let response = app.clone().oneshot(get("/state.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["cache-control"], "no-store");
    let state = json_body(response).await;
    assert_eq!(state["maxInnings"], 6);
    assert_eq!(state["matches"].as_array().unwrap().len(), 1);

    let response = app.clone().oneshot(get("/matches/a/1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view = json_body(response).await;
    assert_eq!(view["match"]["topTeam"], "Red");
    assert_eq!(view["match"]["status"], "Playing");
    assert_eq!(view["score"]["topTotal"], 3);
    assert_eq!(view["score"]["top"], json!([0, 3, null, null, null, null]));
    assert_eq!(view["decision"], json!({ "kind": "Win", "slot": "Top" }));

    let missing = app.oneshot(get("/matches/Z/9")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
