use std::time::Duration;

use crate::fixtures::test_app::TestApp;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect(app: &TestApp, token: &str) -> Ws {
    let (ws, _) = tokio_tungstenite::connect_async(app.ws_url(token))
        .await
        .expect("WS connect failed");
    ws
}

async fn send_event(ws: &mut Ws, event: Value) {
    ws.send(Message::Text(event.to_string().into())).await.unwrap();
}

/// Reads frames until one of the wanted type arrives, skipping unrelated
/// pushes (presence, receipts) that interleave freely.
async fn next_event(ws: &mut Ws, wanted: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for `{wanted}`"))
            .expect("stream ended")
            .expect("stream error");
        if let Message::Text(text) = msg {
            let parsed: Value = serde_json::from_str(&text).unwrap();
            if parsed["type"] == wanted {
                return parsed;
            }
        }
    }
}

async fn assert_no_event(ws: &mut Ws, unwanted: &str) {
    let outcome = tokio::time::timeout(Duration::from_millis(300), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let parsed: Value = serde_json::from_str(&text).unwrap();
                    if parsed["type"] == unwanted {
                        return;
                    }
                }
                Some(Ok(_)) => {}
                _ => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    assert!(outcome.is_err(), "unexpected `{unwanted}` event");
}

async fn open_room(app: &TestApp, token: &str) -> String {
    let resp = app.auth_post("/api/room/open", token).send().await.unwrap();
    let json: Value = resp.json().await.unwrap();
    json["id"].as_str().unwrap().to_string()
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn handshake_rejects_invalid_token() {
    let app = TestApp::spawn().await;

    let result = tokio_tungstenite::connect_async(app.ws_url("not-a-token")).await;
    assert!(result.is_err(), "invalid bearer must refuse the upgrade");
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn ping_pong() {
    let app = TestApp::spawn().await;
    let customer = app.customer("Ada Lovelace");

    let mut ws = connect(&app, &customer.token).await;
    send_event(&mut ws, serde_json::json!({ "type": "ping" })).await;
    next_event(&mut ws, "pong").await;
    ws.close(None).await.ok();
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn message_round_trip_with_typing() {
    let app = TestApp::spawn().await;
    let customer = app.customer("Ada Lovelace");
    let staff = app.staff("Agent Dale");
    let room_id = open_room(&app, &customer.token).await;

    let mut customer_ws = connect(&app, &customer.token).await;
    send_event(
        &mut customer_ws,
        serde_json::json!({ "type": "join_room", "data": { "room_id": room_id } }),
    )
    .await;
    let joined = next_event(&mut customer_ws, "room_joined").await;
    assert_eq!(joined["data"]["room_id"], room_id.as_str());

    let mut staff_ws = connect(&app, &staff.token).await;
    send_event(
        &mut staff_ws,
        serde_json::json!({ "type": "join_room", "data": { "room_id": room_id } }),
    )
    .await;
    next_event(&mut staff_ws, "room_joined").await;

    // Staff typing reaches the customer but never echoes back.
    send_event(
        &mut staff_ws,
        serde_json::json!({ "type": "typing", "data": { "room_id": room_id } }),
    )
    .await;
    let typing = next_event(&mut customer_ws, "user_typing").await;
    assert_eq!(typing["data"]["user"]["display_name"], "Agent Dale");

    send_event(
        &mut customer_ws,
        serde_json::json!({
            "type": "send_message",
            "data": { "room_id": room_id, "message": "Where is my order?" }
        }),
    )
    .await;

    let push = next_event(&mut staff_ws, "new_message").await;
    assert_eq!(push["data"]["message"]["body"], "Where is my order?");
    assert_eq!(push["data"]["message"]["sender_role"], "customer");

    // The sender's own channels get the durable echo too.
    let echo = next_event(&mut customer_ws, "new_message").await;
    assert_eq!(echo["data"]["message"]["id"], push["data"]["message"]["id"]);

    customer_ws.close(None).await.ok();
    staff_ws.close(None).await.ok();
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn joining_staff_sweeps_unread_and_notifies_subscribers() {
    let app = TestApp::spawn().await;
    let customer = app.customer("Ada Lovelace");
    let staff = app.staff("Agent Dale");
    let room_id = open_room(&app, &customer.token).await;

    app.auth_post(&format!("/api/room/{room_id}/message"), &customer.token)
        .json(&serde_json::json!({ "message": "Hello?" }))
        .send()
        .await
        .unwrap();

    let mut customer_ws = connect(&app, &customer.token).await;
    send_event(
        &mut customer_ws,
        serde_json::json!({ "type": "join_room", "data": { "room_id": room_id } }),
    )
    .await;
    next_event(&mut customer_ws, "room_joined").await;

    // Staff opening the room acknowledges everything addressed to them;
    // the customer sees the receipt live.
    let mut staff_ws = connect(&app, &staff.token).await;
    send_event(
        &mut staff_ws,
        serde_json::json!({ "type": "join_room", "data": { "room_id": room_id } }),
    )
    .await;

    let receipt = next_event(&mut customer_ws, "messages_read").await;
    assert_eq!(receipt["data"]["message_ids"].as_array().unwrap().len(), 1);

    let resp = app
        .auth_get(&format!("/api/room/{room_id}"), &staff.token)
        .send()
        .await
        .unwrap();
    let room: Value = resp.json().await.unwrap();
    assert_eq!(room["unread_for_staff"], 0);

    customer_ws.close(None).await.ok();
    staff_ws.close(None).await.ok();
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn read_receipts_reach_staff_not_viewing_the_room() {
    let app = TestApp::spawn().await;
    let customer = app.customer("Ada Lovelace");
    let reader = app.staff("Agent Dale");
    let watcher = app.staff("Agent Cooper");
    let room_id = open_room(&app, &customer.token).await;

    app.auth_post(&format!("/api/room/{room_id}/message"), &customer.token)
        .json(&serde_json::json!({ "message": "Hello?" }))
        .send()
        .await
        .unwrap();

    // Connected to the console, but never joined this room.
    let mut watcher_ws = connect(&app, &watcher.token).await;

    let mut reader_ws = connect(&app, &reader.token).await;
    send_event(
        &mut reader_ws,
        serde_json::json!({ "type": "join_room", "data": { "room_id": room_id } }),
    )
    .await;

    // The join sweep marks the message read; the room-list badge on the
    // other console clears from the same receipt.
    let receipt = next_event(&mut watcher_ws, "messages_read").await;
    assert_eq!(receipt["data"]["room_id"], room_id.as_str());
    assert_eq!(receipt["data"]["message_ids"].as_array().unwrap().len(), 1);

    watcher_ws.close(None).await.ok();
    reader_ws.close(None).await.ok();
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn staff_presence_is_pooled() {
    let app = TestApp::spawn().await;
    let customer = app.customer("Ada Lovelace");
    let staff_a = app.staff("Agent Dale");
    let staff_b = app.staff("Agent Cooper");
    open_room(&app, &customer.token).await;

    let mut customer_ws = connect(&app, &customer.token).await;

    // First operator online flips the pool indicator.
    let mut ws_a = connect(&app, &staff_a.token).await;
    next_event(&mut customer_ws, "admin_online").await;

    // A second operator joining, or the first leaving while one remains,
    // is invisible to customers.
    let mut ws_b = connect(&app, &staff_b.token).await;
    ws_a.close(None).await.ok();
    assert_no_event(&mut customer_ws, "admin_offline").await;

    ws_b.close(None).await.ok();
    next_event(&mut customer_ws, "admin_offline").await;

    customer_ws.close(None).await.ok();
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn foreign_room_operations_surface_as_error_events() {
    let app = TestApp::spawn().await;
    let ada = app.customer("Ada Lovelace");
    let grace = app.customer("Grace Hopper");
    let room_id = open_room(&app, &ada.token).await;

    let mut ws = connect(&app, &grace.token).await;
    send_event(
        &mut ws,
        serde_json::json!({ "type": "join_room", "data": { "room_id": room_id } }),
    )
    .await;
    let err = next_event(&mut ws, "error").await;
    assert_eq!(err["data"]["code"], "not_found");

    send_event(
        &mut ws,
        serde_json::json!({ "type": "join_room", "data": { "room_id": "junk" } }),
    )
    .await;
    let err = next_event(&mut ws, "error").await;
    assert_eq!(err["data"]["code"], "bad_request");

    ws.close(None).await.ok();
}
