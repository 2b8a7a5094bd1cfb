//! Integration tests for the Covey server: handshake, town requests, and
//! pushed roster events over real WebSocket connections.

use std::sync::Arc;
use std::time::Duration;

use covey::prelude::*;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Test video provider
// =========================================================================

struct FixedVideo;

impl VideoTokenIssuer for FixedVideo {
    async fn issue_token(
        &self,
        town_id: &TownId,
        player_id: PlayerId,
    ) -> Result<Option<String>, SessionError> {
        Ok(Some(format!("video:{town_id}:{player_id}")))
    }
}

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn spawn<V: VideoTokenIssuer>(server: CoveyServer<V, JsonCodec>) -> String {
    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

/// Starts a server on a random port and returns the address.
async fn start_server() -> String {
    let server = CoveyServerBuilder::new()
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("server should build");
    spawn(server).await
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

fn encode_envelope(envelope: &Envelope) -> Message {
    let bytes = serde_json::to_vec(envelope).expect("encode");
    Message::Binary(bytes.into())
}

fn decode_envelope(msg: Message) -> Envelope {
    serde_json::from_slice(&msg.into_data()).expect("decode")
}

async fn send(ws: &mut ClientWs, msg: ClientMessage) {
    let envelope = Envelope {
        seq: 0,
        timestamp: 0,
        channel: Channel::ReliableOrdered,
        payload: Payload::Client(msg),
    };
    ws.send(encode_envelope(&envelope)).await.expect("send");
}

/// Next server message, failing the test if none arrives within a second.
async fn recv(ws: &mut ClientWs) -> ServerMessage {
    let msg = tokio::time::timeout(Duration::from_secs(1), ws.next())
        .await
        .expect("timed out waiting for server")
        .expect("stream ended")
        .expect("recv");
    match decode_envelope(msg).payload {
        Payload::Server(msg) => msg,
        other => panic!("expected a server message, got {other:?}"),
    }
}

async fn request(ws: &mut ClientWs, msg: ClientMessage) -> ServerMessage {
    send(ws, msg).await;
    recv(ws).await
}

/// Connects and completes the handshake.
async fn connect_ready(addr: &str) -> ClientWs {
    let mut ws = connect(addr).await;
    let ack = request(&mut ws, ClientMessage::Handshake { version: PROTOCOL_VERSION }).await;
    assert!(matches!(ack, ServerMessage::HandshakeAck { .. }), "got {ack:?}");
    ws
}

fn create_request(name: &str, public: bool) -> TownCreateRequest {
    TownCreateRequest {
        friendly_name: name.into(),
        is_publicly_listed: public,
        map_id: MapId::Standard,
        enable_video: false,
        enable_proximity: false,
        sprite_restriction: SpriteRestriction::AllUsers,
        restricted_sprite_name: String::new(),
    }
}

async fn create_town(ws: &mut ClientWs, name: &str, public: bool) -> TownCreateResponse {
    match request(ws, ClientMessage::CreateTown(create_request(name, public))).await {
        ServerMessage::TownCreated(created) => created,
        other => panic!("expected TownCreated, got {other:?}"),
    }
}

async fn join_town(ws: &mut ClientWs, town_id: &TownId, user: &str) -> TownJoinResponse {
    let join = TownJoinRequest {
        town_id: town_id.clone(),
        user_name: user.into(),
        avatar_name: "misa".into(),
        sprite_restriction_password: String::new(),
    };
    match request(ws, ClientMessage::JoinTown(join)).await {
        ServerMessage::TownJoined(joined) => joined,
        other => panic!("expected TownJoined, got {other:?}"),
    }
}

async fn subscribe(ws: &mut ClientWs, town_id: &TownId, joined: &TownJoinResponse) {
    let reply = request(
        ws,
        ClientMessage::Subscribe {
            town_id: town_id.clone(),
            session_token: joined.session_token.clone(),
        },
    )
    .await;
    match reply {
        ServerMessage::Subscribed { player_id, .. } => assert_eq!(player_id, joined.player_id),
        other => panic!("expected Subscribed, got {other:?}"),
    }
}

fn expect_error(msg: ServerMessage, expected: u16) {
    match msg {
        ServerMessage::Error { code, .. } => assert_eq!(code, expected),
        other => panic!("expected Error {expected}, got {other:?}"),
    }
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_handshake_success() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let ack = request(&mut ws, ClientMessage::Handshake { version: PROTOCOL_VERSION }).await;
    match ack {
        ServerMessage::HandshakeAck { server_time } => assert!(server_time > 0),
        other => panic!("expected HandshakeAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_version_mismatch() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let reply = request(&mut ws, ClientMessage::Handshake { version: 999 }).await;
    expect_error(reply, 400);
}

#[tokio::test]
async fn test_handshake_required_first() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let reply = request(&mut ws, ClientMessage::ListTowns).await;
    expect_error(reply, 400);
}

#[tokio::test]
async fn test_heartbeat_echoes_client_time() {
    let addr = start_server().await;
    let mut ws = connect_ready(&addr).await;

    match request(&mut ws, ClientMessage::Heartbeat { client_time: 1234 }).await {
        ServerMessage::HeartbeatAck { client_time, .. } => assert_eq!(client_time, 1234),
        other => panic!("expected HeartbeatAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let addr = start_server().await;
    let mut ws = connect_ready(&addr).await;

    ws.send(Message::Binary(b"not json".to_vec().into()))
        .await
        .expect("send");
    expect_error(recv(&mut ws).await, 400);

    let reply = request(&mut ws, ClientMessage::ListTowns).await;
    assert!(matches!(reply, ServerMessage::TownList { .. }));
}

// =========================================================================
// Town requests
// =========================================================================

#[tokio::test]
async fn test_create_list_join() {
    let addr = start_server().await;
    let mut ws = connect_ready(&addr).await;

    let created = create_town(&mut ws, "Alpha", true).await;
    assert_eq!(created.update_password.len(), 24);
    assert!(created.sprite_restriction_password.is_none());

    match request(&mut ws, ClientMessage::ListTowns).await {
        ServerMessage::TownList { towns } => {
            assert_eq!(towns.len(), 1);
            assert_eq!(towns[0].town_id, created.town_id);
            assert_eq!(towns[0].friendly_name, "Alpha");
            assert_eq!(towns[0].current_occupancy, 0);
        }
        other => panic!("expected TownList, got {other:?}"),
    }

    let joined = join_town(&mut ws, &created.town_id, "alice").await;
    assert_eq!(joined.friendly_name, "Alpha");
    assert_eq!(joined.current_players.len(), 1);
    assert_eq!(joined.current_players[0].user_name, "alice");
    assert!(joined.provider_video_token.is_none());
    assert!(!joined.sprite_password_override);
}

#[tokio::test]
async fn test_private_town_not_listed() {
    let addr = start_server().await;
    let mut ws = connect_ready(&addr).await;

    create_town(&mut ws, "Hidden", false).await;

    match request(&mut ws, ClientMessage::ListTowns).await {
        ServerMessage::TownList { towns } => assert!(towns.is_empty()),
        other => panic!("expected TownList, got {other:?}"),
    }
}

#[tokio::test]
async fn test_request_errors_carry_status_codes() {
    let addr = start_server().await;
    let mut ws = connect_ready(&addr).await;

    let reply = request(&mut ws, ClientMessage::CreateTown(create_request("", true))).await;
    expect_error(reply, 400);

    let join = TownJoinRequest {
        town_id: TownId::new("FFFF000000"),
        user_name: "bob".into(),
        avatar_name: "misa".into(),
        sprite_restriction_password: String::new(),
    };
    expect_error(request(&mut ws, ClientMessage::JoinTown(join)).await, 404);

    let created = create_town(&mut ws, "Alpha", true).await;
    let update = TownUpdateRequest {
        town_id: created.town_id.clone(),
        password: "wrong".into(),
        friendly_name: Some("Beta".into()),
        is_publicly_listed: None,
        map_id: None,
        enable_video: None,
        enable_proximity: None,
    };
    expect_error(request(&mut ws, ClientMessage::UpdateTown(update)).await, 403);
}

#[tokio::test]
async fn test_update_town_renames() {
    let addr = start_server().await;
    let mut ws = connect_ready(&addr).await;
    let created = create_town(&mut ws, "Alpha", true).await;

    let update = TownUpdateRequest {
        town_id: created.town_id.clone(),
        password: created.update_password.clone(),
        friendly_name: Some("Beta".into()),
        is_publicly_listed: None,
        map_id: None,
        enable_video: None,
        enable_proximity: None,
    };
    match request(&mut ws, ClientMessage::UpdateTown(update)).await {
        ServerMessage::TownUpdated { town_id } => assert_eq!(town_id, created.town_id),
        other => panic!("expected TownUpdated, got {other:?}"),
    }

    match request(&mut ws, ClientMessage::ListTowns).await {
        ServerMessage::TownList { towns } => assert_eq!(towns[0].friendly_name, "Beta"),
        other => panic!("expected TownList, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shared_registry_is_visible_to_clients() {
    let registry = Arc::new(TownRegistry::default());
    let server = CoveyServerBuilder::new()
        .bind("127.0.0.1:0")
        .registry(Arc::clone(&registry))
        .build()
        .await
        .expect("server should build");
    let created = server
        .registry()
        .create_town(create_request("Alpha", true))
        .expect("create");
    let addr = spawn(server).await;
    let mut ws = connect_ready(&addr).await;

    match request(&mut ws, ClientMessage::ListTowns).await {
        ServerMessage::TownList { towns } => assert_eq!(towns[0].town_id, created.town_id),
        other => panic!("expected TownList, got {other:?}"),
    }
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_video_token_issued_for_video_towns() {
    let server = CoveyServerBuilder::new()
        .bind("127.0.0.1:0")
        .build_with_video(FixedVideo)
        .await
        .expect("server should build");
    let addr = spawn(server).await;
    let mut ws = connect_ready(&addr).await;

    let plain = create_town(&mut ws, "Plain", true).await;
    let joined = join_town(&mut ws, &plain.town_id, "alice").await;
    assert!(joined.provider_video_token.is_none());

    let request_video = TownCreateRequest {
        enable_video: true,
        ..create_request("Video", true)
    };
    let video = match request(&mut ws, ClientMessage::CreateTown(request_video)).await {
        ServerMessage::TownCreated(created) => created,
        other => panic!("expected TownCreated, got {other:?}"),
    };
    let joined = join_town(&mut ws, &video.town_id, "alice").await;
    assert_eq!(
        joined.provider_video_token,
        Some(format!("video:{}:{}", video.town_id, joined.player_id))
    );
}

// =========================================================================
// Subscriptions and pushed events
// =========================================================================

#[tokio::test]
async fn test_movement_reaches_others_not_mover() {
    let addr = start_server().await;
    let mut alice = connect_ready(&addr).await;
    let mut bob = connect_ready(&addr).await;

    let created = create_town(&mut alice, "Alpha", true).await;
    let alice_join = join_town(&mut alice, &created.town_id, "alice").await;
    subscribe(&mut alice, &created.town_id, &alice_join).await;

    let bob_join = join_town(&mut bob, &created.town_id, "bob").await;
    assert_eq!(bob_join.current_players.len(), 2);
    match recv(&mut alice).await {
        ServerMessage::PlayerJoined { player } => assert_eq!(player.user_name, "bob"),
        other => panic!("expected PlayerJoined, got {other:?}"),
    }

    subscribe(&mut bob, &created.town_id, &bob_join).await;
    let location = UserLocation {
        x: 10.0,
        y: 20.0,
        rotation: Direction::Left,
        moving: true,
    };
    send(&mut bob, ClientMessage::PlayerMovement { location }).await;

    match recv(&mut alice).await {
        ServerMessage::PlayerMoved { player } => {
            assert_eq!(player.player_id, bob_join.player_id);
            assert_eq!(player.location, location);
        }
        other => panic!("expected PlayerMoved, got {other:?}"),
    }

    // Bob's next frame is the heartbeat ack, not an echo of his own move.
    let reply = request(&mut bob, ClientMessage::Heartbeat { client_time: 7 }).await;
    assert!(matches!(reply, ServerMessage::HeartbeatAck { client_time: 7, .. }), "got {reply:?}");
}

#[tokio::test]
async fn test_movement_requires_subscription() {
    let addr = start_server().await;
    let mut ws = connect_ready(&addr).await;

    let reply = request(
        &mut ws,
        ClientMessage::PlayerMovement {
            location: UserLocation::default(),
        },
    )
    .await;
    expect_error(reply, 403);
}

#[tokio::test]
async fn test_subscribe_with_bad_token_is_unauthorized() {
    let addr = start_server().await;
    let mut ws = connect_ready(&addr).await;
    let created = create_town(&mut ws, "Alpha", true).await;

    let reply = request(
        &mut ws,
        ClientMessage::Subscribe {
            town_id: created.town_id,
            session_token: SessionToken::new("nope"),
        },
    )
    .await;
    expect_error(reply, 403);
}

#[tokio::test]
async fn test_disconnect_notifies_others() {
    let addr = start_server().await;
    let mut alice = connect_ready(&addr).await;
    let mut bob = connect_ready(&addr).await;

    let created = create_town(&mut alice, "Alpha", true).await;
    let alice_join = join_town(&mut alice, &created.town_id, "alice").await;
    subscribe(&mut alice, &created.town_id, &alice_join).await;

    let bob_join = join_town(&mut bob, &created.town_id, "bob").await;
    let _ = recv(&mut alice).await; // bob joined
    subscribe(&mut bob, &created.town_id, &bob_join).await;

    send(
        &mut bob,
        ClientMessage::Disconnect {
            reason: "bye".into(),
        },
    )
    .await;

    match recv(&mut alice).await {
        ServerMessage::PlayerDisconnected { player } => {
            assert_eq!(player.player_id, bob_join.player_id)
        }
        other => panic!("expected PlayerDisconnected, got {other:?}"),
    }

    match request(&mut alice, ClientMessage::ListTowns).await {
        ServerMessage::TownList { towns } => assert_eq!(towns[0].current_occupancy, 1),
        other => panic!("expected TownList, got {other:?}"),
    }
}

#[tokio::test]
async fn test_delete_town_closes_subscribers() {
    let addr = start_server().await;
    let mut owner = connect_ready(&addr).await;
    let mut guest = connect_ready(&addr).await;

    let created = create_town(&mut owner, "Alpha", true).await;
    let joined = join_town(&mut guest, &created.town_id, "guest").await;
    subscribe(&mut guest, &created.town_id, &joined).await;

    let delete = TownDeleteRequest {
        town_id: created.town_id.clone(),
        password: created.update_password.clone(),
    };
    match request(&mut owner, ClientMessage::DeleteTown(delete)).await {
        ServerMessage::TownDeleted { town_id } => assert_eq!(town_id, created.town_id),
        other => panic!("expected TownDeleted, got {other:?}"),
    }

    match recv(&mut guest).await {
        ServerMessage::TownClosing { town_id } => assert_eq!(town_id, created.town_id),
        other => panic!("expected TownClosing, got {other:?}"),
    }

    // The server closes the guest's connection after TownClosing.
    let next = tokio::time::timeout(Duration::from_secs(1), guest.next())
        .await
        .expect("server should close");
    assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));

    match request(&mut owner, ClientMessage::ListTowns).await {
        ServerMessage::TownList { towns } => assert!(towns.is_empty()),
        other => panic!("expected TownList, got {other:?}"),
    }
}

#[tokio::test]
async fn test_closed_connection_leaves_town() {
    let addr = start_server().await;
    let mut alice = connect_ready(&addr).await;
    let mut bob = connect_ready(&addr).await;

    let created = create_town(&mut alice, "Alpha", true).await;
    let alice_join = join_town(&mut alice, &created.town_id, "alice").await;
    subscribe(&mut alice, &created.town_id, &alice_join).await;

    let bob_join = join_town(&mut bob, &created.town_id, "bob").await;
    let _ = recv(&mut alice).await; // bob joined
    subscribe(&mut bob, &created.town_id, &bob_join).await;

    bob.close(None).await.expect("close");
    drop(bob);

    match recv(&mut alice).await {
        ServerMessage::PlayerDisconnected { player } => assert_eq!(player.user_name, "bob"),
        other => panic!("expected PlayerDisconnected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_idle_connection_times_out() {
    let server = CoveyServerBuilder::new()
        .bind("127.0.0.1:0")
        .idle_timeout(Duration::from_millis(100))
        .build()
        .await
        .expect("server should build");
    let addr = spawn(server).await;
    let mut ws = connect_ready(&addr).await;

    let next = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("server should close idle connection");
    assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
}
