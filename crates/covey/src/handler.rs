//! Per-connection handler: handshake, requests, and pushed town events.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version → send HandshakeAck
//!   2. Loop: answer client requests, forward events of the subscribed town
//!   3. On exit the subscription drops: listener removed, player disconnected

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use covey_protocol::{
    Channel, ClientMessage, Codec, Envelope, Payload, PlayerId, ProtocolError, ServerMessage,
    SessionToken, TownId, TownJoinRequest, TownJoinResponse, UserLocation,
};
use covey_session::VideoTokenIssuer;
use covey_town::{ChannelListener, JoinRequest, ListenerId, TownController, TownError, TownEvent};
use covey_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::{PROTOCOL_VERSION, ServerState};
use crate::CoveyError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type EventReceiver = mpsc::UnboundedReceiver<TownEvent>;

/// A connection bound to one player in one town.
///
/// Dropping it removes the connection's listener and ends the player's
/// session, so cleanup runs on every exit path, panics included.
struct Subscription {
    town: Arc<TownController>,
    token: SessionToken,
    player_id: PlayerId,
    listener: ListenerId,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.town.remove_town_listener(self.listener);
        if !self.town.state().is_active() {
            return;
        }
        match self.town.disconnect(&self.token) {
            Ok(_) => {
                tracing::info!(town_id = %self.town.town_id(), player_id = %self.player_id, "player left");
            }
            Err(e) => {
                tracing::debug!(player_id = %self.player_id, error = %e, "session already gone");
            }
        }
    }
}

enum Flow {
    Continue,
    Close,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<V, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<V, C>>,
) -> Result<(), CoveyError>
where
    V: VideoTokenIssuer,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = ?conn.peer_addr(), "handling new connection");

    let start = Instant::now();
    if let Err(e) = perform_handshake(&conn, &state.codec, &start).await {
        let _ = conn.close().await;
        return Err(e);
    }

    let mut ctx = ConnectionCtx {
        conn: &conn,
        state: state.as_ref(),
        seq: 1,
        start,
        subscription: None,
    };
    let mut events: Option<EventReceiver> = None;
    let mut deadline = tokio::time::Instant::now() + state.idle_timeout;

    loop {
        tokio::select! {
            received = conn.recv() => {
                let data = match received {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%conn_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "recv error");
                        break;
                    }
                };
                deadline = tokio::time::Instant::now() + state.idle_timeout;
                if let Flow::Close = ctx.handle_frame(&data, &mut events).await? {
                    break;
                }
            }
            event = next_event(&mut events) => {
                match event {
                    Some(event) => {
                        if let Flow::Close = ctx.push_event(event).await? {
                            break;
                        }
                    }
                    None => {
                        // The town dropped our listener.
                        events = None;
                        ctx.subscription = None;
                    }
                }
            }
            () = tokio::time::sleep_until(deadline) => {
                tracing::info!(%conn_id, "connection timed out");
                break;
            }
        }
    }

    drop(ctx);
    let _ = conn.close().await;
    Ok(())
}

/// Pending forever while the connection has no subscription.
async fn next_event(events: &mut Option<EventReceiver>) -> Option<TownEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Receives Handshake, validates the version, sends HandshakeAck.
async fn perform_handshake(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    start: &Instant,
) -> Result<(), CoveyError> {
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before handshake".into()).into());
        }
        Ok(Err(e)) => return Err(CoveyError::Transport(e)),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: Envelope = match codec.decode(&data) {
        Ok(envelope) => envelope,
        Err(e) => {
            send_error(conn, codec, 400, "expected Handshake", 0, start).await?;
            return Err(e.into());
        }
    };

    let version = match envelope.payload {
        Payload::Client(ClientMessage::Handshake { version }) => version,
        _ => {
            send_error(conn, codec, 400, "expected Handshake", 0, start).await?;
            return Err(ProtocolError::InvalidMessage("first message must be Handshake".into()).into());
        }
    };

    if version != PROTOCOL_VERSION {
        send_error(
            conn,
            codec,
            400,
            &format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
            0,
            start,
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let ack = Envelope {
        seq: 0,
        timestamp: start.elapsed().as_millis() as u64,
        channel: Channel::ReliableOrdered,
        payload: Payload::Server(ServerMessage::HandshakeAck {
            server_time: unix_millis(),
        }),
    };
    let bytes = codec.encode(&ack)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Per-connection state for the message loop.
struct ConnectionCtx<'a, V: VideoTokenIssuer, C: Codec> {
    conn: &'a WebSocketConnection,
    state: &'a ServerState<V, C>,
    seq: u64,
    start: Instant,
    subscription: Option<Subscription>,
}

impl<V, C> ConnectionCtx<'_, V, C>
where
    V: VideoTokenIssuer,
    C: Codec,
{
    async fn handle_frame(
        &mut self,
        data: &[u8],
        events: &mut Option<EventReceiver>,
    ) -> Result<Flow, CoveyError> {
        let envelope: Envelope = match self.state.codec.decode(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(conn_id = %self.conn.id(), error = %e, "failed to decode envelope");
                self.send_error(400, &format!("malformed message: {e}")).await?;
                return Ok(Flow::Continue);
            }
        };

        let Payload::Client(msg) = envelope.payload else {
            self.send_error(400, "expected a client message").await?;
            return Ok(Flow::Continue);
        };

        match msg {
            ClientMessage::Handshake { .. } => {
                self.send_error(400, "handshake already completed").await?;
            }

            ClientMessage::Heartbeat { client_time } => {
                self.send(ServerMessage::HeartbeatAck {
                    client_time,
                    server_time: unix_millis(),
                })
                .await?;
            }

            ClientMessage::CreateTown(request) => {
                let reply = self
                    .state
                    .registry
                    .create_town(request)
                    .map(|created| ServerMessage::TownCreated(created.response()));
                self.reply(reply).await?;
            }

            ClientMessage::ListTowns => {
                let towns = self.state.registry.get_towns();
                self.send(ServerMessage::TownList { towns }).await?;
            }

            ClientMessage::UpdateTown(request) => {
                let town_id = request.town_id.clone();
                let password = request.password.clone();
                let reply = self
                    .state
                    .registry
                    .update_town(&town_id, &password, request.into())
                    .map(|()| ServerMessage::TownUpdated { town_id });
                self.reply(reply).await?;
            }

            ClientMessage::DeleteTown(request) => {
                let reply = self
                    .state
                    .registry
                    .delete_town(&request.town_id, &request.password)
                    .map(|_| ServerMessage::TownDeleted {
                        town_id: request.town_id,
                    });
                self.reply(reply).await?;
            }

            ClientMessage::JoinTown(request) => {
                let reply = self.join(request).await;
                self.reply(reply).await?;
            }

            ClientMessage::Subscribe {
                town_id,
                session_token,
            } => match self.subscribe(town_id, session_token) {
                Ok((reply, rx)) => {
                    *events = Some(rx);
                    self.send(reply).await?;
                }
                Err(e) => self.send_town_error(&e).await?,
            },

            ClientMessage::PlayerMovement { location } => {
                if let Err(e) = self.report_movement(location) {
                    self.send_town_error(&e).await?;
                }
            }

            ClientMessage::Disconnect { reason } => {
                tracing::info!(conn_id = %self.conn.id(), %reason, "client disconnected");
                return Ok(Flow::Close);
            }
        }

        Ok(Flow::Continue)
    }

    /// Admits the player, then asks the video provider for a token if the
    /// town wants one. The provider is called with no town lock held.
    async fn join(&self, request: TownJoinRequest) -> Result<ServerMessage, TownError> {
        let town_id = request.town_id.clone();
        let grant = self
            .state
            .registry
            .join_town(&town_id, &JoinRequest::from(request))?
            .into_value();

        let provider_video_token = if grant.settings.enable_video {
            match self.state.video.issue_token(&town_id, grant.player.player_id).await {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!(%town_id, error = %e, "no video token for joining player");
                    None
                }
            }
        } else {
            None
        };

        let settings = grant.settings;
        Ok(ServerMessage::TownJoined(TownJoinResponse {
            session_token: grant.session_token,
            player_id: grant.player.player_id,
            provider_video_token,
            current_players: grant.current_players,
            friendly_name: settings.friendly_name,
            is_publicly_listed: settings.is_publicly_listed,
            map_id: settings.map_id,
            enable_video: settings.enable_video,
            enable_proximity: settings.enable_proximity,
            sprite_restriction: settings.sprite_restriction,
            restricted_sprite_name: settings.restricted_sprite_name,
            sprite_password_override: grant.sprite_password_override,
        }))
    }

    fn subscribe(
        &mut self,
        town_id: TownId,
        token: SessionToken,
    ) -> Result<(ServerMessage, EventReceiver), TownError> {
        if self.subscription.is_some() {
            return Err(TownError::InvalidArgument("connection is already subscribed".into()));
        }
        let town = self
            .state
            .registry
            .get_controller_for_town(&town_id)
            .ok_or_else(|| TownError::NotFound(town_id.clone()))?;
        let player = town
            .player_for_token(&token)
            .ok_or_else(|| TownError::Unauthorized("invalid session token".into()))?;

        let (listener, rx) = ChannelListener::channel();
        let listener = town.add_player_listener(&token, Arc::new(listener))?;
        tracing::info!(%town_id, player_id = %player.player_id, "connection subscribed");

        self.subscription = Some(Subscription {
            town,
            token,
            player_id: player.player_id,
            listener,
        });
        Ok((
            ServerMessage::Subscribed {
                town_id,
                player_id: player.player_id,
            },
            rx,
        ))
    }

    fn report_movement(&self, location: UserLocation) -> Result<(), TownError> {
        let Some(sub) = &self.subscription else {
            return Err(TownError::Unauthorized("subscribe before reporting movement".into()));
        };
        sub.town.report_movement(&sub.token, location).map(|_| ())
    }

    /// Forwards one town event. Movement goes out unreliable; the rest
    /// reliable and ordered.
    async fn push_event(&mut self, event: TownEvent) -> Result<Flow, CoveyError> {
        let (channel, msg) = match event {
            TownEvent::PlayerJoined(player) => {
                (Channel::ReliableOrdered, ServerMessage::PlayerJoined { player })
            }
            TownEvent::PlayerMoved(player) => {
                (Channel::Unreliable, ServerMessage::PlayerMoved { player })
            }
            TownEvent::PlayerDisconnected(player) => {
                (Channel::ReliableOrdered, ServerMessage::PlayerDisconnected { player })
            }
            TownEvent::TownDestroyed => {
                let town_id = self.subscription.take().map(|sub| sub.town.town_id().clone());
                if let Some(town_id) = town_id {
                    self.send(ServerMessage::TownClosing { town_id }).await?;
                }
                return Ok(Flow::Close);
            }
        };
        self.send_on(channel, msg).await?;
        Ok(Flow::Continue)
    }

    async fn reply(&mut self, result: Result<ServerMessage, TownError>) -> Result<(), CoveyError> {
        match result {
            Ok(msg) => self.send(msg).await,
            Err(e) => self.send_town_error(&e).await,
        }
    }

    async fn send_town_error(&mut self, e: &TownError) -> Result<(), CoveyError> {
        tracing::debug!(conn_id = %self.conn.id(), error = %e, "request rejected");
        self.send_error(e.status_code(), &e.to_string()).await
    }

    async fn send_error(&mut self, code: u16, message: &str) -> Result<(), CoveyError> {
        let seq = next_seq(&mut self.seq);
        send_error(self.conn, &self.state.codec, code, message, seq, &self.start).await
    }

    async fn send(&mut self, msg: ServerMessage) -> Result<(), CoveyError> {
        self.send_on(Channel::ReliableOrdered, msg).await
    }

    async fn send_on(&mut self, channel: Channel, msg: ServerMessage) -> Result<(), CoveyError> {
        let envelope = Envelope {
            seq: next_seq(&mut self.seq),
            timestamp: self.start.elapsed().as_millis() as u64,
            channel,
            payload: Payload::Server(msg),
        };
        let bytes = self.state.codec.encode(&envelope)?;
        match channel {
            Channel::Unreliable => self.conn.send_unreliable(&bytes).await?,
            Channel::ReliableOrdered | Channel::ReliableUnordered => self.conn.send(&bytes).await?,
        }
        Ok(())
    }
}

/// Sends a `ServerMessage::Error` envelope to the client.
async fn send_error(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    code: u16,
    message: &str,
    seq: u64,
    start: &Instant,
) -> Result<(), CoveyError> {
    let envelope = Envelope {
        seq,
        timestamp: start.elapsed().as_millis() as u64,
        channel: Channel::ReliableOrdered,
        payload: Payload::Server(ServerMessage::Error {
            code,
            message: message.to_string(),
        }),
    };
    let bytes = codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_seq_increments() {
        let mut seq = 1;
        assert_eq!(next_seq(&mut seq), 1);
        assert_eq!(next_seq(&mut seq), 2);
        assert_eq!(seq, 3);
    }

    #[test]
    fn test_unix_millis_is_after_2020() {
        assert!(unix_millis() > 1_577_836_800_000);
    }

    #[tokio::test]
    async fn test_next_event_pending_without_subscription() {
        let mut events = None;
        let result =
            tokio::time::timeout(Duration::from_millis(20), next_event(&mut events)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_next_event_none_when_listener_dropped() {
        let (listener, rx) = ChannelListener::channel();
        let mut events = Some(rx);
        drop(listener);
        assert_eq!(next_event(&mut events).await, None);
    }
}
