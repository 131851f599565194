//! Per-connection handler: handshake, role checks, and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version, authenticate optional token
//!   2. Send HandshakeAck → session created as guest or operator
//!   3. Loop: receive envelopes → dispatch participant or operator commands
//!
//! After a successful `Join` a second task forwards the room's events to
//! the client until the connection closes or joins another room.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use quizroom_protocol::{
    ClientMessage, Codec, Envelope, ParticipantId, ProtocolError, QuestionId, RoomEvent, RoomId,
    ServerMessage,
};
use quizroom_room::{RoomError, SubmitOutcome};
use quizroom_session::{Authenticator, OperatorCapability};
use quizroom_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::QuizError;
use crate::server::{PROTOCOL_VERSION, ServerState};

/// Drop guard that removes the connection's session when the handler exits.
///
/// `Drop` is synchronous, so the async lock is taken in a spawned task.
struct SessionGuard<A: Authenticator, C: Codec> {
    connection_id: ConnectionId,
    state: Arc<ServerState<A, C>>,
}

impl<A: Authenticator, C: Codec> Drop for SessionGuard<A, C> {
    fn drop(&mut self) {
        let connection_id = self.connection_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.sessions.lock().await.remove(connection_id);
        });
    }
}

/// The task forwarding one room's events to this connection. Aborted on
/// drop, so re-joining or disconnecting stops the old stream.
struct Forwarder(JoinHandle<()>);

impl Drop for Forwarder {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The sending half of a connection, shared with the forwarder task.
///
/// `seq` counts outbound envelopes; `timestamp` is milliseconds since the
/// connection was accepted.
struct Outbound {
    conn: Arc<WebSocketConnection>,
    /// Next sequence number. Held across the write, so envelopes reach the
    /// wire in `seq` order.
    seq: Mutex<u64>,
    start: Instant,
}

impl Outbound {
    fn new(conn: Arc<WebSocketConnection>) -> Self {
        Self {
            conn,
            seq: Mutex::new(0),
            start: Instant::now(),
        }
    }

    async fn send(&self, codec: &impl Codec, payload: ServerMessage) -> Result<(), QuizError> {
        let mut seq = self.seq.lock().await;
        let envelope = Envelope {
            seq: *seq,
            timestamp: self.start.elapsed().as_millis() as u64,
            payload,
        };
        let bytes = codec.encode(&envelope)?;
        *seq += 1;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    async fn send_error(&self, codec: &impl Codec, code: u16, message: impl Into<String>) -> Result<(), QuizError> {
        self.send(
            codec,
            ServerMessage::Error {
                code,
                message: message.into(),
            },
        )
        .await
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), QuizError>
where
    A: Authenticator,
    C: Codec,
{
    let connection_id = conn.id();
    tracing::debug!(%connection_id, peer = %conn.peer_addr(), "handling new connection");
    let out = Arc::new(Outbound::new(Arc::new(conn)));

    // --- Step 1: Handshake ---
    let capability = perform_handshake(&out, &state).await?;
    let operator = capability.is_some();

    {
        let mut sessions = state.sessions.lock().await;
        sessions.create(connection_id, capability)?;
    }
    let _guard = SessionGuard {
        connection_id,
        state: Arc::clone(&state),
    };
    out.send(
        &state.codec,
        ServerMessage::HandshakeAck {
            server_time: unix_millis(),
            operator,
        },
    )
    .await?;
    tracing::info!(%connection_id, operator, "connection ready");

    // --- Step 2: Message loop ---
    let mut forwarder: Option<Forwarder> = None;
    loop {
        let data = match tokio::time::timeout(state.session_config.idle_timeout, out.conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::debug!(%connection_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%connection_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%connection_id, "connection idle, closing");
                let _ = out.conn.close().await;
                break;
            }
        };

        let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%connection_id, error = %e, "failed to decode envelope");
                out.send_error(&state.codec, 400, format!("malformed message: {e}")).await?;
                continue;
            }
        };

        let should_close = dispatch(&out, &state, connection_id, envelope.payload, &mut forwarder).await?;
        if should_close {
            break;
        }
    }

    // _guard and forwarder drop here.
    Ok(())
}

/// Receives the Handshake, checks the version, and authenticates the
/// token if one was presented. Returns the operator capability, if any.
async fn perform_handshake<A, C>(
    out: &Outbound,
    state: &ServerState<A, C>,
) -> Result<Option<OperatorCapability>, QuizError>
where
    A: Authenticator,
    C: Codec,
{
    let data = match tokio::time::timeout(state.session_config.handshake_timeout, out.conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before handshake".into()).into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
        Ok(env) => env,
        Err(e) => {
            out.send_error(&state.codec, 400, "expected Handshake").await?;
            return Err(e.into());
        }
    };

    let ClientMessage::Handshake { version, token } = envelope.payload else {
        out.send_error(&state.codec, 400, "expected Handshake").await?;
        return Err(ProtocolError::InvalidMessage("first message must be Handshake".into()).into());
    };

    if version != PROTOCOL_VERSION {
        out.send_error(
            &state.codec,
            400,
            format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let Some(token) = token else {
        return Ok(None);
    };
    match state.auth.authenticate(&token).await {
        Ok(capability) => Ok(Some(capability)),
        Err(e) => {
            tracing::info!(connection_id = %out.conn.id(), "operator authentication failed");
            out.send_error(&state.codec, 401, "unauthorized").await?;
            let _ = out.conn.close().await;
            Err(e.into())
        }
    }
}

/// Routes one client message. Returns `true` if the connection should close.
async fn dispatch<A, C>(
    out: &Arc<Outbound>,
    state: &Arc<ServerState<A, C>>,
    connection_id: ConnectionId,
    msg: ClientMessage,
    forwarder: &mut Option<Forwarder>,
) -> Result<bool, QuizError>
where
    A: Authenticator,
    C: Codec,
{
    if msg.is_operator_only() {
        let allowed = state.sessions.lock().await.require_operator(connection_id).is_ok();
        if !allowed {
            tracing::debug!(%connection_id, ?msg, "operator command refused");
            out.send_error(&state.codec, 403, "operator only").await?;
            return Ok(false);
        }
    }

    let codec = &state.codec;
    let registry = &state.registry;

    match msg {
        ClientMessage::Handshake { .. } => {
            out.send_error(codec, 400, "handshake already completed").await?;
        }

        ClientMessage::Heartbeat { client_time } => {
            out.send(
                codec,
                ServerMessage::HeartbeatAck {
                    client_time,
                    server_time: unix_millis(),
                },
            )
            .await?;
        }

        ClientMessage::Disconnect { reason } => {
            tracing::debug!(%connection_id, %reason, "client disconnected");
            return Ok(true);
        }

        ClientMessage::Join { room_id, name } => {
            // Subscribe first so nothing published between the join and the
            // Init reply is lost.
            let events = match registry.subscribe(&room_id).await {
                Ok(events) => events,
                Err(e) => {
                    out.send_error(codec, room_error_code(&e), e.to_string()).await?;
                    return Ok(false);
                }
            };
            match registry.join(&room_id, name).await {
                Ok((participant_id, view)) => {
                    let previous = state.sessions.lock().await.bind_participant(
                        connection_id,
                        room_id.clone(),
                        participant_id.clone(),
                    )?;
                    if let Some((old_room, old_pid)) = previous {
                        tracing::debug!(%connection_id, room_id = %old_room, participant_id = %old_pid, "left previous room");
                    }
                    *forwarder = None;
                    out.send(
                        codec,
                        ServerMessage::Init {
                            participant_id,
                            state: view,
                        },
                    )
                    .await?;
                    *forwarder = Some(spawn_forwarder(Arc::clone(out), Arc::clone(state), events));
                }
                Err(e) => {
                    out.send_error(codec, room_error_code(&e), e.to_string()).await?;
                }
            }
        }

        ClientMessage::Submit {
            room_id,
            participant_id,
            question_id,
            answer,
        } => {
            submit(state, connection_id, room_id, participant_id, question_id, answer).await;
        }

        ClientMessage::CreateRoom { room_id } => {
            registry.create_room(room_id.clone()).await;
            out.send(codec, ServerMessage::RoomCreated { room_id }).await?;
        }

        ClientMessage::AddQuestion { room_id, question } => match registry.add_question(&room_id, question).await {
            Ok(question_id) => {
                out.send(codec, ServerMessage::QuestionAdded { room_id, question_id }).await?;
            }
            Err(e) => {
                out.send_error(codec, room_error_code(&e), e.to_string()).await?;
            }
        },

        ClientMessage::Start { room_id } => {
            if let Err(e) = registry.start(&room_id).await {
                out.send_error(codec, room_error_code(&e), e.to_string()).await?;
            }
        }

        ClientMessage::Advance { room_id } => {
            if let Err(e) = registry.advance(&room_id).await {
                out.send_error(codec, room_error_code(&e), e.to_string()).await?;
            }
        }

        ClientMessage::RestartRoom { room_id } => match registry.restart_room(&room_id).await {
            Ok(()) => {
                state.sessions.lock().await.unbind_room(&room_id);
            }
            Err(e) => {
                out.send_error(codec, room_error_code(&e), e.to_string()).await?;
            }
        },

        ClientMessage::DeleteRoom { room_id } => {
            if registry.delete_room(&room_id).await {
                state.sessions.lock().await.unbind_room(&room_id);
            }
        }

        ClientMessage::GetState { room_id } => match registry.get_state(&room_id).await {
            Ok(view) => {
                out.send(codec, ServerMessage::State { room_id, state: view }).await?;
            }
            Err(e) => {
                out.send_error(codec, room_error_code(&e), e.to_string()).await?;
            }
        },
    }

    Ok(false)
}

/// Forwards a submission. Submissions never get a reply; whatever happens
/// is visible to the client through room events.
async fn submit<A, C>(
    state: &ServerState<A, C>,
    connection_id: ConnectionId,
    room_id: RoomId,
    participant_id: ParticipantId,
    question_id: QuestionId,
    answer: i64,
) where
    A: Authenticator,
    C: Codec,
{
    let permitted = state
        .sessions
        .lock()
        .await
        .may_submit_as(connection_id, &room_id, &participant_id);
    if !permitted {
        tracing::debug!(%connection_id, %room_id, %participant_id, "submission for a participant this connection didn't join as");
        return;
    }

    match state.registry.submit(&room_id, participant_id.clone(), question_id, answer).await {
        Ok(SubmitOutcome::Rejected(reason)) => {
            tracing::debug!(%room_id, %participant_id, %question_id, %reason, "submission rejected");
        }
        Ok(outcome) => {
            tracing::debug!(%room_id, %participant_id, %question_id, ?outcome, "submission recorded");
        }
        Err(e) => {
            tracing::debug!(%room_id, %participant_id, error = %e, "submission dropped");
        }
    }
}

fn spawn_forwarder<A, C>(
    out: Arc<Outbound>,
    state: Arc<ServerState<A, C>>,
    mut events: broadcast::Receiver<RoomEvent>,
) -> Forwarder
where
    A: Authenticator,
    C: Codec,
{
    Forwarder(tokio::spawn(async move {
        let connection_id = out.conn.id();
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = out.send(&state.codec, ServerMessage::Room { event }).await {
                        tracing::debug!(%connection_id, error = %e, "event push failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(%connection_id, missed, "subscriber fell behind, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }))
}

/// Maps a room error to its wire code.
fn room_error_code(error: &RoomError) -> u16 {
    match error {
        RoomError::NotFound(_) | RoomError::Unavailable(_) => 404,
        RoomError::JoinClosed(_) => 409,
        RoomError::InvalidQuestion(_) => 400,
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
