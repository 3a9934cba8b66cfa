//! WebTransport server: accept loop and per-connection message handling
//!
//! Each connection gets one spawned task for inbound frames plus one writer
//! task draining its outbound queue. Frames are length-prefixed bincode
//! messages on a single bidirectional stream. The first frame must be the
//! identity handshake; anything else refuses the connection before any
//! state is created.

use std::time::Instant;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use wtransport::endpoint::IncomingSession;
use wtransport::{Endpoint, RecvStream, SendStream};

use crate::config::ServerConfig;
use crate::net::broadcast::{outbound_channel, Outbound, OutboundReceiver};
use crate::net::hub::SharedHub;
use crate::net::protocol::{decode, encode, ClientMessage, ServerMessage};
use crate::net::tls::TlsConfig;
use crate::world::player::ConnectionId;

/// Upper bound for a single frame
const MAX_MESSAGE_SIZE: usize = 65536;

/// Display-name length cap applied at join
const MAX_NAME_LEN: usize = 24;

/// WebTransport front-end for the chatroom hub
pub struct PlazaServer {
    config: ServerConfig,
    tls_config: TlsConfig,
    hub: SharedHub,
}

impl PlazaServer {
    pub async fn new(config: ServerConfig, hub: SharedHub) -> anyhow::Result<Self> {
        let tls_config = TlsConfig::load().await?;
        Ok(Self {
            config,
            tls_config,
            hub,
        })
    }

    /// Certificate hash for browser clients
    pub fn cert_hash(&self) -> &str {
        self.tls_config.cert_hash()
    }

    /// Run the accept loop forever
    pub async fn run(self) -> anyhow::Result<()> {
        // with_bind_default gives dual-stack IPv4 + IPv6
        let server_config = wtransport::ServerConfig::builder()
            .with_bind_default(self.config.port)
            .with_identity(self.tls_config.identity)
            .build();

        let server = Endpoint::server(server_config)?;
        info!("Plaza server listening on port {}", self.config.port);

        loop {
            let incoming = server.accept().await;
            let hub = self.hub.clone();
            let max_connections = self.config.max_connections;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, hub, max_connections).await {
                    debug!("Connection ended with error: {}", e);
                }
            });
        }
    }
}

/// Handle one connection from handshake to release
async fn handle_connection(
    incoming: IncomingSession,
    hub: SharedHub,
    max_connections: usize,
) -> anyhow::Result<()> {
    let session_request = incoming.await?;
    debug!(
        "New connection from {:?}, path {}",
        session_request.authority(),
        session_request.path()
    );
    let connection = session_request.accept().await?;
    let (mut send, mut recv) = connection.accept_bi().await?;

    // Identity handshake: the first frame must be Hello. Absence or
    // invalidity is a hard connection refusal, not a soft error.
    let frame = read_frame(&mut recv).await?;
    let (user_id, token) = match decode::<ClientMessage>(&frame) {
        Ok(ClientMessage::Hello { user_id, token }) => (user_id, token),
        Ok(_) | Err(_) => {
            refuse(&mut send, "Identity handshake required").await;
            return Ok(());
        }
    };

    let (admitted, writer) = {
        let mut hub_guard = hub.write().await;
        // Capacity applies to new identities only; a reconnect replaces its
        // own prior session instead of consuming a slot
        if hub_guard.session_count() >= max_connections
            && !hub_guard.has_active_session(&user_id)
        {
            drop(hub_guard);
            refuse(&mut send, "Chatroom is full, please try again later").await;
            return Ok(());
        }

        let (tx, rx) = outbound_channel();
        match hub_guard.admit(&user_id, &token, tx) {
            Ok(admitted) => {
                // Writer task takes the stream once admission succeeded
                let writer = tokio::spawn(run_writer(send, rx));
                (admitted, writer)
            }
            Err(e) => {
                drop(hub_guard);
                refuse(&mut send, &e.to_string()).await;
                return Ok(());
            }
        }
    };

    let connection_id = admitted.connection_id;
    let revoked = admitted.revoked;

    loop {
        tokio::select! {
            frame = read_frame(&mut recv) => {
                let data = match frame {
                    Ok(data) => data,
                    Err(e) => {
                        debug!("Connection {} read ended: {}", connection_id, e);
                        break;
                    }
                };
                let message = match decode::<ClientMessage>(&data) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Undecodable frame from {}: {}", connection_id, e);
                        continue;
                    }
                };
                if dispatch(&hub, connection_id, message).await.is_break() {
                    break;
                }
            }
            _ = revoked.notified() => {
                debug!("Connection {} revoked by newer session", connection_id);
                break;
            }
        }
    }

    // Abrupt drops land here too; release is idempotent and a no-op for
    // connections a reconnect already cleaned up
    hub.write().await.release(connection_id);

    // Wait for the writer to drain what is queued (a Kicked notice on the
    // revoked path in particular) before `connection` is dropped and the
    // transport closes under it
    let _ = writer.await;
    Ok(())
}

/// Route one inbound message to the hub
async fn dispatch(
    hub: &SharedHub,
    connection_id: ConnectionId,
    message: ClientMessage,
) -> std::ops::ControlFlow<()> {
    use std::ops::ControlFlow;

    match message {
        ClientMessage::Hello { .. } => {
            // Handshake already completed; repeated Hello is ignored
        }
        ClientMessage::Join(mut profile) => {
            profile.name = sanitize_name(&profile.name);
            hub.write().await.join(connection_id, profile);
        }
        ClientMessage::Move {
            x,
            z,
            direction,
            anim_state,
        } => {
            hub.write()
                .await
                .handle_move(connection_id, x, z, direction, &anim_state, Instant::now());
        }
        ClientMessage::PlayAnim {
            animation,
            duration_ms: _,
            direction,
        } => {
            // Duration comes from the server-side catalog, not the client
            hub.write()
                .await
                .handle_play_anim(connection_id, &animation, direction, Instant::now());
        }
        ClientMessage::AnimationState {
            anim_state,
            direction,
            is_moving,
        } => {
            hub.write().await.handle_anim_state(
                connection_id,
                &anim_state,
                direction,
                is_moving,
                Instant::now(),
            );
        }
        ClientMessage::TeleportHome => {
            hub.write().await.teleport_home(connection_id, Instant::now());
        }
        ClientMessage::Chat { message } => {
            // Verbatim past the emptiness check: the wire payload is never
            // reformatted server-side
            if !message.trim().is_empty() {
                hub.write().await.handle_chat(connection_id, message);
            }
        }
        ClientMessage::Leave => {
            debug!("Connection {} left gracefully", connection_id);
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}

/// Drain a connection's outbound queue onto its send stream.
/// `Close` flushes what is queued ahead of it, then shuts the stream down.
async fn run_writer<W>(mut send: W, mut rx: OutboundReceiver)
where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Message(message) => {
                let encoded = match encode(&message) {
                    Ok(data) => data,
                    Err(e) => {
                        warn!("Failed to encode outbound message: {}", e);
                        continue;
                    }
                };
                if write_frame(&mut send, &encoded).await.is_err() {
                    break;
                }
            }
            Outbound::Close => {
                let _ = send.shutdown().await;
                break;
            }
        }
    }
}

/// Send a refusal and close; used only before admission
async fn refuse(send: &mut SendStream, reason: &str) {
    let message = ServerMessage::Refused {
        reason: reason.to_string(),
    };
    if let Ok(encoded) = encode(&message) {
        let _ = write_frame(send, &encoded).await;
    }
    let _ = send.shutdown().await;
}

/// Read one length-prefixed frame
async fn read_frame(recv: &mut RecvStream) -> anyhow::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    recv.read_exact(&mut len_buf)
        .await
        .map_err(|e| anyhow::anyhow!("stream read error: {e}"))?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        anyhow::bail!("oversized frame: {} bytes", len);
    }

    let mut buf = vec![0u8; len];
    recv.read_exact(&mut buf)
        .await
        .map_err(|e| anyhow::anyhow!("stream read error: {e}"))?;
    Ok(buf)
}

/// Write one length-prefixed frame
async fn write_frame<W>(send: &mut W, payload: &[u8]) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    send.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    send.write_all(payload).await?;
    Ok(())
}

/// Sanitize a display name: trim, strip control and markup characters,
/// collapse whitespace, cap the length
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .filter(|c| *c != '<' && *c != '>' && *c != '&')
        .take(MAX_NAME_LEN)
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        "Player".to_string()
    } else {
        collapsed
    }
}
