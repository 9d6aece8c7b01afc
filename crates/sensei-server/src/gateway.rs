//! Connection gateway.
//!
//! Accepts TCP connections speaking newline-delimited JSON. The first
//! frame must be a handshake carrying a bearer token; verification happens
//! before any registry or session state is created. After a successful
//! handshake the connection gets an outbound queue drained by a writer
//! task, and the reader loop dispatches command envelopes until the client
//! disconnects or the session is evicted.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use sensei_integrations::TokenVerifier;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tokio::io::AsyncBufReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::manager::AgentSessionManager;
use crate::protocol::{CommandEnvelope, CommandResponse, Handshake, HandshakeReply, OutboundFrame};
use crate::registry::SessionRegistry;

pub struct Gateway {
    registry: Arc<SessionRegistry>,
    manager: Arc<AgentSessionManager>,
    verifier: Arc<TokenVerifier>,
}

impl Gateway {
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        manager: Arc<AgentSessionManager>,
        verifier: Arc<TokenVerifier>,
    ) -> Self {
        Self {
            registry,
            manager,
            verifier,
        }
    }

    /// Bind `addr` and serve connections until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn listen(self: Arc<Self>, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("gateway listening on {addr}");
        self.serve(listener).await;
        Ok(())
    }

    /// Serve connections from an already-bound listener.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let gateway = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = gateway.handle_connection(stream).await {
                            log::debug!("connection from {peer} ended: {e}");
                        }
                    });
                }
                Err(e) => {
                    log::error!("gateway accept error: {e}");
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        // Handshake first; nothing is registered until it passes.
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        let handshake: Handshake = match serde_json::from_str(&line) {
            Ok(handshake) => handshake,
            Err(e) => {
                write_frame(&mut write_half, &HandshakeReply::rejected("malformed handshake"))
                    .await?;
                anyhow::bail!("malformed handshake: {e}");
            }
        };

        let user_id = match self.verifier.verify(&handshake.token, Utc::now()) {
            Ok(subject) => subject,
            Err(e) => {
                log::info!("connection refused: {e}");
                write_frame(&mut write_half, &HandshakeReply::rejected(e.to_string())).await?;
                return Ok(());
            }
        };
        let learner_id = handshake.learner_id.unwrap_or_else(|| user_id.clone());

        let connection_id = Uuid::new_v4();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        self.registry
            .register(connection_id, user_id, learner_id, outbound_tx, Utc::now());
        write_frame(&mut write_half, &HandshakeReply::accepted(connection_id)).await?;

        let writer_task = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let payload = match frame {
                    OutboundFrame::Response(response) => serde_json::to_string(&response),
                    OutboundFrame::Event(event) => serde_json::to_string(&event),
                    OutboundFrame::Close => break,
                };
                match payload {
                    Ok(json) => {
                        if write_half.write_all(json.as_bytes()).await.is_err()
                            || write_half.write_all(b"\n").await.is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => log::error!("failed to serialize outbound frame: {e}"),
                }
            }
            let _ = write_half.shutdown().await;
        });

        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<CommandEnvelope>(&line) {
                Ok(envelope) => self.manager.dispatch(connection_id, envelope).await,
                Err(e) => CommandResponse::failure(None, format!("invalid command envelope: {e}")),
            };
            let queued = self.registry.with_session_mut(connection_id, |session| {
                session.outbound.send(OutboundFrame::Response(response)).is_ok()
            });
            // Session already evicted: stop serving this connection.
            if queued.is_none() {
                break;
            }
        }

        // Teardown races with the idle reaper; whoever removes the session
        // owns shutting its agents down.
        if let Some(session) = self.registry.remove(connection_id) {
            let _ = session.outbound.send(OutboundFrame::Close);
            session.agents.shutdown_all().await;
            log::info!("connection {connection_id} closed");
        }
        let _ = writer_task.await;
        Ok(())
    }
}

async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_string(frame)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}
