//! WebSocket server that streams price updates to subscribers

use super::types::{ServerOptions, WsError};
use crate::pipeline::{ChannelSink, Pipeline};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header::ORIGIN, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

/// Accepts subscriber connections and wires each one into the pipeline
pub struct SubscriberServer {
    listener: TcpListener,
    options: Arc<ServerOptions>,
    pipeline: Arc<Pipeline>,
}

impl SubscriberServer {
    /// Bind the listener
    pub async fn bind(options: ServerOptions, pipeline: Arc<Pipeline>) -> Result<Self, WsError> {
        let listener = TcpListener::bind(options.bind_addr)
            .await
            .map_err(|e| WsError::BindFailed(format!("{}: {}", options.bind_addr, e)))?;

        Ok(Self {
            listener,
            options: Arc::new(options),
            pipeline,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, WsError> {
        self.listener
            .local_addr()
            .map_err(|e| WsError::BindFailed(e.to_string()))
    }

    /// Accept connections until `shutdown` resolves, then drop every open connection
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), WsError> {
        let addr = self.local_addr()?;
        tracing::info!(%addr, origins = ?self.options.allowed_origins, "Subscriber server listening");

        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let options = self.options.clone();
                        let pipeline = self.pipeline.clone();
                        connections.spawn(async move {
                            if let Err(e) = serve_connection(stream, peer, options, pipeline).await {
                                tracing::debug!(%peer, error = %e, "Connection ended with error");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to accept connection"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        tracing::info!(open = connections.len(), "Subscriber server stopping");
        connections.shutdown().await;
        Ok(())
    }
}

/// Handshake callback: only listed origins may upgrade
fn check_origin(
    request: &Request,
    response: Response,
    options: &ServerOptions,
) -> Result<Response, ErrorResponse> {
    let origin = request.headers().get(ORIGIN).and_then(|v| v.to_str().ok());

    match origin {
        Some(origin) if options.is_allowed(origin) => Ok(response),
        _ => {
            tracing::warn!(origin = ?origin, "Rejected connection from disallowed origin");
            let mut rejection = ErrorResponse::new(Some("Origin not allowed".to_string()));
            *rejection.status_mut() = StatusCode::FORBIDDEN;
            Err(rejection)
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    options: Arc<ServerOptions>,
    pipeline: Arc<Pipeline>,
) -> Result<(), WsError> {
    let ws = accept_hdr_async(stream, |request: &Request, response: Response| {
        check_origin(request, response, &options)
    })
    .await
    .map_err(|e| WsError::HandshakeFailed(e.to_string()))?;

    let (sink, mut outbound) = ChannelSink::new(options.outbound_buffer);
    let id = pipeline.connect(Arc::new(sink)).await;
    tracing::debug!(%peer, subscriber = %id, "WebSocket connected");

    let result = stream_updates(ws, &mut outbound, options.ping_interval).await;

    pipeline.disconnect(id).await;
    result
}

/// Forward outbound updates and keep the connection alive until either side closes
async fn stream_updates(
    ws: WebSocketStream<TcpStream>,
    outbound: &mut mpsc::Receiver<Arc<str>>,
    ping_every: Duration,
) -> Result<(), WsError> {
    let (mut write, mut read) = ws.split();

    let mut ping_interval = interval_at(Instant::now() + ping_every, ping_every);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut waiting_for_pong = false;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await
                            .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        waiting_for_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(WsError::ConnectionFailed(e.to_string()));
                    }
                    // Subscribers have nothing to say
                    Some(Ok(_)) => {}
                }
            }

            update = outbound.recv() => {
                match update {
                    Some(text) => {
                        write.send(Message::Text(text.to_string())).await
                            .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    }
                    None => return Ok(()),
                }
            }

            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    return Err(WsError::PongTimeout);
                }
                write.send(Message::Ping(Vec::new())).await
                    .map_err(|e| WsError::SendFailed(e.to_string()))?;
                waiting_for_pong = true;
            }
        }
    }
}
