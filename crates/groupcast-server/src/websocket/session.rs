//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use groupcast_core::{Connection, Hub, Payload};
use groupcast_settings::ServerSettings;
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::frame::{DisconnectReason, InboundFrame};
use super::handler::SessionHandler;
use super::heartbeat::{run_heartbeat, HeartbeatResult, MIN_TICK};

/// Timing knobs for a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    /// Interval between server-initiated Ping frames.
    pub heartbeat_interval: Duration,
    /// End the session after this long without any inbound frame.
    pub heartbeat_timeout: Duration,
    /// How long the writer may spend flushing its queue once closing.
    pub drain_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for SessionOptions {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            heartbeat_interval: settings.heartbeat_interval(),
            heartbeat_timeout: settings.heartbeat_timeout(),
            drain_timeout: settings.drain_timeout(),
        }
    }
}

/// How the writer task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterOutcome {
    /// Queue flushed and close frame sent.
    Drained,
    /// A socket write failed.
    Failed,
}

/// Run a session over an upgraded axum socket.
pub async fn run_session(
    socket: WebSocket,
    hub: Arc<Hub>,
    handler: Arc<dyn SessionHandler>,
    options: SessionOptions,
) -> DisconnectReason {
    let (sink, stream) = socket.split();
    drive_session(sink, stream, hub, handler, options).await
}

/// Drive one connection over any frame sink/stream pair.
///
/// 1. Registers with the hub and spawns the writer
/// 2. Opens the connection and calls `on_connect`
/// 3. Dispatches inbound text to `on_message` until the peer closes, the
///    socket fails, the heartbeat expires, or a close is requested
/// 4. Lets the writer drain within the drain timeout
/// 5. Calls `on_disconnect` and removes the connection from the hub
#[instrument(skip_all, fields(conn_id = tracing::field::Empty))]
pub async fn drive_session<S, R, E>(
    sink: S,
    mut stream: R,
    hub: Arc<Hub>,
    handler: Arc<dyn SessionHandler>,
    options: SessionOptions,
) -> DisconnectReason
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (conn, queue) = hub.register();
    let id = conn.id().clone();
    let _ = tracing::Span::current().record("conn_id", id.as_str());

    let started = Instant::now();
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    let mut writer = tokio::spawn(write_loop(
        sink,
        queue,
        Arc::clone(&conn),
        options.heartbeat_interval,
    ));

    let _ = conn.open();
    info!("client connected");
    if let Err(e) = handler.on_connect(&hub, &id) {
        warn!(error = %e, kind = e.error_kind(), "on_connect failed");
    }

    let heartbeat = run_heartbeat(
        Arc::clone(&conn),
        options.heartbeat_interval,
        options.heartbeat_timeout,
        conn.closing_token(),
    );
    tokio::pin!(heartbeat);

    let mut reason = loop {
        tokio::select! {
            result = &mut heartbeat => {
                break match result {
                    HeartbeatResult::TimedOut => {
                        warn!(timeout = ?options.heartbeat_timeout, "client unresponsive, disconnecting");
                        DisconnectReason::HeartbeatTimeout
                    }
                    HeartbeatResult::Cancelled => DisconnectReason::ServerShutdown,
                };
            }
            next = stream.next() => {
                match next {
                    Some(Ok(msg)) => {
                        conn.mark_alive();
                        let frame = InboundFrame::from(msg);
                        if let InboundFrame::Close(code) = frame {
                            break DisconnectReason::ClientClosed { code };
                        }
                        match frame.text() {
                            Some(text) => {
                                if let Err(e) = handler.on_message(&hub, &id, text) {
                                    warn!(error = %e, kind = e.error_kind(), "on_message failed");
                                }
                            }
                            None => {
                                if let InboundFrame::Binary(data) = &frame {
                                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                                }
                            }
                        }
                    }
                    Some(Err(e)) => break DisconnectReason::ReadError(e.to_string()),
                    None => break DisconnectReason::StreamEnded,
                }
            }
        }
    };

    let _ = conn.begin_close();
    match tokio::time::timeout(options.drain_timeout, &mut writer).await {
        Ok(Ok(WriterOutcome::Failed)) if reason == DisconnectReason::ServerShutdown => {
            reason = DisconnectReason::WriteError;
        }
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(error = %e, "writer task failed"),
        Err(_) => {
            writer.abort();
            warn!(
                timeout = ?options.drain_timeout,
                discarded = conn.queued(),
                "drain timed out, discarding queued payloads"
            );
        }
    }

    handler.on_disconnect(&hub, &id, &reason);
    let _ = hub.disconnect(&id);
    conn.mark_closed();

    info!(reason = %reason, dropped = conn.drop_count(), "client disconnected");
    counter!("ws_disconnections_total", "reason" => reason.as_str()).increment(1);
    gauge!("ws_connections_active").decrement(1.0);
    histogram!("ws_connection_duration_seconds").record(started.elapsed().as_secs_f64());
    reason
}

/// Forward queued payloads to the socket, pinging on an interval.
///
/// Once the connection starts closing, the queue is closed to new payloads,
/// whatever is already queued is flushed in order, and a normal close frame
/// is sent.
async fn write_loop<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Payload>,
    conn: Arc<Connection>,
    ping_every: Duration,
) -> WriterOutcome
where
    S: Sink<Message> + Unpin,
    S::Error: Display + Send,
{
    let closing = conn.closing_token();
    let mut ping = tokio::time::interval(ping_every.max(MIN_TICK));
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            () = closing.cancelled() => break,
            next = queue.recv() => {
                let Some(payload) = next else { break };
                if let Err(e) = sink.send(Message::text(&*payload)).await {
                    debug!(error = %e, "socket write failed");
                    let _ = conn.begin_close();
                    return WriterOutcome::Failed;
                }
            }
            _ = ping.tick() => {
                if let Err(e) = sink.send(Message::Ping(Bytes::new())).await {
                    debug!(error = %e, "ping failed");
                    let _ = conn.begin_close();
                    return WriterOutcome::Failed;
                }
            }
        }
    }

    queue.close();
    while let Some(payload) = queue.recv().await {
        if let Err(e) = sink.send(Message::text(&*payload)).await {
            debug!(error = %e, "socket write failed while draining");
            return WriterOutcome::Failed;
        }
    }

    let close = Message::Close(Some(CloseFrame {
        code: close_code::NORMAL,
        reason: Utf8Bytes::from_static(""),
    }));
    if let Err(e) = sink.send(close).await {
        debug!(error = %e, "close frame not sent");
    }
    let _ = sink.close().await;
    WriterOutcome::Drained
}
