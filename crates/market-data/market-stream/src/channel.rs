//! One real-time channel: connection lifecycle, heartbeat and reconnection
//!
//! Each channel runs as its own task. Decoded JSON frames are forwarded to the
//! session queue tagged with the channel kind; everything else (pings, probe
//! acknowledgements, malformed text) is handled here.

use crate::models::ChannelKind;
use crate::reconnect::{BackoffPolicy, ReconnectSupervisor, RetryPlan};
use crate::session::SessionEvent;
use crate::transport::{Connection, InboundFrame, Transport};
use crate::wire;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, trace, warn};

/// Why a live connection stopped being served
#[derive(Debug)]
enum ConnectionEnd {
    /// Caller asked the channel to stop
    Stopped,
    /// Session queue is gone; nobody is listening any more
    Orphaned,
    /// Server close, stream end or transport error
    Dropped(String),
}

/// Static wiring of a channel task
#[derive(Clone)]
struct ChannelContext {
    kind: ChannelKind,
    topic: String,
    transport: Arc<dyn Transport>,
    events: mpsc::Sender<SessionEvent>,
    heartbeat: Duration,
    policy: BackoffPolicy,
}

struct RunningChannel {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// A single subscription bound to one topic
pub struct ChannelConnection {
    context: ChannelContext,
    running: Option<RunningChannel>,
}

impl ChannelConnection {
    pub fn new(
        kind: ChannelKind,
        topic: impl Into<String>,
        transport: Arc<dyn Transport>,
        events: mpsc::Sender<SessionEvent>,
        heartbeat: Duration,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            context: ChannelContext {
                kind,
                topic: topic.into(),
                transport,
                events,
                heartbeat,
                policy,
            },
            running: None,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ChannelKind {
        self.context.kind
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.context.topic
    }

    /// True while the channel task is alive (connected or waiting to reconnect)
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| !r.task.is_finished())
    }

    /// Start serving the topic
    ///
    /// Any existing connection and pending reconnect timer are torn down first, so
    /// calling this twice leaves exactly one connection.
    pub async fn open(&mut self) {
        self.close().await;

        let (stop, stop_rx) = watch::channel(false);
        let context = self.context.clone();
        let task = tokio::spawn(run_channel(context, stop_rx));
        self.running = Some(RunningChannel { stop, task });
    }

    /// Explicit stop: no reconnection afterwards, heartbeat released
    pub async fn close(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        // the task may already be gone, in which case nobody is listening
        let _ = running.stop.send(true);
        if let Err(e) = running.task.await {
            warn!("{} channel task ended abnormally: {}", self.context.kind, e);
        }
    }
}

async fn run_channel(ctx: ChannelContext, mut stop: watch::Receiver<bool>) {
    let mut supervisor = ReconnectSupervisor::new(ctx.policy);

    loop {
        // a reconnect timer that fires after a stop must not reopen
        if *stop.borrow() {
            break;
        }

        let opened = tokio::select! {
            biased;
            _ = stop.changed() => break,
            result = ctx.transport.connect(&ctx.topic) => result,
        };

        match opened {
            Ok(connection) => {
                let resync = supervisor.on_open();
                info!("{} channel connected to {}", ctx.kind, ctx.topic);
                let event = SessionEvent::Opened {
                    kind: ctx.kind,
                    resync,
                };
                if ctx.events.send(event).await.is_err() {
                    break;
                }

                match serve(&ctx, connection, &mut stop).await {
                    ConnectionEnd::Stopped | ConnectionEnd::Orphaned => break,
                    ConnectionEnd::Dropped(reason) => {
                        warn!("{} channel connection lost: {}", ctx.kind, reason);
                    }
                }
            }
            Err(e) => {
                warn!("{} channel failed to connect: {}", ctx.kind, e);
            }
        }

        let plan = supervisor.on_failure();
        match plan {
            RetryPlan::Backoff { attempt, delay } => {
                info!(
                    "{} channel reconnecting in {:?} (attempt {}/{})",
                    ctx.kind,
                    delay,
                    attempt,
                    supervisor.policy().max_attempts
                );
            }
            RetryPlan::Cooldown { delay } => {
                warn!(
                    "{} channel exhausted {} attempts, cooling down for {:?}",
                    ctx.kind,
                    supervisor.policy().max_attempts,
                    delay
                );
            }
        }

        tokio::select! {
            biased;
            _ = stop.changed() => break,
            () = tokio::time::sleep(plan.delay()) => {}
        }
    }

    debug!("{} channel task stopped", ctx.kind);
}

/// Serve one live connection until it ends
async fn serve(
    ctx: &ChannelContext,
    connection: Connection,
    stop: &mut watch::Receiver<bool>,
) -> ConnectionEnd {
    let Connection {
        mut sink,
        mut source,
    } = connection;

    let mut heartbeat = interval_at(Instant::now() + ctx.heartbeat, ctx.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => {
                if let Err(e) = sink.close().await {
                    debug!("{} channel close handshake failed: {}", ctx.kind, e);
                }
                return ConnectionEnd::Stopped;
            }
            frame = source.next_frame() => match frame {
                Some(Ok(InboundFrame::Text(text))) => {
                    if !forward(ctx, &text).await {
                        return ConnectionEnd::Orphaned;
                    }
                }
                Some(Ok(InboundFrame::Ping(payload))) => {
                    if let Err(e) = sink.send_pong(payload).await {
                        warn!("{} channel failed to answer ping: {}", ctx.kind, e);
                    }
                }
                Some(Ok(InboundFrame::Close(code))) => {
                    return ConnectionEnd::Dropped(format!("closed by server (code {code:?})"));
                }
                Some(Err(e)) => return ConnectionEnd::Dropped(e.to_string()),
                None => return ConnectionEnd::Dropped("stream ended".to_string()),
            },
            _ = heartbeat.tick() => {
                let probe = wire::ping_probe(chrono::Utc::now().timestamp_millis());
                if let Err(e) = sink.send_text(probe).await {
                    warn!("{} channel heartbeat failed: {}", ctx.kind, e);
                }
            }
        }
    }
}

/// Parse and enqueue one text frame; `false` once the session queue is closed
async fn forward(ctx: &ChannelContext, text: &str) -> bool {
    let payload: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("{} channel dropped unparseable frame: {}", ctx.kind, e);
            return true;
        }
    };

    if wire::is_heartbeat_ack(&payload) {
        trace!("{} channel heartbeat acknowledged", ctx.kind);
        return true;
    }

    ctx.events
        .send(SessionEvent::Frame {
            kind: ctx.kind,
            payload,
        })
        .await
        .is_ok()
}
