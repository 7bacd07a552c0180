//! Shard sessions.
//!
//! Each shard runs as one task owning its connection, sequence, session id
//! and heartbeat timer. Observers read [`ShardInfo`] snapshots published
//! through a `watch` channel and talk to the task through a [`ShardHandle`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use shardline_cache::EntityCache;
use shardline_events::{decode, DispatchFrame, Envelope, Event, EventRegistry};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::identify::IdentifyQueue;
use crate::limiter::CommandLimiter;
use crate::manager::shard_for;
use crate::protocol::{
    close_action, CloseAction, GatewayCommand, GatewayFrame, Identify, OpCode, CLOSE_NORMAL,
    CLOSE_RESUMABLE,
};
use crate::transport::{GatewayConnection, GatewayTransport, Inbound};

/// Connection state of a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardState {
    /// Created, not yet started.
    Idle,
    /// Opening the transport.
    Connecting,
    /// Connected, waiting for Hello.
    AwaitingHello,
    /// Identify sent, waiting for Ready.
    Identifying,
    /// Resume sent, waiting for Resumed.
    Resuming,
    /// Receiving events.
    Connected,
    /// Waiting before the next connection attempt.
    Reconnecting,
    /// Stopped or rejected; no further attempts.
    Closed,
}

impl ShardState {
    /// Returns the state's name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    /// Shard index.
    pub index: u32,
    /// Total shards.
    pub count: u32,
    /// Connection state.
    pub state: ShardState,
    /// Current session id.
    pub session_id: Option<String>,
    /// Last dispatch sequence seen.
    pub sequence: Option<u64>,
    /// Heartbeat interval from the last Hello.
    pub heartbeat_interval: Option<Duration>,
    /// Round trip of the last acknowledged heartbeat.
    pub latency: Option<Duration>,
    /// Consecutive rejected resumes.
    pub resume_failures: u32,
}

impl ShardInfo {
    /// Creates the snapshot of a shard that has not started.
    #[must_use]
    pub const fn new(index: u32, count: u32) -> Self {
        Self {
            index,
            count,
            state: ShardState::Idle,
            session_id: None,
            sequence: None,
            heartbeat_interval: None,
            latency: None,
            resume_failures: 0,
        }
    }
}

/// Shared collaborators of every session.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub config: Arc<GatewayConfig>,
    pub transport: Arc<dyn GatewayTransport>,
    pub cache: Arc<EntityCache>,
    pub events: EventRegistry,
    pub identify: Arc<IdentifyQueue>,
    pub fatal: mpsc::UnboundedSender<GatewayError>,
}

/// Handle to a running shard session.
#[derive(Debug)]
pub struct ShardHandle {
    index: u32,
    info: watch::Receiver<ShardInfo>,
    commands: mpsc::UnboundedSender<GatewayCommand>,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl ShardHandle {
    /// Spawns the session task for shard `index` of `count`.
    pub(crate) fn spawn(index: u32, count: u32, ctx: SessionContext) -> Self {
        let (info_tx, info_rx) = watch::channel(ShardInfo::new(index, count));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let session = Session {
            index,
            count,
            ctx,
            info: info_tx,
            commands: command_rx,
            cancel: cancel.clone(),
            state: ShardState::Idle,
            session_id: None,
            sequence: None,
            resume_url: None,
            resume_failures: 0,
            consecutive_failures: 0,
            replacing: false,
            heartbeat_interval: None,
            latency: None,
            outbox: VecDeque::new(),
        };

        Self {
            index,
            info: info_rx,
            commands: command_tx,
            cancel,
            join: Some(tokio::spawn(session.run())),
        }
    }

    /// Shard index.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn info(&self) -> ShardInfo {
        self.info.borrow().clone()
    }

    /// Returns a receiver that observes every published snapshot.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ShardInfo> {
        self.info.clone()
    }

    /// Waits until a snapshot satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Closed`] if the session ends first.
    pub async fn wait_until(
        &self,
        predicate: impl FnMut(&ShardInfo) -> bool,
    ) -> GatewayResult<ShardInfo> {
        let mut rx = self.info.clone();
        let info = rx
            .wait_for(predicate)
            .await
            .map_err(|_| GatewayError::Closed)?;
        Ok(info.clone())
    }

    /// Queues a command. Commands are sent in order once the shard is
    /// connected, subject to the command rate limit.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Closed`] if the session has ended.
    pub fn send(&self, command: GatewayCommand) -> GatewayResult<()> {
        self.commands
            .send(command)
            .map_err(|_| GatewayError::Closed)
    }

    /// Stops the session and waits for its task to finish.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!(shard = self.index, error = %e, "Shard task failed");
            }
        }
    }
}

impl Drop for ShardHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// How one connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Stopped,
    Fatal,
    Reconnect,
}

/// Why the wait for Hello ended without one.
enum Disconnect {
    Lost,
    Closed(Option<u16>),
}

#[derive(Default)]
struct Heartbeat {
    timer: Option<Interval>,
    awaiting_ack: bool,
    sent_at: Option<Instant>,
}

impl Heartbeat {
    fn arm(&mut self, period: Duration) {
        if self.timer.is_none() {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.timer = Some(timer);
        }
    }

    async fn tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending().await,
        }
    }

    fn sent(&mut self) {
        self.awaiting_ack = true;
        self.sent_at = Some(Instant::now());
    }

    fn acked(&mut self) -> Option<Duration> {
        self.awaiting_ack = false;
        self.sent_at.take().map(|at| at.elapsed())
    }
}

struct Session {
    index: u32,
    count: u32,
    ctx: SessionContext,
    info: watch::Sender<ShardInfo>,
    commands: mpsc::UnboundedReceiver<GatewayCommand>,
    cancel: CancellationToken,
    state: ShardState,
    session_id: Option<String>,
    sequence: Option<u64>,
    resume_url: Option<String>,
    resume_failures: u32,
    consecutive_failures: u32,
    /// A previous session was discarded; the next Identify resynchronizes.
    replacing: bool,
    heartbeat_interval: Option<Duration>,
    latency: Option<Duration>,
    outbox: VecDeque<GatewayCommand>,
}

impl Session {
    #[instrument(name = "shard", skip_all, fields(shard = self.index))]
    async fn run(mut self) {
        info!(count = self.count, "Starting shard session");
        let cancel = self.cancel.clone();

        loop {
            match self.connect_once().await {
                Outcome::Stopped => break,
                Outcome::Fatal => {
                    self.set_state(ShardState::Closed);
                    return;
                }
                Outcome::Reconnect => {
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                    let delay = jitter(
                        self.ctx
                            .config
                            .reconnect_backoff(self.consecutive_failures),
                    );
                    self.set_state(ShardState::Reconnecting);
                    info!(
                        delay_ms = delay.as_millis() as u64,
                        resumable = self.can_resume(),
                        "Reconnecting"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = sleep(delay) => {}
                    }
                }
            }
        }

        self.set_state(ShardState::Closed);
        info!("Shard session stopped");
    }

    /// Runs one connection from connect to disconnect.
    async fn connect_once(&mut self) -> Outcome {
        let cancel = self.cancel.clone();
        let config = Arc::clone(&self.ctx.config);

        let url = if self.can_resume() {
            self.resume_url
                .clone()
                .unwrap_or_else(|| config.gateway_url.clone())
        } else {
            config.gateway_url.clone()
        };

        self.set_state(ShardState::Connecting);
        let connected = tokio::select! {
            () = cancel.cancelled() => return Outcome::Stopped,
            result = self.ctx.transport.connect(&url) => result,
        };
        let mut conn = match connected {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Gateway connect failed");
                return Outcome::Reconnect;
            }
        };

        self.set_state(ShardState::AwaitingHello);
        let hello = tokio::select! {
            () = cancel.cancelled() => {
                close_quietly(conn.as_mut(), CLOSE_NORMAL).await;
                return Outcome::Stopped;
            }
            result = timeout(config.hello_timeout, await_hello(conn.as_mut())) => result,
        };
        let interval = match hello {
            Ok(Ok(interval)) => interval,
            Ok(Err(Disconnect::Closed(code))) => return self.on_close(code, ""),
            Ok(Err(Disconnect::Lost)) => return Outcome::Reconnect,
            Err(_) => {
                warn!(timeout_ms = config.hello_timeout.as_millis() as u64, "No Hello received");
                close_quietly(conn.as_mut(), CLOSE_RESUMABLE).await;
                return Outcome::Reconnect;
            }
        };
        debug!(interval_ms = interval.as_millis() as u64, "Received Hello");
        self.heartbeat_interval = Some(interval);

        let resume = match (&self.session_id, self.sequence) {
            (Some(session_id), Some(seq)) => {
                Some(GatewayFrame::resume(&config.token, session_id, seq))
            }
            _ => None,
        };
        let handshake = if let Some(frame) = resume {
            self.state = ShardState::Resuming;
            frame
        } else {
            tokio::select! {
                () = cancel.cancelled() => {
                    close_quietly(conn.as_mut(), CLOSE_NORMAL).await;
                    return Outcome::Stopped;
                }
                () = self.ctx.identify.wait(self.index) => {}
            }
            if self.replacing {
                self.resynchronize();
            }
            self.state = ShardState::Identifying;
            GatewayFrame::identify(&Identify {
                token: &config.token,
                shard: [self.index, self.count],
                intents: config.intents,
                properties: &config.properties,
                large_threshold: config.large_threshold,
                presence: config.presence.as_ref(),
            })
        };
        self.publish_info();
        debug!(state = %self.state, "Sending handshake");
        if send_frame(conn.as_mut(), &handshake).await.is_err() {
            return Outcome::Reconnect;
        }

        self.run_connection(conn.as_mut()).await
    }

    async fn run_connection(&mut self, conn: &mut dyn GatewayConnection) -> Outcome {
        let cancel = self.cancel.clone();
        let limiter = CommandLimiter::from_config(&self.ctx.config);
        let mut heartbeat = Heartbeat::default();
        // Heartbeats run from Hello onward, through the handshake.
        if let Some(period) = self.heartbeat_interval {
            heartbeat.arm(period);
        }

        loop {
            let connected = self.state == ShardState::Connected;
            let pending_commands = connected && !self.outbox.is_empty();

            tokio::select! {
                () = cancel.cancelled() => {
                    close_quietly(conn, CLOSE_NORMAL).await;
                    return Outcome::Stopped;
                }

                () = heartbeat.tick() => {
                    if heartbeat.awaiting_ack {
                        warn!("Heartbeat not acknowledged, closing zombie connection");
                        close_quietly(conn, CLOSE_RESUMABLE).await;
                        return Outcome::Reconnect;
                    }
                    trace!(seq = ?self.sequence, "Sending heartbeat");
                    if send_frame(conn, &GatewayFrame::heartbeat(self.sequence)).await.is_err() {
                        return Outcome::Reconnect;
                    }
                    heartbeat.sent();
                }

                inbound = conn.recv() => {
                    let text = match inbound {
                        Some(Ok(Inbound::Text(text))) => text,
                        Some(Ok(Inbound::Close { code, reason })) => {
                            return self.on_close(code, &reason);
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Gateway receive failed");
                            return Outcome::Reconnect;
                        }
                        None => {
                            warn!("Gateway stream ended");
                            return Outcome::Reconnect;
                        }
                    };
                    if let Some(outcome) = self.on_frame(&text, conn, &mut heartbeat).await {
                        return outcome;
                    }
                }

                Some(command) = self.commands.recv(), if connected => {
                    self.outbox.push_back(command);
                }

                () = limiter.acquire(), if pending_commands => {
                    if let Some(command) = self.outbox.pop_front() {
                        debug!(command = ?command, "Sending command");
                        if send_frame(conn, &command.to_frame()).await.is_err() {
                            self.outbox.push_front(command);
                            return Outcome::Reconnect;
                        }
                    }
                }
            }
        }
    }

    /// Handles one text frame. Returns an outcome when the connection ends.
    async fn on_frame(
        &mut self,
        text: &str,
        conn: &mut dyn GatewayConnection,
        heartbeat: &mut Heartbeat,
    ) -> Option<Outcome> {
        let frame = match GatewayFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Discarding unparseable frame");
                return None;
            }
        };

        match frame.opcode() {
            Some(OpCode::Dispatch) => {
                self.on_dispatch(frame);
                None
            }
            Some(OpCode::Heartbeat) => {
                debug!("Heartbeat requested");
                if send_frame(conn, &GatewayFrame::heartbeat(self.sequence))
                    .await
                    .is_err()
                {
                    return Some(Outcome::Reconnect);
                }
                heartbeat.sent();
                None
            }
            Some(OpCode::HeartbeatAck) => {
                if let Some(latency) = heartbeat.acked() {
                    self.latency = Some(latency);
                    self.publish_info();
                }
                None
            }
            Some(OpCode::Reconnect) => {
                info!("Reconnect requested");
                close_quietly(conn, CLOSE_RESUMABLE).await;
                Some(Outcome::Reconnect)
            }
            Some(OpCode::InvalidSession) => {
                let resumable = frame.d.as_bool().unwrap_or(false);
                self.on_invalid_session(resumable);
                close_quietly(conn, CLOSE_RESUMABLE).await;
                Some(Outcome::Reconnect)
            }
            _ => {
                trace!(op = frame.op, "Ignoring frame");
                None
            }
        }
    }

    fn on_dispatch(&mut self, frame: GatewayFrame) {
        if let Some(seq) = frame.s {
            self.sequence = Some(seq);
        }
        let Some(name) = frame.t else {
            warn!(seq = ?frame.s, "Dispatch without a name");
            return;
        };
        let dispatch = DispatchFrame::new(frame.s.unwrap_or_default(), name, frame.d);

        let decoded = match decode(self.index, &dispatch) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "Failed to decode dispatch");
                self.publish_info();
                return;
            }
        };

        match &decoded.envelope.event {
            Event::Ready(ready) => {
                info!(
                    session_id = %ready.session_id,
                    guilds = ready.guilds.len(),
                    "Session ready"
                );
                self.session_id = Some(ready.session_id.clone());
                self.resume_url.clone_from(&ready.resume_gateway_url);
                self.on_connected();
            }
            Event::Resumed => {
                info!(seq = ?self.sequence, "Session resumed");
                self.on_connected();
            }
            _ => {}
        }

        for e in self.ctx.cache.apply(decoded.patch) {
            warn!(error = %e, event = %dispatch.name, "Dropped cache update");
        }
        self.ctx.events.publish(&decoded.envelope);
        self.publish_info();
    }

    fn on_connected(&mut self) {
        self.state = ShardState::Connected;
        self.resume_failures = 0;
        self.consecutive_failures = 0;
    }

    fn on_invalid_session(&mut self, resumable: bool) {
        if self.state == ShardState::Resuming {
            self.resume_failures += 1;
        }
        let max = self.ctx.config.max_resume_failures;
        if !resumable || self.resume_failures > max {
            warn!(
                resumable,
                failures = self.resume_failures,
                "Session invalidated, will identify"
            );
            self.discard_session();
        } else {
            info!(failures = self.resume_failures, "Resume rejected, retrying");
        }
    }

    fn on_close(&mut self, code: Option<u16>, reason: &str) -> Outcome {
        match code.map(close_action) {
            Some(CloseAction::Fatal(meaning)) => {
                let code = code.unwrap_or_default();
                error!(code, reason = meaning, "Gateway rejected session");
                let rejected = GatewayError::SessionRejected {
                    shard: self.index,
                    code,
                    reason: meaning,
                };
                if let Err(e) = self.ctx.fatal.send(rejected) {
                    debug!(error = %e.0, "No listener for fatal shard errors");
                }
                Outcome::Fatal
            }
            Some(CloseAction::Reidentify) => {
                warn!(code = ?code, reason, "Session expired by close code");
                self.discard_session();
                Outcome::Reconnect
            }
            Some(CloseAction::Resume) | None => {
                info!(code = ?code, reason, "Gateway closed connection");
                Outcome::Reconnect
            }
        }
    }

    /// Forgets the session so the next handshake is a fresh Identify.
    fn discard_session(&mut self) {
        if self.session_id.is_some() {
            self.replacing = true;
        }
        self.session_id = None;
        self.sequence = None;
        self.resume_url = None;
        self.resume_failures = 0;
        self.publish_info();
    }

    /// Marks the shard's guilds stale and announces the new session.
    fn resynchronize(&mut self) {
        self.replacing = false;
        let (index, count) = (self.index, self.count);
        let stale = self
            .ctx
            .cache
            .mark_stale(|guild| shard_for(guild.get(), count) == index);
        info!(stale_guilds = stale, "Resynchronizing after session loss");
        self.ctx.events.publish(&Envelope::new(
            index,
            None,
            Event::Resynchronized {
                stale_guilds: stale,
            },
        ));
    }

    const fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.sequence.is_some()
    }

    fn set_state(&mut self, state: ShardState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Shard state changed");
            self.state = state;
        }
        self.publish_info();
    }

    fn publish_info(&self) {
        self.info.send_replace(ShardInfo {
            index: self.index,
            count: self.count,
            state: self.state,
            session_id: self.session_id.clone(),
            sequence: self.sequence,
            heartbeat_interval: self.heartbeat_interval,
            latency: self.latency,
            resume_failures: self.resume_failures,
        });
    }
}

/// Reads frames until Hello arrives.
async fn await_hello(conn: &mut dyn GatewayConnection) -> Result<Duration, Disconnect> {
    loop {
        match conn.recv().await {
            Some(Ok(Inbound::Text(text))) => match GatewayFrame::parse(&text) {
                Ok(frame) => {
                    if let Some(interval) = frame.hello_interval() {
                        return Ok(interval);
                    }
                    trace!(op = frame.op, "Ignoring frame before Hello");
                }
                Err(e) => warn!(error = %e, "Discarding unparseable frame"),
            },
            Some(Ok(Inbound::Close { code, .. })) => return Err(Disconnect::Closed(code)),
            Some(Err(e)) => {
                warn!(error = %e, "Gateway receive failed");
                return Err(Disconnect::Lost);
            }
            None => return Err(Disconnect::Lost),
        }
    }
}

async fn send_frame(conn: &mut dyn GatewayConnection, frame: &GatewayFrame) -> GatewayResult<()> {
    let text = frame.to_text().map_err(|e| {
        error!(error = %e, "Failed to encode frame");
        GatewayError::Closed
    })?;
    conn.send(text).await.map_err(|e| {
        warn!(error = %e, "Gateway send failed");
        GatewayError::from(e)
    })
}

async fn close_quietly(conn: &mut dyn GatewayConnection, code: u16) {
    if let Err(e) = conn.close(code).await {
        debug!(code, error = %e, "Close frame not sent");
    }
}

/// Adds up to a tenth of `delay` so shards do not reconnect in lockstep.
fn jitter(delay: Duration) -> Duration {
    let spread = u64::try_from(delay.as_millis() / 10).unwrap_or(u64::MAX);
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use shardline_cache::CacheConfig;
    use shardline_core::UserId;

    use super::*;
    use crate::error::{TransportError, TransportResult};

    enum Sent {
        Frame(GatewayFrame),
        Close(u16),
    }

    struct ScriptedConnection {
        inbound: mpsc::UnboundedReceiver<Inbound>,
        sent: mpsc::UnboundedSender<Sent>,
    }

    #[async_trait]
    impl GatewayConnection for ScriptedConnection {
        async fn send(&mut self, text: String) -> TransportResult<()> {
            let frame = GatewayFrame::parse(&text).unwrap();
            let _ = self.sent.send(Sent::Frame(frame));
            Ok(())
        }

        async fn recv(&mut self) -> Option<TransportResult<Inbound>> {
            self.inbound.recv().await.map(Ok)
        }

        async fn close(&mut self, code: u16) -> TransportResult<()> {
            let _ = self.sent.send(Sent::Close(code));
            Ok(())
        }
    }

    struct Remote {
        to_client: mpsc::UnboundedSender<Inbound>,
        sent: mpsc::UnboundedReceiver<Sent>,
    }

    impl Remote {
        fn push(&self, frame: &GatewayFrame) {
            let _ = self
                .to_client
                .send(Inbound::Text(frame.to_text().unwrap()));
        }

        async fn next_frame(&mut self) -> GatewayFrame {
            loop {
                match self.sent.recv().await.unwrap() {
                    Sent::Frame(frame) => return frame,
                    Sent::Close(_) => {}
                }
            }
        }

        async fn next_close(&mut self) -> u16 {
            loop {
                match self.sent.recv().await.unwrap() {
                    Sent::Close(code) => return code,
                    Sent::Frame(_) => {}
                }
            }
        }
    }

    #[derive(Default)]
    struct ScriptedTransport {
        connections: Mutex<VecDeque<ScriptedConnection>>,
    }

    impl ScriptedTransport {
        fn expect_connection(&self) -> Remote {
            let (to_client, inbound) = mpsc::unbounded_channel();
            let (sent_tx, sent) = mpsc::unbounded_channel();
            self.connections
                .lock()
                .unwrap()
                .push_back(ScriptedConnection {
                    inbound,
                    sent: sent_tx,
                });
            Remote { to_client, sent }
        }
    }

    #[async_trait]
    impl GatewayTransport for ScriptedTransport {
        async fn connect(&self, url: &str) -> TransportResult<Box<dyn GatewayConnection>> {
            let next = self.connections.lock().unwrap().pop_front();
            match next {
                Some(conn) => Ok(Box::new(conn)),
                None => Err(TransportError::Connect {
                    url: url.to_string(),
                    reason: "no scripted connection".to_string(),
                }),
            }
        }
    }

    fn ready_frame(seq: u64) -> GatewayFrame {
        GatewayFrame::dispatch(
            seq,
            "READY",
            json!({
                "session_id": "session-1",
                "resume_gateway_url": "ws://resume.test",
                "user": { "id": "9", "username": "bot", "bot": true },
                "guilds": []
            }),
        )
    }

    struct Fixture {
        handle: ShardHandle,
        cache: Arc<EntityCache>,
        fatal: mpsc::UnboundedReceiver<GatewayError>,
    }

    fn start(transport: Arc<ScriptedTransport>) -> Fixture {
        let config = Arc::new(GatewayConfig::for_testing());
        let cache = Arc::new(EntityCache::new(CacheConfig::default()));
        let (fatal_tx, fatal) = mpsc::unbounded_channel();
        let ctx = SessionContext {
            identify: Arc::new(IdentifyQueue::new(
                config.max_concurrency,
                config.identify_interval,
            )),
            config,
            transport,
            cache: Arc::clone(&cache),
            events: EventRegistry::new(),
            fatal: fatal_tx,
        };
        Fixture {
            handle: ShardHandle::spawn(0, 1, ctx),
            cache,
            fatal,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hello_identify_ready_connects() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut remote = transport.expect_connection();
        remote.push(&GatewayFrame::hello(Duration::from_secs(40)));
        let mut fixture = start(Arc::clone(&transport));

        let identify = remote.next_frame().await;
        assert_eq!(identify.opcode(), Some(OpCode::Identify));
        assert_eq!(identify.d["token"], "test-token");
        assert_eq!(identify.d["shard"], json!([0, 1]));

        remote.push(&ready_frame(1));
        let info = fixture
            .handle
            .wait_until(|i| i.state == ShardState::Connected)
            .await
            .unwrap();
        assert_eq!(info.session_id.as_deref(), Some("session-1"));
        assert_eq!(info.sequence, Some(1));
        assert_eq!(info.heartbeat_interval, Some(Duration::from_secs(40)));
        assert_eq!(fixture.cache.self_user_id(), Some(UserId::new(9)));

        fixture.handle.stop().await;
        assert_eq!(remote.next_close().await, CLOSE_NORMAL);
        assert_eq!(fixture.handle.info().state, ShardState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_heartbeat_reconnects() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut remote = transport.expect_connection();
        remote.push(&GatewayFrame::hello(Duration::from_secs(1)));
        remote.push(&ready_frame(1));
        let mut fixture = start(Arc::clone(&transport));
        let start_time = Instant::now();

        fixture
            .handle
            .wait_until(|i| i.state == ShardState::Connected)
            .await
            .unwrap();

        let _identify = remote.next_frame().await;
        let beat = remote.next_frame().await;
        assert_eq!(beat.opcode(), Some(OpCode::Heartbeat));
        assert_eq!(beat.d, json!(1));

        let info = fixture
            .handle
            .wait_until(|i| i.state == ShardState::Reconnecting)
            .await
            .unwrap();
        assert!(start_time.elapsed() >= Duration::from_secs(2));
        assert_eq!(remote.next_close().await, CLOSE_RESUMABLE);
        assert_eq!(info.session_id.as_deref(), Some("session-1"));

        fixture.handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledged_heartbeat_records_latency() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut remote = transport.expect_connection();
        remote.push(&GatewayFrame::hello(Duration::from_secs(1)));
        remote.push(&ready_frame(1));
        let mut fixture = start(Arc::clone(&transport));

        let _identify = remote.next_frame().await;
        let beat = remote.next_frame().await;
        assert_eq!(beat.opcode(), Some(OpCode::Heartbeat));
        remote.push(&GatewayFrame::new(OpCode::HeartbeatAck, serde_json::Value::Null));

        let info = fixture
            .handle
            .wait_until(|i| i.latency.is_some())
            .await
            .unwrap();
        assert_eq!(info.state, ShardState::Connected);

        fixture.handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_close_code_stops_shard() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut remote = transport.expect_connection();
        remote.push(&GatewayFrame::hello(Duration::from_secs(40)));
        let mut fixture = start(Arc::clone(&transport));

        let _identify = remote.next_frame().await;
        let _ = remote.to_client.send(Inbound::Close {
            code: Some(4004),
            reason: "Authentication failed.".to_string(),
        });

        fixture
            .handle
            .wait_until(|i| i.state == ShardState::Closed)
            .await
            .unwrap();
        let err = fixture.fatal.recv().await.unwrap();
        assert!(matches!(
            err,
            GatewayError::SessionRejected { shard: 0, code: 4004, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_handshake_reconnects() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut remote = transport.expect_connection();
        remote.push(&GatewayFrame::hello(Duration::from_secs(1)));
        let mut fixture = start(Arc::clone(&transport));
        let start_time = Instant::now();

        let identify = remote.next_frame().await;
        assert_eq!(identify.opcode(), Some(OpCode::Identify));
        let beat = remote.next_frame().await;
        assert_eq!(beat.opcode(), Some(OpCode::Heartbeat));
        assert_eq!(beat.d, serde_json::Value::Null);

        fixture
            .handle
            .wait_until(|i| i.state == ShardState::Reconnecting)
            .await
            .unwrap();
        assert!(start_time.elapsed() >= Duration::from_secs(2));
        assert_eq!(remote.next_close().await, CLOSE_RESUMABLE);

        fixture.handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_close_without_listener_still_closes() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut remote = transport.expect_connection();
        remote.push(&GatewayFrame::hello(Duration::from_secs(40)));
        let Fixture { handle, fatal, .. } = start(Arc::clone(&transport));
        drop(fatal);

        let _identify = remote.next_frame().await;
        let _ = remote.to_client.send(Inbound::Close {
            code: Some(4014),
            reason: "Disallowed intents.".to_string(),
        });

        let info = handle
            .wait_until(|i| i.state == ShardState::Closed)
            .await
            .unwrap();
        assert_eq!(info.session_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_sent_once_connected() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut remote = transport.expect_connection();
        remote.push(&GatewayFrame::hello(Duration::from_secs(40)));
        let mut fixture = start(Arc::clone(&transport));

        fixture
            .handle
            .send(GatewayCommand::UpdatePresence {
                status: "idle".to_string(),
                activities: Vec::new(),
                afk: true,
                since: None,
            })
            .unwrap();

        let identify = remote.next_frame().await;
        assert_eq!(identify.opcode(), Some(OpCode::Identify));
        remote.push(&ready_frame(1));

        let presence = remote.next_frame().await;
        assert_eq!(presence.opcode(), Some(OpCode::PresenceUpdate));
        assert_eq!(presence.d["status"], "idle");

        fixture.handle.stop().await;
    }

    #[test]
    fn test_jitter_bounds() {
        let delay = Duration::from_secs(1);
        for _ in 0..100 {
            let jittered = jitter(delay);
            assert!(jittered >= delay);
            assert!(jittered <= Duration::from_millis(1100));
        }
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
    }
}
