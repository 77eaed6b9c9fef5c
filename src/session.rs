// src/session.rs
//! Session orchestration
//!
//! A [`Session`] owns the protocol state, the worker pool and the stats.
//! All of it is mutated from one task: socket frames, worker reports and
//! the authorize timer are multiplexed in [`Session::run`] and handed to
//! the synchronous `on_*` handlers one at a time. Compute engines only
//! reach the session through their [`WorkerMessage`] channel.

use crate::config::Config;
use crate::miner::engine::Engine;
use crate::miner::scheduler::{MiningJob, Scheduler};
use crate::miner::worker::{CandidateShare, WorkerMessage, WorkerReport};
use crate::network::messages::{StratumMessage, Subscription};
use crate::network::pool::{PoolClient, PoolConfig};
use crate::network::transport::{self, Backoff, Connection, ConnectionState, FrameStream};
use crate::stats::aggregator::{MiningStats, ShareResult, Stats};
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use crossbeam_channel::Sender;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Connection and mining state shown to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Not started
    Idle,
    /// Opening the socket
    Connecting,
    /// Socket open, handshake in progress
    Authenticating,
    /// Workers are running on a job
    Mining,
    /// The last connection attempt or socket failed
    Error,
    /// Socket closed while the session was running
    Disconnected,
    /// Stopped by the operator
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Idle => "Idle",
            Status::Connecting => "Connecting...",
            Status::Authenticating => "Connected, Authenticating...",
            Status::Mining => "Mining",
            Status::Error => "Error",
            Status::Disconnected => "Disconnected",
            Status::Stopped => "Stopped",
        };
        f.write_str(text)
    }
}

/// Everything the presentation layer is told about
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Status transition
    Status(Status),
    /// Socket opened
    Connected,
    /// Subscribe reply applied
    Subscribed(Subscription),
    /// Difficulty for upcoming jobs
    DifficultyChanged(f64),
    /// A new worker generation started
    NewJob {
        /// Pool job id
        job_id: String,
        /// Generation working on it
        generation: u64,
        /// Pool asked to drop previous work
        clean_jobs: bool,
    },
    /// Aggregate throughput in H/s
    Hashrate(f64),
    /// Counter snapshot
    Stats(MiningStats),
    /// Accepted share count after a pool verdict
    Accepted(u64),
    /// Rejected share count after a pool verdict
    Rejected(u64),
    /// A candidate went out as `mining.submit`
    ShareSubmitted(CandidateShare),
    /// Diagnostic line from a worker
    WorkerLog {
        /// Worker slot
        index: usize,
        /// Engine text
        message: String,
    },
    /// Non-fatal transport, protocol or worker error
    Error(String),
    /// Socket closed while running
    Closed,
}

/// When `mining.authorize` goes out after `mining.subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// Fixed delay after the socket opens
    Delayed(Duration),
    /// As soon as the subscribe reply is applied
    AfterSubscribe,
}

/// Reconnect delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// First delay after a drop
    pub initial: Duration,
    /// Cap for the doubling delay
    pub max: Duration,
}

/// Fixed parameters of a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Resolved socket URL
    pub url: String,
    /// Algorithm handed to every worker
    pub algorithm: AlgorithmType,
    /// Workers per generation
    pub workers: usize,
    /// Pool identity
    pub pool: PoolConfig,
    /// Authorize ordering
    pub handshake: Handshake,
    /// `None` keeps the session disconnected after a drop
    pub reconnect: Option<ReconnectPolicy>,
}

impl SessionOptions {
    /// Derives session options from a validated config
    ///
    /// # Errors
    /// Returns `MinerError::ConfigError` when the socket URL can't be resolved
    pub fn from_config(config: &Config) -> Result<Self, MinerError> {
        let url = transport::resolve_socket_url(
            &config.host,
            config.proxy.as_deref(),
            config.port,
        )?;

        let handshake = if config.authorize_after_subscribe {
            Handshake::AfterSubscribe
        } else {
            Handshake::Delayed(Duration::from_millis(config.authorize_delay_ms))
        };

        let reconnect = config.reconnect.enabled.then(|| ReconnectPolicy {
            initial: Duration::from_millis(config.reconnect.initial_delay_ms),
            max: Duration::from_millis(config.reconnect.max_delay_ms),
        });

        Ok(SessionOptions {
            url,
            algorithm: config.algorithm_type(),
            workers: config.worker_count(),
            pool: PoolConfig {
                user: config.user.clone().unwrap_or_default(),
                password: config.pass.clone().unwrap_or_default(),
                client_version: config.client_version().to_owned(),
            },
            handshake,
            reconnect,
        })
    }
}

/// Top-level owner of one mining session
pub struct Session {
    options: SessionOptions,
    pool: PoolClient,
    scheduler: Scheduler,
    stats: Stats,
    /// Live socket; replaced on reconnect
    connection: Option<Connection>,
    status: Status,
    running: bool,
    events: Sender<SessionEvent>,
    /// Taken by `run`
    reports: Option<mpsc::UnboundedReceiver<WorkerMessage>>,
}

impl Session {
    /// Creates an idle session
    ///
    /// # Arguments
    /// * `options` - Endpoint, identity and worker settings
    /// * `engine` - Compute engine started for every worker slot
    /// * `events` - Channel to the presentation layer
    pub fn new(options: SessionOptions, engine: Arc<dyn Engine>, events: Sender<SessionEvent>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(engine, options.algorithm, options.workers, tx);
        let stats = Stats::new(scheduler.worker_count());

        Session {
            pool: PoolClient::new(options.pool.clone()),
            options,
            scheduler,
            stats,
            connection: None,
            status: Status::Idle,
            running: false,
            events,
            reports: Some(rx),
        }
    }

    /// Current status
    pub fn status(&self) -> Status {
        self.status
    }

    /// False once stopped
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Counter snapshot
    pub fn stats(&self) -> MiningStats {
        self.stats.snapshot()
    }

    /// Protocol state
    pub fn pool(&self) -> &PoolClient {
        &self.pool
    }

    /// Worker pool
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            log::trace!("No presentation listener");
        }
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
        self.emit(SessionEvent::Status(status));
    }

    fn emit_error(&self, message: impl Into<String>) {
        let message = message.into();
        log::error!("{}", message);
        self.emit(SessionEvent::Error(message));
    }

    fn emit_stats(&self) {
        self.emit(SessionEvent::Stats(self.stats.snapshot()));
    }

    /// Marks the session running with zeroed counters
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.stats.reset();
        log::info!(
            "Starting {} with {} workers",
            self.options.algorithm,
            self.scheduler.worker_count()
        );
        self.emit_stats();
    }

    /// Socket opened: subscribe right away
    pub fn on_open(&mut self, connection: Connection) {
        log::info!("Connected to {}", connection.url());
        self.connection = Some(connection);
        self.set_status(Status::Authenticating);
        self.emit(SessionEvent::Connected);

        if let Err(e) = self.pool.subscribe(self.connection.as_ref()) {
            self.emit_error(format!("Subscribe failed: {}", e));
        }
    }

    /// Sends `mining.authorize`
    pub fn authorize(&mut self) {
        if !self.running {
            return;
        }
        match self.pool.authorize(self.connection.as_ref()) {
            Ok(id) => log::debug!("Authorizing {} (id {})", self.pool.user(), id),
            Err(e) => log::warn!("Authorize not sent: {}", e),
        }
    }

    /// Handles one inbound socket payload
    pub fn on_frame(&mut self, payload: &str) {
        log::trace!("rx: {}", payload.trim_end());
        for value in transport::split_frame(payload) {
            if let Some(message) = self.pool.decode(value) {
                self.dispatch(message);
            }
        }
    }

    fn dispatch(&mut self, message: StratumMessage) {
        match message {
            StratumMessage::SubscribeReply(Some(subscription)) => {
                self.pool.apply_subscription(&subscription);
                log::info!(
                    "Subscribed: extranonce1={} extranonce2_size={}",
                    subscription.extranonce1,
                    subscription.extranonce2_size
                );
                self.emit(SessionEvent::Subscribed(subscription));
                if self.options.handshake == Handshake::AfterSubscribe {
                    self.authorize();
                }
            }
            StratumMessage::SubscribeReply(None) => {
                self.emit_error(
                    MinerError::ProtocolError("Subscribe reply did not carry extranonce data".into())
                        .to_string(),
                );
            }
            StratumMessage::AuthorizeReply { authorized: true } => {
                log::info!("Worker {} authorized", self.pool.user());
            }
            StratumMessage::AuthorizeReply { authorized: false } => {
                self.emit_error(
                    MinerError::ProtocolError(format!(
                        "Authorization failed for {}",
                        self.pool.user()
                    ))
                    .to_string(),
                );
            }
            StratumMessage::SubmitReply { accepted, reason } => {
                if accepted {
                    let count = self.stats.record_share(ShareResult::Accepted);
                    log::info!("Share accepted ({})", count);
                    self.emit(SessionEvent::Accepted(count));
                } else {
                    let count = self.stats.record_share(ShareResult::Rejected);
                    log::warn!(
                        "Share rejected ({}): {}",
                        count,
                        reason.as_deref().unwrap_or("no reason given")
                    );
                    self.emit(SessionEvent::Rejected(count));
                }
                self.emit_stats();
            }
            StratumMessage::DifficultyPush(difficulty) => {
                log::info!("Difficulty set to {}", difficulty);
                self.pool.set_difficulty(difficulty);
                self.emit(SessionEvent::DifficultyChanged(difficulty));
            }
            StratumMessage::NotifyPush(template) => {
                let job = self.pool.build_job(template);
                self.distribute(job);
            }
            StratumMessage::InvalidPush { method, reason } => {
                self.emit_error(
                    MinerError::ProtocolError(format!("Malformed {}: {}", method, reason))
                        .to_string(),
                );
            }
            StratumMessage::UnknownPush { method } => {
                log::debug!("Ignoring message {}", method.as_deref().unwrap_or("without method"));
            }
        }
    }

    fn distribute(&mut self, job: MiningJob) {
        let job_id = job.job_id().to_owned();
        let clean_jobs = job.template.clean_jobs;

        let failures = self.scheduler.distribute(job);
        self.stats.reset_slots(self.scheduler.worker_count());
        let generation = self.scheduler.generation();
        log::info!("New job {} (generation {})", job_id, generation);

        self.set_status(Status::Mining);
        self.emit(SessionEvent::NewJob {
            job_id,
            generation,
            clean_jobs,
        });
        self.emit(SessionEvent::Hashrate(0.0));

        for (index, e) in failures {
            self.emit_error(format!("Worker {} failed to start: {}", index, e));
        }
    }

    /// Handles one worker report
    ///
    /// Reports from any generation but the live one are dropped here,
    /// before they can touch stats or reach the pool.
    pub fn on_worker_message(&mut self, message: WorkerMessage) {
        if !self.running || message.generation() != self.scheduler.generation() {
            log::trace!(
                "Dropping report from generation {} (live {})",
                message.generation(),
                self.scheduler.generation()
            );
            return;
        }

        let index = message.index();
        match message.into_report() {
            WorkerReport::Throughput(rate) => self.record_rate(index, rate),
            WorkerReport::Candidate { share, throughput } => {
                if let Some(rate) = throughput {
                    self.record_rate(index, rate);
                }
                match share {
                    Some(share) => self.submit(share),
                    None => log::debug!("Worker {} sent an incomplete share", index),
                }
            }
            WorkerReport::Log(message) => {
                log::debug!("[worker {}] {}", index, message);
                self.emit(SessionEvent::WorkerLog { index, message });
            }
            WorkerReport::Failed(reason) => {
                self.emit_error(format!("Worker {}: {}", index, reason));
            }
        }
    }

    fn record_rate(&mut self, index: usize, rate: f64) {
        if let Some(total) = self.stats.record_rate(index, rate) {
            self.emit(SessionEvent::Hashrate(total));
            self.emit_stats();
        }
    }

    fn submit(&mut self, share: CandidateShare) {
        match self.pool.submit(self.connection.as_ref(), &share) {
            Ok(id) => {
                log::debug!("Submitted share for job {} (id {})", share.job_id, id);
                self.emit(SessionEvent::ShareSubmitted(share));
            }
            Err(e) => log::warn!("Share for job {} not submitted: {}", share.job_id, e),
        }
    }

    /// Socket or connect failure
    pub fn on_error(&mut self, cause: impl Into<String>) {
        if let Some(conn) = self.connection.as_mut() {
            conn.set_state(ConnectionState::Error);
        }
        self.set_status(Status::Error);
        self.emit_error(cause);
    }

    /// Socket closed: workers of the live generation stop
    pub fn on_close(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            conn.set_state(ConnectionState::Closed);
        }
        self.teardown();
        if self.running {
            log::warn!("Connection closed");
            self.set_status(Status::Disconnected);
            self.emit(SessionEvent::Closed);
        }
    }

    /// Stops everything without waiting for outstanding replies
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.connection = None;
        self.teardown();
        self.set_status(Status::Stopped);
        log::info!(
            "Stopped: accepted {}, rejected {}",
            self.stats.accepted(),
            self.stats.rejected()
        );
    }

    fn teardown(&mut self) {
        self.pool.clear_pending();
        let stopped = self.scheduler.retire();
        if stopped > 0 {
            log::debug!("Stopped {} workers", stopped);
        }
        self.stats.reset_slots(self.scheduler.worker_count());
        self.emit(SessionEvent::Hashrate(0.0));
        self.emit_stats();
    }

    /// Runs the session until `shutdown` flips or its sender is dropped
    ///
    /// Connects, reconnects with backoff when configured, and returns the
    /// final counters.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<MiningStats, MinerError> {
        let mut reports = self
            .reports
            .take()
            .ok_or_else(|| MinerError::TaskError("Session is already running".into()))?;
        let mut backoff = self
            .options
            .reconnect
            .map(|policy| Backoff::new(policy.initial, policy.max));

        self.start();
        while self.running && !*shutdown.borrow() {
            self.set_status(Status::Connecting);
            let url = self.options.url.clone();

            let opened = tokio::select! {
                result = transport::open(&url) => result,
                _ = shutdown.changed() => break,
            };

            match opened {
                Ok((connection, stream)) => {
                    if let Some(backoff) = backoff.as_mut() {
                        backoff.reset();
                    }
                    self.on_open(connection);
                    self.drive(stream, &mut reports, &mut shutdown).await;
                }
                Err(e) => self.on_error(e.to_string()),
            }

            if *shutdown.borrow() {
                break;
            }
            self.on_close();

            let Some(backoff) = backoff.as_mut() else {
                log::info!("Reconnect disabled, waiting for shutdown");
                let _ = shutdown.changed().await;
                break;
            };
            let delay = backoff.next_delay();
            log::info!("Reconnecting in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.stop();
        Ok(self.stats.snapshot())
    }

    /// Pumps one connection until it ends or shutdown is requested
    async fn drive(
        &mut self,
        mut stream: FrameStream,
        reports: &mut mpsc::UnboundedReceiver<WorkerMessage>,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let (delay, mut authorize_armed) = match self.options.handshake {
            Handshake::Delayed(delay) => (delay, true),
            Handshake::AfterSubscribe => (Duration::ZERO, false),
        };
        let authorize_timer = tokio::time::sleep(delay);
        tokio::pin!(authorize_timer);

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(message)) => {
                        if let Some(text) = transport::message_text(message) {
                            self.on_frame(&text);
                        }
                    }
                    Some(Err(e)) => {
                        self.on_error(MinerError::from(e).to_string());
                        return;
                    }
                    None => return,
                },
                Some(message) = reports.recv() => self.on_worker_message(message),
                _ = &mut authorize_timer, if authorize_armed => {
                    authorize_armed = false;
                    self.authorize();
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}
