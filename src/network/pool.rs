// src/network/pool.rs

//! Stratum protocol state for one session
//!
//! [`PoolClient`] owns everything the protocol needs to remember between
//! lines: the request id counter, the pending-request table used to tell
//! replies from pushes, and the extra-nonce/difficulty parameters stamped
//! onto each new job. It never touches the socket directly; requests are
//! written through the session's current [`Connection`].
use crate::miner::scheduler::{ENGINE_ARG, MiningJob};
use crate::miner::worker::CandidateShare;
use crate::network::messages::{
    DEFAULT_EXTRANONCE2_SIZE, JobTemplate, RawMessage, Request, RequestKind, StratumMessage,
    Subscription, method,
};
use crate::network::transport::Connection;
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

/// Share difficulty assumed until the pool sends `mining.set_difficulty`
pub const DEFAULT_DIFFICULTY: f64 = 0.01;

/// Credentials and identity presented to the pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Wallet address or pool username
    pub user: String,
    /// Worker password ("x" is sent when empty)
    pub password: String,
    /// Client identifier sent with `mining.subscribe`
    pub client_version: String,
}

/// Protocol engine state
#[derive(Debug)]
pub struct PoolClient {
    /// Pool identity configuration
    config: PoolConfig,
    /// Next request id; never reused within a session
    next_id: u64,
    /// Outstanding requests by id
    pending: HashMap<u64, RequestKind>,
    /// Extra-nonce-1 from the last subscribe reply
    extranonce1: String,
    /// Extra-nonce-2 size from the last subscribe reply
    extranonce2_size: usize,
    /// Current share difficulty
    difficulty: f64,
}

impl PoolClient {
    /// Creates protocol state for a new session
    pub fn new(config: PoolConfig) -> Self {
        PoolClient {
            config,
            next_id: 1,
            pending: HashMap::new(),
            extranonce1: String::new(),
            extranonce2_size: 0,
            difficulty: DEFAULT_DIFFICULTY,
        }
    }

    /// Pool user the session mines for
    pub fn user(&self) -> &str {
        &self.config.user
    }

    /// Current extra-nonce-1
    pub fn extranonce1(&self) -> &str {
        &self.extranonce1
    }

    /// Current extra-nonce-2 size (0 until subscribed)
    pub fn extranonce2_size(&self) -> usize {
        self.extranonce2_size
    }

    /// Current share difficulty
    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    /// Number of requests still waiting for a reply
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Sends a request and records it as pending
    ///
    /// # Errors
    /// Returns `MinerError::NotConnected` if there is no open connection;
    /// nothing is recorded in that case.
    pub fn request(
        &mut self,
        conn: Option<&Connection>,
        method: &'static str,
        params: Value,
        kind: RequestKind,
    ) -> Result<u64, MinerError> {
        let conn = conn.filter(|c| c.is_open()).ok_or(MinerError::NotConnected)?;

        let id = self.next_id;
        let frame = serde_json::to_string(&Request { id, method, params })?;
        conn.send(&frame)?;

        self.next_id += 1;
        self.pending.insert(id, kind);
        Ok(id)
    }

    /// Sends `mining.subscribe`
    pub fn subscribe(&mut self, conn: Option<&Connection>) -> Result<u64, MinerError> {
        let params = json!([self.config.client_version]);
        self.request(conn, method::SUBSCRIBE, params, RequestKind::Subscribe)
    }

    /// Sends `mining.authorize`
    pub fn authorize(&mut self, conn: Option<&Connection>) -> Result<u64, MinerError> {
        let password = if self.config.password.is_empty() {
            "x"
        } else {
            self.config.password.as_str()
        };
        let params = json!([self.config.user, password]);
        self.request(conn, method::AUTHORIZE, params, RequestKind::Authorize)
    }

    /// Sends `mining.submit` for a worker's candidate share
    pub fn submit(
        &mut self,
        conn: Option<&Connection>,
        share: &CandidateShare,
    ) -> Result<u64, MinerError> {
        let params = json!([
            self.config.user,
            share.job_id,
            share.extranonce2,
            share.ntime,
            share.nonce
        ]);
        self.request(conn, method::SUBMIT, params, RequestKind::Submit)
    }

    /// Decodes one inbound JSON value
    ///
    /// A matching pending entry is consumed, so each request is answered at
    /// most once. Returns `None` for values that are not JSON objects.
    pub fn decode(&mut self, value: Value) -> Option<StratumMessage> {
        // Derived structs also deserialize from arrays; `[2]` must not match id 2
        if !value.is_object() {
            log::trace!("Ignoring non-object line: {}", value);
            return None;
        }

        let raw: RawMessage = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                log::trace!("Ignoring non-object line: {}", e);
                return None;
            }
        };

        let pending = raw.request_id().and_then(|id| self.pending.remove(&id));
        Some(StratumMessage::classify(raw, pending))
    }

    /// Stores the extra-nonce parameters from a subscribe reply
    pub fn apply_subscription(&mut self, subscription: &Subscription) {
        self.extranonce1 = subscription.extranonce1.clone();
        self.extranonce2_size = subscription.extranonce2_size;
    }

    /// Updates the difficulty used by jobs created from now on
    pub fn set_difficulty(&mut self, difficulty: f64) {
        self.difficulty = difficulty;
    }

    /// Stamps a notify template with the current session parameters
    pub fn build_job(&self, template: JobTemplate) -> MiningJob {
        let extranonce2_size = if self.extranonce2_size == 0 {
            DEFAULT_EXTRANONCE2_SIZE
        } else {
            self.extranonce2_size
        };

        MiningJob {
            extranonce1: self.extranonce1.clone(),
            extranonce2_size,
            difficulty: self.difficulty,
            template,
            nonce: 0,
            arg: ENGINE_ARG.into(),
        }
    }

    /// Forgets all outstanding requests; their replies can no longer arrive
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }
}
