// src/config/config.rs
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Main configuration structure for the mining client
///
/// Field names are snake_case. Older JSON configs use other keys for the
/// same settings (`wallet`, `password`, `workers`, `algo`, `clientVersion`,
/// ...); those are read into separate fields and folded in by
/// [`Config::apply_fallbacks`], so a file carrying both spellings still parses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Pool host, or a full `ws(s)://` / `http(s)://` endpoint URL
    #[serde(default)]
    pub host: String,

    /// Pool port (required when tunneling through a proxy)
    #[serde(default, deserialize_with = "lenient_int")]
    pub port: Option<i64>,

    /// Proxy base URL used to tunnel to `host:port`
    #[serde(default)]
    pub proxy: Option<String>,

    /// Wallet address or pool username
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default, skip_serializing)]
    wallet: Option<String>,

    #[serde(default, skip_serializing)]
    worker: Option<String>,

    /// Worker password
    #[serde(default)]
    pub pass: Option<String>,

    #[serde(default, skip_serializing)]
    password: Option<String>,

    /// Algorithm name or alias (unknown names fall back to the default)
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    #[serde(default, skip_serializing)]
    algo: Option<String>,

    /// Number of compute workers per job
    #[serde(default, deserialize_with = "lenient_count")]
    pub threads: Option<usize>,

    #[serde(default, deserialize_with = "lenient_count", skip_serializing)]
    workers: Option<usize>,

    /// Client identifier sent with `mining.subscribe`
    #[serde(default, alias = "clientVersion")]
    client_version: Option<String>,

    #[serde(default, skip_serializing)]
    version: Option<String>,

    #[serde(default, alias = "subscribeVersion", skip_serializing)]
    subscribe_version: Option<String>,

    #[serde(default, alias = "minerVersion", skip_serializing)]
    miner_version: Option<String>,

    /// Status line refresh interval
    #[serde(
        default = "default_stats_interval_ms",
        alias = "statsIntervalMs",
        deserialize_with = "lenient_interval"
    )]
    pub stats_interval_ms: u64,

    /// Delay between `mining.subscribe` and `mining.authorize`
    #[serde(default = "default_authorize_delay_ms", alias = "authorizeDelayMs")]
    pub authorize_delay_ms: u64,

    /// Authorize as soon as the subscribe reply arrives instead of after a delay
    #[serde(default, alias = "authorizeAfterSubscribe")]
    pub authorize_after_subscribe: bool,

    /// External compute engine
    #[serde(default)]
    pub engine: EngineConfig,

    /// Reconnect policy after the connection drops
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// A number that may arrive as an integer, a float or a numeric string
#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Numeric {
    fn as_i64(&self) -> Option<i64> {
        let float = |f: f64| f.is_finite().then(|| f.trunc() as i64);
        match self {
            Numeric::Int(n) => Some(*n),
            Numeric::Float(f) => float(*f),
            Numeric::Text(text) => {
                let text = text.trim();
                text.parse::<i64>()
                    .ok()
                    .or_else(|| text.parse::<f64>().ok().and_then(float))
            }
        }
    }
}

/// Unparsable values read as absent, so validation reports them
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Numeric>::deserialize(deserializer)?.and_then(|n| n.as_i64()))
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_int(deserializer)?.map(|n| usize::try_from(n).unwrap_or(0)))
}

fn lenient_interval<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_int(deserializer)?
        .and_then(|n| u64::try_from(n).ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(default_stats_interval_ms))
}

/// External compute engine program
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Program started once per worker
    #[serde(default)]
    pub command: String,

    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,
}

/// Exponential backoff reconnect settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Reconnect at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// First delay after a drop
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for the doubling delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            enabled: true,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_algorithm() -> String {
    AlgorithmType::default().to_string()
}

const DEFAULT_CLIENT_VERSION: &str = "webminer/1.0";

fn default_stats_interval_ms() -> u64 {
    1000
}

fn default_authorize_delay_ms() -> u64 {
    700
}

fn default_true() -> bool {
    true
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Config {
    /// Loads configuration from a file
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as TOML.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded configuration
    /// * `Err(MinerError)` - If file couldn't be read or parsed
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json(&config_str)
        } else {
            Self::from_toml(&config_str)
        }
    }

    /// Parses a TOML document
    pub fn from_toml(text: &str) -> Result<Self, MinerError> {
        let config: Config = toml::from_str(text)?;
        Ok(config.apply_fallbacks())
    }

    /// Parses a JSON document
    pub fn from_json(text: &str) -> Result<Self, MinerError> {
        let config: Config = serde_json::from_str(text)?;
        Ok(config.apply_fallbacks())
    }

    /// Folds the alternative keys into the canonical fields
    ///
    /// `user` falls back to `wallet`, then `worker`, when it is empty.
    /// `pass` and `threads` fall back to `password` and `workers` when
    /// absent. A non-empty `algo` wins over `algorithm`. The client version
    /// is the first of `client_version`, `version`, `subscribe_version`,
    /// `miner_version` that is set.
    fn apply_fallbacks(mut self) -> Self {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

        if !filled(&self.user) {
            if filled(&self.wallet) {
                self.user = self.wallet.take();
            } else if filled(&self.worker) {
                self.user = self.worker.take();
            }
        }
        if self.pass.is_none() {
            self.pass = self.password.take();
        }
        if self.threads.is_none() {
            self.threads = self.workers.take();
        }
        if let Some(algo) = self.algo.take().filter(|a| !a.trim().is_empty()) {
            self.algorithm = algo;
        }

        let version = self
            .client_version
            .take()
            .or_else(|| self.version.take())
            .or_else(|| self.subscribe_version.take())
            .or_else(|| self.miner_version.take())
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty());
        self.client_version = version;
        self
    }

    /// Client identifier sent with `mining.subscribe`
    pub fn client_version(&self) -> &str {
        self.client_version
            .as_deref()
            .unwrap_or(DEFAULT_CLIENT_VERSION)
    }

    /// Checks that every required field is present
    ///
    /// All missing fields are reported in one error.
    pub fn validate(&self) -> Result<(), MinerError> {
        let mut missing = Vec::new();
        if self.host.trim().is_empty() {
            missing.push("host");
        }
        if self.user.as_deref().is_none_or(|u| u.trim().is_empty()) {
            missing.push("user");
        }
        if self.pass.is_none() {
            missing.push("pass");
        }
        if self.threads.is_none() {
            missing.push("threads");
        }
        if self.engine.command.trim().is_empty() {
            missing.push("engine.command");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(MinerError::ConfigError(format!(
                "Missing/invalid required config fields: {}",
                missing.join(", ")
            )))
        }
    }

    /// Algorithm after alias normalization
    pub fn algorithm_type(&self) -> AlgorithmType {
        AlgorithmType::normalize(&self.algorithm)
    }

    /// Worker count, never below one
    pub fn worker_count(&self) -> usize {
        match self.threads {
            Some(0) => {
                log::warn!("threads = 0 is not usable, running 1 worker");
                1
            }
            Some(n) => n,
            None => 1,
        }
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template() -> String {
        let mut template = String::new();
        template.push_str("# wsminer-rs configuration\n\n");
        template.push_str("# Pool host, or a full ws:// / wss:// endpoint URL\n");
        template.push_str("host = \"pool.example.com\"\n");
        template.push_str("port = 3333\n");
        template.push_str("# Proxy that tunnels to host:port (needed unless host is a URL)\n");
        template.push_str("proxy = \"wss://proxy.example.com/\"\n");
        template.push_str("user = \"your_wallet_address.worker01\"\n");
        template.push_str("pass = \"x\"\n\n");
        template.push_str("# Run `wsminer-rs algos` for the list of algorithms\n");
        template.push_str(&format!("algorithm = \"{}\"\n", AlgorithmType::default()));
        template.push_str("# Number of compute workers\n");
        template.push_str(&format!("threads = {}\n", num_cpus::get()));
        template.push_str("client_version = \"webminer/1.0\"\n");
        template.push_str("stats_interval_ms = 1000\n");
        template.push_str("# Handshake: authorize after a delay, or when subscribe is answered\n");
        template.push_str("authorize_delay_ms = 700\n");
        template.push_str("authorize_after_subscribe = false\n\n");
        template.push_str("# Compute engine started once per worker\n");
        template.push_str("[engine]\n");
        template.push_str("command = \"/usr/local/bin/compute-engine\"\n");
        template.push_str("args = []\n\n");
        template.push_str("[reconnect]\n");
        template.push_str("enabled = true\n");
        template.push_str("initial_delay_ms = 1000\n");
        template.push_str("max_delay_ms = 60000\n");

        template
    }
}
