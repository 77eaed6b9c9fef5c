// src/miner/worker.rs
//! Worker reports
//!
//! Compute engines talk back to the session only through messages. Each
//! message is stamped with the generation and slot index chosen by the
//! scheduler when the worker was spawned, so a worker cannot claim to
//! belong to a different generation than the one it was started for.

use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Engines report kH/s; the session accounts in H/s
pub const THROUGHPUT_SCALE: f64 = 1000.0;

/// A share found by a worker, ready for `mining.submit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateShare {
    /// Job the share was computed against
    pub job_id: String,
    /// Worker-chosen extra-nonce-2 (hex)
    pub extranonce2: String,
    /// Block time used (hex)
    pub ntime: String,
    /// Winning nonce (hex)
    pub nonce: String,
}

impl CandidateShare {
    /// Builds a share from engine output; every field must be present and
    /// non-empty.
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(CandidateShare {
            job_id: text_field(value, "job_id")?,
            extranonce2: text_field(value, "extranonce2")?,
            ntime: text_field(value, "ntime")?,
            nonce: text_field(value, "nonce")?,
        })
    }
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Anything a worker can tell the session
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerReport {
    /// Current rate of this worker in H/s
    Throughput(f64),
    /// Share submission; `share` is `None` when the engine output was incomplete
    Candidate {
        /// The share, if all fields were present
        share: Option<CandidateShare>,
        /// Rate piggybacked on the submission, in H/s
        throughput: Option<f64>,
    },
    /// Diagnostic text from the engine
    Log(String),
    /// The engine died or could not be started
    Failed(String),
}

impl WorkerReport {
    /// Decodes one engine output message
    ///
    /// Engine protocol:
    /// - `{"type":"hashrate","value":kHs}`
    /// - `{"type":"submit"|"share","data"|"share":{...},"hashrate":kHs}`
    /// - `{"type":"log","message":"..."}`
    pub fn from_value(value: &Value) -> Option<WorkerReport> {
        match value.get("type")?.as_str()? {
            "hashrate" => Some(WorkerReport::Throughput(scaled_rate(value.get("value")))),
            "submit" | "share" => {
                let share = value
                    .get("data")
                    .or_else(|| value.get("share"))
                    .and_then(CandidateShare::from_value);
                let throughput = value
                    .get("hashrate")
                    .filter(|v| !v.is_null())
                    .map(|v| scaled_rate(Some(v)));
                Some(WorkerReport::Candidate { share, throughput })
            }
            "log" => match value.get("message")? {
                Value::String(s) if !s.is_empty() => Some(WorkerReport::Log(s.clone())),
                Value::String(_) | Value::Null => None,
                other => Some(WorkerReport::Log(other.to_string())),
            },
            _ => None,
        }
    }

    /// Decodes one line of engine output; non-JSON lines yield `None`
    pub fn from_line(line: &str) -> Option<WorkerReport> {
        let value: Value = serde_json::from_str(line.trim()).ok()?;
        WorkerReport::from_value(&value)
    }
}

/// Engines may send numbers or numeric strings; garbage counts as zero
fn scaled_rate(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    if raw.is_finite() && raw > 0.0 {
        raw * THROUGHPUT_SCALE
    } else {
        0.0
    }
}

/// A report together with the slot it came from
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerMessage {
    generation: u64,
    index: usize,
    report: WorkerReport,
}

impl WorkerMessage {
    /// Generation the reporting worker was spawned for
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Slot index of the reporting worker
    pub fn index(&self) -> usize {
        self.index
    }

    /// The report itself
    pub fn report(&self) -> &WorkerReport {
        &self.report
    }

    /// Consumes the message, returning the report
    pub fn into_report(self) -> WorkerReport {
        self.report
    }
}

/// Report channel handed to one worker
///
/// Only the scheduler creates these, fixing generation and index at
/// spawn time.
#[derive(Debug, Clone)]
pub struct ReportSender {
    generation: u64,
    index: usize,
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl ReportSender {
    pub(crate) fn new(
        generation: u64,
        index: usize,
        tx: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Self {
        ReportSender {
            generation,
            index,
            tx,
        }
    }

    /// Generation this sender reports for
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Slot index this sender reports for
    pub fn index(&self) -> usize {
        self.index
    }

    /// Delivers a report to the session
    ///
    /// # Errors
    /// Returns `MinerError::ChannelError` once the session is gone
    pub fn send(&self, report: WorkerReport) -> Result<(), MinerError> {
        self.tx.send(WorkerMessage {
            generation: self.generation,
            index: self.index,
            report,
        })?;
        Ok(())
    }
}
