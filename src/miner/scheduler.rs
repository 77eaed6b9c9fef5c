// src/miner/scheduler.rs
//! Worker pool management
//!
//! Every new job starts a new *generation*: the previous workers are
//! terminated, and a fresh set of exactly `workers` slots is spawned with
//! the same `{algo, work}` payload. Reports carry the generation they were
//! spawned for, so anything produced against older work can be recognized
//! and ignored by the session.

use crate::miner::engine::{Assignment, Engine, EngineHandle};
use crate::miner::worker::{ReportSender, WorkerMessage};
use crate::network::messages::JobTemplate;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Engine argument passed with every job
pub const ENGINE_ARG: &str = "0607";

/// Represents a mining job received from the pool
///
/// Immutable once built; a new notify produces a new job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MiningJob {
    /// Extra-nonce-1 at the time the job arrived
    #[serde(rename = "extraNonce1")]
    pub extranonce1: String,
    /// Extra-nonce-2 size at the time the job arrived
    #[serde(rename = "extraNonce2Size")]
    pub extranonce2_size: usize,
    /// Share difficulty at the time the job arrived
    #[serde(rename = "miningDiff")]
    pub difficulty: f64,
    /// Fields from `mining.notify`
    #[serde(flatten)]
    pub template: JobTemplate,
    /// Starting nonce for the engine
    pub nonce: u32,
    /// Engine argument, always [`ENGINE_ARG`]
    pub arg: String,
}

impl MiningJob {
    /// Pool job identifier
    pub fn job_id(&self) -> &str {
        &self.template.job_id
    }
}

/// One worker of the current generation
pub struct WorkerSlot {
    index: usize,
    generation: u64,
    handle: Option<Box<dyn EngineHandle>>,
}

impl WorkerSlot {
    /// Position of this worker within its generation
    pub fn index(&self) -> usize {
        self.index
    }

    /// Generation the worker was spawned for
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// False when the engine failed to start
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    fn terminate(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.terminate();
        }
    }
}

/// Coordinates mining jobs across worker generations
pub struct Scheduler {
    /// Starts compute units
    engine: Arc<dyn Engine>,
    /// Algorithm passed to every worker
    algorithm: AlgorithmType,
    /// Slots per generation
    workers: usize,
    /// Generation counter; only ever increases
    generation: u64,
    /// Slots of the live generation
    slots: Vec<WorkerSlot>,
    /// Job the live generation works on
    current_job: Option<Arc<MiningJob>>,
    /// Channel every worker reports into
    reports: mpsc::UnboundedSender<WorkerMessage>,
}

impl Scheduler {
    /// Creates a scheduler with no live generation
    ///
    /// # Arguments
    /// * `engine` - Compute engine used to start workers
    /// * `algorithm` - Algorithm handed to every worker
    /// * `workers` - Slots per generation (at least 1)
    /// * `reports` - Channel the session reads worker reports from
    pub fn new(
        engine: Arc<dyn Engine>,
        algorithm: AlgorithmType,
        workers: usize,
        reports: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Self {
        Scheduler {
            engine,
            algorithm,
            workers: workers.max(1),
            generation: 0,
            slots: Vec::new(),
            current_job: None,
            reports,
        }
    }

    /// The live generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Slots per generation
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Slots of the live generation
    pub fn slots(&self) -> &[WorkerSlot] {
        &self.slots
    }

    /// Job of the live generation
    pub fn current_job(&self) -> Option<&MiningJob> {
        self.current_job.as_deref()
    }

    /// Starts a new generation for `job`
    ///
    /// The previous generation is terminated first. Returns the spawn
    /// failures; a failed slot stays empty until the next generation.
    pub fn distribute(&mut self, job: MiningJob) -> Vec<(usize, MinerError)> {
        self.generation += 1;
        let terminated = self.terminate_all();
        log::debug!(
            "Generation {} for job {} ({} workers stopped)",
            self.generation,
            job.job_id(),
            terminated
        );

        let assignment = Assignment {
            algo: self.algorithm,
            work: job,
        };
        let mut failures = Vec::new();

        let slots: Vec<WorkerSlot> = (0..self.workers)
            .map(|index| {
                let sender = ReportSender::new(self.generation, index, self.reports.clone());
                let handle = match self.engine.spawn(&assignment, sender) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        failures.push((index, e));
                        None
                    }
                };
                WorkerSlot {
                    index,
                    generation: self.generation,
                    handle,
                }
            })
            .collect();

        self.slots = slots;
        self.current_job = Some(Arc::new(assignment.work));
        failures
    }

    /// Stops the live generation without starting another one
    ///
    /// The generation counter still advances, so reports already queued by
    /// the stopped workers are recognized as stale.
    pub fn retire(&mut self) -> usize {
        self.generation += 1;
        self.current_job = None;
        self.terminate_all()
    }

    /// Terminates every live slot, returning how many were running
    fn terminate_all(&mut self) -> usize {
        let mut stopped = 0;
        for slot in &mut self.slots {
            if slot.is_running() {
                stopped += 1;
            }
            slot.terminate();
        }
        self.slots.clear();
        stopped
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.terminate_all();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::miner::engine::mock::MockEngine;

    pub(crate) fn job(job_id: &str) -> MiningJob {
        MiningJob {
            extranonce1: "ab12".into(),
            extranonce2_size: 4,
            difficulty: 0.01,
            template: JobTemplate {
                job_id: job_id.into(),
                prev_hash: "00".into(),
                coinb1: "c1".into(),
                coinb2: "c2".into(),
                merkle_branch: vec!["m1".into()],
                version: "20000000".into(),
                nbits: "1d00ffff".into(),
                ntime: "5f5e1000".into(),
                clean_jobs: true,
            },
            nonce: 0,
            arg: ENGINE_ARG.into(),
        }
    }

    fn scheduler(engine: &MockEngine, workers: usize) -> Scheduler {
        let (tx, _rx) = mpsc::unbounded_channel();
        Scheduler::new(
            Arc::new(engine.clone()),
            AlgorithmType::Power2B,
            workers,
            tx,
        )
    }

    #[test]
    fn distribute_spawns_one_generation() {
        let engine = MockEngine::default();
        let mut scheduler = scheduler(&engine, 2);

        let failures = scheduler.distribute(job("j1"));
        assert!(failures.is_empty());
        assert_eq!(scheduler.generation(), 1);
        assert_eq!(engine.spawned(), 2);
        assert_eq!(engine.terminated(), 0);

        let state = engine.state.lock().unwrap();
        for (i, spawned) in state.spawned.iter().enumerate() {
            assert_eq!(spawned.reports.index(), i);
            assert_eq!(spawned.reports.generation(), 1);
            assert_eq!(spawned.assignment.algo, AlgorithmType::Power2B);
            assert_eq!(spawned.assignment.work.job_id(), "j1");
        }
    }

    #[test]
    fn next_job_replaces_previous_generation() {
        let engine = MockEngine::default();
        let mut scheduler = scheduler(&engine, 3);

        scheduler.distribute(job("j1"));
        scheduler.distribute(job("j2"));

        assert_eq!(scheduler.generation(), 2);
        assert_eq!(engine.spawned(), 6);
        assert_eq!(engine.terminated(), 3);
        assert_eq!(scheduler.slots().len(), 3);
        assert!(scheduler.slots().iter().all(|s| s.generation() == 2));
        assert_eq!(scheduler.current_job().map(MiningJob::job_id), Some("j2"));
    }

    #[test]
    fn retire_stops_workers_and_advances_generation() {
        let engine = MockEngine::default();
        let mut scheduler = scheduler(&engine, 2);

        // Nothing live yet
        assert_eq!(scheduler.retire(), 0);
        assert_eq!(scheduler.generation(), 1);

        scheduler.distribute(job("j1"));
        assert_eq!(scheduler.retire(), 2);
        assert_eq!(scheduler.generation(), 3);
        assert_eq!(engine.terminated(), 2);
        assert!(scheduler.slots().is_empty());
        assert!(scheduler.current_job().is_none());
    }

    #[test]
    fn failed_spawn_leaves_empty_slot() {
        let engine = MockEngine {
            fail_index: Some(1),
            ..MockEngine::default()
        };
        let mut scheduler = scheduler(&engine, 3);

        let failures = scheduler.distribute(job("j1"));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 1);
        assert_eq!(scheduler.slots().len(), 3);
        assert!(!scheduler.slots()[1].is_running());
        assert_eq!(engine.spawned(), 2);
    }

    #[test]
    fn zero_workers_is_clamped_to_one() {
        let engine = MockEngine::default();
        let mut scheduler = scheduler(&engine, 0);
        scheduler.distribute(job("j1"));
        assert_eq!(engine.spawned(), 1);
    }

    #[test]
    fn dropping_scheduler_terminates_workers() {
        let engine = MockEngine::default();
        let mut scheduler = scheduler(&engine, 2);
        scheduler.distribute(job("j1"));
        drop(scheduler);
        assert_eq!(engine.terminated(), 2);
    }
}
