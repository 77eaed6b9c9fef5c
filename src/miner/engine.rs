// src/miner/engine.rs
//! Compute engine boundary
//!
//! The hash routines themselves live outside this crate. An [`Engine`]
//! starts one compute unit per worker slot and hands back a handle the
//! scheduler uses to stop it. The bundled [`ProcessEngine`] runs an
//! external program per slot and speaks JSON lines with it.

use crate::miner::scheduler::MiningJob;
use crate::miner::worker::{ReportSender, WorkerReport};
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use serde::Serialize;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

/// Payload every worker of a generation starts with
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    /// Algorithm the engine must run
    pub algo: AlgorithmType,
    /// Job to search over
    pub work: MiningJob,
}

/// Something that can run compute units
pub trait Engine: Send + Sync {
    /// Starts one worker for `assignment`
    ///
    /// All output must go through `reports`; the engine never sees the
    /// session state.
    fn spawn(
        &self,
        assignment: &Assignment,
        reports: ReportSender,
    ) -> Result<Box<dyn EngineHandle>, MinerError>;
}

/// Control handle of one running worker
pub trait EngineHandle: Send {
    /// Stops the worker. After this returns the worker sends nothing more
    /// that the session would accept.
    fn terminate(&mut self);
}

/// Engine that runs an external program per worker
///
/// The program receives `{"algo": ..., "work": {...}}` as one line on stdin
/// and writes report lines to stdout. Its stderr is discarded. `work`
/// carries the job fields (`jobId`, `prevhash`, `coinb1`, `coinb2`,
/// `merkle_branch`, `version`, `nbits`, `ntime`, `clean_jobs`) plus
/// `extraNonce1`, `extraNonce2Size`, `miningDiff`, `nonce` and `arg`.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    /// Program to execute
    command: String,
    /// Arguments passed to every instance
    args: Vec<String>,
}

impl ProcessEngine {
    /// Creates an engine launching `command args...`
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        ProcessEngine {
            command: command.into(),
            args,
        }
    }
}

impl Engine for ProcessEngine {
    fn spawn(
        &self,
        assignment: &Assignment,
        reports: ReportSender,
    ) -> Result<Box<dyn EngineHandle>, MinerError> {
        let payload = serde_json::to_string(assignment)?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                MinerError::EngineError(format!("Failed to start '{}': {}", self.command, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MinerError::EngineError("Engine stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MinerError::EngineError("Engine stdout unavailable".into()))?;

        let task = tokio::spawn(pump_reports(stdin, stdout, payload, reports));

        Ok(Box::new(ProcessHandle { child, task }))
    }
}

/// Feeds the payload to the engine and forwards its output lines
async fn pump_reports(
    mut stdin: ChildStdin,
    stdout: tokio::process::ChildStdout,
    payload: String,
    reports: ReportSender,
) {
    let index = reports.index();

    if let Err(e) = write_line(&mut stdin, &payload).await {
        let _ = reports.send(WorkerReport::Failed(format!(
            "Worker {} rejected its job: {}",
            index, e
        )));
        return;
    }

    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match WorkerReport::from_line(&line) {
                Some(report) => {
                    if reports.send(report).is_err() {
                        break;
                    }
                }
                None => log::trace!("worker {}: {}", index, line),
            },
            Ok(None) => {
                let _ = reports.send(WorkerReport::Failed(format!("Worker {} exited", index)));
                break;
            }
            Err(e) => {
                let _ = reports.send(WorkerReport::Failed(format!(
                    "Worker {} output error: {}",
                    index, e
                )));
                break;
            }
        }
    }

    // stdin stays open for the engine's lifetime; closing it earlier would
    // read as a shutdown request to some engines
    drop(stdin);
}

async fn write_line(stdin: &mut ChildStdin, payload: &str) -> std::io::Result<()> {
    stdin.write_all(payload.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

struct ProcessHandle {
    child: Child,
    task: JoinHandle<()>,
}

impl EngineHandle for ProcessHandle {
    fn terminate(&mut self) {
        self.task.abort();
        if let Err(e) = self.child.start_kill() {
            log::debug!("Engine already gone: {}", e);
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::miner::worker::WorkerMessage;
    use crate::miner::scheduler::ENGINE_ARG;
    use crate::network::messages::JobTemplate;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn assignment() -> Assignment {
        Assignment {
            algo: AlgorithmType::Ghostrider,
            work: MiningJob {
                extranonce1: "ab12".into(),
                extranonce2_size: 4,
                difficulty: 0.5,
                template: JobTemplate {
                    job_id: "j1".into(),
                    prev_hash: "00".into(),
                    coinb1: "c1".into(),
                    coinb2: "c2".into(),
                    merkle_branch: vec![],
                    version: "20000000".into(),
                    nbits: "1d00ffff".into(),
                    ntime: "5f5e1000".into(),
                    clean_jobs: false,
                },
                nonce: 0,
                arg: ENGINE_ARG.into(),
            },
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<WorkerMessage>) -> WorkerMessage {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for worker report")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn process_engine_round_trip() {
        let script = r#"read payload
case "$payload" in
  *'"algo":"cwm_ghostrider"'*'"jobId":"j1"'*) echo '{"type":"log","message":"payload ok"}' ;;
  *) echo '{"type":"log","message":"payload bad"}' ;;
esac
echo 'warming up'
echo '{"type":"hashrate","value":2}'
"#;
        let engine = ProcessEngine::new("sh", vec!["-c".into(), script.into()]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _handle = engine
            .spawn(&assignment(), ReportSender::new(4, 1, tx))
            .unwrap();

        let first = next(&mut rx).await;
        assert_eq!(first.generation(), 4);
        assert_eq!(first.index(), 1);
        assert_eq!(first.report(), &WorkerReport::Log("payload ok".into()));

        assert_eq!(next(&mut rx).await.report(), &WorkerReport::Throughput(2000.0));
        assert!(matches!(next(&mut rx).await.report(), WorkerReport::Failed(_)));
    }

    #[tokio::test]
    async fn terminated_engine_goes_quiet() {
        let script = "read payload; sleep 1; echo '{\"type\":\"hashrate\",\"value\":1}'";
        let engine = ProcessEngine::new("sh", vec!["-c".into(), script.into()]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut handle = engine
            .spawn(&assignment(), ReportSender::new(1, 0, tx))
            .unwrap();
        handle.terminate();
        drop(handle);

        let result = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        // Either nothing arrives or the channel closes with the aborted task
        assert!(matches!(result, Err(_) | Ok(None)));
    }

    #[tokio::test]
    async fn missing_program_is_an_engine_error() {
        let engine = ProcessEngine::new("/nonexistent/engine-binary", vec![]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = engine.spawn(&assignment(), ReportSender::new(1, 0, tx));
        assert!(matches!(result, Err(MinerError::EngineError(_))));
    }
}

/// In-memory engine recording what the scheduler asked of it
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// A worker started by [`MockEngine`]
    pub(crate) struct Spawned {
        pub assignment: Assignment,
        pub reports: ReportSender,
    }

    #[derive(Default)]
    pub(crate) struct MockState {
        pub spawned: Vec<Spawned>,
        pub terminated: usize,
    }

    /// Engine double; clones share state
    #[derive(Clone, Default)]
    pub(crate) struct MockEngine {
        pub state: Arc<Mutex<MockState>>,
        /// Slot index whose spawn fails
        pub fail_index: Option<usize>,
    }

    impl MockEngine {
        pub fn spawned(&self) -> usize {
            self.state.lock().unwrap().spawned.len()
        }

        pub fn terminated(&self) -> usize {
            self.state.lock().unwrap().terminated
        }

        /// Report sender of the n-th spawned worker overall
        pub fn sender(&self, nth: usize) -> ReportSender {
            self.state.lock().unwrap().spawned[nth].reports.clone()
        }
    }

    struct MockHandle {
        state: Arc<Mutex<MockState>>,
        stopped: bool,
    }

    impl EngineHandle for MockHandle {
        fn terminate(&mut self) {
            if !self.stopped {
                self.stopped = true;
                self.state.lock().unwrap().terminated += 1;
            }
        }
    }

    impl Engine for MockEngine {
        fn spawn(
            &self,
            assignment: &Assignment,
            reports: ReportSender,
        ) -> Result<Box<dyn EngineHandle>, MinerError> {
            if self.fail_index == Some(reports.index()) {
                return Err(MinerError::EngineError("spawn refused".into()));
            }
            self.state.lock().unwrap().spawned.push(Spawned {
                assignment: assignment.clone(),
                reports,
            });
            Ok(Box::new(MockHandle {
                state: self.state.clone(),
                stopped: false,
            }))
        }
    }
}
