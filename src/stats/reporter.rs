// src/stats/reporter.rs
use crate::session::{SessionEvent, Status};
use crate::stats::aggregator::MiningStats;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::Write;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use sysinfo::{Components, System};

/// How often CPU usage and temperature are logged
const HARDWARE_INTERVAL: Duration = Duration::from_secs(60);

/// Statistics related to hardware performance
#[derive(Debug, Clone)]
pub struct HardwareStats {
    /// Current CPU usage percentage (0-100)
    pub cpu_usage: f32,
    /// Memory currently in use (in bytes)
    pub memory_used: u64,
    /// Current CPU temperature in Celsius
    pub temperature: f32,
}

/// What the status line shows
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    /// Session status
    pub status: Status,
    /// Latest counters
    pub stats: MiningStats,
}

impl Default for StatusLine {
    fn default() -> Self {
        StatusLine {
            status: Status::Idle,
            stats: MiningStats::default(),
        }
    }
}

impl StatusLine {
    /// Folds one event into the display state
    ///
    /// Returns the message to log, for events that deserve a line of
    /// their own.
    pub fn apply(&mut self, event: SessionEvent) -> Option<String> {
        match event {
            SessionEvent::Status(status) => {
                self.status = status;
                None
            }
            SessionEvent::Hashrate(rate) => {
                self.stats.hashrate = rate;
                None
            }
            SessionEvent::Stats(stats) => {
                self.stats = stats;
                None
            }
            SessionEvent::Accepted(count) => {
                self.stats.accepted = count;
                None
            }
            SessionEvent::Rejected(count) => {
                self.stats.rejected = count;
                None
            }
            SessionEvent::Error(message) => Some(format!("Error: {}", message)),
            SessionEvent::Closed => Some("Connection closed".to_owned()),
            SessionEvent::Connected
            | SessionEvent::Subscribed(_)
            | SessionEvent::DifficultyChanged(_)
            | SessionEvent::NewJob { .. }
            | SessionEvent::ShareSubmitted(_)
            | SessionEvent::WorkerLog { .. } => None,
        }
    }

    /// One-line summary
    pub fn line(&self) -> String {
        format!(
            "Status: {} | Hashrate: {} | Accepted: {} | Rejected: {}",
            self.status,
            format_hashrate(self.stats.hashrate),
            self.stats.accepted,
            self.stats.rejected
        )
    }
}

/// Formats a rate in H/s with a readable unit
pub fn format_hashrate(rate: f64) -> String {
    if rate >= 1_000_000.0 {
        format!("{:.2} MH/s", rate / 1_000_000.0)
    } else if rate >= 1_000.0 {
        format!("{:.2} kH/s", rate / 1_000.0)
    } else {
        format!("{:.2} H/s", rate)
    }
}

/// Renders session events for the operator
///
/// Runs on its own thread and exits once every event sender is gone.
pub struct StatsReporter {
    /// Event source
    events: Receiver<SessionEvent>,
    /// Status line refresh interval
    report_interval: Duration,
    /// Current line contents
    display: StatusLine,
    /// System information collector
    system: System,
    /// Hardware component information collector
    components: Components,
}

impl StatsReporter {
    /// Creates a reporter reading from `events`
    ///
    /// # Arguments
    /// * `events` - Receiving end of the session event channel
    /// * `report_interval` - How often the status line is redrawn
    pub fn new(events: Receiver<SessionEvent>, report_interval: Duration) -> Self {
        StatsReporter {
            events,
            report_interval: report_interval.max(Duration::from_millis(100)),
            display: StatusLine::default(),
            system: System::new_all(),
            components: Components::new_with_refreshed_list(),
        }
    }

    /// Current display state
    pub fn display(&self) -> &StatusLine {
        &self.display
    }

    /// Gets the current hardware statistics
    ///
    /// This refreshes system information before returning the stats.
    pub fn get_hardware_stats(&mut self) -> HardwareStats {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.components.refresh(true);

        let cpus = self.system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let temperature = self
            .components
            .iter()
            .find(|c| c.label().contains("CPU"))
            .and_then(|c| c.temperature())
            .unwrap_or(0.0);

        HardwareStats {
            cpu_usage,
            memory_used: self.system.used_memory(),
            temperature,
        }
    }

    /// Starts the reporter on a background thread
    pub fn start_reporting(self) -> JoinHandle<()> {
        std::thread::spawn(move || self.run())
    }

    fn run(mut self) {
        let mut next_draw = Instant::now() + self.report_interval;
        let mut next_hardware = Instant::now() + HARDWARE_INTERVAL;

        loop {
            let timeout = next_draw.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(timeout) {
                Ok(event) => {
                    if let Some(message) = self.display.apply(event) {
                        clear_line();
                        log::warn!("{}", message);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    draw(&self.display.line());
                    next_draw = Instant::now() + self.report_interval;

                    if Instant::now() >= next_hardware {
                        let hw = self.get_hardware_stats();
                        clear_line();
                        log::info!(
                            "CPU: {:.1}% | Memory: {} MiB | Temp: {:.1}°C",
                            hw.cpu_usage,
                            hw.memory_used / (1024 * 1024),
                            hw.temperature
                        );
                        next_hardware = Instant::now() + HARDWARE_INTERVAL;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        clear_line();
        log::info!("{}", self.display().line());
    }
}

fn draw(line: &str) {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "\r\x1b[2K{}", line);
    let _ = out.flush();
}

fn clear_line() {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "\r\x1b[2K");
    let _ = out.flush();
}
