use crate::counter::{Counter, CounterSnapshot};
use crate::signal::StopReason;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SEPARATOR: &str = "======================================================";

/// Final tally of one run, as written to the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub log_time: DateTime<Local>,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub elapsed_ms: u64,
    pub stop_reason: Option<StopReason>,
    pub counts: CounterSnapshot,
}

impl RunReport {
    /// Reads every counter value at once; the run's end is "now".
    pub fn capture(
        counter: &Counter,
        start_time: DateTime<Local>,
        stop_reason: Option<StopReason>,
    ) -> Self {
        let counts = counter.snapshot();
        let end_time = Local::now();
        let elapsed_ms = (end_time - start_time).num_milliseconds().max(0) as u64;

        Self {
            log_time: end_time,
            start_time,
            end_time,
            elapsed_ms,
            stop_reason,
            counts,
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// `Name: value` lines for every counter, in a fixed order.
    pub fn counter_lines(&self) -> Vec<String> {
        let c = &self.counts;
        vec![
            format!("Total Batches: {}", c.batch),
            format!("Total Requests: {}", c.total_requests),
            format!("Failed Requests: {}", c.failed_requests),
            format!("Endpoint Sleep Requests: {}", c.endpoint_sleep),
            format!("Endpoint Instant A Requests: {}", c.endpoint_instant_a),
            format!("Endpoint Instant B Requests: {}", c.endpoint_instant_b),
            format!("Endpoint Stream Requests: {}", c.endpoint_stream),
            format!("Endpoint Fail Requests: {}", c.endpoint_failing),
            format!("Endpoint Exception Requests: {}", c.endpoint_exception),
        ]
    }

    /// Every line of the report block, separator first. Shared by the run
    /// log and the tracing output.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            SEPARATOR.to_string(),
            format!("# Log Time: {}", self.log_time.format(TIME_FORMAT)),
            format!("Start Time: {}", self.start_time.format(TIME_FORMAT)),
            format!("End Time: {}", self.end_time.format(TIME_FORMAT)),
            format!("Elapsed Time: {}", format_elapsed(self.elapsed())),
        ];
        if let Some(reason) = self.stop_reason {
            lines.push(format!("Stop Reason: {}", reason));
        }
        lines.extend(self.counter_lines());
        lines
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in self.lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out.push('\n');
        out
    }

    /// Appends the rendered block; the file is created if missing and never truncated.
    pub fn append_to(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open report file {:?}", path))?;
        file.write_all(self.render().as_bytes())
            .with_context(|| format!("Failed to append report to {:?}", path))?;
        Ok(())
    }

    pub fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create results dir {:?}", dir))?;
        let name = format!("run_{}.json", self.end_time.format("%Y%m%d_%H%M%S"));
        let path = dir.join(name);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    pub fn log(&self) {
        for line in self.lines() {
            info!("{}", line);
        }
    }
}

/// `H:MM:SS`, fractional seconds dropped; hours are not wrapped at 24.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
