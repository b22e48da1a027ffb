use crate::counter::{Counter, CounterSnapshot};
use crate::error::ConfigError;
use crate::signal::TerminationSignal;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMode {
    /// Terminal progress bar; hidden automatically when stderr is not a tty
    #[default]
    Bar,
    /// Periodic tracing line
    Log,
    Off,
}

impl FromStr for ProgressMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bar" => Ok(ProgressMode::Bar),
            "log" => Ok(ProgressMode::Log),
            "off" | "none" => Ok(ProgressMode::Off),
            other => Err(ConfigError::UnknownProgressMode(other.to_string())),
        }
    }
}

/// One-line rendering of a snapshot for bars and log lines.
pub fn describe(snapshot: &CounterSnapshot) -> String {
    format!(
        "batches={} total={} failed={} sleep={} instant_a={} instant_b={} stream={} fail={} exception={}",
        snapshot.batch,
        snapshot.total_requests,
        snapshot.failed_requests,
        snapshot.endpoint_sleep,
        snapshot.endpoint_instant_a,
        snapshot.endpoint_instant_b,
        snapshot.endpoint_stream,
        snapshot.endpoint_failing,
        snapshot.endpoint_exception,
    )
}

/// Samples the counter every tick and renders it until the run stops.
pub struct ProgressReporter {
    counter: Arc<Counter>,
    signal: TerminationSignal,
    mode: ProgressMode,
    tick: Duration,
    total: Duration,
}

impl ProgressReporter {
    pub fn new(
        counter: Arc<Counter>,
        signal: TerminationSignal,
        mode: ProgressMode,
        tick: Duration,
        total: Duration,
    ) -> Self {
        Self {
            counter,
            signal,
            mode,
            tick,
            total,
        }
    }

    /// Returns the number of ticks rendered.
    pub async fn run(self) -> u64 {
        let bar = match self.mode {
            ProgressMode::Off => return 0,
            ProgressMode::Bar => Some(self.progress_bar()),
            ProgressMode::Log => None,
        };

        let start = Instant::now();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut ticks = 0u64;

        loop {
            ticker.tick().await;
            if self.signal.is_set() {
                break;
            }

            let snapshot = self.counter.snapshot();
            let elapsed = start.elapsed().min(self.total);
            match &bar {
                Some(pb) => {
                    pb.set_position(elapsed.as_secs());
                    pb.set_message(describe(&snapshot));
                }
                None => info!(elapsed_s = elapsed.as_secs(), "progress: {}", describe(&snapshot)),
            }
            ticks += 1;
        }

        if let Some(pb) = bar {
            pb.finish_with_message(describe(&self.counter.snapshot()));
        }
        ticks
    }

    fn progress_bar(&self) -> ProgressBar {
        let pb = ProgressBar::new(self.total.as_secs());
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len}s (eta {eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb
    }
}
