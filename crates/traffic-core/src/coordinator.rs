//! Run lifecycle: start the deadline watch and background producers, run
//! rounds until the termination signal is set, drain, then report.
//!
//! Rounds are strictly sequential. Within a round every invocation runs as
//! its own task and the round ends when the slowest one has finished, which
//! is bounded by the per-request timeout. Nothing in flight is ever aborted;
//! shutdown waits for loops to notice the signal at their next check.

use crate::composer::{Batch, BatchComposer};
use crate::config::Config;
use crate::counter::{Counter, CounterKey};
use crate::driver::EndpointDriver;
use crate::endpoint::{EndpointCatalog, EndpointKind};
use crate::producer::BackgroundProducer;
use crate::progress::ProgressReporter;
use crate::report::{format_elapsed, RunReport};
use crate::sender::RequestSender;
use crate::signal::{StopReason, TerminationSignal};
use anyhow::Result;
use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Initializing,
    Running,
    Draining,
    Reporting,
    Done,
}

pub struct RunCoordinator {
    config: Config,
    counter: Arc<Counter>,
    signal: TerminationSignal,
    driver: EndpointDriver,
    catalog: EndpointCatalog,
    composer: BatchComposer,
    rng: StdRng,
    phase: watch::Sender<RunPhase>,
}

impl RunCoordinator {
    pub fn new(config: Config, sender: Arc<dyn RequestSender>) -> Result<Self> {
        config.validate()?;

        let counter = Arc::new(Counter::new());
        let driver = EndpointDriver::new(sender, Arc::clone(&counter));
        let catalog = EndpointCatalog::new(&config.target.base_url, config.endpoints.clone())?;

        let mut rng = match config.run.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let composer = BatchComposer::new(
            catalog.clone(),
            config.target.profile,
            config.run.max_batch_size,
            StdRng::seed_from_u64(rng.gen()),
        );
        let (phase, _) = watch::channel(RunPhase::Initializing);

        Ok(Self {
            config,
            counter,
            signal: TerminationSignal::new(),
            driver,
            catalog,
            composer,
            rng,
            phase,
        })
    }

    pub fn counter(&self) -> Arc<Counter> {
        Arc::clone(&self.counter)
    }

    /// Handle for stopping the run from outside, same path as the deadline.
    pub fn signal(&self) -> TerminationSignal {
        self.signal.clone()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: RunPhase) {
        info!(?phase, "run phase");
        self.phase.send_replace(phase);
    }

    /// Runs to completion. `interrupt` resolving (e.g. Ctrl-C) stops the run
    /// exactly like the deadline does; the report is produced either way.
    pub async fn run<I>(mut self, interrupt: I) -> Result<RunReport>
    where
        I: Future<Output = ()> + Send + 'static,
    {
        self.enter(RunPhase::Initializing);
        let start_time = Local::now();
        let started = Instant::now();
        info!(
            base_url = %self.catalog.base(),
            sender = self.driver.sender_name(),
            profile = ?self.config.target.profile,
            duration_s = self.config.run.duration_secs,
            "starting traffic run"
        );

        let deadline = tokio::spawn(watch_deadline(
            self.config.run_duration(),
            interrupt,
            self.signal.clone(),
        ));
        let mut background = self.spawn_background();

        self.enter(RunPhase::Running);
        self.batch_loop(started).await;

        self.enter(RunPhase::Draining);
        // Only still pending when the signal was set from outside.
        deadline.abort();
        self.drain(&mut background).await;

        self.enter(RunPhase::Reporting);
        let report = RunReport::capture(&self.counter, start_time, self.signal.reason());
        self.emit(&report);

        self.enter(RunPhase::Done);
        Ok(report)
    }

    fn spawn_background(&mut self) -> JoinSet<(&'static str, u64)> {
        let mut set = JoinSet::new();

        if self.config.background.enabled {
            let delay = (
                self.config.background.min_delay_ms,
                self.config.background.max_delay_ms,
            );
            for kind in [EndpointKind::Failing, EndpointKind::Exception] {
                let producer = BackgroundProducer::new(
                    kind,
                    self.driver.clone(),
                    self.catalog.clone(),
                    self.signal.clone(),
                    delay,
                    StdRng::seed_from_u64(self.rng.gen()),
                );
                set.spawn(async move { (kind.label(), producer.run().await) });
            }
        }

        let reporter = ProgressReporter::new(
            self.counter(),
            self.signal.clone(),
            self.config.progress.mode,
            Duration::from_millis(self.config.progress.tick_ms),
            self.config.run_duration(),
        );
        set.spawn(async move { ("progress", reporter.run().await) });

        set
    }

    async fn batch_loop(&mut self, started: Instant) {
        let pause = Duration::from_millis(self.config.run.round_pause_ms);

        while !self.signal.is_set() {
            match self.composer.compose_round(&self.counter) {
                Ok(batch) => {
                    let size = batch.len();
                    dispatch_round(&self.driver, batch).await;
                    self.counter.increment(CounterKey::Batch);
                    info!(
                        round = self.counter.get(CounterKey::Batch),
                        requests = size,
                        total = self.counter.get(CounterKey::TotalRequests),
                        elapsed = %format_elapsed(started.elapsed()),
                        "round completed"
                    );
                }
                Err(e) => {
                    error!(round = self.counter.get(CounterKey::Batch), error = ?e, "round composition failed");
                }
            }

            sleep(pause).await;
        }

        info!("termination signal observed, leaving batch loop");
    }

    async fn drain(&self, background: &mut JoinSet<(&'static str, u64)>) {
        let grace = self.config.shutdown_grace();
        let joined = timeout(grace, async {
            while let Some(res) = background.join_next().await {
                match res {
                    Ok((name, count)) => info!(task = name, count, "background task finished"),
                    Err(e) => error!(error = %e, "background task failed"),
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                grace_ms = grace.as_millis() as u64,
                remaining = background.len(),
                "background tasks still running; reporting without them"
            );
            background.detach_all();
        }
    }

    fn emit(&self, report: &RunReport) {
        report.log();

        if let Err(e) = report.append_to(&self.config.report.path) {
            error!(error = ?e, "failed to append run report");
        } else {
            info!(path = ?self.config.report.path, "run report appended");
        }

        if let Some(dir) = &self.config.report.json_dir {
            match report.write_json(dir) {
                Ok(path) => info!(path = ?path, "json summary written"),
                Err(e) => error!(error = ?e, "failed to write json summary"),
            }
        }
    }
}

/// Sets the signal when the run duration elapses or `interrupt` resolves,
/// whichever comes first.
async fn watch_deadline<I>(duration: Duration, interrupt: I, signal: TerminationSignal)
where
    I: Future<Output = ()> + Send,
{
    info!(duration_s = duration.as_secs(), "deadline timer started");
    tokio::select! {
        _ = sleep(duration) => {
            if signal.trigger(StopReason::Deadline) {
                info!("deadline reached, stopping after the current round");
            }
        }
        _ = interrupt => {
            if signal.trigger(StopReason::Interrupt) {
                warn!("interrupt received, stopping after the current round");
            }
        }
    }
}

/// Fans a round out as one task per invocation and waits for all of them.
/// Returns how many finished without panicking.
pub async fn dispatch_round(driver: &EndpointDriver, batch: Batch) -> usize {
    let mut set = JoinSet::new();
    for invocation in batch.invocations {
        let driver = driver.clone();
        set.spawn(async move { driver.drive(&invocation).await });
    }

    let mut finished = 0;
    while let Some(res) = set.join_next().await {
        match res {
            Ok(_) => finished += 1,
            Err(e) => error!(error = %e, "request task panicked"),
        }
    }
    finished
}
