use crate::driver::{reserve_sequence, EndpointDriver};
use crate::endpoint::{EndpointCatalog, EndpointKind};
use crate::signal::TerminationSignal;
use rand::rngs::StdRng;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

/// Long-running loop that hits one endpoint kind at randomized intervals
/// until the termination signal is observed.
///
/// Cancellation is cooperative: the signal is checked at the top of each
/// iteration, so an in-flight request and the pause after it always finish.
pub struct BackgroundProducer {
    kind: EndpointKind,
    driver: EndpointDriver,
    catalog: EndpointCatalog,
    signal: TerminationSignal,
    min_delay_ms: u64,
    max_delay_ms: u64,
    rng: StdRng,
}

impl BackgroundProducer {
    pub fn new(
        kind: EndpointKind,
        driver: EndpointDriver,
        catalog: EndpointCatalog,
        signal: TerminationSignal,
        delay_ms: (u64, u64),
        rng: StdRng,
    ) -> Self {
        Self {
            kind,
            driver,
            catalog,
            signal,
            min_delay_ms: delay_ms.0,
            max_delay_ms: delay_ms.1,
            rng,
        }
    }

    /// Pause after each request, uniform over the configured range.
    pub fn draw_delay(&mut self) -> Duration {
        Duration::from_millis(self.rng.gen_range(self.min_delay_ms..=self.max_delay_ms))
    }

    /// Runs until stopped; returns the number of requests issued.
    pub async fn run(mut self) -> u64 {
        info!(kind = %self.kind, "background producer started");
        let mut issued = 0u64;

        while !self.signal.is_set() {
            match self.catalog.plan(self.kind, &mut self.rng) {
                Ok(planned) => {
                    let invocation = planned.with_seq(reserve_sequence(self.driver.counter()));
                    self.driver.drive(&invocation).await;
                    issued += 1;
                }
                Err(e) => error!(kind = %self.kind, error = ?e, "failed to plan background request"),
            }

            let delay = self.draw_delay();
            sleep(delay).await;
        }

        info!(kind = %self.kind, issued, "background producer stopped");
        issued
    }
}
