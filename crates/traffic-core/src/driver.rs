use crate::counter::{Counter, CounterKey};
use crate::endpoint::Invocation;
use crate::sender::RequestSender;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to one invocation, after it has been folded into the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The exchange completed; any status counts, error endpoints included.
    Completed { status: u16, latency_ms: u64 },
    /// Timeout, refused or reset connection, broken body.
    TransportFailed,
}

/// Reserves the next request number. The reservation is the request's
/// `total_requests` increment; the driver records the rest of the outcome.
pub fn reserve_sequence(counter: &Counter) -> u64 {
    counter.get_and_maybe_increment(CounterKey::TotalRequests, true)
}

/// Executes invocations of any endpoint kind and records their outcomes.
/// Cheap to clone; clones share the sender and the counter.
#[derive(Clone)]
pub struct EndpointDriver {
    sender: Arc<dyn RequestSender>,
    counter: Arc<Counter>,
}

impl EndpointDriver {
    pub fn new(sender: Arc<dyn RequestSender>, counter: Arc<Counter>) -> Self {
        Self { sender, counter }
    }

    pub fn counter(&self) -> &Arc<Counter> {
        &self.counter
    }

    pub fn sender_name(&self) -> &'static str {
        self.sender.name()
    }

    /// Issues exactly one request. Never fails: transport errors become a
    /// `failed_requests` increment, and the kind counter is bumped either way.
    pub async fn drive(&self, invocation: &Invocation) -> Outcome {
        let outcome = match self.sender.send(invocation).await {
            Ok(response) => {
                debug!(
                    seq = invocation.seq,
                    kind = %invocation.kind,
                    method = %invocation.method,
                    status = response.status,
                    latency_ms = response.latency_ms,
                    "request completed"
                );
                Outcome::Completed {
                    status: response.status,
                    latency_ms: response.latency_ms,
                }
            }
            Err(e) => {
                warn!(
                    seq = invocation.seq,
                    kind = %invocation.kind,
                    method = %invocation.method,
                    url = %invocation.url,
                    error = %e,
                    "request failed"
                );
                self.counter.increment(CounterKey::FailedRequests);
                Outcome::TransportFailed
            }
        };

        self.counter.increment(invocation.kind.counter_key());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointPaths;
    use crate::endpoint::{EndpointCatalog, EndpointKind};
    use crate::sender::MockSender;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup(sender: MockSender) -> (EndpointDriver, EndpointCatalog, StdRng) {
        let counter = Arc::new(Counter::new());
        let driver = EndpointDriver::new(Arc::new(sender), counter);
        let catalog =
            EndpointCatalog::new("http://localhost:5050", EndpointPaths::default()).unwrap();
        (driver, catalog, StdRng::seed_from_u64(21))
    }

    #[tokio::test]
    async fn test_error_endpoints_count_as_normal_outcomes() {
        let (driver, catalog, mut rng) = setup(MockSender::new(0));

        for kind in [EndpointKind::Failing, EndpointKind::Exception] {
            let inv = catalog.plan(kind, &mut rng).unwrap();
            let inv = inv.with_seq(reserve_sequence(driver.counter()));
            let outcome = driver.drive(&inv).await;
            assert!(matches!(outcome, Outcome::Completed { status, .. } if status >= 400));
        }

        let snap = driver.counter().snapshot();
        assert_eq!(snap.failed_requests, 0);
        assert_eq!(snap.endpoint_failing, 1);
        assert_eq!(snap.endpoint_exception, 1);
        assert_eq!(snap.total_requests, 2);
        assert!(snap.is_balanced());
    }

    #[tokio::test]
    async fn test_transport_failure_is_folded_into_counters() {
        let (driver, catalog, mut rng) = setup(MockSender::failing(0));

        let inv = catalog.plan(EndpointKind::Sleep, &mut rng).unwrap();
        let inv = inv.with_seq(reserve_sequence(driver.counter()));
        assert_eq!(driver.drive(&inv).await, Outcome::TransportFailed);

        let snap = driver.counter().snapshot();
        assert_eq!(snap.failed_requests, 1);
        assert_eq!(snap.endpoint_sleep, 1);
        assert_eq!(snap.total_requests, 1);
        assert!(snap.is_balanced());
    }

    #[test]
    fn test_reserve_sequence_bumps_total() {
        let counter = Counter::new();
        assert_eq!(reserve_sequence(&counter), 0);
        assert_eq!(reserve_sequence(&counter), 1);
        assert_eq!(counter.get(CounterKey::TotalRequests), 2);
    }
}
