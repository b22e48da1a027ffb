use crate::error::CounterError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of metrics tracked for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKey {
    TotalRequests,
    FailedRequests,
    EndpointSleep,
    EndpointInstantA,
    EndpointInstantB,
    EndpointStream,
    EndpointFailing,
    EndpointException,
    Batch,
}

impl CounterKey {
    pub const COUNT: usize = 9;

    pub const ALL: [CounterKey; Self::COUNT] = [
        CounterKey::TotalRequests,
        CounterKey::FailedRequests,
        CounterKey::EndpointSleep,
        CounterKey::EndpointInstantA,
        CounterKey::EndpointInstantB,
        CounterKey::EndpointStream,
        CounterKey::EndpointFailing,
        CounterKey::EndpointException,
        CounterKey::Batch,
    ];

    /// Keys whose sum must equal `TotalRequests` once nothing is in flight.
    pub const ENDPOINTS: [CounterKey; 6] = [
        CounterKey::EndpointSleep,
        CounterKey::EndpointInstantA,
        CounterKey::EndpointInstantB,
        CounterKey::EndpointStream,
        CounterKey::EndpointFailing,
        CounterKey::EndpointException,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKey::TotalRequests => "total_requests",
            CounterKey::FailedRequests => "failed_requests",
            CounterKey::EndpointSleep => "endpoint_sleep",
            CounterKey::EndpointInstantA => "endpoint_instant_a",
            CounterKey::EndpointInstantB => "endpoint_instant_b",
            CounterKey::EndpointStream => "endpoint_stream",
            CounterKey::EndpointFailing => "endpoint_failing",
            CounterKey::EndpointException => "endpoint_exception",
            CounterKey::Batch => "batch",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterKey {
    type Err = CounterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CounterKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CounterError::InvalidKey(s.to_string()))
    }
}

/// Shared outcome tally. Every read and write goes through one lock, so
/// each operation is atomic with respect to every other one.
#[derive(Debug, Default)]
pub struct Counter {
    values: Mutex<[u64; CounterKey::COUNT]>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, key: CounterKey) {
        self.values.lock()[key.index()] += 1;
    }

    /// Name-based increment; unknown names are rejected.
    pub fn increment_named(&self, name: &str) -> Result<(), CounterError> {
        let key = name.parse::<CounterKey>()?;
        self.increment(key);
        Ok(())
    }

    /// Returns the value observed under the lock. With `also_increment`,
    /// the caller gets the pre-increment value and the next caller sees
    /// the bumped one.
    pub fn get_and_maybe_increment(&self, key: CounterKey, also_increment: bool) -> u64 {
        let mut values = self.values.lock();
        let observed = values[key.index()];
        if also_increment {
            values[key.index()] += 1;
        }
        observed
    }

    pub fn get_and_maybe_increment_named(
        &self,
        name: &str,
        also_increment: bool,
    ) -> Result<u64, CounterError> {
        let key = name.parse::<CounterKey>()?;
        Ok(self.get_and_maybe_increment(key, also_increment))
    }

    pub fn get(&self, key: CounterKey) -> u64 {
        self.get_and_maybe_increment(key, false)
    }

    /// Consistent copy of every value, taken under a single lock acquisition.
    pub fn snapshot(&self) -> CounterSnapshot {
        let values = *self.values.lock();
        CounterSnapshot::from_values(values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub endpoint_sleep: u64,
    pub endpoint_instant_a: u64,
    pub endpoint_instant_b: u64,
    pub endpoint_stream: u64,
    pub endpoint_failing: u64,
    pub endpoint_exception: u64,
    pub batch: u64,
}

impl CounterSnapshot {
    fn from_values(values: [u64; CounterKey::COUNT]) -> Self {
        let v = |k: CounterKey| values[k.index()];
        Self {
            total_requests: v(CounterKey::TotalRequests),
            failed_requests: v(CounterKey::FailedRequests),
            endpoint_sleep: v(CounterKey::EndpointSleep),
            endpoint_instant_a: v(CounterKey::EndpointInstantA),
            endpoint_instant_b: v(CounterKey::EndpointInstantB),
            endpoint_stream: v(CounterKey::EndpointStream),
            endpoint_failing: v(CounterKey::EndpointFailing),
            endpoint_exception: v(CounterKey::EndpointException),
            batch: v(CounterKey::Batch),
        }
    }

    pub fn value(&self, key: CounterKey) -> u64 {
        match key {
            CounterKey::TotalRequests => self.total_requests,
            CounterKey::FailedRequests => self.failed_requests,
            CounterKey::EndpointSleep => self.endpoint_sleep,
            CounterKey::EndpointInstantA => self.endpoint_instant_a,
            CounterKey::EndpointInstantB => self.endpoint_instant_b,
            CounterKey::EndpointStream => self.endpoint_stream,
            CounterKey::EndpointFailing => self.endpoint_failing,
            CounterKey::EndpointException => self.endpoint_exception,
            CounterKey::Batch => self.batch,
        }
    }

    pub fn endpoint_sum(&self) -> u64 {
        CounterKey::ENDPOINTS.iter().map(|k| self.value(*k)).sum()
    }

    /// `total_requests` equals the per-endpoint sum and failures never exceed it.
    pub fn is_balanced(&self) -> bool {
        self.total_requests == self.endpoint_sum() && self.failed_requests <= self.total_requests
    }
}
