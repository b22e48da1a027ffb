use crate::counter::Counter;
use crate::driver::reserve_sequence;
use crate::endpoint::{EndpointCatalog, EndpointKind, Invocation, Profile};
use anyhow::Result;
use rand::rngs::StdRng;
use rand::Rng;
use tracing::info;

/// One round's worth of pending invocations. Lives for a single round.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub invocations: Vec<Invocation>,
    /// Per-kind sizes drawn for this round, in composition order
    pub sizes: Vec<(EndpointKind, usize)>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }
}

/// Draws independent per-kind batch sizes and resolves each unit into an
/// invocation with its own sequence number.
pub struct BatchComposer {
    catalog: EndpointCatalog,
    profile: Profile,
    max_batch_size: u32,
    rng: StdRng,
}

impl BatchComposer {
    pub fn new(catalog: EndpointCatalog, profile: Profile, max_batch_size: u32, rng: StdRng) -> Self {
        Self {
            catalog,
            profile,
            max_batch_size,
            rng,
        }
    }

    /// Uniform over [0, max_batch_size].
    pub fn draw_batch_size(&mut self) -> usize {
        self.rng.gen_range(0..=self.max_batch_size) as usize
    }

    /// Plans every invocation first and only then reserves sequence numbers,
    /// so a failed composition leaves the counter untouched.
    pub fn compose_round(&mut self, counter: &Counter) -> Result<Batch> {
        let mut planned = Vec::new();
        let mut sizes = Vec::with_capacity(3);

        for kind in self.profile.batched_kinds() {
            let size = self.draw_batch_size();
            info!(kind = %kind, size, "composing batch");

            for _ in 0..size {
                planned.push(self.catalog.plan(kind, &mut self.rng)?);
            }
            sizes.push((kind, size));
        }

        let invocations = planned
            .into_iter()
            .map(|inv| inv.with_seq(reserve_sequence(counter)))
            .collect();

        Ok(Batch { invocations, sizes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointPaths;
    use crate::counter::CounterKey;
    use rand::SeedableRng;

    fn composer(seed: u64) -> BatchComposer {
        let catalog =
            EndpointCatalog::new("http://localhost:5050", EndpointPaths::default()).unwrap();
        BatchComposer::new(catalog, Profile::Classic, 14, StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_batch_sizes_are_uniform_over_zero_to_fourteen() {
        let mut composer = composer(7);
        let mut histogram = [0usize; 15];

        for _ in 0..10_000 {
            let size = composer.draw_batch_size();
            assert!(size <= 14, "size out of range: {}", size);
            histogram[size] += 1;
        }

        // Expected ~667 per bucket; sd ~25.
        for (size, count) in histogram.iter().enumerate() {
            assert!(
                (540..=800).contains(count),
                "bucket {} has {} draws",
                size,
                count
            );
        }
    }

    #[test]
    fn test_compose_round_reserves_one_sequence_per_invocation() {
        let mut composer = composer(99);
        let counter = Counter::new();

        let batch = composer.compose_round(&counter).unwrap();
        let expected: usize = batch.sizes.iter().map(|(_, n)| n).sum();

        assert_eq!(batch.len(), expected);
        assert!(batch.len() <= 42);
        assert_eq!(counter.get(CounterKey::TotalRequests), batch.len() as u64);

        let seqs: Vec<u64> = batch.invocations.iter().map(|i| i.seq).collect();
        assert_eq!(seqs, (0..batch.len() as u64).collect::<Vec<_>>());
    }

    #[test]
    fn test_compose_round_uses_profile_kinds() {
        let mut composer = composer(4);
        let counter = Counter::new();

        for _ in 0..20 {
            let batch = composer.compose_round(&counter).unwrap();
            let kinds: Vec<EndpointKind> = batch.sizes.iter().map(|(k, _)| *k).collect();
            assert_eq!(kinds, Profile::Classic.batched_kinds().to_vec());

            for (kind, size) in &batch.sizes {
                let n = batch.invocations.iter().filter(|i| i.kind == *kind).count();
                assert_eq!(n, *size);
            }
        }
    }

    #[test]
    fn test_same_seed_same_round() {
        let counter_a = Counter::new();
        let counter_b = Counter::new();
        let a = composer(1234).compose_round(&counter_a).unwrap();
        let b = composer(1234).compose_round(&counter_b).unwrap();
        assert_eq!(a.invocations, b.invocations);
    }
}
