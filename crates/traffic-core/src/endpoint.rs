use crate::config::EndpointPaths;
use crate::counter::CounterKey;
use crate::error::ConfigError;
use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Categories of target-service operation this generator exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Sleep,
    InstantA,
    InstantB,
    Stream,
    Failing,
    Exception,
}

impl EndpointKind {
    pub fn counter_key(self) -> CounterKey {
        match self {
            EndpointKind::Sleep => CounterKey::EndpointSleep,
            EndpointKind::InstantA => CounterKey::EndpointInstantA,
            EndpointKind::InstantB => CounterKey::EndpointInstantB,
            EndpointKind::Stream => CounterKey::EndpointStream,
            EndpointKind::Failing => CounterKey::EndpointFailing,
            EndpointKind::Exception => CounterKey::EndpointException,
        }
    }

    pub fn method_policy(self) -> MethodPolicy {
        match self {
            EndpointKind::InstantA | EndpointKind::InstantB | EndpointKind::Stream => {
                MethodPolicy::MostlyGet
            }
            EndpointKind::Sleep | EndpointKind::Failing | EndpointKind::Exception => {
                MethodPolicy::GetOnly
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EndpointKind::Sleep => "sleep",
            EndpointKind::InstantA => "instant_a",
            EndpointKind::InstantB => "instant_b",
            EndpointKind::Stream => "stream",
            EndpointKind::Failing => "failing",
            EndpointKind::Exception => "exception",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodPolicy {
    GetOnly,
    /// Four GETs to one POST.
    MostlyGet,
}

const MOSTLY_GET: [Method; 5] = [Method::Get, Method::Post, Method::Get, Method::Get, Method::Get];

impl MethodPolicy {
    pub fn choose<R: Rng + ?Sized>(self, rng: &mut R) -> Method {
        match self {
            MethodPolicy::GetOnly => Method::Get,
            MethodPolicy::MostlyGet => *MOSTLY_GET.choose(rng).unwrap_or(&Method::Get),
        }
    }
}

/// Which kinds make up each round of the batch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Sleep plus two instant endpoints.
    #[default]
    Classic,
    /// Sleep, one instant endpoint and the throttled stream endpoint.
    Stream,
}

impl Profile {
    pub fn batched_kinds(self) -> [EndpointKind; 3] {
        match self {
            Profile::Classic => [
                EndpointKind::Sleep,
                EndpointKind::InstantA,
                EndpointKind::InstantB,
            ],
            Profile::Stream => [
                EndpointKind::Sleep,
                EndpointKind::InstantA,
                EndpointKind::Stream,
            ],
        }
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classic" => Ok(Profile::Classic),
            "stream" => Ok(Profile::Stream),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }
}

/// Delay for the sleep endpoint, in hundredths of a second, within [0, 200].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepDelay(u32);

impl SleepDelay {
    pub const MAX_CENTIS: u32 = 200;

    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_range(0..=Self::MAX_CENTIS))
    }

    pub fn from_centis(centis: u32) -> Self {
        Self(centis.min(Self::MAX_CENTIS))
    }

    pub fn as_secs_f64(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl fmt::Display for SleepDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

pub const STREAM_CHUNK_KB: [u32; 6] = [256, 512, 1024, 2048, 4096, 8192];
pub const STREAM_BYTES_PER_SEC: [u64; 4] = [
    3 * 1024 * 1024,
    5 * 1024 * 1024,
    7 * 1024 * 1024,
    10 * 1024 * 1024,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub size_mb: u32,
    pub chunk_kb: u32,
    pub bytes_per_sec: u64,
}

impl StreamParams {
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            size_mb: rng.gen_range(1..=10),
            chunk_kb: *STREAM_CHUNK_KB.choose(rng).unwrap_or(&STREAM_CHUNK_KB[0]),
            bytes_per_sec: *STREAM_BYTES_PER_SEC
                .choose(rng)
                .unwrap_or(&STREAM_BYTES_PER_SEC[0]),
        }
    }
}

/// One fully-resolved request: everything random has already been drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub seq: u64,
    pub kind: EndpointKind,
    pub method: Method,
    pub url: Url,
}

impl Invocation {
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }
}

/// Base URL plus per-kind paths; turns a kind and an RNG into a request.
#[derive(Debug, Clone)]
pub struct EndpointCatalog {
    base: Url,
    paths: EndpointPaths,
}

impl EndpointCatalog {
    pub fn new(base_url: &str, paths: EndpointPaths) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Failed to parse target base url: {base_url}"))?;
        Ok(Self { base, paths })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Draws method and parameters for `kind` and builds the request. The
    /// sequence number is left at zero until the request is reserved.
    pub fn plan<R: Rng + ?Sized>(&self, kind: EndpointKind, rng: &mut R) -> Result<Invocation> {
        let method = kind.method_policy().choose(rng);
        let url = match kind {
            EndpointKind::Sleep => {
                let delay = SleepDelay::sample(rng);
                self.join(&format!("{}/{}", self.paths.sleep.trim_end_matches('/'), delay))?
            }
            EndpointKind::InstantA => self.join(&self.paths.instant_a)?,
            EndpointKind::InstantB => self.join(&self.paths.instant_b)?,
            EndpointKind::Stream => {
                let p = StreamParams::sample(rng);
                let mut url = self.join(&self.paths.stream)?;
                url.query_pairs_mut()
                    .append_pair("sizeMb", &p.size_mb.to_string())
                    .append_pair("chunkKb", &p.chunk_kb.to_string())
                    .append_pair("bytesPerSec", &p.bytes_per_sec.to_string());
                url
            }
            EndpointKind::Failing => self.join(&self.paths.failing)?,
            EndpointKind::Exception => self.join(&self.paths.exception)?,
        };

        Ok(Invocation {
            seq: 0,
            kind,
            method,
            url,
        })
    }

    fn join(&self, path: &str) -> Result<Url> {
        // Keep any path prefix on the base (e.g. http://host/api/).
        let mut base = self.base.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/'))
            .with_context(|| format!("Failed to join '{path}' onto {}", self.base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn catalog() -> EndpointCatalog {
        EndpointCatalog::new("http://localhost:5050", EndpointPaths::default()).unwrap()
    }

    #[test]
    fn test_sleep_delay_has_two_decimals_and_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..5_000 {
            let delay = SleepDelay::sample(&mut rng);
            let text = delay.to_string();
            let (whole, frac) = text.split_once('.').expect("decimal point");
            assert_eq!(frac.len(), 2, "{text}");
            assert!(whole.chars().all(|c| c.is_ascii_digit()));
            let secs = delay.as_secs_f64();
            assert!((0.0..=2.0).contains(&secs), "{text}");
        }

        assert_eq!(SleepDelay::from_centis(0).to_string(), "0.00");
        assert_eq!(SleepDelay::from_centis(5).to_string(), "0.05");
        assert_eq!(SleepDelay::from_centis(150).to_string(), "1.50");
        assert_eq!(SleepDelay::from_centis(999).to_string(), "2.00");
    }

    #[test]
    fn test_method_policy_ratio() {
        let mut rng = StdRng::seed_from_u64(3);
        let posts = (0..10_000)
            .filter(|_| MethodPolicy::MostlyGet.choose(&mut rng) == Method::Post)
            .count();
        assert!((1_700..=2_300).contains(&posts), "posts: {}", posts);

        assert!((0..100).all(|_| MethodPolicy::GetOnly.choose(&mut rng) == Method::Get));
    }

    #[test]
    fn test_plan_builds_expected_urls() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(5);

        let sleep = catalog.plan(EndpointKind::Sleep, &mut rng).unwrap().with_seq(7);
        assert_eq!(sleep.seq, 7);
        assert_eq!(sleep.method, Method::Get);
        assert!(sleep.url.path().starts_with("/sleep/"));

        let fail = catalog.plan(EndpointKind::Failing, &mut rng).unwrap();
        assert_eq!(fail.url.as_str(), "http://localhost:5050/fail-request");
        assert_eq!(fail.method, Method::Get);

        let exc = catalog.plan(EndpointKind::Exception, &mut rng).unwrap();
        assert_eq!(exc.url.as_str(), "http://localhost:5050/raise-exception");

        let a = catalog.plan(EndpointKind::InstantA, &mut rng).unwrap();
        assert_eq!(a.url.path(), "/test1");
        let b = catalog.plan(EndpointKind::InstantB, &mut rng).unwrap();
        assert_eq!(b.url.path(), "/test2");
    }

    #[test]
    fn test_stream_params_come_from_fixed_sets() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(9);

        for _ in 0..200 {
            let inv = catalog.plan(EndpointKind::Stream, &mut rng).unwrap();
            assert_eq!(inv.url.path(), "/stream");
            let pairs: std::collections::HashMap<String, String> =
                inv.url.query_pairs().into_owned().collect();

            let size: u32 = pairs["sizeMb"].parse().unwrap();
            let chunk: u32 = pairs["chunkKb"].parse().unwrap();
            let rate: u64 = pairs["bytesPerSec"].parse().unwrap();
            assert!((1..=10).contains(&size));
            assert!(STREAM_CHUNK_KB.contains(&chunk));
            assert!(STREAM_BYTES_PER_SEC.contains(&rate));
        }
    }

    #[test]
    fn test_base_path_prefix_is_kept() {
        let catalog =
            EndpointCatalog::new("http://example.test/api", EndpointPaths::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let inv = catalog.plan(EndpointKind::Failing, &mut rng).unwrap();
        assert_eq!(inv.url.as_str(), "http://example.test/api/fail-request");
    }

    #[test]
    fn test_profiles_pick_three_kinds() {
        assert!(Profile::Classic
            .batched_kinds()
            .contains(&EndpointKind::InstantB));
        assert!(Profile::Stream.batched_kinds().contains(&EndpointKind::Stream));
        assert!(!Profile::Stream
            .batched_kinds()
            .contains(&EndpointKind::InstantB));
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("Stream".parse::<Profile>().unwrap(), Profile::Stream);
        assert_eq!(
            "bursty".parse::<Profile>(),
            Err(ConfigError::UnknownProfile("bursty".into()))
        );
    }

    #[test]
    fn test_catalog_rejects_bad_base_url() {
        assert!(EndpointCatalog::new("not a url", EndpointPaths::default()).is_err());
    }
}
