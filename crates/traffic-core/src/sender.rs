use crate::endpoint::{Invocation, Method};
use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Outcome of one completed HTTP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub latency_ms: u64,
}

pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'a>>;

/// Trait for request transport adapters. An `Err` means the exchange could
/// not be completed (timeout, connect, reset); any HTTP status is `Ok`.
pub trait RequestSender: Send + Sync {
    fn name(&self) -> &'static str;

    fn send<'a>(&'a self, invocation: &'a Invocation) -> SendFuture<'a>;
}

/// Mock sender for testing and dry runs (configurable delay, optional failure)
pub struct MockSender {
    delay: Duration,
    fail: AtomicBool,
}

impl MockSender {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            fail: AtomicBool::new(false),
        }
    }

    /// A sender whose every exchange fails at the transport level.
    pub fn failing(delay_ms: u64) -> Self {
        let sender = Self::new(delay_ms);
        sender.set_failing(true);
        sender
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
}

impl RequestSender for MockSender {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn send<'a>(&'a self, invocation: &'a Invocation) -> SendFuture<'a> {
        Box::pin(async move {
            sleep(self.delay).await;

            if self.fail.load(Ordering::Relaxed) {
                anyhow::bail!("mock transport failure for {}", invocation.url);
            }

            // Mirror the target service: its error endpoints answer with errors.
            let status = match invocation.kind {
                crate::endpoint::EndpointKind::Failing => 400,
                crate::endpoint::EndpointKind::Exception => 500,
                _ => 200,
            };

            Ok(Response {
                status,
                latency_ms: self.delay.as_millis() as u64,
            })
        })
    }
}

/// HTTP sender over one pooled client shared by every in-flight request
pub struct HttpSender {
    client: reqwest::Client,
}

impl HttpSender {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client })
    }
}

impl RequestSender for HttpSender {
    fn name(&self) -> &'static str {
        "http"
    }

    fn send<'a>(&'a self, invocation: &'a Invocation) -> SendFuture<'a> {
        Box::pin(async move {
            let start = Instant::now();
            let request = match invocation.method {
                Method::Get => self.client.get(invocation.url.clone()),
                Method::Post => self.client.post(invocation.url.clone()),
            };

            let response = request.send().await?;
            let status = response.status().as_u16();
            // Drain the body so streamed responses count against the timeout too.
            response.bytes().await?;

            Ok(Response {
                status,
                latency_ms: start.elapsed().as_millis() as u64,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointKind;
    use reqwest::Url;

    fn invocation(kind: EndpointKind) -> Invocation {
        Invocation {
            seq: 0,
            kind,
            method: Method::Get,
            url: Url::parse("http://localhost:5050/test1").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_mock_sender_answers_like_the_target() {
        let sender = MockSender::new(1);
        let ok = sender.send(&invocation(EndpointKind::InstantA)).await.unwrap();
        assert_eq!(ok.status, 200);

        let fail = sender.send(&invocation(EndpointKind::Failing)).await.unwrap();
        assert_eq!(fail.status, 400);
    }

    #[tokio::test]
    async fn test_mock_sender_can_fail_transport() {
        let sender = MockSender::failing(0);
        assert!(sender.send(&invocation(EndpointKind::Sleep)).await.is_err());

        sender.set_failing(false);
        assert!(sender.send(&invocation(EndpointKind::Sleep)).await.is_ok());
    }
}
