use crate::politeness::{DelayRange, PolitenessConfig, PolitenessGate};
use crate::types::{
    is_retryable_status, CollectorError, FetchConfig, FetchResponse, Result, DEFAULT_ACCEPT,
    DEFAULT_ACCEPT_LANGUAGE, DEFAULT_USER_AGENTS,
};
use crate::utils::time::sleep_or_cancel;
use crate::utils::url::host_key;
use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use rand::seq::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// A single GET on the wire. Returns any HTTP status; only transport-level
/// failures (DNS, connect, timeout, body) are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<FetchResponse>;
}

/// A complete fetch: `Ok` only for 2xx responses.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> Result<FetchResponse>;
}

/// The default stack: politeness in front of retries in front of reqwest.
pub type FetchClient = RateLimitedClient<RetryingClient<HttpTransport>>;

/// Build the client every adapter fetches through, together with the gate it
/// shares robots and budget state with.
pub fn build_fetch_client(
    fetch_config: &FetchConfig,
    politeness: PolitenessConfig,
    host_delays: HashMap<String, DelayRange>,
) -> Result<FetchClient> {
    let transport = HttpTransport::new(fetch_config)?;
    let gate = PolitenessGate::new(politeness, Arc::new(transport.clone()))
        .with_host_delays(host_delays);
    let retrying = RetryingClient::new(transport, fetch_config);
    Ok(RateLimitedClient::new(retrying, Arc::new(gate)))
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    user_agents: Vec<String>,
    max_body_bytes: u64,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE));

        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(timeout)
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        if config.accept_invalid_certs {
            debug!("TLS certificate verification disabled for collection requests");
        }

        let user_agents = if config.user_agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
        } else {
            config.user_agents.clone()
        };

        Ok(Self {
            client,
            user_agents,
            max_body_bytes: (config.max_feed_size_mb as u64).saturating_mul(1024 * 1024),
        })
    }

    fn pick_user_agent(&self) -> String {
        let mut rng = rand::rng();
        self.user_agents
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| DEFAULT_USER_AGENTS[0].to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<FetchResponse> {
        let user_agent = self.pick_user_agent();
        let mut response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, user_agent)
            .send()
            .await?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_body_bytes {
                return Err(CollectorError::BodyTooLarge {
                    size_mb: (content_length / (1024 * 1024)) as usize,
                });
            }
        }

        // Chunked responses carry no length; enforce the cap while reading.
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            append_within_limit(&mut bytes, &chunk, self.max_body_bytes)?;
        }
        let body = String::from_utf8_lossy(&bytes).into_owned();
        debug!("GET {} -> {} ({} bytes)", url, status, body.len());

        Ok(FetchResponse {
            url: final_url,
            status,
            body,
        })
    }
}

fn append_within_limit(body: &mut Vec<u8>, chunk: &[u8], max_bytes: u64) -> Result<()> {
    let total = body.len() as u64 + chunk.len() as u64;
    if total > max_bytes {
        return Err(CollectorError::BodyTooLarge {
            size_mb: (total / (1024 * 1024)) as usize,
        });
    }
    body.extend_from_slice(chunk);
    Ok(())
}

/// Retries transient failures (5xx gateway errors, connect/timeout) with a
/// randomized backoff that grows with the attempt number.
pub struct RetryingClient<T> {
    inner: T,
    max_attempts: u32,
    backoff_min: Duration,
    backoff_max: Duration,
}

impl<T> RetryingClient<T> {
    pub fn new(inner: T, config: &FetchConfig) -> Self {
        Self {
            inner,
            max_attempts: config.max_attempts.max(1),
            backoff_min: Duration::from_millis(config.backoff_min_ms.min(config.backoff_max_ms)),
            backoff_max: Duration::from_millis(config.backoff_max_ms.max(config.backoff_min_ms)),
        }
    }

    /// First retry waits uniformly in [min, max]; each later one doubles the range.
    fn backoff(&self) -> ExponentialBackoff {
        let min = self.backoff_min.as_secs_f64();
        let max = self.backoff_max.as_secs_f64();
        let mid = (min + max) / 2.0;
        let randomization_factor = if mid > 0.0 { (max - min) / (max + min) } else { 0.0 };
        let initial = Duration::from_secs_f64(mid);

        ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            randomization_factor,
            multiplier: 2.0,
            max_interval: initial.saturating_mul(1u32 << self.max_attempts.min(16)),
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

#[async_trait]
impl<T: Transport> Fetch for RetryingClient<T> {
    async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> Result<FetchResponse> {
        let start_time = Instant::now();
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(CollectorError::Cancelled);
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(CollectorError::Cancelled),
                outcome = self.inner.get(url) => outcome,
            };

            let failure = match outcome {
                Ok(response) if response.is_success() => {
                    info!(
                        "Fetched {} ({} bytes, attempt {}, {}ms)",
                        url,
                        response.body.len(),
                        attempt,
                        start_time.elapsed().as_millis()
                    );
                    return Ok(response);
                }
                Ok(response) if is_retryable_status(response.status) => CollectorError::Status {
                    url: url.to_string(),
                    status: response.status,
                },
                Ok(response) => {
                    warn!("Non-retryable HTTP {} from {}", response.status, url);
                    return Err(CollectorError::Status {
                        url: url.to_string(),
                        status: response.status,
                    });
                }
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            if attempt >= self.max_attempts {
                error!(
                    "Failed to fetch {} after {} attempts: {}",
                    url, attempt, failure
                );
                return Err(CollectorError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last_error: failure.to_string(),
                });
            }

            let delay = backoff.next_backoff().unwrap_or(self.backoff_max);
            warn!(
                "Attempt {} failed for {}, retrying in {:?}: {}",
                attempt, url, delay, failure
            );
            sleep_or_cancel(delay, cancel).await?;
        }
    }
}

/// Consults the politeness gate (robots, randomized delay, per-host budget)
/// before handing the request to the wrapped client.
pub struct RateLimitedClient<F> {
    inner: F,
    gate: Arc<PolitenessGate>,
}

impl<F> RateLimitedClient<F> {
    pub fn new(inner: F, gate: Arc<PolitenessGate>) -> Self {
        Self { inner, gate }
    }

    pub fn gate(&self) -> &Arc<PolitenessGate> {
        &self.gate
    }
}

#[async_trait]
impl<F: Fetch> Fetch for RateLimitedClient<F> {
    async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> Result<FetchResponse> {
        if cancel.is_cancelled() {
            return Err(CollectorError::Cancelled);
        }

        if !self.gate.allow(url).await {
            warn!("Robots.txt disallows {}; not fetching", url);
            return Err(CollectorError::RobotsDisallowed {
                url: url.to_string(),
            });
        }

        let host = host_key(url);
        self.gate.throttle(&host, cancel).await?;
        self.gate.acquire_budget(&host, cancel).await?;

        self.inner.fetch(url, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays canned statuses; `None` stands for a connect failure.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Option<u16>>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(script: &[Option<u16>]) -> Self {
            Self {
                script: Mutex::new(script.iter().copied().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, url: &Url) -> Result<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front().flatten();
            match next {
                Some(status) => Ok(FetchResponse {
                    url: url.clone(),
                    status,
                    body: format!("status {status}"),
                }),
                None => Err(CollectorError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: 0,
                    last_error: "connection refused".into(),
                }),
            }
        }
    }

    fn fast_config() -> FetchConfig {
        FetchConfig {
            backoff_min_ms: 0,
            backoff_max_ms: 0,
            ..FetchConfig::default()
        }
    }

    fn url() -> Url {
        Url::parse("https://example.com/feed.xml").unwrap()
    }

    #[tokio::test]
    async fn retries_gateway_errors_then_succeeds() {
        let client = RetryingClient::new(
            ScriptedTransport::new(&[Some(503), Some(502), Some(200)]),
            &fast_config(),
        );
        let response = client.fetch(&url(), &CancellationToken::new()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_three_attempts() {
        let client = RetryingClient::new(
            ScriptedTransport::new(&[Some(500), Some(500), Some(500), Some(200)]),
            &fast_config(),
        );
        let err = client.fetch(&url(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CollectorError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_terminal() {
        let client = RetryingClient::new(
            ScriptedTransport::new(&[Some(404), Some(200)]),
            &fast_config(),
        );
        let err = client.fetch(&url(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CollectorError::Status { status: 404, .. }));
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_transient_transport_errors_are_not_retried() {
        let client = RetryingClient::new(ScriptedTransport::new(&[None, Some(200)]), &fast_config());
        assert!(client.fetch(&url(), &CancellationToken::new()).await.is_err());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_the_first_attempt() {
        let client = RetryingClient::new(ScriptedTransport::new(&[Some(200)]), &fast_config());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client.fetch(&url(), &cancel).await.unwrap_err();
        assert!(matches!(err, CollectorError::Cancelled));
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn streamed_body_stops_at_the_size_cap() {
        let mut body = Vec::new();
        append_within_limit(&mut body, &[b'a'; 600], 1_000).unwrap();
        let err = append_within_limit(&mut body, &[b'b'; 600], 1_000).unwrap_err();
        assert!(matches!(err, CollectorError::BodyTooLarge { .. }));
        assert_eq!(body.len(), 600);

        append_within_limit(&mut body, &[b'c'; 400], 1_000).unwrap();
        assert_eq!(body.len(), 1_000);
    }

    #[test]
    fn backoff_range_scales_with_attempt() {
        let client = RetryingClient::new((), &FetchConfig::default());
        let mut backoff = client.backoff();
        let first = backoff.next_backoff().unwrap();
        let second = backoff.next_backoff().unwrap();
        assert!(first >= Duration::from_millis(1_999) && first <= Duration::from_millis(5_001));
        assert!(second >= Duration::from_millis(3_999) && second <= Duration::from_millis(10_001));
    }
}
