//! Per-host politeness: robots.txt compliance, randomized inter-request
//! delays and a rolling-window request budget.
//!
//! One [`PolitenessGate`] is shared by every adapter of a pass, so all robots
//! decisions and budgets live in a single table behind async locks.

use crate::fetcher::Transport;
use crate::types::Result;
use crate::utils::time::sleep_or_cancel;
use crate::utils::url::{origin_key, robots_url};
use rand::Rng;
use robotstxt::DefaultMatcher;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_ROBOTS_AGENT: &str = "AIDailyBriefBot";

/// Inclusive bounds in milliseconds for a randomized pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn sample(&self) -> Duration {
        let millis = if self.max_ms <= self.min_ms {
            self.min_ms
        } else {
            rand::rng().random_range(self.min_ms..=self.max_ms)
        };
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolitenessConfig {
    pub respect_robots_txt: bool,
    /// Agent name matched against `User-agent` groups in robots.txt.
    pub robots_agent: String,
    pub request_delay: DelayRange,
    /// Zero disables the budget.
    pub requests_per_window: usize,
    pub window_seconds: u64,
    pub inter_source_delay: DelayRange,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            respect_robots_txt: true,
            robots_agent: DEFAULT_ROBOTS_AGENT.to_string(),
            request_delay: DelayRange::new(1_000, 3_000),
            requests_per_window: 100,
            window_seconds: 3_600,
            inter_source_delay: DelayRange::new(1_000, 2_000),
        }
    }
}

/// Request timestamps for one host inside the rolling window.
#[derive(Debug, Default)]
pub struct RateBudget {
    requests: VecDeque<Instant>,
}

impl RateBudget {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.requests.front() {
            if now.duration_since(oldest) >= window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records a request if the window still has room.
    pub fn try_record(&mut self, now: Instant, window: Duration, cap: usize) -> bool {
        self.prune(now, window);
        if cap == 0 || self.requests.len() < cap {
            self.requests.push_back(now);
            true
        } else {
            false
        }
    }

    /// Time until the oldest request leaves the window. A window end past the
    /// clock's range waits the whole window.
    pub fn wait_time(&self, now: Instant, window: Duration) -> Duration {
        self.requests
            .front()
            .map(|&oldest| match oldest.checked_add(window) {
                Some(end) => end.saturating_duration_since(now),
                None => window,
            })
            .unwrap_or_default()
    }

    pub fn in_window(&self) -> usize {
        self.requests.len()
    }
}

/// Robots policy retained for an origin; an empty body allows everything.
#[derive(Debug, Clone, Default)]
struct RobotsPolicy {
    body: String,
}

pub struct PolitenessGate {
    config: PolitenessConfig,
    transport: Arc<dyn Transport>,
    host_delays: HashMap<String, DelayRange>,
    robots_cache: RwLock<HashMap<String, Arc<RobotsPolicy>>>,
    budgets: Mutex<HashMap<String, RateBudget>>,
}

impl PolitenessGate {
    pub fn new(config: PolitenessConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            host_delays: HashMap::new(),
            robots_cache: RwLock::new(HashMap::new()),
            budgets: Mutex::new(HashMap::new()),
        }
    }

    /// Per-host delay overrides, keyed like [`crate::utils::url::host_key`].
    pub fn with_host_delays(mut self, host_delays: HashMap<String, DelayRange>) -> Self {
        self.host_delays = host_delays;
        self
    }

    pub fn config(&self) -> &PolitenessConfig {
        &self.config
    }

    /// Whether the configured agent may fetch `url`. Fails open: when
    /// robots.txt cannot be retrieved the answer is `true`.
    pub async fn allow(&self, url: &Url) -> bool {
        if !self.config.respect_robots_txt {
            return true;
        }

        let origin = origin_key(url);
        let cached = self.robots_cache.read().await.get(&origin).cloned();
        let policy = match cached {
            Some(policy) => policy,
            None => {
                let policy = Arc::new(self.fetch_policy(url).await);
                let mut cache = self.robots_cache.write().await;
                cache.entry(origin.clone()).or_insert(policy).clone()
            }
        };

        if policy.body.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        let allowed =
            matcher.one_agent_allowed_by_robots(&policy.body, &self.config.robots_agent, url.as_str());
        if !allowed {
            debug!("Robots.txt for {} disallows {}", origin, url.path());
        }
        allowed
    }

    async fn fetch_policy(&self, url: &Url) -> RobotsPolicy {
        let robots = match robots_url(url) {
            Ok(robots) => robots,
            Err(e) => {
                warn!("Cannot build robots.txt URL for {}: {}; allowing", url, e);
                return RobotsPolicy::default();
            }
        };

        match self.transport.get(&robots).await {
            Ok(response) if response.is_success() => {
                debug!("Loaded {} ({} bytes)", robots, response.body.len());
                RobotsPolicy {
                    body: response.body,
                }
            }
            Ok(response) if matches!(response.status, 404 | 410) => {
                debug!("No robots.txt at {}", robots);
                RobotsPolicy::default()
            }
            Ok(response) => {
                warn!(
                    "Robots.txt at {} returned HTTP {}; failing open",
                    robots, response.status
                );
                RobotsPolicy::default()
            }
            Err(e) => {
                warn!("Failed to fetch robots.txt from {}: {}; failing open", robots, e);
                RobotsPolicy::default()
            }
        }
    }

    pub fn delay_for(&self, host: &str) -> DelayRange {
        self.host_delays
            .get(host)
            .copied()
            .unwrap_or(self.config.request_delay)
    }

    /// Randomized pause before a request to `host`.
    pub async fn throttle(&self, host: &str, cancel: &CancellationToken) -> Result<()> {
        let delay = self.delay_for(host).sample();
        if !delay.is_zero() {
            debug!("Throttling {} for {:?}", host, delay);
        }
        sleep_or_cancel(delay, cancel).await
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_seconds)
    }

    /// Try to take one request from the host's rolling window.
    pub async fn check_budget(&self, host: &str) -> bool {
        let mut budgets = self.budgets.lock().await;
        budgets.entry(host.to_string()).or_default().try_record(
            Instant::now(),
            self.window(),
            self.config.requests_per_window,
        )
    }

    /// Blocks until the host's window has room, then records the request.
    /// Requests are delayed, never dropped.
    pub async fn acquire_budget(&self, host: &str, cancel: &CancellationToken) -> Result<()> {
        loop {
            let wait = {
                let mut budgets = self.budgets.lock().await;
                let budget = budgets.entry(host.to_string()).or_default();
                let now = Instant::now();
                if budget.try_record(now, self.window(), self.config.requests_per_window) {
                    return Ok(());
                }
                budget.wait_time(now, self.window())
            };

            let wait = wait.max(Duration::from_millis(1));
            info!("Request budget for {} exhausted; waiting {:?}", host, wait);
            sleep_or_cancel(wait, cancel).await?;
        }
    }

    pub async fn requests_in_window(&self, host: &str) -> usize {
        let mut budgets = self.budgets.lock().await;
        let window = self.window();
        budgets
            .get_mut(host)
            .map(|budget| {
                budget.prune(Instant::now(), window);
                budget.in_window()
            })
            .unwrap_or(0)
    }
}
