// src/limiter.rs
//! Per-provider pacing, cooldowns and circuit breaking.
//!
//! A provider is a domain (`caranddriver.com`) or a named API (`scrapfly`).
//! Every provider gets its own state behind its own mutex, so concurrent
//! callers on different providers never contend and callers on the same
//! provider see consistent counters.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovRateLimiter};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

pub const DEFAULT_COOLDOWN_SECS: u64 = 900;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_BREAKER_SECS: u64 = 180;

/// `requests` per `per_secs`, e.g. 10 per 60 s.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pace {
    pub requests: u32,
    pub per_secs: u64,
}

impl Pace {
    fn quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.requests.max(1)).unwrap_or(NonZeroU32::MIN);
        let window = Duration::from_secs(self.per_secs.max(1));
        let period = window / burst.get();
        Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterSettings {
    pub cooldown_secs: u64,
    pub failure_threshold: u32,
    pub breaker_secs: u64,
    /// Pace for providers without an explicit entry.
    pub default_pace: Pace,
    /// Keyed by provider; a domain entry also covers its subdomains.
    pub paces: HashMap<String, Pace>,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        let mut paces = HashMap::new();
        paces.insert("openai.com".into(), Pace { requests: 400, per_secs: 60 });
        paces.insert("youtube.com".into(), Pace { requests: 10, per_secs: 60 });
        paces.insert("googleapis.com".into(), Pace { requests: 100, per_secs: 60 });
        paces.insert("scrapfly".into(), Pace { requests: 60, per_secs: 60 });
        paces.insert("google_search".into(), Pace { requests: 100, per_secs: 60 });
        paces.insert("youtube_api".into(), Pace { requests: 100, per_secs: 60 });
        paces.insert("whisper".into(), Pace { requests: 50, per_secs: 60 });
        Self {
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            breaker_secs: DEFAULT_BREAKER_SECS,
            default_pace: Pace { requests: 1, per_secs: 2 },
            paces,
        }
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    cooldown_until: Option<Instant>,
    breaker_until: Option<Instant>,
    consecutive_failures: u32,
}

impl ProviderState {
    fn remaining(&self, now: Instant) -> Duration {
        let cd = self
            .cooldown_until
            .map(|t| t.saturating_duration_since(now))
            .unwrap_or_default();
        let br = self
            .breaker_until
            .map(|t| t.saturating_duration_since(now))
            .unwrap_or_default();
        cd.max(br)
    }

    fn is_idle(&self, now: Instant) -> bool {
        self.consecutive_failures == 0 && self.remaining(now).is_zero()
    }
}

/// Debug view of one blocked provider.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CooldownInfo {
    pub provider: String,
    pub remaining_secs: u64,
    pub consecutive_failures: u32,
    pub breaker_open: bool,
}

pub struct RateLimiter {
    settings: LimiterSettings,
    states: Mutex<HashMap<String, Arc<Mutex<ProviderState>>>>,
    pacers: Mutex<HashMap<String, Arc<DefaultDirectRateLimiter>>>,
}

impl RateLimiter {
    pub fn new(settings: LimiterSettings) -> Self {
        Self {
            settings,
            states: Mutex::new(HashMap::new()),
            pacers: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    fn slot(&self, key: &str) -> Arc<Mutex<ProviderState>> {
        let mut map = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(key.to_string()).or_default().clone()
    }

    fn existing_slot(&self, key: &str) -> Option<Arc<Mutex<ProviderState>>> {
        let map = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(key).cloned()
    }

    /// How long a caller must wait before dispatching to `key`. Zero means go.
    pub fn should_wait(&self, key: &str) -> Duration {
        match self.existing_slot(key) {
            Some(slot) => {
                let st = slot.lock().unwrap_or_else(PoisonError::into_inner);
                st.remaining(Instant::now())
            }
            None => Duration::ZERO,
        }
    }

    /// Rate-limit signal: starts a cooldown and counts toward the breaker.
    pub fn record_failure(&self, key: &str, retry_after: Option<Duration>) {
        let cooldown = retry_after.unwrap_or(Duration::from_secs(self.settings.cooldown_secs));
        let now = Instant::now();
        {
            let slot = self.slot(key);
            let mut st = slot.lock().unwrap_or_else(PoisonError::into_inner);
            let until = now + cooldown;
            st.cooldown_until = Some(st.cooldown_until.map_or(until, |t| t.max(until)));
            self.bump_failures(key, &mut st, now);
        }
        tracing::warn!(provider = key, cooldown_secs = cooldown.as_secs(), "provider cooldown set");
        self.purge_expired(now);
    }

    /// Network/5xx failure: counts toward the breaker without a cooldown.
    pub fn record_unavailable(&self, key: &str) {
        let now = Instant::now();
        let slot = self.slot(key);
        let mut st = slot.lock().unwrap_or_else(PoisonError::into_inner);
        self.bump_failures(key, &mut st, now);
    }

    fn bump_failures(&self, key: &str, st: &mut ProviderState, now: Instant) {
        st.consecutive_failures = st.consecutive_failures.saturating_add(1);
        if st.consecutive_failures >= self.settings.failure_threshold {
            let until = now + Duration::from_secs(self.settings.breaker_secs);
            if st.breaker_until.map_or(true, |t| t <= now) {
                tracing::warn!(
                    provider = key,
                    failures = st.consecutive_failures,
                    "circuit breaker opened"
                );
            }
            st.breaker_until = Some(st.breaker_until.map_or(until, |t| t.max(until)));
        }
    }

    /// Resets the failure counter and clears a per-call cooldown. An open
    /// breaker stays open until its window has elapsed.
    pub fn record_success(&self, key: &str) {
        if let Some(slot) = self.existing_slot(key) {
            let mut st = slot.lock().unwrap_or_else(PoisonError::into_inner);
            st.consecutive_failures = 0;
            st.cooldown_until = None;
        }
    }

    /// Manual reset of everything known about `key`.
    pub fn clear(&self, key: &str) {
        let mut map = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        map.remove(key);
    }

    fn purge_expired(&self, now: Instant) {
        let mut map = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, slot| {
            let mut st = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if st.cooldown_until.is_some_and(|t| t <= now) {
                st.cooldown_until = None;
            }
            if st.breaker_until.is_some_and(|t| t <= now) {
                st.breaker_until = None;
            }
            !st.is_idle(now)
        });
        gauge!("resolver_active_cooldowns").set(map.len() as f64);
    }

    pub fn active_cooldowns(&self) -> Vec<CooldownInfo> {
        let now = Instant::now();
        let map = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<CooldownInfo> = map
            .iter()
            .filter_map(|(k, slot)| {
                let st = slot.lock().unwrap_or_else(PoisonError::into_inner);
                let rem = st.remaining(now);
                (!rem.is_zero()).then(|| CooldownInfo {
                    provider: k.clone(),
                    remaining_secs: rem.as_secs().max(1),
                    consecutive_failures: st.consecutive_failures,
                    breaker_open: st.breaker_until.is_some_and(|t| t > now),
                })
            })
            .collect();
        out.sort_by(|a, b| a.provider.cmp(&b.provider));
        out
    }

    fn pace_for(&self, key: &str) -> Pace {
        if let Some(p) = self.settings.paces.get(key) {
            return *p;
        }
        self.settings
            .paces
            .iter()
            .find(|(k, _)| key.ends_with(&format!(".{k}")))
            .map(|(_, p)| *p)
            .unwrap_or(self.settings.default_pace)
    }

    /// Waits for a pacing token. Does not consult cooldowns; pair with
    /// [`RateLimiter::should_wait`].
    pub async fn acquire(&self, key: &str) {
        let pacer = {
            let mut map = self.pacers.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(GovRateLimiter::direct(self.pace_for(key).quota())))
                .clone()
        };
        pacer.until_ready().await;
    }

    /// Runs `call` against provider `key` with the full protocol: fail fast
    /// while blocked, wait for a pacing token, then account for the outcome.
    pub async fn guarded<T, F, Fut>(&self, key: &str, call: F) -> Result<T, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let wait = self.should_wait(key);
        if !wait.is_zero() {
            return Err(FetchError::CircuitOpen {
                provider: key.to_string(),
                wait,
            });
        }
        self.acquire(key).await;
        let out = call().await;
        match &out {
            Ok(_) => self.record_success(key),
            Err(FetchError::ProviderRateLimited { retry_after, .. }) => {
                counter!("resolver_provider_errors_total", "provider" => key.to_string()).increment(1);
                self.record_failure(key, *retry_after);
            }
            Err(FetchError::ProviderUnavailable { .. }) => {
                counter!("resolver_provider_errors_total", "provider" => key.to_string()).increment(1);
                self.record_unavailable(key);
            }
            // Content-level outcomes say nothing about provider health.
            Err(_) => {}
        }
        out
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(LimiterSettings::default())
    }
}

/// Provider key for a URL: lowercase host without `www.`.
pub fn provider_key_for_url(raw: &str) -> String {
    let host = url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_else(|| {
            raw.trim()
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .split('/')
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase()
        });
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(LimiterSettings::default())
    }

    #[test]
    fn unknown_provider_does_not_wait() {
        assert_eq!(limiter().should_wait("example.com"), Duration::ZERO);
    }

    #[test]
    fn failure_sets_default_or_retry_after_cooldown() {
        let l = limiter();
        l.record_failure("a.com", None);
        let w = l.should_wait("a.com");
        assert!(w > Duration::from_secs(890) && w <= Duration::from_secs(900));

        l.record_failure("b.com", Some(Duration::from_secs(30)));
        assert!(l.should_wait("b.com") <= Duration::from_secs(30));
        assert!(l.should_wait("b.com") > Duration::ZERO);
    }

    #[test]
    fn breaker_open_survives_success() {
        let l = limiter();
        for _ in 0..5 {
            l.record_failure("yt", Some(Duration::from_millis(1)));
        }
        l.record_success("yt");
        let w = l.should_wait("yt");
        assert!(w > Duration::from_secs(170), "breaker should hold, got {w:?}");
        let info = l.active_cooldowns();
        assert_eq!(info.len(), 1);
        assert!(info[0].breaker_open);
        assert_eq!(info[0].consecutive_failures, 0);
    }

    #[test]
    fn success_below_threshold_resets_counter() {
        let l = limiter();
        for _ in 0..4 {
            l.record_unavailable("api");
        }
        l.record_success("api");
        // Four more failures should not trip since the counter went back to zero.
        for _ in 0..4 {
            l.record_unavailable("api");
        }
        assert_eq!(l.should_wait("api"), Duration::ZERO);
        l.record_unavailable("api");
        assert!(l.should_wait("api") > Duration::ZERO);
    }

    #[test]
    fn purge_drops_expired_entries() {
        let l = limiter();
        l.record_failure("old.com", Some(Duration::ZERO));
        l.record_success("old.com");
        l.record_failure("new.com", Some(Duration::from_secs(60)));
        let keys: Vec<_> = l.active_cooldowns().into_iter().map(|c| c.provider).collect();
        assert_eq!(keys, vec!["new.com".to_string()]);
        let map = l.states.lock().unwrap();
        assert!(!map.contains_key("old.com"));
    }

    #[test]
    fn concurrent_failures_on_same_provider_are_all_counted() {
        let l = Arc::new(limiter());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let l = l.clone();
                std::thread::spawn(move || l.record_unavailable("shared"))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let slot = l.existing_slot("shared").unwrap();
        assert_eq!(slot.lock().unwrap().consecutive_failures, 8);
        assert!(l.should_wait("shared") > Duration::ZERO);
    }

    #[test]
    fn pace_lookup_covers_subdomains() {
        let l = limiter();
        assert_eq!(l.pace_for("m.youtube.com").requests, 10);
        assert_eq!(l.pace_for("scrapfly").requests, 60);
        assert_eq!(l.pace_for("motortrend.com"), Pace { requests: 1, per_secs: 2 });
    }

    #[tokio::test]
    async fn acquire_allows_first_call_immediately() {
        let l = limiter();
        let t0 = Instant::now();
        l.acquire("fresh.example").await;
        assert!(t0.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn guarded_fails_fast_while_blocked() {
        let l = limiter();
        let r: Result<(), _> = l
            .guarded("svc", || async { Err(FetchError::rate_limited("svc", Some(Duration::from_secs(60)))) })
            .await;
        assert!(matches!(r, Err(FetchError::ProviderRateLimited { .. })));

        let mut called = false;
        let r: Result<(), _> = l
            .guarded("svc", || {
                called = true;
                async { Ok(()) }
            })
            .await;
        assert!(matches!(r, Err(FetchError::CircuitOpen { .. })));
        assert!(!called, "no dispatch while cooling down");
    }

    #[tokio::test]
    async fn guarded_success_clears_cooldown() {
        let l = limiter();
        l.record_unavailable("svc2");
        let r = l.guarded("svc2", || async { Ok::<_, FetchError>(7) }).await;
        assert_eq!(r.unwrap(), 7);
        assert_eq!(l.existing_slot("svc2").unwrap().lock().unwrap().consecutive_failures, 0);
    }

    #[test]
    fn provider_key_strips_scheme_and_www() {
        assert_eq!(provider_key_for_url("https://www.MotorTrend.com/reviews/x"), "motortrend.com");
        assert_eq!(provider_key_for_url("caranddriver.com/reviews"), "caranddriver.com");
    }
}
