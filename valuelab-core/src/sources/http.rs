//! Blocking HTTP fetcher shared by the concrete adapters.
//!
//! Handles retries with exponential backoff, the circuit breaker, and the
//! injected response cache. Calls block the current thread; there is no
//! cancellation beyond the client timeout. The client keeps a cookie jar for
//! the lifetime of the fetcher, which the Yahoo session handshake relies on.

use super::circuit_breaker::CircuitBreaker;
use super::provider::SourceError;
use super::response_cache::ResponseCache;
use crate::config::HttpSettings;
use reqwest::header::REFERER;
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Session parameters that must not be part of a cache key.
const SESSION_PARAMS: [&str; 1] = ["crumb"];

/// Shared blocking client. One per process; adapters hold it behind an `Arc`.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    cache: Option<Arc<dyn ResponseCache>>,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpFetcher {
    /// Build a client from `settings`. `cache` is consulted before every
    /// cacheable GET; `None` always goes to the network.
    pub fn new(
        settings: &HttpSettings,
        cache: Option<Arc<dyn ResponseCache>>,
    ) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout())
            .user_agent(settings.user_agent.as_str())
            .cookie_store(true)
            .build()
            .map_err(|e| SourceError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker: Arc::new(CircuitBreaker::new(
                settings.breaker_cooldown(),
                settings.breaker_failure_threshold,
            )),
            cache,
            max_retries: settings.max_retries,
            base_delay: settings.retry_base_delay(),
        })
    }

    /// The breaker shared by every request through this fetcher.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Whether the breaker currently lets requests through.
    pub fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }

    /// GET `url` and return the body, from the cache when fresh.
    ///
    /// The cache key is the URL without session parameters, so a new crumb
    /// doesn't invalidate bodies cached under an old one.
    pub fn get_text(&self, url: &str) -> Result<String, SourceError> {
        let key = cache_key(url);
        if let Some(cache) = &self.cache {
            if let Some(body) = cache.get(&key) {
                return Ok(body);
            }
        }

        let body = self.get_with_retry(url)?;

        if let Some(cache) = &self.cache {
            cache.put(&key, &body);
        }
        Ok(body)
    }

    /// GET `url` without touching the response cache. For session-bound
    /// endpoints whose body is only valid alongside this client's cookies.
    pub fn get_uncached(&self, url: &str) -> Result<String, SourceError> {
        self.get_with_retry(url)
    }

    /// Visit `url` only to collect the cookies it sets. The status is ignored
    /// (the Yahoo consent host answers 404 while still setting the session
    /// cookie); only transport failures are errors.
    pub fn prime_cookies(&self, url: &str, referer: &str) -> Result<(), SourceError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(SourceError::CircuitBreakerTripped);
        }
        let resp = self
            .client
            .get(url)
            .header(REFERER, referer)
            .send()
            .map_err(|e| SourceError::NetworkUnreachable(e.to_string()))?;
        debug!(url, status = %resp.status(), "session cookies primed");
        Ok(())
    }

    fn get_with_retry(&self, url: &str) -> Result<String, SourceError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(SourceError::CircuitBreakerTripped);
        }

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(url, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(SourceError::CircuitBreakerTripped);
            }

            let resp = match self.client.get(url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    self.circuit_breaker.record_failure();
                    last_error = Some(SourceError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(SourceError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();

            if status == StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                return Err(SourceError::CircuitBreakerTripped);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                last_error = Some(SourceError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }

            if status.is_client_error() {
                return Err(client_error(status, url));
            }

            if !status.is_success() {
                self.circuit_breaker.record_failure();
                last_error = Some(SourceError::Http(format!("HTTP {status} for {url}")));
                continue;
            }

            let body = resp
                .text()
                .map_err(|e| SourceError::ResponseFormatChanged(format!("unreadable body: {e}")))?;
            self.circuit_breaker.record_success();
            return Ok(body);
        }

        let err = last_error.unwrap_or_else(|| SourceError::Other("max retries exceeded".into()));
        warn!(url, error = %err, "request failed after retries");
        Err(err)
    }
}

/// Non-retryable 4xx (other than 403/429, handled by the breaker).
fn client_error(status: StatusCode, url: &str) -> SourceError {
    if status == StatusCode::UNAUTHORIZED {
        SourceError::Unauthorized(format!("HTTP 401 for {url}"))
    } else {
        SourceError::Http(format!("HTTP {status} for {url}"))
    }
}

fn is_session_param(key: &str) -> bool {
    SESSION_PARAMS.contains(&key)
}

/// `url` with session parameters removed. Unparseable URLs are used as-is.
fn cache_key(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if !parsed.query_pairs().any(|(k, _)| is_session_param(&k)) {
        return url.to_string();
    }
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_session_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_distinct_from_other_client_errors() {
        let url = "https://query2.finance.yahoo.com/v10/finance/quoteSummary/PETR4.SA";
        assert!(matches!(
            client_error(StatusCode::UNAUTHORIZED, url),
            SourceError::Unauthorized(_)
        ));
        assert!(matches!(
            client_error(StatusCode::NOT_FOUND, url),
            SourceError::Http(_)
        ));
    }

    #[test]
    fn cache_key_drops_the_crumb() {
        let a = cache_key("https://q.example/v10/quote/PETR4.SA?modules=price&crumb=abc");
        let b = cache_key("https://q.example/v10/quote/PETR4.SA?modules=price&crumb=xyz%2F1");
        assert_eq!(a, b);
        assert!(!a.contains("crumb"));
        assert!(a.contains("modules=price"));

        assert_eq!(
            cache_key("https://q.example/getcrumb?crumb=abc"),
            "https://q.example/getcrumb"
        );
    }

    #[test]
    fn cache_key_leaves_other_urls_alone() {
        let url = "https://q.example/v8/finance/chart/PETR4.SA?range=5y&interval=1d&events=div";
        assert_eq!(cache_key(url), url);
        assert_eq!(cache_key("not a url"), "not a url");
    }
}
