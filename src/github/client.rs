//! Rate-limited blocking client for the GitHub REST API.
//!
//! Every call consults the tracked [`RateLimitBudget`] first and blocks out
//! the reset window when the budget is low. Transient failures (403/429,
//! 502/503, transport errors) are retried with exponential backoff plus
//! jitter; when the server supplies a reset hint the wait uses that hint
//! instead, capped at the configured ceiling. Definitive absence (404/422)
//! returns `None` immediately with no retry. Exhausted retries also return
//! `None`: callers treat it as "no data available", never as a pipeline
//! error.

use crate::config::{ExtractionConfig, RetryConfig};
use crate::errors::{ExtractError, Result};
use crate::github::budget::RateLimitBudget;
use chrono::Utc;
use log::{debug, warn};
use rand::Rng;
use reqwest::blocking::Response;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("gitlapse/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RateLimitedClient {
    http: reqwest::blocking::Client,
    base_url: String,
    token: Option<String>,
    budget: RateLimitBudget,
    retry: RetryConfig,
    low_water_mark: u32,
    reset_margin: Duration,
    calls_made: u64,
}

impl RateLimitedClient {
    pub fn new(token: Option<String>, config: &ExtractionConfig) -> Result<Self> {
        Self::with_base_url(token, config, DEFAULT_BASE_URL)
    }

    /// Construct against an alternate API root. Tests point this at a local
    /// stub server.
    pub fn with_base_url(
        token: Option<String>,
        config: &ExtractionConfig,
        base_url: &str,
    ) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExtractError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            budget: RateLimitBudget::new(),
            retry: config.retry.clone(),
            low_water_mark: config.low_water_mark,
            reset_margin: config.reset_margin(),
            calls_made: 0,
        })
    }

    /// Total HTTP requests issued, for the end-of-run summary.
    pub fn calls_made(&self) -> u64 {
        self.calls_made
    }

    pub fn budget(&self) -> &RateLimitBudget {
        &self.budget
    }

    /// GET a single resource. `path` is relative to the API root.
    ///
    /// Returns `None` for definitive absence, and after retries are
    /// exhausted; both are soft outcomes the caller reads as "no data".
    pub fn get(&mut self, path: &str, params: &[(String, String)]) -> Option<Value> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 1..=self.retry.max_attempts {
            self.wait_for_budget();

            let mut request = self.http.get(&url).query(params);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            request = request.header("Accept", "application/vnd.github.v3+json");

            match request.send() {
                Ok(response) => {
                    self.calls_made += 1;
                    self.absorb_rate_limit_headers(&response);
                    self.budget.record_call();
                    let status = response.status();

                    if status.is_success() {
                        return match response.json::<Value>() {
                            Ok(value) => Some(value),
                            Err(e) => {
                                warn!("malformed JSON from {}: {}", url, e);
                                None
                            }
                        };
                    }

                    // Entity does not exist; retrying cannot change that.
                    if status == StatusCode::NOT_FOUND
                        || status == StatusCode::UNPROCESSABLE_ENTITY
                    {
                        debug!("{} for {}", status, url);
                        return None;
                    }

                    if !self.retry.should_retry(attempt) {
                        warn!("{} for {}, retries exhausted", status, url);
                        return None;
                    }

                    let wait = self.transient_wait(&response, status, attempt);
                    warn!(
                        "{} for {}, attempt {}/{}, waiting {:.0}s",
                        status,
                        url,
                        attempt,
                        self.retry.max_attempts,
                        wait.as_secs_f64()
                    );
                    std::thread::sleep(wait);
                }
                Err(e) => {
                    if !self.retry.should_retry(attempt) {
                        warn!("transport error for {}: {}, retries exhausted", url, e);
                        return None;
                    }
                    let wait = self.jittered(self.retry.delay_for_attempt(attempt));
                    warn!(
                        "transport error for {}: {}, attempt {}/{}, waiting {:.0}s",
                        url,
                        e,
                        attempt,
                        self.retry.max_attempts,
                        wait.as_secs_f64()
                    );
                    std::thread::sleep(wait);
                }
            }
        }
        None
    }

    /// GET a paginated listing, appending items across pages.
    ///
    /// `past_window` is the caller's stop predicate: once a page's last item
    /// matches it, no further page is fetched. Callers request listings in
    /// ascending order so the predicate makes later pages provably useless,
    /// sparing the rate-limit budget. Also stops when a page comes back
    /// short of the requested page size, when a page yields no data, or at
    /// `max_pages`.
    pub fn get_paginated<F>(
        &mut self,
        path: &str,
        params: &[(String, String)],
        per_page: usize,
        max_pages: usize,
        mut past_window: F,
    ) -> Vec<Value>
    where
        F: FnMut(&Value) -> bool,
    {
        let mut items = Vec::new();

        for page in 1..=max_pages {
            let mut page_params = params.to_vec();
            page_params.push(("per_page".to_string(), per_page.to_string()));
            page_params.push(("page".to_string(), page.to_string()));

            let batch = match self.get(path, &page_params) {
                Some(Value::Array(batch)) => batch,
                Some(other) => {
                    debug!("non-array page from {}: {}", path, other);
                    break;
                }
                None => break,
            };

            if batch.is_empty() {
                break;
            }
            let short_page = batch.len() < per_page;
            let past = batch.last().is_some_and(&mut past_window);
            items.extend(batch);
            if short_page || past {
                break;
            }
        }
        items
    }

    /// Block until the tracked budget permits another call.
    fn wait_for_budget(&self) {
        if let Some(wait) =
            self.budget
                .required_wait(self.low_water_mark, self.reset_margin, Utc::now())
        {
            warn!(
                "rate-limit budget low ({} remaining), waiting {:.0}s for reset",
                self.budget.remaining(),
                wait.as_secs_f64()
            );
            std::thread::sleep(wait);
        }
    }

    fn absorb_rate_limit_headers(&mut self, response: &Response) {
        let remaining = header_number::<u32>(response, "x-ratelimit-remaining");
        let reset = header_number::<i64>(response, "x-ratelimit-reset");
        self.budget.update(remaining, reset);
    }

    /// Wait before retrying a transient failure. Rate-limit responses use the
    /// server's hint when present (capped at the ceiling); everything else
    /// backs off exponentially with jitter.
    fn transient_wait(&self, response: &Response, status: StatusCode, attempt: u32) -> Duration {
        let rate_limited =
            status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS;
        if rate_limited {
            if let Some(hint) = reset_hint(response) {
                return self.retry.cap_hint(hint + self.reset_margin);
            }
        }
        self.jittered(self.retry.delay_for_attempt(attempt))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let factor = self.retry.jitter_factor;
        if factor <= 0.0 {
            return delay;
        }
        let scale = 1.0 + rand::rng().random_range(-factor..factor);
        delay.mul_f64(scale.max(0.0))
    }
}

/// Seconds until the rate-limit window resets, from `Retry-After` or the
/// `X-RateLimit-Reset` epoch, whichever the server provided.
fn reset_hint(response: &Response) -> Option<Duration> {
    if let Some(secs) = header_number::<u64>(response, "retry-after") {
        return Some(Duration::from_secs(secs));
    }
    let reset_epoch = header_number::<i64>(response, "x-ratelimit-reset")?;
    let until = reset_epoch - Utc::now().timestamp();
    Some(Duration::from_secs(until.max(0) as u64))
}

fn header_number<T: std::str::FromStr>(response: &Response, name: &str) -> Option<T> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn test_config() -> ExtractionConfig {
        ExtractionConfig {
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_secs: 1,
                jitter_factor: 0.0,
            },
            ..Default::default()
        }
    }

    fn response(status_line: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut response = format!(
            "HTTP/1.1 {}\r\nconnection: close\r\ncontent-type: application/json\r\ncontent-length: {}\r\n",
            status_line,
            body.len()
        );
        for (name, value) in headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }
        response.push_str("\r\n");
        response.push_str(body);
        response
    }

    /// Serve one canned response per connection, in order, counting the
    /// requests actually received. Connections past the list are refused.
    fn stub_server(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let served = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&served);
        thread::spawn(move || {
            for canned in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                loop {
                    let mut line = String::new();
                    match reader.read_line(&mut line) {
                        Ok(0) => break,
                        Ok(_) if line == "\r\n" => break,
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }
                let _ = stream.write_all(canned.as_bytes());
            }
        });
        (base_url, served)
    }

    #[test]
    fn absent_resource_returns_none_without_retry() {
        let (base_url, served) = stub_server(vec![response(
            "404 Not Found",
            &[],
            r#"{"message":"Not Found"}"#,
        )]);
        let mut client =
            RateLimitedClient::with_base_url(None, &test_config(), &base_url).unwrap();

        let result = client.get("/repos/acme/gone", &[]);
        assert!(result.is_none());
        assert_eq!(served.load(Ordering::SeqCst), 1);
        assert_eq!(client.calls_made(), 1);
    }

    #[test]
    fn transient_failure_retries_then_succeeds() {
        let (base_url, served) = stub_server(vec![
            response("502 Bad Gateway", &[], "{}"),
            response("200 OK", &[], r#"{"id":1}"#),
        ]);
        let mut client =
            RateLimitedClient::with_base_url(None, &test_config(), &base_url).unwrap();

        let value = client.get("/repos/acme/demo", &[]).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(served.load(Ordering::SeqCst), 2);
        assert_eq!(client.calls_made(), 2);
    }

    #[test]
    fn rate_limit_headers_update_the_budget() {
        let (base_url, _) = stub_server(vec![response(
            "200 OK",
            &[
                ("x-ratelimit-remaining", "123"),
                ("x-ratelimit-reset", "1700000000"),
            ],
            "{}",
        )]);
        let mut client =
            RateLimitedClient::with_base_url(None, &test_config(), &base_url).unwrap();

        client.get("/rate_limit", &[]);
        // The headers are absorbed before the issued call is recorded.
        assert_eq!(client.budget().remaining(), 122);
        assert_eq!(client.budget().reset_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn pagination_stops_once_past_the_window() {
        let page_one =
            r#"[{"created_at":"2021-01-01T00:00:00Z"},{"created_at":"2022-01-01T00:00:00Z"}]"#;
        let page_two =
            r#"[{"created_at":"2023-01-01T00:00:00Z"},{"created_at":"2023-06-01T00:00:00Z"}]"#;
        let (base_url, served) = stub_server(vec![
            response("200 OK", &[], page_one),
            response("200 OK", &[], page_two),
        ]);
        let mut client =
            RateLimitedClient::with_base_url(None, &test_config(), &base_url).unwrap();

        let items = client.get_paginated("/repos/acme/demo/issues", &[], 2, 5, |item| {
            item["created_at"].as_str().is_some_and(|c| c > "2021-12-31")
        });

        // Page one's last item is past the window: page two stays unfetched.
        assert_eq!(items.len(), 2);
        assert_eq!(served.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pagination_stops_at_a_short_page() {
        let page_one = r#"[{"created_at":"2021-01-01T00:00:00Z"}]"#;
        let (base_url, served) = stub_server(vec![response("200 OK", &[], page_one)]);
        let mut client =
            RateLimitedClient::with_base_url(None, &test_config(), &base_url).unwrap();

        let items = client.get_paginated("/repos/acme/demo/issues", &[], 2, 5, |_| false);
        assert_eq!(items.len(), 1);
        assert_eq!(served.load(Ordering::SeqCst), 1);
    }
}
