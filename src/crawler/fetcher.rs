//! Adaptive HTTP fetcher
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building the HTTP client from the `[fetcher]` config section
//! - The rate gate driven by [`DelayController`]
//! - Browser-like request headers with cookie and referer chaining
//! - Retry with backoff and jitter on 429 and transport failures
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 2xx, body complete | Absorb cookies, decay delay, return body |
//! | HTTP 2xx, body cut off | Grow delay, wait delay + jitter, retry |
//! | HTTP 429 | Grow delay, wait delay + jitter, retry |
//! | Other non-2xx | Immediate failure, no retry |
//! | Timeout / connect / reset | Grow delay, wait delay + jitter, retry |

use crate::config::FetcherConfig;
use crate::state::{DelayController, SessionState};
use rand::Rng;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// User agent sent when the config does not override it
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DOCUMENT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,\
     image/avif,image/webp,image/apng,*/*;q=0.8";

const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Why a fetch produced no body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// Non-2xx status other than 429; never retried
    #[error("HTTP {status}")]
    Http { status: u16 },

    /// Every attempt was answered with 429
    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Transport failure on the final attempt
    #[error("Network error: {error}")]
    Network { error: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Result of a fetch operation
///
/// Fetches never return `Err`; callers inspect the variant instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult<T = String> {
    Success { status: u16, body: T },
    Failure(FetchFailure),
}

impl<T> FetchResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// HTTP status of the final attempt, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Success { status, .. } => Some(*status),
            Self::Failure(FetchFailure::Http { status }) => Some(*status),
            Self::Failure(FetchFailure::RateLimited { .. }) => {
                Some(StatusCode::TOO_MANY_REQUESTS.as_u16())
            }
            Self::Failure(_) => None,
        }
    }

    /// Human-readable error for a failed fetch
    pub fn error(&self) -> Option<String> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(failure) => Some(failure.to_string()),
        }
    }

    pub fn into_body(self) -> Option<T> {
        match self {
            Self::Success { body, .. } => Some(body),
            Self::Failure(_) => None,
        }
    }
}

/// What a request is for; decides headers and whether the referer anchor moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Document,
    Image,
}

/// A fully received response body
#[derive(Debug)]
enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

/// Reads the whole body; documents are decoded as text, images kept as bytes
async fn read_payload(response: Response, kind: RequestKind) -> Result<Payload, reqwest::Error> {
    match kind {
        RequestKind::Document => response.text().await.map(Payload::Text),
        RequestKind::Image => response.bytes().await.map(|b| Payload::Binary(b.to_vec())),
    }
}

/// Builds an HTTP client from the fetcher configuration
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(config.request_timeout))
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Rate-limited fetcher owning one delay controller and one session
///
/// All methods take `&mut self`, so a fetcher can only ever have one request
/// in flight. Independent crawl streams each own their own instance.
pub struct AdaptiveFetcher {
    client: Client,
    delay: DelayController,
    session: SessionState,
    max_retries: u32,
    jitter_max: u64,
}

impl AdaptiveFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            delay: DelayController::new(config),
            session: SessionState::new(),
            max_retries: config.max_retries,
            jitter_max: config.jitter_max,
        })
    }

    /// Fetches a page with the configured number of attempts
    pub async fn fetch(&mut self, url: &str) -> FetchResult {
        self.fetch_with_retries(url, self.max_retries).await
    }

    /// Fetches a page, making at most `retries` attempts
    pub async fn fetch_with_retries(&mut self, url: &str, retries: u32) -> FetchResult {
        match self.request(url, RequestKind::Document, retries).await {
            Ok((status, Payload::Text(body))) => FetchResult::Success { status, body },
            Ok((status, Payload::Binary(bytes))) => FetchResult::Success {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            },
            Err(failure) => FetchResult::Failure(failure),
        }
    }

    /// Fetches a binary image; does not move the referer anchor
    pub async fn fetch_image(&mut self, url: &str) -> FetchResult<Vec<u8>> {
        match self.request(url, RequestKind::Image, self.max_retries).await {
            Ok((status, Payload::Binary(body))) => FetchResult::Success { status, body },
            Ok((status, Payload::Text(text))) => FetchResult::Success {
                status,
                body: text.into_bytes(),
            },
            Err(failure) => FetchResult::Failure(failure),
        }
    }

    pub fn delay(&self) -> &DelayController {
        &self.delay
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Runs the attempt loop and hands back the body of the first complete 2xx response
    ///
    /// A body that breaks off mid-transfer counts as a network failure, so
    /// cookies, the referer anchor and the delay decay only follow a body
    /// that fully arrived.
    async fn request(
        &mut self,
        url: &str,
        kind: RequestKind,
        retries: u32,
    ) -> Result<(u16, Payload), FetchFailure> {
        let parsed = Url::parse(url).map_err(|e| FetchFailure::InvalidUrl(e.to_string()))?;
        let retries = retries.max(1);

        for attempt in 1..=retries {
            self.delay.maybe_reset(Instant::now());
            if let Some(wait) = self.delay.time_until_next_request(Instant::now()) {
                tokio::time::sleep(wait).await;
            }
            self.delay.record_request(Instant::now());

            let headers = build_headers(&mut self.session, &parsed, kind);
            tracing::debug!("GET {} (attempt {}/{})", url, attempt, retries);

            let failure = match self.client.get(parsed.clone()).headers(headers).send().await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    FetchFailure::RateLimited { attempts: attempt }
                }
                Ok(response) if !response.status().is_success() => {
                    let status = response.status().as_u16();
                    tracing::warn!("HTTP {} for {}", status, url);
                    return Err(FetchFailure::Http { status });
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let set_cookies: Vec<String> = response
                        .headers()
                        .get_all(header::SET_COOKIE)
                        .iter()
                        .filter_map(|v| v.to_str().ok())
                        .map(String::from)
                        .collect();

                    match read_payload(response, kind).await {
                        Ok(payload) => {
                            self.session.absorb(set_cookies.iter().map(String::as_str));
                            if kind == RequestKind::Document {
                                self.session.record_success(url);
                            }
                            self.delay.on_success();
                            return Ok((status, payload));
                        }
                        Err(e) => FetchFailure::Network {
                            error: e.to_string(),
                        },
                    }
                }
                Err(e) => FetchFailure::Network {
                    error: e.to_string(),
                },
            };

            self.delay.on_failure(Instant::now());
            if attempt == retries {
                tracing::warn!("Giving up on {} after {} attempts: {}", url, retries, failure);
                return Err(failure);
            }

            let wait = self.backoff();
            match &failure {
                FetchFailure::RateLimited { .. } => tracing::info!(
                    "Rate limited, waiting {}ms before retry (attempt {}/{})",
                    wait.as_millis(),
                    attempt,
                    retries
                ),
                other => tracing::info!(
                    "{}, waiting {}ms before retry (attempt {}/{})",
                    other,
                    wait.as_millis(),
                    attempt,
                    retries
                ),
            }
            tokio::time::sleep(wait).await;
        }

        // The loop always returns on its final attempt
        Err(FetchFailure::Network {
            error: "no attempts made".to_string(),
        })
    }

    /// Current delay plus uniform jitter in `[0, jitter_max)`
    fn backoff(&self) -> Duration {
        self.delay.current_delay() + jitter(self.jitter_max)
    }
}

fn jitter(max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}

/// Builds the browser-like header set for one request
fn build_headers(session: &mut SessionState, url: &Url, kind: RequestKind) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE));

    match kind {
        RequestKind::Document => {
            headers.insert(header::ACCEPT, HeaderValue::from_static(DOCUMENT_ACCEPT));
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
            headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
            headers.insert("sec-fetch-site", HeaderValue::from_static(session.fetch_site()));
            headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
            headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        }
        RequestKind::Image => {
            headers.insert(header::ACCEPT, HeaderValue::from_static(IMAGE_ACCEPT));
            headers.insert("sec-fetch-dest", HeaderValue::from_static("image"));
            headers.insert("sec-fetch-mode", HeaderValue::from_static("no-cors"));
            headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
        }
    }

    if let Some(referer) = session.referer_for(url) {
        match HeaderValue::from_str(&referer) {
            Ok(value) => {
                headers.insert(header::REFERER, value);
            }
            Err(_) => tracing::debug!("Referer not sendable as a header: {}", referer),
        }
    }

    if let Some(cookies) = session.cookie_header() {
        match HeaderValue::from_str(&cookies) {
            Ok(value) => {
                headers.insert(header::COOKIE, value);
            }
            Err(_) => tracing::debug!("Cookie header not sendable, dropping it"),
        }
    }

    headers
}
