//! HTTP session against the portal.
//!
//! The portal refuses tabulation POSTs without the cookie handed out by its
//! entry page, so [`PainelClient::connect`] performs that GET up front and
//! keeps the cookie in the client's store for the lifetime of the session.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue, ORIGIN, REFERER, RETRY_AFTER,
};

use crate::constants::{DEFAULT_SESSION_URL, DEFAULT_TABULATION_URL, USER_AGENT};
use crate::error::{Error, Result};
use crate::parse::snippet_for_log;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Tabulation endpoint (POST target).
    pub tabulation_url: String,
    /// Entry page that sets the mandatory session cookie.
    pub session_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts per request for transient failures.
    pub max_retries: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            tabulation_url: DEFAULT_TABULATION_URL.to_string(),
            session_url: DEFAULT_SESSION_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

pub struct PainelClient {
    http: reqwest::Client,
    opts: ClientOptions,
}

impl PainelClient {
    /// Builds the HTTP client and bootstraps the session cookie.
    pub async fn connect(opts: ClientOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("pt-BR,pt;q=0.9"));
        if let Some(origin) = origin_of(&opts.tabulation_url) {
            headers.insert(ORIGIN, origin);
        }
        if let Ok(referer) = HeaderValue::from_str(&opts.session_url) {
            headers.insert(REFERER, referer);
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .cookie_store(true)
            .timeout(opts.timeout)
            .build()
            .map_err(Error::Setup)?;

        let response = http
            .get(&opts.session_url)
            .send()
            .await
            .map_err(|source| Error::Request {
                filter: "session bootstrap".to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(Error::Status {
                filter: "session bootstrap".to_string(),
                status: response.status(),
            });
        }

        Ok(PainelClient { http, opts })
    }

    /// Convenience constructor with default portal endpoints.
    pub async fn connect_default() -> Result<Self> {
        PainelClient::connect(ClientOptions::default()).await
    }

    pub fn options(&self) -> &ClientOptions {
        &self.opts
    }

    /// POSTs one tabulation payload, retrying transient statuses with
    /// doubling backoff and honoring Retry-After when present.
    pub(crate) async fn post_tabulation(&self, payload: &str, filter: &str) -> Result<String> {
        let attempts = self.opts.max_retries.max(1);
        let mut backoff = Duration::from_secs(1);

        for attempt in 1..=attempts {
            let response = self
                .http
                .post(&self.opts.tabulation_url)
                .header(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                )
                .body(payload.to_string())
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.text().await.map_err(|source| Error::Request {
                            filter: filter.to_string(),
                            source,
                        });
                    }

                    let retry_after = parse_retry_after(resp.headers().get(RETRY_AFTER));
                    if is_retryable_status(status) && attempt < attempts {
                        let body = resp.text().await.unwrap_or_default();
                        tracing::warn!(
                            %status,
                            filter,
                            attempt,
                            body = %snippet_for_log(&body),
                            "retrying transient portal status"
                        );
                        tokio::time::sleep(retry_after.unwrap_or(backoff)).await;
                        backoff = (backoff + backoff).min(Duration::from_secs(60));
                        continue;
                    }

                    return Err(Error::Status {
                        filter: filter.to_string(),
                        status,
                    });
                }
                Err(source) => {
                    if attempt == attempts {
                        return Err(Error::Request {
                            filter: filter.to_string(),
                            source,
                        });
                    }
                    tracing::warn!(filter, attempt, error = %source, "retrying failed request");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff + backoff).min(Duration::from_secs(60));
                }
            }
        }

        // attempts >= 1, so the loop always returns before falling through.
        Err(Error::Status {
            filter: filter.to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        })
    }
}

fn origin_of(url: &str) -> Option<HeaderValue> {
    let parsed = reqwest::Url::parse(url).ok()?;
    HeaderValue::from_str(&parsed.origin().ascii_serialization()).ok()
}

pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

pub(crate) fn parse_retry_after(value: Option<&HeaderValue>) -> Option<Duration> {
    let value = value?.to_str().ok()?.trim();
    let secs = value.parse::<u64>().ok()?;
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
    }

    #[test]
    fn retry_after_seconds() {
        let value = HeaderValue::from_static("12");
        assert_eq!(
            parse_retry_after(Some(&value)),
            Some(Duration::from_secs(12))
        );
        let junk = HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_retry_after(Some(&junk)), None);
        assert_eq!(parse_retry_after(None), None);
    }
}
