//! Rate-limit-aware GitHub REST client.
//!
//! `octocrab` is used only to mint installation tokens (see
//! [`super::client::GitHubClient`]) — the bootstrap and file-sync fetchers
//! below need raw response headers (`Link`, `Retry-After`,
//! `X-RateLimit-Remaining`) that octocrab's typed responses don't expose,
//! so they go through `reqwest` directly, the way the teacher's
//! `Cargo.toml` already pulls in `reqwest` for its own outbound HTTP calls.

use std::time::Duration;

const API_BASE: &str = "https://api.github.com";

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("github returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

pub struct RestClient {
    http: reqwest::Client,
    token: String,
}

impl RestClient {
    pub fn new(token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
        }
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", "ghmirror-api")
    }

    /// GET a single URL, returning the parsed JSON body and the `rel="next"`
    /// pagination URL (if any), or a typed [`RestError`] on rate limit / HTTP
    /// failure.
    pub async fn get(&self, url: &str) -> Result<(serde_json::Value, Option<String>), RestError> {
        let response = self.request(url).send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        if status.as_u16() == 429
            || (status.as_u16() == 403 && is_rate_limit_exhausted(&headers))
        {
            return Err(RestError::RateLimited {
                retry_after_ms: retry_after_ms(&headers),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let next = next_link(&headers);
        let body: serde_json::Value = response.json().await?;
        Ok((body, next))
    }

    /// GET `path` (relative to `https://api.github.com`) and follow `Link:
    /// rel="next"` until either the pages are exhausted or `max_items` array
    /// entries have been collected. Each page response must be a JSON array.
    pub async fn get_all_pages(
        &self,
        path: &str,
        per_page: u32,
        max_items: usize,
    ) -> Result<Vec<serde_json::Value>, RestError> {
        let sep = if path.contains('?') { "&" } else { "?" };
        let mut url = Some(format!("{API_BASE}{path}{sep}per_page={per_page}"));
        let mut items = Vec::new();

        while let Some(current) = url {
            let (body, next) = self.get(&current).await?;
            let page = body.as_array().cloned().unwrap_or_default();
            items.extend(page);
            if items.len() >= max_items {
                items.truncate(max_items);
                break;
            }
            url = next;
        }

        Ok(items)
    }

    pub fn base_url(path: &str) -> String {
        format!("{API_BASE}{path}")
    }

    /// Issue a mutating request (`POST`/`PATCH`/`PUT`) with a JSON body,
    /// used by the write-operation path (spec.md §4.15) — reads go through
    /// [`Self::get`]/[`Self::get_all_pages`], mutations go through here.
    pub async fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<(u16, serde_json::Value), RestError> {
        let url = Self::base_url(path);
        let response = self
            .http
            .request(method, &url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", "ghmirror-api")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 || (status.as_u16() == 403 && is_rate_limit_exhausted(response.headers())) {
            return Err(RestError::RateLimited {
                retry_after_ms: retry_after_ms(response.headers()),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::Http { status: status.as_u16(), body });
        }

        let json = response.json().await.unwrap_or(serde_json::Value::Null);
        Ok((status.as_u16(), json))
    }
}

fn is_rate_limit_exhausted(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        == Some(0)
}

/// Derive `retryAfterMs` from `Retry-After` (seconds) or
/// `X-RateLimit-Reset` (epoch seconds), defaulting to 60s (spec.md §5).
fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> u64 {
    if let Some(secs) = headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        return secs * 1000;
    }

    if let Some(reset_epoch) = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
    {
        let now = chrono::Utc::now().timestamp();
        let delta = (reset_epoch - now).max(0);
        return delta as u64 * 1000;
    }

    Duration::from_secs(60).as_millis() as u64
}

/// Parse the `rel="next"` URL out of a GitHub `Link` header.
fn next_link(headers: &reqwest::header::HeaderMap) -> Option<String> {
    let raw = headers.get("link")?.to_str().ok()?;
    raw.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let url_segment = segments.next()?.trim();
        let rel_is_next = segments.any(|s| s.trim() == r#"rel="next""#);
        if rel_is_next {
            url_segment
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string()
                .into()
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn next_link_parses_github_style_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "link",
            HeaderValue::from_static(
                r#"<https://api.github.com/repos/o/r/issues?page=2>; rel="next", <https://api.github.com/repos/o/r/issues?page=5>; rel="last""#,
            ),
        );
        assert_eq!(
            next_link(&headers).as_deref(),
            Some("https://api.github.com/repos/o/r/issues?page=2")
        );
    }

    #[test]
    fn next_link_is_none_without_next_rel() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "link",
            HeaderValue::from_static(
                r#"<https://api.github.com/repos/o/r/issues?page=1>; rel="first""#,
            ),
        );
        assert_eq!(next_link(&headers), None);
    }

    #[test]
    fn retry_after_header_wins_over_rate_limit_reset() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("30"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("9999999999"));
        assert_eq!(retry_after_ms(&headers), 30_000);
    }

    #[test]
    fn retry_after_defaults_to_60s() {
        let headers = HeaderMap::new();
        assert_eq!(retry_after_ms(&headers), 60_000);
    }
}
