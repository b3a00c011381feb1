// src/ingest/http.rs
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};

use crate::config::HttpConfig;
use crate::ingest::types::FetchError;

/// Client shared by all fetchers of one monitor. Carries the identifying
/// User-Agent and a hard request timeout.
pub fn build_client(cfg: &HttpConfig) -> anyhow::Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_str(&cfg.accept)?);
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_str(&cfg.accept_language)?);

    let timeout = Duration::from_secs(cfg.timeout_secs.max(1));
    let client = reqwest::Client::builder()
        .user_agent(cfg.user_agent.as_str())
        .default_headers(headers)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// GET `url` and return the body; non-2xx and timeouts become `FetchError`.
pub async fn get_text(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    resp.text()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))
}
