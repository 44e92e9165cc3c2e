use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Client;
use tabsync_core::{Element, FragmentSource, PollError};
use tracing::debug;

pub mod parse;

/// Fetches table fragments over HTTP. Each fetch asks the endpoint for the
/// named update target and appends a millisecond timestamp as a cache buster,
/// the query shape the fragment servlet expects:
/// `GET <endpoint>?update=<target>&ts=<millis>`.
pub struct HttpFragmentSource {
    client: Client,
    endpoint: String,
    target: String,
}

impl HttpFragmentSource {
    pub fn new(endpoint: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            target: target.into(),
        }
    }

    fn cache_buster() -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
    }
}

#[async_trait]
impl FragmentSource for HttpFragmentSource {
    async fn fetch_fragment(&self) -> Result<Element, PollError> {
        let ts = Self::cache_buster().to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("update", self.target.as_str()), ("ts", ts.as_str())])
            .send()
            .await
            .map_err(|e| PollError::fetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| PollError::fetch(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| PollError::fetch(e.to_string()))?;

        debug!(target = %self.target, bytes = body.len(), "fetched fragment");
        parse::table_fragment(&body)
    }
}
