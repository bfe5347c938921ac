// src/services/hackernews.rs

//! Hacker News item API client.
//!
//! Fetches item snapshots from the Firebase endpoint. The upstream returns
//! `null` for ids that never existed and loosely-shaped JSON otherwise;
//! both are normalized here into the error taxonomy (`NotFound` vs
//! `Transport`) before anything downstream sees them.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::config::HackerNewsConfig;
use crate::error::{AppError, Result};
use crate::models::Document;

/// Source of external document snapshots.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch the current state of one document.
    async fn fetch(&self, id: i64) -> Result<Document>;
}

/// HTTP client for the Hacker News item API.
pub struct HackerNewsClient {
    client: Client,
    endpoint: Url,
}

impl HackerNewsClient {
    /// Create a new client with the given configuration.
    pub fn new(config: &HackerNewsConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let endpoint = Url::parse(&config.endpoint)?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl DocumentSource for HackerNewsClient {
    async fn fetch(&self, id: i64) -> Result<Document> {
        let url = self.endpoint.join(&format!("v0/item/{id}.json"))?;
        debug!(%url, "fetching item");

        let context = || format!("item {id}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::transport(context(), e))?;
        if !response.status().is_success() {
            return Err(AppError::transport(
                context(),
                format!("HTTP {}", response.status()),
            ));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::transport(context(), e))?;
        if payload.is_null() {
            return Err(AppError::not_found(format!("item {id} does not exist")));
        }

        serde_json::from_value(payload)
            .map_err(|e| AppError::transport(context(), format!("malformed document: {e}")))
    }
}

/// Extract an item id from free-form text: a bare number, a
/// `/watch <id>`-style command, or any URL carrying an `id` query
/// parameter.
pub fn parse_item_id(text: &str) -> Option<i64> {
    let text = text.trim();

    if let Ok(id) = text.parse::<i64>() {
        return (id > 0).then_some(id);
    }

    let patterns = [r"/(?:watch|unwatch)\s+(\d+)", r"[?&]id=(\d+)"];
    for pattern in patterns {
        let re = Regex::new(pattern).expect("static pattern");
        if let Some(caps) = re.captures(text) {
            if let Ok(id) = caps[1].parse::<i64>() {
                if id > 0 {
                    return Some(id);
                }
            }
        }
    }
    None
}
