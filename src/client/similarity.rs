//! Interface to the external vector-similarity service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, StoreError};
use crate::types::ArticleType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityRequest {
    pub query: String,
    pub k: usize,
}

/// One hit, in the order the service ranked it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityHit {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub article_type: ArticleType,
    pub score: f64,
}

#[async_trait]
pub trait SimilarityService: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SimilarityHit>>;
}

/// Posts `{query, k}` as JSON and expects a JSON array of hits.
pub struct HttpSimilarityService {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpSimilarityService {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SimilarityService for HttpSimilarityService {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SimilarityHit>> {
        let request = SimilarityRequest {
            query: query.to_string(),
            k,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StoreError::Timeout {
                        path: self.endpoint.clone(),
                        range: None,
                        budget: self.timeout,
                    }
                } else {
                    StoreError::network(&self.endpoint, None, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::network(
                &self.endpoint,
                None,
                format!("similarity service answered {}", status),
            ));
        }
        let mut hits: Vec<SimilarityHit> = response
            .json()
            .await
            .map_err(|e| StoreError::format(&self.endpoint, e.to_string()))?;
        hits.truncate(k);
        Ok(hits)
    }
}
