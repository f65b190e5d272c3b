//! PostgREST-style HTTP store (`{url}/rest/v1/{resource}`).

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use std::time::Duration;
use tracing::debug;

use super::{Query, Row, Store};
use crate::error::{Error, Result};

const SERVICE: &str = "store";

pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout_seconds: u64,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| Error::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout_seconds,
        })
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, resource)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Send and check the status; connectivity failures carry no status.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorized(request).send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("Request timed out after {}s", self.timeout_seconds)
            } else if e.is_connect() {
                format!("Cannot connect to store at {}", self.base_url)
            } else {
                format!("Failed to send request: {}", e)
            };
            Error::UpstreamUnavailable {
                service: SERVICE,
                status: None,
                message,
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamUnavailable {
                service: SERVICE,
                status: Some(status.as_u16()),
                message: body,
            });
        }

        Ok(response)
    }

    async fn rows(response: Response) -> Result<Vec<Row>> {
        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse store response: {}", e)))
    }
}

#[async_trait]
impl Store for RestStore {
    async fn select(&self, query: Query) -> Result<Vec<Row>> {
        debug!("GET {}", query);
        let request = self
            .client
            .get(self.endpoint(&query.resource))
            .query(&query.to_params());
        let response = self.send(request).await?;
        Self::rows(response).await
    }

    async fn insert(&self, resource: &str, rows: Vec<Row>) -> Result<()> {
        debug!("POST {} ({} rows)", resource, rows.len());
        let request = self
            .client
            .post(self.endpoint(resource))
            .header("Prefer", "return=minimal")
            .json(&rows);
        self.send(request).await?;
        Ok(())
    }

    async fn update(&self, query: Query, patch: Row) -> Result<usize> {
        debug!("PATCH {}", query);
        let request = self
            .client
            .patch(self.endpoint(&query.resource))
            .query(&query.to_params())
            .header("Prefer", "return=representation")
            .json(&patch);
        let response = self.send(request).await?;
        Ok(Self::rows(response).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let store = RestStore::new("https://example.supabase.co/", "key", 5).unwrap();
        assert_eq!(
            store.endpoint("transactions"),
            "https://example.supabase.co/rest/v1/transactions"
        );
    }

    #[tokio::test]
    async fn test_unreachable_store_reports_no_status() {
        // Port 9 (discard) is closed on test machines; the connect fails fast.
        let store = RestStore::new("http://127.0.0.1:9", "key", 2).unwrap();
        let err = store.select(Query::new("customers")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::UpstreamUnavailable { status: None, .. }
        ));
    }
}
