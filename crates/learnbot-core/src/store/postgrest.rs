use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::StoreError;

use super::{Filter, ProfileStore, Row};

/// Supabase REST (PostgREST) backed profile store.
pub struct PostgrestStore {
    base_url: String,
    service_key: String,
    client: reqwest::Client,
}

/// PostgREST error body.
#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl PostgrestStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = crate::util::http::client_builder()
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &StoreConfig, client: reqwest::Client) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            client,
        }
    }

    fn table_url(&self, table: &str, filter: Option<&Filter>, limit: Option<usize>) -> String {
        let mut params = Vec::new();
        if let Some(f) = filter {
            params.push(format!(
                "{}=eq.{}",
                urlencoding::encode(&f.column),
                urlencoding::encode(&f.value)
            ));
        }
        if let Some(n) = limit {
            params.push(format!("limit={}", n));
        }
        let mut url = format!("{}/rest/v1/{}", self.base_url, urlencoding::encode(table));
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_error(status, &body))
    }
}

/// Translate a non-success PostgREST response into a [`StoreError`].
fn map_error(status: StatusCode, body: &str) -> StoreError {
    let parsed: Option<ApiError> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|e| e.code.clone());
    let message = parsed
        .as_ref()
        .and_then(|e| match (&e.message, &e.details) {
            (Some(m), Some(d)) => Some(format!("{} ({})", m, d)),
            (Some(m), None) => Some(m.clone()),
            _ => None,
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body.to_string()
            }
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        StatusCode::CONFLICT => StoreError::Conflict(message),
        s if s.is_server_error() => StoreError::Unavailable(format!("{}: {}", s.as_u16(), message)),
        s => StoreError::Rejected {
            status: s.as_u16(),
            code,
            message,
        },
    }
}

#[async_trait]
impl ProfileStore for PostgrestStore {
    async fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError> {
        let url = self.table_url(table, filter, limit);
        debug!("GET {}", url);
        let response = self
            .execute(self.client.get(&url).query(&[("select", "*")]))
            .await?;
        response
            .json::<Vec<Row>>()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<(), StoreError> {
        let url = self.table_url(table, None, None);
        debug!("POST {}", url);
        self.execute(
            self.client
                .post(&url)
                .header("Prefer", "return=minimal")
                .json(row),
        )
        .await?;
        Ok(())
    }

    async fn update(&self, table: &str, patch: &Row, filter: &Filter) -> Result<usize, StoreError> {
        let url = self.table_url(table, Some(filter), None);
        debug!("PATCH {}", url);
        let response = self
            .execute(
                self.client
                    .patch(&url)
                    .header("Prefer", "return=representation")
                    .json(patch),
            )
            .await?;
        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        Ok(rows.len())
    }
}
