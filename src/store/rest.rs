use super::{Filter, OrderBy, RemoteStore, Row, StoreError};
use crate::config::StoreConfig;
use crate::models::UserId;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// PostgREST-style HTTP client (Supabase layout: `/auth/v1` and `/rest/v1`).
#[derive(Debug, Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
}

impl RestStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url: String = base_url.into();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token,
        })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let base_url = config
            .url
            .clone()
            .ok_or_else(|| StoreError::Transport("no store url configured".to_string()))?;

        Self::new(
            base_url,
            config.api_key.clone().unwrap_or_default(),
            config.access_token.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        builder.header("apikey", &self.api_key).bearer_auth(bearer)
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify_error(status, &body);
        debug!("Store request failed with {}: {}", status, err);
        Err(err)
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|filter| match filter {
            Filter::Eq(column, value) => (column.clone(), format!("eq.{}", value_text(value))),
            Filter::IsNull(column) => (column.clone(), "is.null".to_string()),
        })
        .collect()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Map a PostgREST error response onto [`StoreError`].
pub(crate) fn classify_error(status: StatusCode, body: &str) -> StoreError {
    let parsed: PostgrestError = serde_json::from_str(body).unwrap_or_default();
    let message = parsed.message.unwrap_or_else(|| body.to_string());

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return StoreError::Auth(message);
    }

    match parsed.code.as_deref() {
        // PGRST204: column not in schema cache; 42703: undefined_column
        Some("PGRST204") | Some("42703") => {
            return StoreError::MissingColumn(quoted_name(&message).unwrap_or(message));
        }
        // unique_violation
        Some("23505") => return StoreError::UniqueViolation(message),
        _ => {}
    }

    if status == StatusCode::CONFLICT {
        return StoreError::UniqueViolation(message);
    }

    StoreError::Http {
        status: status.as_u16(),
        message,
    }
}

/// First `'name'` or `"name"` in an error message.
fn quoted_name(message: &str) -> Option<String> {
    let (start, quote) = message.char_indices().find(|(_, c)| *c == '\'' || *c == '"')?;
    let rest = &message[start + 1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

#[async_trait]
impl RemoteStore for RestStore {
    fn schema_scope(&self) -> Option<String> {
        Some(self.base_url.clone())
    }

    async fn current_principal(&self) -> Result<Option<UserId>, StoreError> {
        if self.access_token.is_none() {
            trace!("No access token, no principal");
            return Ok(None);
        }

        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self.authorized(self.client.get(&url)).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Access token rejected, treating as signed out");
            return Ok(None);
        }

        let user: AuthUser = Self::check(response).await?.json().await?;
        Ok(Some(UserId::new(user.id)))
    }

    async fn query(
        &self,
        table: &str,
        filters: &[Filter],
        order: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_params(filters));
        if let Some(order) = order {
            let direction = if order.descending { "desc" } else { "asc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        let response = self
            .authorized(self.client.get(self.table_url(table)))
            .query(&params)
            .send()
            .await?;

        let rows: Vec<Row> = Self::check(response).await?.json().await?;
        Ok(rows)
    }

    async fn upsert(
        &self,
        table: &str,
        row: Row,
        conflict_columns: &[&str],
    ) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.post(self.table_url(table)))
            .query(&[("on_conflict", conflict_columns.join(","))])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn update(&self, table: &str, row: Row, filters: &[Filter]) -> Result<u64, StoreError> {
        let response = self
            .authorized(self.client.patch(self.table_url(table)))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;

        let updated: Vec<Value> = Self::check(response).await?.json().await?;
        Ok(updated.len() as u64)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.post(self.table_url(table)))
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.delete(self.table_url(table)))
            .query(&filter_params(filters))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
