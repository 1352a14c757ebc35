use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::models::session::Session;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Packages,
    DailyYields,
    Transactions,
    Profiles,
    Referrals,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Packages => "packages",
            Table::DailyYields => "daily_yields",
            Table::Transactions => "transactions",
            Table::Profiles => "profiles",
            Table::Referrals => "referrals",
        }
    }

    pub fn from_name(name: &str) -> Option<Table> {
        match name {
            "packages" => Some(Table::Packages),
            "daily_yields" => Some(Table::DailyYields),
            "transactions" => Some(Table::Transactions),
            "profiles" => Some(Table::Profiles),
            "referrals" => Some(Table::Referrals),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendErrorKind {
    NotFound,
    UniqueViolation,
    Unauthorized,
    Rejected(u16),
    Network,
    Decode,
}

/// The one error every backend wrapper returns.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is(&self, kind: BackendErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_decode() {
            BackendErrorKind::Decode
        } else {
            BackendErrorKind::Network
        };

        BackendError::new(kind, e.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::new(BackendErrorKind::Decode, e.to_string())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Eq(String, String),
    In(String, Vec<String>),
}

#[derive(Clone, Debug, Default)]
pub struct Query {
    pub columns: Option<String>,
    pub filters: Vec<Filter>,
    pub order: Option<(String, bool)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.columns = Some(columns.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters
            .push(Filter::Eq(column.to_string(), value.to_string()));
        self
    }

    pub fn within(mut self, column: &str, values: &[String]) -> Self {
        self.filters
            .push(Filter::In(column.to_string(), values.to_vec()));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.to_string(), ascending));
        self
    }

    /// Renders the query as row-API query parameters.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();

        if let Some(columns) = &self.columns {
            params.push(("select".to_string(), columns.clone()));
        }

        for filter in &self.filters {
            match filter {
                Filter::Eq(column, value) => {
                    params.push((column.clone(), format!("eq.{}", value)));
                }
                Filter::In(column, values) => {
                    let quoted = values
                        .iter()
                        .map(|v| format!("\"{}\"", v.replace('"', "\\\"")))
                        .collect::<Vec<_>>()
                        .join(",");
                    params.push((column.clone(), format!("in.({})", quoted)));
                }
            }
        }

        if let Some((column, ascending)) = &self.order {
            let direction = if *ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", column, direction)));
        }

        params
    }
}

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn select(&self, table: Table, query: &Query) -> BackendResult<Vec<Value>>;

    async fn insert(&self, table: Table, row: Value) -> BackendResult<Value>;

    async fn update(&self, table: Table, query: &Query, patch: Value) -> BackendResult<Vec<Value>>;

    async fn upsert(&self, table: Table, row: Value) -> BackendResult<Value>;

    async fn delete(&self, table: Table, query: &Query) -> BackendResult<u64>;
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> BackendResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(BackendError::from))
        .collect()
}

pub fn decode_row<T: DeserializeOwned>(row: Value) -> BackendResult<T> {
    Ok(serde_json::from_value(row)?)
}

/// Maps an error response of the hosted row/auth/storage APIs onto a kind.
pub fn error_from_response(status: u16, body: &str) -> BackendError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .map(|c| match c {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    let message = parsed
        .as_ref()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|m| m.as_str()))
        })
        .map(|m| m.to_string())
        .unwrap_or_else(|| body.to_string());

    let kind = match (status, code.as_deref()) {
        (_, Some("23505")) => BackendErrorKind::UniqueViolation,
        (_, Some("PGRST116")) => BackendErrorKind::NotFound,
        (401, _) | (403, _) => BackendErrorKind::Unauthorized,
        (404, _) => BackendErrorKind::NotFound,
        (409, _) => BackendErrorKind::UniqueViolation,
        (status, _) => BackendErrorKind::Rejected(status),
    };

    BackendError::new(kind, message)
}

/// Row API client for the hosted backend.
#[derive(Clone)]
pub struct RestBackend {
    url: String,
    anon_key: String,
    client: reqwest::Client,
    session: watch::Receiver<Option<Session>>,
}

impl RestBackend {
    pub fn new(url: &str, anon_key: &str, session: watch::Receiver<Option<Session>>) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            client: reqwest::Client::new(),
            session,
        }
    }

    fn request(&self, method: Method, table: Table, query: &Query) -> RequestBuilder {
        let token = self
            .session
            .borrow()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone());

        self.client
            .request(method, format!("{}/rest/v1/{}", self.url, table.name()))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .query(&query.to_params())
    }

    async fn send(&self, request: RequestBuilder) -> BackendResult<Value> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            log::debug!("Backend rejected request: {} {}", status, body);
            return Err(error_from_response(status.as_u16(), &body));
        }

        if body.trim().is_empty() || status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&body)?)
    }

    fn into_rows(value: Value) -> Vec<Value> {
        match value {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }

    fn first_row(value: Value) -> BackendResult<Value> {
        Self::into_rows(value)
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::new(BackendErrorKind::Decode, "Empty representation."))
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn select(&self, table: Table, query: &Query) -> BackendResult<Vec<Value>> {
        let request = self.request(Method::GET, table, query);
        let value = self.send(request).await?;

        Ok(Self::into_rows(value))
    }

    async fn insert(&self, table: Table, row: Value) -> BackendResult<Value> {
        let request = self
            .request(Method::POST, table, &Query::new())
            .header("Prefer", "return=representation")
            .json(&row);
        let value = self.send(request).await?;

        Self::first_row(value)
    }

    async fn update(&self, table: Table, query: &Query, patch: Value) -> BackendResult<Vec<Value>> {
        let request = self
            .request(Method::PATCH, table, query)
            .header("Prefer", "return=representation")
            .json(&patch);
        let value = self.send(request).await?;

        Ok(Self::into_rows(value))
    }

    async fn upsert(&self, table: Table, row: Value) -> BackendResult<Value> {
        let request = self
            .request(Method::POST, table, &Query::new())
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&row);
        let value = self.send(request).await?;

        Self::first_row(value)
    }

    async fn delete(&self, table: Table, query: &Query) -> BackendResult<u64> {
        let request = self
            .request(Method::DELETE, table, query)
            .header("Prefer", "return=representation");
        let value = self.send(request).await?;

        Ok(Self::into_rows(value).len() as u64)
    }
}
