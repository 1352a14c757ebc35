//! In-process stand-ins for the hosted backend, used by the service tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use super::auth::AuthProvider;
use super::backend::{Backend, BackendError, BackendErrorKind, BackendResult, Filter, Query, Table};
use super::storage::{BucketSpec, ObjectStorage};
use crate::models::session::{AuthUser, Session, SignUpOutcome};

fn column_text(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn matches(row: &Value, query: &Query) -> bool {
    query.filters.iter().all(|filter| match filter {
        Filter::Eq(column, value) => column_text(row, column).as_deref() == Some(value.as_str()),
        Filter::In(column, values) => column_text(row, column)
            .map(|text| values.contains(&text))
            .unwrap_or(false),
    })
}

fn merge(row: &mut Value, patch: &Value) {
    if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
    updates: Mutex<HashMap<Table, usize>>,
    failure: Mutex<Option<BackendError>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a row as-is apart from the id and creation defaults.
    pub fn seed(&self, table: Table, mut row: Value) -> Value {
        Self::fill_defaults(&mut row);
        let mut tables = self.tables.lock().unwrap();
        tables.entry(table).or_default().push(row.clone());

        row
    }

    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn update_calls(&self, table: Table) -> usize {
        *self.updates.lock().unwrap().get(&table).unwrap_or(&0)
    }

    /// Makes every following call fail until cleared with `None`.
    pub fn set_failure(&self, failure: Option<BackendError>) {
        *self.failure.lock().unwrap() = failure;
    }

    fn check_failure(&self) -> BackendResult<()> {
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn fill_defaults(row: &mut Value) {
        if row.get("id").map(|id| id.is_null()).unwrap_or(true) {
            row["id"] = json!(uuid::Uuid::new_v4().to_string());
        }
        if row.get("created_at").map(|c| c.is_null()).unwrap_or(true) {
            row["created_at"] = json!(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true));
        }
    }

    fn check_unique(rows: &[Value], table: Table, candidate: &Value) -> BackendResult<()> {
        if table != Table::Profiles {
            return Ok(());
        }

        let username = match column_text(candidate, "username") {
            Some(username) => username,
            None => return Ok(()),
        };
        let id = column_text(candidate, "id");

        let taken = rows.iter().any(|row| {
            column_text(row, "username").as_deref() == Some(username.as_str())
                && column_text(row, "id") != id
        });

        if taken {
            return Err(BackendError::new(
                BackendErrorKind::UniqueViolation,
                "duplicate key value violates unique constraint \"profiles_username_key\"",
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn select(&self, table: Table, query: &Query) -> BackendResult<Vec<Value>> {
        self.check_failure()?;

        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Value> = tables
            .get(&table)
            .map(|rows| rows.iter().filter(|row| matches(row, query)).cloned().collect())
            .unwrap_or_default();

        if let Some((column, ascending)) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = column_text(a, column).cmp(&column_text(b, column));
                if *ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        Ok(rows)
    }

    async fn insert(&self, table: Table, mut row: Value) -> BackendResult<Value> {
        self.check_failure()?;
        Self::fill_defaults(&mut row);

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table).or_default();
        let id = column_text(&row, "id");
        if rows.iter().any(|existing| column_text(existing, "id") == id) {
            return Err(BackendError::new(
                BackendErrorKind::UniqueViolation,
                "duplicate key value violates unique constraint",
            ));
        }
        Self::check_unique(rows, table, &row)?;
        rows.push(row.clone());

        Ok(row)
    }

    async fn update(&self, table: Table, query: &Query, patch: Value) -> BackendResult<Vec<Value>> {
        self.check_failure()?;
        *self.updates.lock().unwrap().entry(table).or_default() += 1;

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table).or_default();
        let mut updated = Vec::new();

        for index in 0..rows.len() {
            if !matches(&rows[index], query) {
                continue;
            }

            let mut candidate = rows[index].clone();
            merge(&mut candidate, &patch);
            Self::check_unique(rows, table, &candidate)?;
            rows[index] = candidate.clone();
            updated.push(candidate);
        }

        Ok(updated)
    }

    async fn upsert(&self, table: Table, mut row: Value) -> BackendResult<Value> {
        self.check_failure()?;

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table).or_default();
        Self::check_unique(rows, table, &row)?;

        let id = column_text(&row, "id");
        if let Some(existing) = rows
            .iter_mut()
            .find(|existing| id.is_some() && column_text(existing, "id") == id)
        {
            merge(existing, &row);
            return Ok(existing.clone());
        }

        Self::fill_defaults(&mut row);
        rows.push(row.clone());

        Ok(row)
    }

    async fn delete(&self, table: Table, query: &Query) -> BackendResult<u64> {
        self.check_failure()?;

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table).or_default();
        let before = rows.len();
        rows.retain(|row| !matches(row, query));

        Ok((before - rows.len()) as u64)
    }
}

struct Account {
    user: AuthUser,
    password: String,
    metadata: Value,
}

#[derive(Default)]
pub struct MemoryAuth {
    accounts: Mutex<Vec<Account>>,
    signed_out: Mutex<Vec<String>>,
    confirm_email: bool,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign-up returns the user without a session, as when email
    /// confirmation is enabled.
    pub fn with_email_confirmation() -> Self {
        Self {
            confirm_email: true,
            ..Self::default()
        }
    }

    pub fn register(&self, email: &str, password: &str) -> AuthUser {
        let user = AuthUser {
            id: uuid::Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
        };
        self.accounts.lock().unwrap().push(Account {
            user: user.clone(),
            password: password.to_string(),
            metadata: Value::Null,
        });

        user
    }

    pub fn metadata(&self, email: &str) -> Option<Value> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.user.email.as_deref() == Some(email))
            .map(|a| a.metadata.clone())
    }

    pub fn signed_out(&self) -> Vec<String> {
        self.signed_out.lock().unwrap().clone()
    }

    fn session_for(user: &AuthUser) -> Session {
        Session {
            access_token: format!("token-{}", user.id),
            refresh_token: None,
            user: user.clone(),
        }
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<Session> {
        let accounts = self.accounts.lock().unwrap();

        accounts
            .iter()
            .find(|a| a.user.email.as_deref() == Some(email) && a.password == password)
            .map(|a| Self::session_for(&a.user))
            .ok_or_else(|| {
                BackendError::new(BackendErrorKind::Rejected(400), "Invalid login credentials")
            })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
        _redirect_to: &str,
    ) -> BackendResult<SignUpOutcome> {
        let mut accounts = self.accounts.lock().unwrap();

        if accounts.iter().any(|a| a.user.email.as_deref() == Some(email)) {
            return Err(BackendError::new(
                BackendErrorKind::Rejected(422),
                "User already registered",
            ));
        }

        let user = AuthUser {
            id: uuid::Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
        };
        accounts.push(Account {
            user: user.clone(),
            password: password.to_string(),
            metadata,
        });

        let session = if self.confirm_email {
            None
        } else {
            Some(Self::session_for(&user))
        };

        Ok(SignUpOutcome {
            user: Some(user),
            session,
        })
    }

    async fn sign_out(&self, access_token: &str) -> BackendResult<()> {
        self.signed_out
            .lock()
            .unwrap()
            .push(access_token.to_string());

        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    buckets: Mutex<Vec<BucketSpec>>,
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buckets(&self) -> Vec<BucketSpec> {
        self.buckets.lock().unwrap().clone()
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<(String, Vec<u8>)> {
        self.objects
            .lock()
            .unwrap()
            .get(&format!("{}/{}", bucket, path))
            .cloned()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool> {
        Ok(self.buckets.lock().unwrap().iter().any(|b| b.name == bucket))
    }

    async fn create_bucket(&self, spec: &BucketSpec) -> BackendResult<()> {
        self.buckets.lock().unwrap().push(spec.clone());
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> BackendResult<()> {
        if !self.bucket_exists(bucket).await? {
            return Err(BackendError::new(BackendErrorKind::NotFound, "Bucket not found"));
        }

        self.objects.lock().unwrap().insert(
            format!("{}/{}", bucket, path),
            (content_type.to_string(), bytes),
        );

        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{}/{}", bucket, path)
    }
}
