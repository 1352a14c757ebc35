use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;

use super::backend::{error_from_response, BackendErrorKind, BackendResult};
use crate::models::session::Session;

#[derive(Clone, Debug)]
pub struct BucketSpec {
    pub name: String,
    pub public: bool,
    pub file_size_limit: u64,
    pub allowed_mime_types: Vec<String>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool>;

    async fn create_bucket(&self, spec: &BucketSpec) -> BackendResult<()>;

    /// Uploads with overwrite.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> BackendResult<()>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

pub struct RestStorage {
    url: String,
    anon_key: String,
    client: reqwest::Client,
    session: watch::Receiver<Option<Session>>,
}

impl RestStorage {
    pub fn new(url: &str, anon_key: &str, session: watch::Receiver<Option<Session>>) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            client: reqwest::Client::new(),
            session,
        }
    }

    fn token(&self) -> String {
        self.session
            .borrow()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    async fn check(response: reqwest::Response) -> BackendResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await?;
        Err(error_from_response(status.as_u16(), &body))
    }
}

#[async_trait]
impl ObjectStorage for RestStorage {
    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool> {
        let response = self
            .client
            .get(format!("{}/storage/v1/bucket/{}", self.url, bucket))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.token())
            .send()
            .await?;

        match Self::check(response).await {
            Ok(()) => Ok(true),
            // the storage API reports a missing bucket as 400 or 404 depending on version
            Err(e) if e.is(BackendErrorKind::NotFound) || e.message.contains("not found") => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_bucket(&self, spec: &BucketSpec) -> BackendResult<()> {
        let response = self
            .client
            .post(format!("{}/storage/v1/bucket", self.url))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.token())
            .json(&json!({
                "id": spec.name,
                "name": spec.name,
                "public": spec.public,
                "file_size_limit": spec.file_size_limit,
                "allowed_mime_types": spec.allowed_mime_types,
            }))
            .send()
            .await?;

        Self::check(response).await
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> BackendResult<()> {
        let response = self
            .client
            .post(format!("{}/storage/v1/object/{}/{}", self.url, bucket, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.token())
            .header("x-upsert", "true")
            .header("cache-control", "max-age=3600")
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await?;

        Self::check(response).await
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.url, bucket, path)
    }
}
