use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

use super::{BackendError, BackendResult, DocumentStore};
use crate::models::{DocumentKey, is_safe_file_name};

/// Uploads attachments with a PUT per file under the user's private prefix
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpDocumentStore {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url_for(&self, key: &DocumentKey) -> String {
        format!("{}/{}", self.base_url, key.path())
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn upload(&self, key: &DocumentKey, content: Vec<u8>, mime_type: &str) -> BackendResult<()> {
        if !is_safe_file_name(&key.file_name) {
            return Err(BackendError::Rejected(format!(
                "invalid file name {:?}",
                key.file_name
            )));
        }
        let url = self.url_for(key);
        let size = content.len();

        let mut request = self
            .client
            .put(&url)
            .header("Content-Type", mime_type)
            .body(content);
        if let Some(token) = &self.token {
            request = request.header("Authorization", token);
        }

        request.send().await?.error_for_status()?;
        info!(path = %key.path(), size, "Uploaded claim document");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub content: Vec<u8>,
    pub mime_type: String,
}

/// Object storage held in memory; file names can be marked to fail
#[derive(Default, Clone)]
pub struct InMemoryDocumentStore {
    objects: Arc<DashMap<String, StoredDocument>>,
    failing: Arc<DashSet<String>>,
    latency_ms: Arc<AtomicU64>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload of `file_name` will be refused
    pub fn fail_uploads_named(&self, file_name: impl Into<String>) {
        self.failing.insert(file_name.into());
    }

    /// Delay every upload, as a slow object store would
    pub fn set_upload_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn get(&self, path: &str) -> Option<StoredDocument> {
        self.objects.get(path).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn upload(&self, key: &DocumentKey, content: Vec<u8>, mime_type: &str) -> BackendResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.failing.contains(&key.file_name) {
            return Err(BackendError::Transport(format!(
                "upload of {} refused",
                key.file_name
            )));
        }

        self.objects.insert(
            key.path(),
            StoredDocument {
                content,
                mime_type: mime_type.to_string(),
            },
        );
        Ok(())
    }
}
