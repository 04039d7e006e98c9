use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};

use crate::core::config::Settings;
use crate::db::models::StoredDocument;
use crate::schemas::appeal::AppealUpload;

/// Where appeal documents live.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Stores one upload under `prefix` and returns its metadata.
    async fn store(&self, prefix: &str, upload: &AppealUpload) -> anyhow::Result<StoredDocument>;

    async fn delete(&self, path: &str) -> anyhow::Result<()>;
}

fn object_key(prefix: &str, filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') { ch } else { '_' })
        .collect();
    let safe = if safe.trim_matches('_').is_empty() { "document".to_string() } else { safe };
    format!("{}/{}-{}", prefix.trim_end_matches('/'), uuid::Uuid::new_v4(), safe)
}

fn describe(path: String, upload: &AppealUpload) -> StoredDocument {
    StoredDocument {
        path,
        filename: upload.filename.clone(),
        content_type: upload.content_type.clone(),
        size: upload.bytes.len() as i64,
        sha256: hex::encode(Sha256::digest(&upload.bytes)),
    }
}

#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        if settings.s3().access_key.is_empty() || settings.s3().secret_key.is_empty() {
            return Ok(None);
        }

        let creds = Credentials::new(
            settings.s3().access_key.clone(),
            settings.s3().secret_key.clone(),
            None,
            None,
            "gradeflow-static",
        );

        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(settings.s3().endpoint.clone())
            .region(aws_config::Region::new(settings.s3().region.clone()))
            .credentials_provider(creds)
            .load()
            .await;

        let client = Client::new(&config);

        Ok(Some(Self { client, bucket: settings.s3().bucket.clone() }))
    }
}

#[async_trait]
impl FileStorage for S3Storage {
    async fn store(&self, prefix: &str, upload: &AppealUpload) -> anyhow::Result<StoredDocument> {
        let key = object_key(prefix, &upload.filename);
        let document = describe(key.clone(), upload);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(&upload.content_type)
            .metadata("sha256", &document.sha256)
            .body(ByteStream::from(upload.bytes.clone()))
            .send()
            .await?;

        Ok(document)
    }

    async fn delete(&self, path: &str) -> anyhow::Result<()> {
        self.client.delete_object().bucket(&self.bucket).key(path).send().await?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryFiles {
    objects: BTreeMap<String, Vec<u8>>,
    deleted: Vec<String>,
}

/// In-process storage. Uploads whose filename is marked as failing are rejected.
#[derive(Clone, Default)]
pub struct MemoryFileStorage {
    files: Arc<Mutex<MemoryFiles>>,
    failing: Arc<HashSet<String>>,
}

impl MemoryFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(filenames: &[&str]) -> Self {
        Self {
            files: Arc::default(),
            failing: Arc::new(filenames.iter().map(|name| name.to_string()).collect()),
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.lock().map(|files| files.objects.keys().cloned().collect()).unwrap_or_default()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.files.lock().map(|files| files.deleted.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl FileStorage for MemoryFileStorage {
    async fn store(&self, prefix: &str, upload: &AppealUpload) -> anyhow::Result<StoredDocument> {
        if self.failing.contains(&upload.filename) {
            anyhow::bail!("storage rejected {}", upload.filename);
        }

        let key = object_key(prefix, &upload.filename);
        let document = describe(key.clone(), upload);
        let mut files = self.files.lock().map_err(|_| anyhow::anyhow!("storage lock poisoned"))?;
        files.objects.insert(key, upload.bytes.clone());
        Ok(document)
    }

    async fn delete(&self, path: &str) -> anyhow::Result<()> {
        let mut files = self.files.lock().map_err(|_| anyhow::anyhow!("storage lock poisoned"))?;
        files.objects.remove(path);
        files.deleted.push(path.to_string());
        Ok(())
    }
}
