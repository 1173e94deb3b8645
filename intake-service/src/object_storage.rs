//! Object storage and provider-side vector table.
//!
//! Talks to a Supabase-style backend: blobs through the storage API, vector
//! rows and the similarity RPC through the REST API.

use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StorageConfig;
use crate::db::models::VectorMetadata;
use crate::error::{ProviderError, ServiceError, ServiceResult};

const SERVICE: &str = "storage";

/// Default number of matches returned by a similarity search
pub const DEFAULT_MATCH_COUNT: usize = 10;

/// A stored blob
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// Generated object name, without the folder prefix
    pub name: String,
    /// Full key inside the bucket
    pub path: String,
    /// Publicly resolvable URL
    pub url: String,
}

/// A chunk returned by the similarity RPC
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorMatch {
    #[serde(alias = "document_id")]
    pub document_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub similarity: f32,
}

/// Blob and vector operations used by the pipeline and search
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store an original upload under `documents/<owner>/`
    async fn upload_document(
        &self,
        content: &[u8],
        file_name: &str,
        mime_type: &str,
        owner: &str,
    ) -> ServiceResult<StoredObject>;

    /// Store an extracted image under `images/<document_id>/`
    async fn upload_image(
        &self,
        content: &[u8],
        file_name: &str,
        document_id: &str,
    ) -> ServiceResult<StoredObject>;

    async fn store_vector_embedding(
        &self,
        document_id: &str,
        embedding: &[f32],
        content: &str,
        metadata: &VectorMetadata,
    ) -> ServiceResult<()>;

    async fn search_similar_vectors(
        &self,
        query: &[f32],
        limit: usize,
    ) -> ServiceResult<Vec<VectorMatch>>;

    /// Remove every provider-side vector row of a document
    async fn delete_document_vectors(&self, document_id: &str) -> ServiceResult<()>;
}

/// REST client for the storage provider
pub struct ObjectStorageClient {
    client: Client,
    config: StorageConfig,
}

impl ObjectStorageClient {
    pub fn new(config: StorageConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                ServiceError::Provider(ProviderError::Connection {
                    service: SERVICE,
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url(),
            self.config.bucket,
            path
        )
    }

    /// Public URL of an object key
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url(),
            self.config.bucket,
            path
        )
    }

    fn rest_url(&self, resource: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url(), resource)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.config.api_key)
            .header("apikey", &self.config.api_key)
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> ServiceResult<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ProviderError::Connection {
                service: SERVICE,
                url: url.to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                service: SERVICE,
                status,
                message,
            }
            .into());
        }

        Ok(response)
    }

    async fn upload(
        &self,
        folder: &str,
        content: &[u8],
        file_name: &str,
        mime_type: &str,
    ) -> ServiceResult<StoredObject> {
        let name = generate_object_name(file_name);
        let path = format!("{}/{}", folder, name);
        let url = self.object_url(&path);

        debug!(path = %path, bytes = content.len(), "Uploading object");
        let request = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .header("x-upsert", "false")
            .body(content.to_vec());
        self.send(&url, request).await?;

        Ok(StoredObject {
            url: self.public_url(&path),
            name,
            path,
        })
    }
}

#[async_trait]
impl ObjectStorage for ObjectStorageClient {
    async fn upload_document(
        &self,
        content: &[u8],
        file_name: &str,
        mime_type: &str,
        owner: &str,
    ) -> ServiceResult<StoredObject> {
        let folder = format!("documents/{}", urlencoding::encode(owner));
        self.upload(&folder, content, file_name, mime_type).await
    }

    async fn upload_image(
        &self,
        content: &[u8],
        file_name: &str,
        document_id: &str,
    ) -> ServiceResult<StoredObject> {
        let folder = format!("images/{}", urlencoding::encode(document_id));
        let mime_type = mime_guess::from_path(file_name).first_or_octet_stream();
        self.upload(&folder, content, file_name, mime_type.essence_str())
            .await
    }

    async fn store_vector_embedding(
        &self,
        document_id: &str,
        embedding: &[f32],
        content: &str,
        metadata: &VectorMetadata,
    ) -> ServiceResult<()> {
        let url = self.rest_url(&self.config.vector_table);
        let row = VectorRow {
            document_id,
            content,
            embedding,
            metadata,
        };
        let request = self
            .client
            .post(&url)
            .header("Prefer", "return=minimal")
            .json(&row);
        self.send(&url, request).await?;
        Ok(())
    }

    async fn search_similar_vectors(
        &self,
        query: &[f32],
        limit: usize,
    ) -> ServiceResult<Vec<VectorMatch>> {
        let url = self.rest_url(&format!("rpc/{}", self.config.match_function));
        let body = MatchRequest {
            query_embedding: query,
            match_threshold: self.config.match_threshold,
            match_count: limit,
        };
        let response = self.send(&url, self.client.post(&url).json(&body)).await?;

        let matches = response
            .json::<Vec<VectorMatch>>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                service: SERVICE,
                message: e.to_string(),
            })?;
        Ok(matches)
    }

    async fn delete_document_vectors(&self, document_id: &str) -> ServiceResult<()> {
        let url = format!(
            "{}?document_id=eq.{}",
            self.rest_url(&self.config.vector_table),
            urlencoding::encode(document_id)
        );
        self.send(&url, self.client.delete(&url)).await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct VectorRow<'a> {
    document_id: &'a str,
    content: &'a str,
    embedding: &'a [f32],
    metadata: &'a VectorMetadata,
}

#[derive(Serialize)]
struct MatchRequest<'a> {
    query_embedding: &'a [f32],
    match_threshold: f32,
    match_count: usize,
}

/// Build a collision-resistant object name:
/// `<unix millis>_<8 random alphanumerics>_<sanitized original name>`
pub fn generate_object_name(original_name: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!(
        "{}_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        suffix,
        sanitize_object_name(original_name)
    )
}

/// Keep ASCII letters, digits, `.`, `-` and `_`; replace everything else
fn sanitize_object_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let sanitized: String = base
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() => c,
            '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    let sanitized = sanitized.trim_matches('_');
    if sanitized.is_empty() {
        "file".to_string()
    } else {
        sanitized.to_string()
    }
}
