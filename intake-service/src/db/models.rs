//! Database model structs.
//!
//! This module contains the data structures for database records and the
//! input/patch types accepted by [`crate::store::DocumentStore`].

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an uploaded document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Stored, not yet picked up by the pipeline
    #[default]
    Uploaded,
    /// A pipeline run is in progress
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "processing" => DocumentStatus::Processing,
            "completed" => DocumentStatus::Completed,
            "failed" => DocumentStatus::Failed,
            _ => DocumentStatus::Uploaded,
        }
    }
}

/// Status of a processing queue item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "processing" => QueueStatus::Processing,
            "completed" => QueueStatus::Completed,
            "failed" => QueueStatus::Failed,
            _ => QueueStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

/// Pipeline stage reported on a queue item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStep {
    #[default]
    Ocr,
    Storage,
    Vectorization,
}

impl ProcessingStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStep::Ocr => "ocr",
            ProcessingStep::Storage => "storage",
            ProcessingStep::Vectorization => "vectorization",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "storage" => ProcessingStep::Storage,
            "vectorization" => ProcessingStep::Vectorization,
            _ => ProcessingStep::Ocr,
        }
    }
}

/// What a model configuration is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPurpose {
    Ocr,
    Embedding,
}

impl ModelPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelPurpose::Ocr => "ocr",
            ModelPurpose::Embedding => "embedding",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "embedding" => ModelPurpose::Embedding,
            _ => ModelPurpose::Ocr,
        }
    }
}

/// Document record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub user_id: String,
    /// Object name in storage; equals the original name until the file is stored
    pub filename: String,
    pub original_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub status: DocumentStatus,
    pub ocr_text: Option<String>,
    pub image_count: usize,
    pub vector_count: usize,
    pub storage_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
    pub category_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Column list matching [`Document::from_row`]
pub(crate) const DOCUMENT_COLUMNS: &str = "id, user_id, filename, original_name, file_size, \
     mime_type, status, ocr_text, image_count, vector_count, storage_url, processing_error, \
     category_id, created_at, updated_at";

impl Document {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let file_size: i64 = row.get(4)?;
        let status_str: String = row.get(6)?;
        let image_count: i64 = row.get(8)?;
        let vector_count: i64 = row.get(9)?;
        let created_at_str: String = row.get(13)?;
        let updated_at_str: String = row.get(14)?;

        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            filename: row.get(2)?,
            original_name: row.get(3)?,
            file_size: file_size as u64,
            mime_type: row.get(5)?,
            status: DocumentStatus::from_str(&status_str),
            ocr_text: row.get(7)?,
            image_count: image_count as usize,
            vector_count: vector_count as usize,
            storage_url: row.get(10)?,
            processing_error: row.get(11)?,
            category_id: row.get(12)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }
}

/// Fields supplied when a document is first accepted
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub user_id: String,
    pub original_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub category_id: Option<String>,
}

/// Partial update for a document; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    pub filename: Option<String>,
    pub ocr_text: Option<String>,
    pub image_count: Option<usize>,
    pub vector_count: Option<usize>,
    pub storage_url: Option<String>,
    /// `Some(None)` clears the category
    pub category_id: Option<Option<String>>,
}

/// Image extracted during OCR and uploaded to object storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedImage {
    pub id: String,
    pub document_id: String,
    pub filename: String,
    pub storage_url: String,
    pub annotation: Option<String>,
    pub page_number: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl ExtractedImage {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let created_at_str: String = row.get(6)?;
        Ok(Self {
            id: row.get(0)?,
            document_id: row.get(1)?,
            filename: row.get(2)?,
            storage_url: row.get(3)?,
            annotation: row.get(4)?,
            page_number: row.get(5)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewExtractedImage {
    pub document_id: String,
    pub filename: String,
    pub storage_url: String,
    pub annotation: Option<String>,
    pub page_number: Option<u32>,
}

/// Metadata stored alongside every chunk embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorMetadata {
    pub chunk_index: usize,
    pub document_type: String,
    pub language: String,
    pub timestamp: DateTime<Utc>,
}

/// Embedded text chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorEmbedding {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: VectorMetadata,
    pub created_at: DateTime<Utc>,
}

impl VectorEmbedding {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let embedding_bytes: Vec<u8> = row.get(3)?;
        let metadata_str: String = row.get(4)?;
        let created_at_str: String = row.get(5)?;

        let metadata = serde_json::from_str(&metadata_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Self {
            id: row.get(0)?,
            document_id: row.get(1)?,
            content: row.get(2)?,
            embedding: embedding_from_bytes(&embedding_bytes),
            metadata,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewVectorEmbedding {
    pub document_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// Persisted progress record of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingQueueItem {
    pub id: String,
    pub document_id: String,
    pub status: QueueStatus,
    pub step: ProcessingStep,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) const QUEUE_COLUMNS: &str =
    "id, document_id, status, step, progress, error, created_at, updated_at";

impl ProcessingQueueItem {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let status_str: String = row.get(2)?;
        let step_str: String = row.get(3)?;
        let progress: i64 = row.get(4)?;
        let created_at_str: String = row.get(6)?;
        let updated_at_str: String = row.get(7)?;

        Ok(Self {
            id: row.get(0)?,
            document_id: row.get(1)?,
            status: QueueStatus::from_str(&status_str),
            step: ProcessingStep::from_str(&step_str),
            progress: progress.clamp(0, 100) as u8,
            error: row.get(5)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }
}

/// Partial update for a queue item
#[derive(Debug, Clone, Default)]
pub struct QueueItemUpdate {
    pub status: Option<QueueStatus>,
    pub step: Option<ProcessingStep>,
    pub progress: Option<u8>,
    /// `Some(None)` clears a previous error
    pub error: Option<Option<String>>,
}

/// Aggregate counters over one user's documents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub documents_processed: u64,
    pub images_extracted: u64,
    pub vector_embeddings: u64,
    pub storage_used: u64,
}

/// User-defined document category
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let created_at_str: String = row.get(5)?;
        let updated_at_str: String = row.get(6)?;
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            color: row.get(4)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub color: Option<Option<String>>,
}

/// Per-user provider model selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfiguration {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub purpose: ModelPurpose,
    pub model: String,
    pub parameters: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModelConfiguration {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let purpose_str: String = row.get(3)?;
        let parameters_str: Option<String> = row.get(5)?;
        let created_at_str: String = row.get(7)?;
        let updated_at_str: String = row.get(8)?;
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            purpose: ModelPurpose::from_str(&purpose_str),
            model: row.get(4)?,
            parameters: parameters_str.and_then(|s| serde_json::from_str(&s).ok()),
            is_active: row.get(6)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewModelConfig {
    pub user_id: String,
    pub name: String,
    pub purpose: ModelPurpose,
    pub model: String,
    pub parameters: Option<serde_json::Value>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ModelConfigUpdate {
    pub name: Option<String>,
    pub model: Option<String>,
    pub parameters: Option<Option<serde_json::Value>>,
    pub is_active: Option<bool>,
}

/// RFC 3339 with fixed microsecond precision so stored strings sort chronologically
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub(crate) fn embedding_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
