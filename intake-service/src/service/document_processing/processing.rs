//! The per-document pipeline: OCR, storage, vectorization, completion.

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::progress::Checkpoint;
use crate::ai::ExtractedImageData;
use crate::chunking::split_into_chunks;
use crate::db::models::{
    Document, DocumentStatus, DocumentUpdate, ModelPurpose, NewExtractedImage,
    NewVectorEmbedding, VectorMetadata,
};
use crate::error::{ProviderError, ServiceError, ServiceResult, format_error_chain_ref};
use crate::service::IntakeService;

/// Counts recorded on a completed document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) image_count: usize,
    pub(crate) vector_count: usize,
}

impl IntakeService {
    /// Body of a supervised run. Errors are persisted on the document and its
    /// queue item, never returned.
    pub(crate) async fn run_pipeline(
        self: Arc<Self>,
        doc: Document,
        content: Bytes,
        queue_item_id: String,
        token: CancellationToken,
    ) {
        let doc_id = doc.id.clone();

        let permit = match token
            .run_until_cancelled(Arc::clone(&self.run_permits).acquire_owned())
            .await
        {
            Some(Ok(permit)) => permit,
            Some(Err(e)) => {
                let err = ServiceError::Internal {
                    message: format!("Processing slots unavailable: {}", e),
                };
                self.fail_run(&doc, &queue_item_id, &err);
                self.finish_run(&doc_id);
                return;
            }
            None => {
                info!(doc_id = %doc_id, "Processing cancelled before start");
                self.finish_run(&doc_id);
                return;
            }
        };

        let started = Instant::now();
        info!(
            doc_id = %doc_id,
            user_id = %doc.user_id,
            original_name = %doc.original_name,
            size = doc.file_size,
            "Processing document"
        );

        match token
            .run_until_cancelled(self.execute_stages(&doc, &content, &queue_item_id))
            .await
        {
            Some(Ok(summary)) => {
                let elapsed = started.elapsed();
                metrics::counter!("intake_runs_completed_total").increment(1);
                metrics::histogram!("intake_run_duration_seconds").record(elapsed.as_secs_f64());
                info!(
                    doc_id = %doc_id,
                    images = summary.image_count,
                    vectors = summary.vector_count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Document processing completed"
                );
            }
            Some(Err(e)) if token.is_cancelled() => {
                debug!(doc_id = %doc_id, error = %e, "Run failed after cancellation");
            }
            Some(Err(e)) => {
                metrics::counter!("intake_runs_failed_total").increment(1);
                metrics::histogram!("intake_run_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                self.fail_run(&doc, &queue_item_id, &e);
            }
            None => {
                info!(doc_id = %doc_id, "Processing cancelled");
            }
        }

        drop(permit);
        self.finish_run(&doc_id);
    }

    /// Run every stage in order, recording checkpoints as they are reached
    async fn execute_stages(
        &self,
        doc: &Document,
        content: &[u8],
        queue_item_id: &str,
    ) -> ServiceResult<RunSummary> {
        let doc_id = doc.id.as_str();
        let user_id = doc.user_id.as_str();

        self.store
            .update_document_status(doc_id, DocumentStatus::Processing, None)?;
        self.record_checkpoint(user_id, queue_item_id, Checkpoint::Started)?;

        // Step 1: OCR
        let ocr_model = self.model_for(user_id, ModelPurpose::Ocr)?;
        info!(doc_id = %doc_id, step = "ocr", model = %ocr_model, "Extracting text and images");
        let extraction = self
            .ai
            .extract_text_and_images(content, &doc.original_name, &doc.mime_type, &ocr_model)
            .await?;
        self.store.update_document(
            doc_id,
            DocumentUpdate {
                ocr_text: Some(extraction.text.clone()),
                image_count: Some(extraction.images.len()),
                ..Default::default()
            },
        )?;
        info!(
            doc_id = %doc_id,
            step = "ocr",
            chars = extraction.text.chars().count(),
            images = extraction.images.len(),
            "Text extracted"
        );
        self.record_checkpoint(user_id, queue_item_id, Checkpoint::TextExtracted)?;

        // Step 2: storage
        let stored = self
            .storage
            .upload_document(content, &doc.original_name, &doc.mime_type, user_id)
            .await?;
        self.store.update_document(
            doc_id,
            DocumentUpdate {
                filename: Some(stored.name),
                storage_url: Some(stored.url),
                ..Default::default()
            },
        )?;
        info!(doc_id = %doc_id, step = "storage", path = %stored.path, "Original stored");
        self.record_checkpoint(user_id, queue_item_id, Checkpoint::DocumentStored)?;

        let image_count = self.store_images(doc_id, &extraction.images).await?;
        self.record_checkpoint(user_id, queue_item_id, Checkpoint::ImagesStored)?;

        // Step 3: vectorization
        let vector_count = self.vectorize(doc, &extraction.text).await?;
        self.record_checkpoint(user_id, queue_item_id, Checkpoint::Embedded)?;

        // Step 4: completion
        self.store.update_document(
            doc_id,
            DocumentUpdate {
                image_count: Some(image_count),
                vector_count: Some(vector_count),
                ..Default::default()
            },
        )?;
        self.store
            .update_document_status(doc_id, DocumentStatus::Completed, None)?;
        self.record_checkpoint(user_id, queue_item_id, Checkpoint::Completed)?;

        Ok(RunSummary {
            image_count,
            vector_count,
        })
    }

    /// Upload extracted images and record a row for each one stored.
    /// Images without data and failed uploads are skipped.
    async fn store_images(
        &self,
        doc_id: &str,
        images: &[ExtractedImageData],
    ) -> ServiceResult<usize> {
        let mut stored_count = 0;
        let mut without_data = 0;

        for (index, image) in images.iter().enumerate() {
            let Some(data) = image.data.as_deref() else {
                without_data += 1;
                continue;
            };

            let file_name = image_file_name(index, image.page_number, data);
            let stored = match self.storage.upload_image(data, &file_name, doc_id).await {
                Ok(stored) => stored,
                Err(e) => {
                    metrics::counter!("intake_image_uploads_failed_total").increment(1);
                    warn!(
                        doc_id = %doc_id,
                        step = "storage",
                        image_index = index,
                        error = %format_error_chain_ref(&e),
                        "Failed to upload extracted image, skipping"
                    );
                    continue;
                }
            };

            self.store.create_extracted_image(NewExtractedImage {
                document_id: doc_id.to_string(),
                filename: stored.name,
                storage_url: stored.url,
                annotation: image.annotation.clone(),
                page_number: image.page_number,
            })?;
            stored_count += 1;
        }

        if without_data > 0 {
            info!(
                doc_id = %doc_id,
                step = "storage",
                count = without_data,
                "Extracted images had no data and were not stored"
            );
        }
        info!(
            doc_id = %doc_id,
            step = "storage",
            stored = stored_count,
            reported = images.len(),
            "Images stored"
        );
        Ok(stored_count)
    }

    /// Chunk and embed the text. On failure the vectors written by this run
    /// are removed so a document never keeps a partial set.
    async fn vectorize(&self, doc: &Document, text: &str) -> ServiceResult<usize> {
        let chunks = split_into_chunks(text, self.config.processing.max_chunk_size);
        if chunks.is_empty() {
            info!(doc_id = %doc.id, step = "vectorization", "No text to embed");
            return Ok(0);
        }

        let result = self.write_vectors(doc, &chunks).await;
        if let Err(e) = &result {
            warn!(
                doc_id = %doc.id,
                step = "vectorization",
                error = %format_error_chain_ref(e),
                "Vectorization failed, rolling back vectors"
            );
            if let Err(e) = self.store.delete_document_vectors(&doc.id) {
                error!(doc_id = %doc.id, error = %format_error_chain_ref(&e), "Failed to remove local vectors");
            }
            if let Err(e) = self.storage.delete_document_vectors(&doc.id).await {
                warn!(doc_id = %doc.id, error = %format_error_chain_ref(&e), "Failed to remove provider vectors");
            }
        }
        result
    }

    async fn write_vectors(&self, doc: &Document, chunks: &[String]) -> ServiceResult<usize> {
        let model = self.model_for(&doc.user_id, ModelPurpose::Embedding)?;
        info!(
            doc_id = %doc.id,
            step = "vectorization",
            chunks = chunks.len(),
            model = %model,
            "Embedding chunks"
        );

        let embeddings = self.ai.create_embeddings(chunks, &model).await?;
        if embeddings.len() != chunks.len() {
            return Err(ProviderError::EmbeddingMismatch {
                expected: chunks.len(),
                actual: embeddings.len(),
            }
            .into());
        }

        let timestamp = Utc::now();
        for (chunk_index, (chunk, embedding)) in chunks.iter().zip(embeddings).enumerate() {
            let metadata = VectorMetadata {
                chunk_index,
                document_type: doc.mime_type.clone(),
                language: self.config.processing.language.clone(),
                timestamp,
            };

            self.storage
                .store_vector_embedding(&doc.id, &embedding, chunk, &metadata)
                .await?;
            self.store.create_vector_embedding(NewVectorEmbedding {
                document_id: doc.id.clone(),
                content: chunk.clone(),
                embedding,
                metadata,
            })?;
        }

        Ok(chunks.len())
    }

    /// Record a failed run on both the document and its queue item
    fn fail_run(&self, doc: &Document, queue_item_id: &str, err: &ServiceError) {
        let message = format_error_chain_ref(err);
        error!(doc_id = %doc.id, user_id = %doc.user_id, error = %message, "Document processing failed");

        if let Err(e) =
            self.store
                .update_document_status(&doc.id, DocumentStatus::Failed, Some(&message))
        {
            error!(doc_id = %doc.id, error = %format_error_chain_ref(&e), "Failed to mark document failed");
        }
        if let Err(e) = self.record_failure(&doc.user_id, queue_item_id, &message) {
            error!(doc_id = %doc.id, error = %format_error_chain_ref(&e), "Failed to mark queue item failed");
        }
    }
}

/// Object name for an extracted image, with an extension matching its bytes
fn image_file_name(index: usize, page_number: Option<u32>, data: &[u8]) -> String {
    let extension = if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "jpg"
    } else {
        "png"
    };
    match page_number {
        Some(page) => format!("page{}_image{}.{}", page, index + 1, extension),
        None => format!("image{}.{}", index + 1, extension),
    }
}
