//! In-memory [`DocumentStore`] used by service and API tests.

use std::sync::Mutex;

use chrono::Utc;

use super::DocumentStore;
use crate::db::models::{
    Category, CategoryUpdate, Document, DocumentStatus, DocumentUpdate, ExtractedImage,
    ModelConfigUpdate, ModelConfiguration, ModelPurpose, NewCategory, NewDocument,
    NewExtractedImage, NewModelConfig, NewVectorEmbedding, ProcessingQueueItem, ProcessingStep,
    QueueItemUpdate, QueueStatus, UserStats, VectorEmbedding,
};
use crate::error::{ServiceError, ServiceResult};

/// Records kept in insertion order; newest-first views iterate in reverse
#[derive(Default)]
struct State {
    documents: Vec<Document>,
    images: Vec<ExtractedImage>,
    vectors: Vec<VectorEmbedding>,
    queue: Vec<ProcessingQueueItem>,
    categories: Vec<Category>,
    model_configs: Vec<ModelConfiguration>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn require_document(state: &State, document_id: &str) -> ServiceResult<()> {
    if state.documents.iter().any(|d| d.id == document_id) {
        Ok(())
    } else {
        Err(ServiceError::DocumentNotFound {
            document_id: document_id.to_string(),
        })
    }
}

fn category_conflict(name: &str) -> ServiceError {
    ServiceError::Conflict {
        message: format!("A category named '{}' already exists", name),
    }
}

impl DocumentStore for MemoryStore {
    fn create_document(&self, new: NewDocument) -> ServiceResult<Document> {
        let now = Utc::now();
        let document = Document {
            id: new_id(),
            user_id: new.user_id,
            filename: new.original_name.clone(),
            original_name: new.original_name,
            file_size: new.file_size,
            mime_type: new.mime_type,
            status: DocumentStatus::Uploaded,
            ocr_text: None,
            image_count: 0,
            vector_count: 0,
            storage_url: None,
            processing_error: None,
            category_id: new.category_id,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().documents.push(document.clone());
        Ok(document)
    }

    fn get_document(&self, id: &str) -> ServiceResult<Option<Document>> {
        let state = self.state.lock().unwrap();
        Ok(state.documents.iter().find(|d| d.id == id).cloned())
    }

    fn update_document(&self, id: &str, update: DocumentUpdate) -> ServiceResult<Document> {
        let mut state = self.state.lock().unwrap();
        let document = state
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_id: id.to_string(),
            })?;

        if let Some(filename) = update.filename {
            document.filename = filename;
        }
        if let Some(ocr_text) = update.ocr_text {
            document.ocr_text = Some(ocr_text);
        }
        if let Some(count) = update.image_count {
            document.image_count = count;
        }
        if let Some(count) = update.vector_count {
            document.vector_count = count;
        }
        if let Some(url) = update.storage_url {
            document.storage_url = Some(url);
        }
        if let Some(category_id) = update.category_id {
            document.category_id = category_id;
        }
        document.updated_at = Utc::now();
        Ok(document.clone())
    }

    fn update_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        let document = state
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_id: id.to_string(),
            })?;
        document.status = status;
        document.processing_error = error.map(str::to_string);
        document.updated_at = Utc::now();
        Ok(())
    }

    fn get_user_documents(&self, user_id: &str) -> ServiceResult<Vec<Document>> {
        let state = self.state.lock().unwrap();
        let mut documents: Vec<_> = state
            .documents
            .iter()
            .rev()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    fn delete_document(&self, id: &str) -> ServiceResult<bool> {
        let mut state = self.state.lock().unwrap();
        let before = state.documents.len();
        state.documents.retain(|d| d.id != id);
        if state.documents.len() == before {
            return Ok(false);
        }
        state.images.retain(|i| i.document_id != id);
        state.vectors.retain(|v| v.document_id != id);
        state.queue.retain(|q| q.document_id != id);
        Ok(true)
    }

    fn create_extracted_image(&self, new: NewExtractedImage) -> ServiceResult<ExtractedImage> {
        let mut state = self.state.lock().unwrap();
        require_document(&state, &new.document_id)?;
        let image = ExtractedImage {
            id: new_id(),
            document_id: new.document_id,
            filename: new.filename,
            storage_url: new.storage_url,
            annotation: new.annotation,
            page_number: new.page_number,
            created_at: Utc::now(),
        };
        state.images.push(image.clone());
        Ok(image)
    }

    fn get_document_images(&self, document_id: &str) -> ServiceResult<Vec<ExtractedImage>> {
        let state = self.state.lock().unwrap();
        let mut images: Vec<_> = state
            .images
            .iter()
            .filter(|i| i.document_id == document_id)
            .cloned()
            .collect();
        images.sort_by_key(|i| (i.page_number.is_none(), i.page_number));
        Ok(images)
    }

    fn create_vector_embedding(&self, new: NewVectorEmbedding) -> ServiceResult<VectorEmbedding> {
        let mut state = self.state.lock().unwrap();
        require_document(&state, &new.document_id)?;
        let vector = VectorEmbedding {
            id: new_id(),
            document_id: new.document_id,
            content: new.content,
            embedding: new.embedding,
            metadata: new.metadata,
            created_at: Utc::now(),
        };
        state.vectors.push(vector.clone());
        Ok(vector)
    }

    fn get_document_vectors(&self, document_id: &str) -> ServiceResult<Vec<VectorEmbedding>> {
        let state = self.state.lock().unwrap();
        let mut vectors: Vec<_> = state
            .vectors
            .iter()
            .filter(|v| v.document_id == document_id)
            .cloned()
            .collect();
        vectors.sort_by_key(|v| v.metadata.chunk_index);
        Ok(vectors)
    }

    fn delete_document_vectors(&self, document_id: &str) -> ServiceResult<usize> {
        let mut state = self.state.lock().unwrap();
        let before = state.vectors.len();
        state.vectors.retain(|v| v.document_id != document_id);
        Ok(before - state.vectors.len())
    }

    fn create_processing_queue_item(
        &self,
        document_id: &str,
    ) -> ServiceResult<ProcessingQueueItem> {
        let mut state = self.state.lock().unwrap();
        require_document(&state, document_id)?;
        let now = Utc::now();
        let item = ProcessingQueueItem {
            id: new_id(),
            document_id: document_id.to_string(),
            status: QueueStatus::Pending,
            step: ProcessingStep::Ocr,
            progress: 0,
            error: None,
            created_at: now,
            updated_at: now,
        };
        state.queue.push(item.clone());
        Ok(item)
    }

    fn update_processing_queue_item(
        &self,
        id: &str,
        update: QueueItemUpdate,
    ) -> ServiceResult<ProcessingQueueItem> {
        let mut state = self.state.lock().unwrap();
        let item = state
            .queue
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| ServiceError::QueueItemNotFound {
                item_id: id.to_string(),
            })?;

        if let Some(status) = update.status {
            item.status = status;
        }
        if let Some(step) = update.step {
            item.step = step;
        }
        if let Some(progress) = update.progress {
            item.progress = progress.min(100);
        }
        if let Some(error) = update.error {
            item.error = error;
        }
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    fn get_active_processing_items(
        &self,
        user_id: &str,
    ) -> ServiceResult<Vec<ProcessingQueueItem>> {
        let state = self.state.lock().unwrap();
        let owned = |document_id: &str| {
            state
                .documents
                .iter()
                .any(|d| d.id == document_id && d.user_id == user_id)
        };
        let mut items: Vec<_> = state
            .queue
            .iter()
            .rev()
            .filter(|q| q.status == QueueStatus::Processing && owned(&q.document_id))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    fn get_latest_queue_item(
        &self,
        document_id: &str,
    ) -> ServiceResult<Option<ProcessingQueueItem>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .queue
            .iter()
            .filter(|q| q.document_id == document_id)
            .max_by_key(|q| q.created_at)
            .cloned())
    }

    fn get_user_stats(&self, user_id: &str) -> ServiceResult<UserStats> {
        let state = self.state.lock().unwrap();
        let stats = state
            .documents
            .iter()
            .filter(|d| d.user_id == user_id)
            .fold(UserStats::default(), |mut stats, d| {
                if d.status == DocumentStatus::Completed {
                    stats.documents_processed += 1;
                }
                stats.images_extracted += d.image_count as u64;
                stats.vector_embeddings += d.vector_count as u64;
                stats.storage_used += d.file_size;
                stats
            });
        Ok(stats)
    }

    fn create_category(&self, new: NewCategory) -> ServiceResult<Category> {
        let mut state = self.state.lock().unwrap();
        if state
            .categories
            .iter()
            .any(|c| c.user_id == new.user_id && c.name == new.name)
        {
            return Err(category_conflict(&new.name));
        }
        let now = Utc::now();
        let category = Category {
            id: new_id(),
            user_id: new.user_id,
            name: new.name,
            description: new.description,
            color: new.color,
            created_at: now,
            updated_at: now,
        };
        state.categories.push(category.clone());
        Ok(category)
    }

    fn list_categories(&self, user_id: &str) -> ServiceResult<Vec<Category>> {
        let state = self.state.lock().unwrap();
        let mut categories: Vec<_> = state
            .categories
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        categories.sort_by_key(|c| c.name.to_lowercase());
        Ok(categories)
    }

    fn get_category(&self, id: &str) -> ServiceResult<Option<Category>> {
        let state = self.state.lock().unwrap();
        Ok(state.categories.iter().find(|c| c.id == id).cloned())
    }

    fn update_category(&self, id: &str, update: CategoryUpdate) -> ServiceResult<Category> {
        let mut state = self.state.lock().unwrap();
        let user_id = state
            .categories
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.user_id.clone())
            .ok_or_else(|| ServiceError::CategoryNotFound {
                category_id: id.to_string(),
            })?;

        if let Some(name) = &update.name
            && state
                .categories
                .iter()
                .any(|c| c.id != id && c.user_id == user_id && &c.name == name)
        {
            return Err(category_conflict(name));
        }

        let category = state
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ServiceError::CategoryNotFound {
                category_id: id.to_string(),
            })?;
        if let Some(name) = update.name {
            category.name = name;
        }
        if let Some(description) = update.description {
            category.description = description;
        }
        if let Some(color) = update.color {
            category.color = color;
        }
        category.updated_at = Utc::now();
        Ok(category.clone())
    }

    fn delete_category(&self, id: &str) -> ServiceResult<bool> {
        let mut state = self.state.lock().unwrap();
        let before = state.categories.len();
        state.categories.retain(|c| c.id != id);
        if state.categories.len() == before {
            return Ok(false);
        }
        for document in state
            .documents
            .iter_mut()
            .filter(|d| d.category_id.as_deref() == Some(id))
        {
            document.category_id = None;
        }
        Ok(true)
    }

    fn create_model_config(&self, new: NewModelConfig) -> ServiceResult<ModelConfiguration> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let config = ModelConfiguration {
            id: new_id(),
            user_id: new.user_id,
            name: new.name,
            purpose: new.purpose,
            model: new.model,
            parameters: new.parameters,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        };
        if config.is_active {
            deactivate_others(&mut state, &config.user_id, config.purpose, &config.id);
        }
        state.model_configs.push(config.clone());
        Ok(config)
    }

    fn list_model_configs(&self, user_id: &str) -> ServiceResult<Vec<ModelConfiguration>> {
        let state = self.state.lock().unwrap();
        let mut configs: Vec<_> = state
            .model_configs
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        configs.sort_by(|a, b| {
            (a.purpose.as_str(), &a.name).cmp(&(b.purpose.as_str(), &b.name))
        });
        Ok(configs)
    }

    fn get_model_config(&self, id: &str) -> ServiceResult<Option<ModelConfiguration>> {
        let state = self.state.lock().unwrap();
        Ok(state.model_configs.iter().find(|c| c.id == id).cloned())
    }

    fn update_model_config(
        &self,
        id: &str,
        update: ModelConfigUpdate,
    ) -> ServiceResult<ModelConfiguration> {
        let mut state = self.state.lock().unwrap();
        let config = state
            .model_configs
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ServiceError::ModelConfigNotFound {
                config_id: id.to_string(),
            })?;

        if let Some(name) = update.name {
            config.name = name;
        }
        if let Some(model) = update.model {
            config.model = model;
        }
        if let Some(parameters) = update.parameters {
            config.parameters = parameters;
        }
        if let Some(is_active) = update.is_active {
            config.is_active = is_active;
        }
        config.updated_at = Utc::now();
        let config = config.clone();

        if config.is_active {
            deactivate_others(&mut state, &config.user_id, config.purpose, &config.id);
        }
        Ok(config)
    }

    fn delete_model_config(&self, id: &str) -> ServiceResult<bool> {
        let mut state = self.state.lock().unwrap();
        let before = state.model_configs.len();
        state.model_configs.retain(|c| c.id != id);
        Ok(state.model_configs.len() < before)
    }

    fn active_model_config(
        &self,
        user_id: &str,
        purpose: ModelPurpose,
    ) -> ServiceResult<Option<ModelConfiguration>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .model_configs
            .iter()
            .find(|c| c.user_id == user_id && c.purpose == purpose && c.is_active)
            .cloned())
    }
}

fn deactivate_others(state: &mut State, user_id: &str, purpose: ModelPurpose, keep_id: &str) {
    let now = Utc::now();
    for config in state
        .model_configs
        .iter_mut()
        .filter(|c| c.user_id == user_id && c.purpose == purpose && c.id != keep_id && c.is_active)
    {
        config.is_active = false;
        config.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[test]
    fn memory_document_lifecycle() {
        contract::document_lifecycle(&MemoryStore::new());
    }

    #[test]
    fn memory_user_documents_newest_first() {
        contract::user_documents_newest_first(&MemoryStore::new());
    }

    #[test]
    fn memory_update_unknown_document_fails() {
        contract::update_unknown_document_fails(&MemoryStore::new());
    }

    #[test]
    fn memory_cascade_delete() {
        contract::cascade_delete(&MemoryStore::new());
    }

    #[test]
    fn memory_delete_document_vectors() {
        contract::delete_document_vectors(&MemoryStore::new());
    }

    #[test]
    fn memory_active_processing_items() {
        contract::active_processing_items(&MemoryStore::new());
    }

    #[test]
    fn memory_user_stats() {
        contract::user_stats(&MemoryStore::new());
    }

    #[test]
    fn memory_children_require_document() {
        contract::children_require_document(&MemoryStore::new());
    }

    #[test]
    fn memory_categories() {
        contract::categories(&MemoryStore::new());
    }

    #[test]
    fn memory_model_configs() {
        contract::model_configs(&MemoryStore::new());
    }
}
