//! Behaviour every [`DocumentStore`] backend must show.
//!
//! Each function drives a fresh store through one scenario and panics on the
//! first deviation. Backends call them from their own test modules.

use chrono::Utc;

use super::DocumentStore;
use crate::db::models::{
    CategoryUpdate, Document, DocumentStatus, DocumentUpdate, ModelConfigUpdate, ModelPurpose,
    NewCategory, NewDocument, NewExtractedImage, NewModelConfig, NewVectorEmbedding,
    ProcessingStep, QueueItemUpdate, QueueStatus, UserStats, VectorMetadata,
};
use crate::error::ServiceError;

fn new_document(store: &dyn DocumentStore, user_id: &str, name: &str, size: u64) -> Document {
    store
        .create_document(NewDocument {
            user_id: user_id.to_string(),
            original_name: name.to_string(),
            file_size: size,
            mime_type: "application/pdf".to_string(),
            category_id: None,
        })
        .unwrap()
}

fn new_vector(document_id: &str, chunk_index: usize) -> NewVectorEmbedding {
    NewVectorEmbedding {
        document_id: document_id.to_string(),
        content: format!("chunk {}", chunk_index),
        embedding: vec![chunk_index as f32, 0.5, -0.5],
        metadata: VectorMetadata {
            chunk_index,
            document_type: "application/pdf".to_string(),
            language: "en".to_string(),
            timestamp: Utc::now(),
        },
    }
}

fn new_image(document_id: &str, page: u32) -> NewExtractedImage {
    NewExtractedImage {
        document_id: document_id.to_string(),
        filename: format!("page{}.png", page),
        storage_url: format!("http://storage.test/images/{}/page{}.png", document_id, page),
        annotation: Some("figure".to_string()),
        page_number: Some(page),
    }
}

pub fn document_lifecycle(store: &dyn DocumentStore) {
    let doc = new_document(store, "u1", "scan.pdf", 1024);
    assert_eq!(doc.status, DocumentStatus::Uploaded);
    assert_eq!(doc.filename, "scan.pdf");
    assert_eq!(doc.image_count, 0);
    assert_eq!(doc.vector_count, 0);
    assert!(doc.ocr_text.is_none());

    let fetched = store.get_document(&doc.id).unwrap().unwrap();
    assert_eq!(fetched.original_name, "scan.pdf");
    assert_eq!(fetched.file_size, 1024);

    let updated = store
        .update_document(
            &doc.id,
            DocumentUpdate {
                filename: Some("1700000000000_abcdefgh_scan.pdf".to_string()),
                ocr_text: Some("hello world".to_string()),
                storage_url: Some("http://storage.test/scan.pdf".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.filename, "1700000000000_abcdefgh_scan.pdf");
    assert_eq!(updated.ocr_text.as_deref(), Some("hello world"));
    assert_eq!(updated.original_name, "scan.pdf");
    assert!(updated.updated_at >= doc.updated_at);

    store
        .update_document_status(&doc.id, DocumentStatus::Failed, Some("OCR failed"))
        .unwrap();
    let failed = store.get_document(&doc.id).unwrap().unwrap();
    assert_eq!(failed.status, DocumentStatus::Failed);
    assert_eq!(failed.processing_error.as_deref(), Some("OCR failed"));

    store
        .update_document_status(&doc.id, DocumentStatus::Completed, None)
        .unwrap();
    let completed = store.get_document(&doc.id).unwrap().unwrap();
    assert_eq!(completed.status, DocumentStatus::Completed);
    assert!(completed.processing_error.is_none());

    assert!(store.get_document("missing").unwrap().is_none());
}

pub fn user_documents_newest_first(store: &dyn DocumentStore) {
    let first = new_document(store, "u1", "first.pdf", 1);
    let second = new_document(store, "u1", "second.pdf", 2);
    new_document(store, "u2", "other.pdf", 3);

    let docs = store.get_user_documents("u1").unwrap();
    let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);

    assert_eq!(store.get_user_documents("u2").unwrap().len(), 1);
    assert!(store.get_user_documents("nobody").unwrap().is_empty());
}

pub fn update_unknown_document_fails(store: &dyn DocumentStore) {
    let err = store
        .update_document("missing", DocumentUpdate::default())
        .unwrap_err();
    assert!(matches!(err, ServiceError::DocumentNotFound { .. }));

    let err = store
        .update_document_status("missing", DocumentStatus::Failed, None)
        .unwrap_err();
    assert!(matches!(err, ServiceError::DocumentNotFound { .. }));

    let err = store
        .update_processing_queue_item("missing", QueueItemUpdate::default())
        .unwrap_err();
    assert!(matches!(err, ServiceError::QueueItemNotFound { .. }));
}

pub fn cascade_delete(store: &dyn DocumentStore) {
    let doc = new_document(store, "u1", "scan.pdf", 10);
    let keep = new_document(store, "u1", "keep.pdf", 10);

    store.create_extracted_image(new_image(&doc.id, 1)).unwrap();
    store.create_vector_embedding(new_vector(&doc.id, 0)).unwrap();
    store.create_processing_queue_item(&doc.id).unwrap();
    store.create_vector_embedding(new_vector(&keep.id, 0)).unwrap();

    assert!(store.delete_document(&doc.id).unwrap());

    assert!(store.get_document(&doc.id).unwrap().is_none());
    assert!(store.get_document_images(&doc.id).unwrap().is_empty());
    assert!(store.get_document_vectors(&doc.id).unwrap().is_empty());
    assert!(store.get_latest_queue_item(&doc.id).unwrap().is_none());

    // Siblings are untouched
    assert_eq!(store.get_document_vectors(&keep.id).unwrap().len(), 1);

    assert!(!store.delete_document(&doc.id).unwrap());
}

pub fn children_require_document(store: &dyn DocumentStore) {
    let err = store
        .create_extracted_image(new_image("missing", 1))
        .unwrap_err();
    assert!(matches!(err, ServiceError::DocumentNotFound { .. }));

    let err = store
        .create_vector_embedding(new_vector("missing", 0))
        .unwrap_err();
    assert!(matches!(err, ServiceError::DocumentNotFound { .. }));

    let err = store.create_processing_queue_item("missing").unwrap_err();
    assert!(matches!(err, ServiceError::DocumentNotFound { .. }));

    assert!(store.get_document_images("missing").unwrap().is_empty());
    assert!(store.get_document_vectors("missing").unwrap().is_empty());
}

pub fn delete_document_vectors(store: &dyn DocumentStore) {
    let doc = new_document(store, "u1", "scan.pdf", 10);
    for index in [2, 0, 1] {
        store.create_vector_embedding(new_vector(&doc.id, index)).unwrap();
    }

    let vectors = store.get_document_vectors(&doc.id).unwrap();
    let order: Vec<_> = vectors.iter().map(|v| v.metadata.chunk_index).collect();
    assert_eq!(order, vec![0, 1, 2]);
    assert_eq!(vectors[1].embedding, vec![1.0, 0.5, -0.5]);
    assert_eq!(vectors[1].content, "chunk 1");

    assert_eq!(store.delete_document_vectors(&doc.id).unwrap(), 3);
    assert!(store.get_document_vectors(&doc.id).unwrap().is_empty());
    assert_eq!(store.delete_document_vectors(&doc.id).unwrap(), 0);
}

pub fn active_processing_items(store: &dyn DocumentStore) {
    let running = new_document(store, "u1", "running.pdf", 1);
    let waiting = new_document(store, "u1", "waiting.pdf", 1);
    let foreign = new_document(store, "u2", "foreign.pdf", 1);

    let item = store.create_processing_queue_item(&running.id).unwrap();
    assert_eq!(item.status, QueueStatus::Pending);
    assert_eq!(item.step, ProcessingStep::Ocr);
    assert_eq!(item.progress, 0);

    store.create_processing_queue_item(&waiting.id).unwrap();
    let foreign_item = store.create_processing_queue_item(&foreign.id).unwrap();

    let updated = store
        .update_processing_queue_item(
            &item.id,
            QueueItemUpdate {
                status: Some(QueueStatus::Processing),
                step: Some(ProcessingStep::Storage),
                progress: Some(50),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.step, ProcessingStep::Storage);
    assert_eq!(updated.progress, 50);
    store
        .update_processing_queue_item(
            &foreign_item.id,
            QueueItemUpdate {
                status: Some(QueueStatus::Processing),
                ..Default::default()
            },
        )
        .unwrap();

    let active = store.get_active_processing_items("u1").unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, item.id);

    let failed = store
        .update_processing_queue_item(
            &item.id,
            QueueItemUpdate {
                status: Some(QueueStatus::Failed),
                error: Some(Some("boom".to_string())),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(failed.error.as_deref(), Some("boom"));
    assert_eq!(failed.progress, 50);
    assert!(store.get_active_processing_items("u1").unwrap().is_empty());

    let latest = store.get_latest_queue_item(&running.id).unwrap().unwrap();
    assert_eq!(latest.status, QueueStatus::Failed);

    let err = store.create_processing_queue_item("missing").unwrap_err();
    assert!(matches!(err, ServiceError::DocumentNotFound { .. }));
}

pub fn user_stats(store: &dyn DocumentStore) {
    let done = new_document(store, "u1", "done.pdf", 1000);
    store
        .update_document(
            &done.id,
            DocumentUpdate {
                image_count: Some(2),
                vector_count: Some(5),
                ..Default::default()
            },
        )
        .unwrap();
    store
        .update_document_status(&done.id, DocumentStatus::Completed, None)
        .unwrap();

    let failed = new_document(store, "u1", "failed.pdf", 500);
    store
        .update_document_status(&failed.id, DocumentStatus::Failed, Some("bad"))
        .unwrap();
    new_document(store, "u2", "other.pdf", 7);

    let stats = store.get_user_stats("u1").unwrap();
    assert_eq!(stats.documents_processed, 1);
    assert_eq!(stats.images_extracted, 2);
    assert_eq!(stats.vector_embeddings, 5);
    assert_eq!(stats.storage_used, 1500);

    assert_eq!(store.get_user_stats("nobody").unwrap(), UserStats::default());
}

pub fn categories(store: &dyn DocumentStore) {
    let invoices = store
        .create_category(NewCategory {
            user_id: "u1".to_string(),
            name: "Invoices".to_string(),
            description: Some("Bills".to_string()),
            color: Some("#ff0000".to_string()),
        })
        .unwrap();
    store
        .create_category(NewCategory {
            user_id: "u1".to_string(),
            name: "contracts".to_string(),
            description: None,
            color: None,
        })
        .unwrap();

    // Same name for another user is fine
    store
        .create_category(NewCategory {
            user_id: "u2".to_string(),
            name: "Invoices".to_string(),
            description: None,
            color: None,
        })
        .unwrap();

    let err = store
        .create_category(NewCategory {
            user_id: "u1".to_string(),
            name: "Invoices".to_string(),
            description: None,
            color: None,
        })
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict { .. }));

    let names: Vec<_> = store
        .list_categories("u1")
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["contracts", "Invoices"]);

    let err = store
        .update_category(
            &invoices.id,
            CategoryUpdate {
                name: Some("contracts".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict { .. }));

    let updated = store
        .update_category(
            &invoices.id,
            CategoryUpdate {
                description: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.name, "Invoices");
    assert!(updated.description.is_none());
    assert_eq!(updated.color.as_deref(), Some("#ff0000"));

    let doc = store
        .create_document(NewDocument {
            user_id: "u1".to_string(),
            original_name: "bill.pdf".to_string(),
            file_size: 3,
            mime_type: "application/pdf".to_string(),
            category_id: Some(invoices.id.clone()),
        })
        .unwrap();
    assert_eq!(doc.category_id.as_deref(), Some(invoices.id.as_str()));

    assert!(store.delete_category(&invoices.id).unwrap());
    assert!(store.get_category(&invoices.id).unwrap().is_none());
    let doc = store.get_document(&doc.id).unwrap().unwrap();
    assert!(doc.category_id.is_none());
    assert!(!store.delete_category(&invoices.id).unwrap());

    let err = store
        .update_category(&invoices.id, CategoryUpdate::default())
        .unwrap_err();
    assert!(matches!(err, ServiceError::CategoryNotFound { .. }));
}

pub fn model_configs(store: &dyn DocumentStore) {
    let new_config = |name: &str, purpose: ModelPurpose, active: bool| NewModelConfig {
        user_id: "u1".to_string(),
        name: name.to_string(),
        purpose,
        model: format!("{}-model", name),
        parameters: Some(serde_json::json!({ "temperature": 0 })),
        is_active: active,
    };

    let first = store
        .create_model_config(new_config("first", ModelPurpose::Ocr, true))
        .unwrap();
    let embed = store
        .create_model_config(new_config("embed", ModelPurpose::Embedding, true))
        .unwrap();
    let second = store
        .create_model_config(new_config("second", ModelPurpose::Ocr, true))
        .unwrap();

    // Activating `second` deactivated `first` only
    let active = store.active_model_config("u1", ModelPurpose::Ocr).unwrap().unwrap();
    assert_eq!(active.id, second.id);
    assert!(!store.get_model_config(&first.id).unwrap().unwrap().is_active);
    assert!(store.get_model_config(&embed.id).unwrap().unwrap().is_active);
    assert_eq!(
        active.parameters,
        Some(serde_json::json!({ "temperature": 0 }))
    );

    let reactivated = store
        .update_model_config(
            &first.id,
            ModelConfigUpdate {
                is_active: Some(true),
                model: Some("better-model".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(reactivated.is_active);
    assert_eq!(reactivated.model, "better-model");
    assert!(!store.get_model_config(&second.id).unwrap().unwrap().is_active);

    let cleared = store
        .update_model_config(
            &first.id,
            ModelConfigUpdate {
                parameters: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(cleared.parameters.is_none());
    assert!(cleared.is_active);

    assert_eq!(store.list_model_configs("u1").unwrap().len(), 3);
    assert!(store.list_model_configs("u2").unwrap().is_empty());
    assert!(store.active_model_config("u2", ModelPurpose::Ocr).unwrap().is_none());

    assert!(store.delete_model_config(&first.id).unwrap());
    assert!(store.active_model_config("u1", ModelPurpose::Ocr).unwrap().is_none());
    assert!(!store.delete_model_config(&first.id).unwrap());

    let err = store
        .update_model_config(&first.id, ModelConfigUpdate::default())
        .unwrap_err();
    assert!(matches!(err, ServiceError::ModelConfigNotFound { .. }));
}
