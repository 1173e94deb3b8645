//! Semantic search over the caller's documents.

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::db::models::ModelPurpose;
use crate::error::{ProviderError, ServiceError, ServiceResult};
use crate::object_storage::DEFAULT_MATCH_COUNT;
use crate::service::IntakeService;

const MAX_SEARCH_LIMIT: usize = 100;

/// Candidates requested from the provider before filtering to the caller's
/// documents. Its ranking spans every user.
const SEARCH_CANDIDATES: usize = MAX_SEARCH_LIMIT;

/// A matching chunk with the name of the document it came from
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub document_id: String,
    pub document_name: String,
    pub content: String,
    pub similarity: f32,
    pub metadata: serde_json::Value,
}

impl IntakeService {
    /// Embed the query and return matching chunks that belong to the user
    pub async fn search_documents(
        &self,
        user_id: &str,
        query: &str,
        limit: Option<usize>,
    ) -> ServiceResult<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "query must not be empty".to_string(),
            });
        }
        let limit = limit.unwrap_or(DEFAULT_MATCH_COUNT);
        if limit == 0 || limit > MAX_SEARCH_LIMIT {
            return Err(ServiceError::InvalidRequest {
                message: format!("limit must be between 1 and {}", MAX_SEARCH_LIMIT),
            });
        }

        let model = self.model_for(user_id, ModelPurpose::Embedding)?;
        let query_embedding = self
            .ai
            .create_embeddings(&[query.to_string()], &model)
            .await?
            .into_iter()
            .next()
            .ok_or(ProviderError::EmbeddingMismatch {
                expected: 1,
                actual: 0,
            })?;

        let matches = self
            .storage
            .search_similar_vectors(&query_embedding, SEARCH_CANDIDATES)
            .await?;

        let names: HashMap<String, String> = self
            .store
            .get_user_documents(user_id)?
            .into_iter()
            .map(|doc| (doc.id, doc.original_name))
            .collect();

        let total = matches.len();
        let hits: Vec<SearchHit> = matches
            .into_iter()
            .filter_map(|m| {
                let document_name = names.get(&m.document_id)?.clone();
                Some(SearchHit {
                    document_id: m.document_id,
                    document_name,
                    content: m.content,
                    similarity: m.similarity,
                    metadata: m.metadata,
                })
            })
            .take(limit)
            .collect();

        debug!(
            user_id = %user_id,
            matches = total,
            returned = hits.len(),
            "Search completed"
        );
        Ok(hits)
    }
}
