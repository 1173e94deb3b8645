//! Vector embedding operations.

use chrono::Utc;
use rusqlite::params;

use super::Database;
use super::models::{NewVectorEmbedding, VectorEmbedding, embedding_to_bytes, format_timestamp};
use crate::error::{DatabaseError, ServiceResult};

impl Database {
    /// Insert a chunk embedding
    pub(super) fn insert_vector_embedding(
        &self,
        new: NewVectorEmbedding,
    ) -> ServiceResult<VectorEmbedding> {
        let vector = VectorEmbedding {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: new.document_id,
            content: new.content,
            embedding: new.embedding,
            metadata: new.metadata,
            created_at: Utc::now(),
        };

        let metadata_json =
            serde_json::to_string(&vector.metadata).map_err(DatabaseError::Serialization)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO vector_embeddings (id, document_id, content, embedding, metadata, chunk_index, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                vector.id,
                vector.document_id,
                vector.content,
                embedding_to_bytes(&vector.embedding),
                metadata_json,
                vector.metadata.chunk_index as i64,
                format_timestamp(&vector.created_at),
            ],
        )
        .map_err(|e| super::missing_document(e, &vector.document_id))?;

        Ok(vector)
    }

    /// Get a document's vectors in chunk order
    pub(super) fn list_document_vectors(
        &self,
        document_id: &str,
    ) -> ServiceResult<Vec<VectorEmbedding>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, document_id, content, embedding, metadata, created_at
                FROM vector_embeddings
                WHERE document_id = ?1
                ORDER BY chunk_index
                "#,
            )
            .map_err(DatabaseError::Query)?;

        let vectors = stmt
            .query_map(params![document_id], VectorEmbedding::from_row)
            .map_err(DatabaseError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;

        Ok(vectors)
    }

    /// Delete every vector of a document
    pub(super) fn remove_document_vectors(&self, document_id: &str) -> ServiceResult<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute(
                "DELETE FROM vector_embeddings WHERE document_id = ?1",
                params![document_id],
            )
            .map_err(DatabaseError::Query)?;
        Ok(deleted)
    }
}
