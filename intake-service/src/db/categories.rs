//! Category CRUD operations.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{Category, CategoryUpdate, NewCategory, format_timestamp};
use crate::error::{DatabaseError, ServiceError, ServiceResult};

const CATEGORY_COLUMNS: &str = "id, user_id, name, description, color, created_at, updated_at";

/// Map a UNIQUE(user_id, name) violation to a conflict
fn map_unique_violation(e: rusqlite::Error, name: &str) -> ServiceError {
    match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            ServiceError::Conflict {
                message: format!("A category named '{}' already exists", name),
            }
        }
        other => ServiceError::Database(DatabaseError::Query(other)),
    }
}

impl Database {
    pub(super) fn insert_category(&self, new: NewCategory) -> ServiceResult<Category> {
        let now = Utc::now();
        let category = Category {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new.user_id,
            name: new.name,
            description: new.description,
            color: new.color,
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO categories (id, user_id, name, description, color, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                category.id,
                category.user_id,
                category.name,
                category.description,
                category.color,
                format_timestamp(&category.created_at),
                format_timestamp(&category.updated_at),
            ],
        )
        .map_err(|e| map_unique_violation(e, &category.name))?;

        Ok(category)
    }

    pub(super) fn list_user_categories(&self, user_id: &str) -> ServiceResult<Vec<Category>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM categories WHERE user_id = ?1 ORDER BY name COLLATE NOCASE",
                CATEGORY_COLUMNS
            ))
            .map_err(DatabaseError::Query)?;

        let categories = stmt
            .query_map(params![user_id], Category::from_row)
            .map_err(DatabaseError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;
        Ok(categories)
    }

    pub(super) fn find_category(&self, id: &str) -> ServiceResult<Option<Category>> {
        let conn = self.conn.lock().unwrap();
        let category = conn
            .query_row(
                &format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS),
                params![id],
                Category::from_row,
            )
            .optional()
            .map_err(DatabaseError::Query)?;
        Ok(category)
    }

    pub(super) fn apply_category_update(
        &self,
        id: &str,
        update: CategoryUpdate,
    ) -> ServiceResult<Category> {
        let name_for_error = update.name.clone().unwrap_or_default();
        let changed = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                r#"
                UPDATE categories SET
                    name = COALESCE(?2, name),
                    description = CASE WHEN ?4 THEN ?3 ELSE description END,
                    color = CASE WHEN ?6 THEN ?5 ELSE color END,
                    updated_at = ?7
                WHERE id = ?1
                "#,
                params![
                    id,
                    update.name,
                    update.description.clone().flatten(),
                    update.description.is_some(),
                    update.color.clone().flatten(),
                    update.color.is_some(),
                    format_timestamp(&Utc::now()),
                ],
            )
            .map_err(|e| map_unique_violation(e, &name_for_error))?
        };

        if changed == 0 {
            return Err(ServiceError::CategoryNotFound {
                category_id: id.to_string(),
            });
        }

        self.find_category(id)?
            .ok_or_else(|| ServiceError::CategoryNotFound {
                category_id: id.to_string(),
            })
    }

    /// Delete a category; documents referencing it fall back to no category
    pub(super) fn remove_category(&self, id: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute("DELETE FROM categories WHERE id = ?1", params![id])
            .map_err(DatabaseError::Query)?;
        Ok(deleted > 0)
    }
}
