//! Model configuration CRUD operations.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use super::Database;
use super::models::{
    ModelConfigUpdate, ModelConfiguration, ModelPurpose, NewModelConfig, format_timestamp,
};
use crate::error::{DatabaseError, ServiceError, ServiceResult};

const MODEL_CONFIG_COLUMNS: &str =
    "id, user_id, name, purpose, model, parameters, is_active, created_at, updated_at";

fn serialize_parameters(parameters: Option<&serde_json::Value>) -> ServiceResult<Option<String>> {
    parameters
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| ServiceError::Database(DatabaseError::Serialization(e)))
}

/// Deactivate the user's other configurations for the same purpose
fn deactivate_others(
    conn: &Connection,
    user_id: &str,
    purpose: ModelPurpose,
    keep_id: &str,
) -> ServiceResult<()> {
    conn.execute(
        r#"
        UPDATE model_configurations SET is_active = 0, updated_at = ?4
        WHERE user_id = ?1 AND purpose = ?2 AND id != ?3 AND is_active = 1
        "#,
        params![
            user_id,
            purpose.as_str(),
            keep_id,
            format_timestamp(&Utc::now())
        ],
    )
    .map_err(DatabaseError::Query)?;
    Ok(())
}

fn query_model_config(conn: &Connection, id: &str) -> ServiceResult<Option<ModelConfiguration>> {
    let config = conn
        .query_row(
            &format!(
                "SELECT {} FROM model_configurations WHERE id = ?1",
                MODEL_CONFIG_COLUMNS
            ),
            params![id],
            ModelConfiguration::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)?;
    Ok(config)
}

impl Database {
    pub(super) fn insert_model_config(
        &self,
        new: NewModelConfig,
    ) -> ServiceResult<ModelConfiguration> {
        let now = Utc::now();
        let config = ModelConfiguration {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new.user_id,
            name: new.name,
            purpose: new.purpose,
            model: new.model,
            parameters: new.parameters,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        };
        let parameters_json = serialize_parameters(config.parameters.as_ref())?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(DatabaseError::Query)?;
        tx.execute(
            r#"
            INSERT INTO model_configurations (id, user_id, name, purpose, model, parameters, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                config.id,
                config.user_id,
                config.name,
                config.purpose.as_str(),
                config.model,
                parameters_json,
                config.is_active,
                format_timestamp(&config.created_at),
                format_timestamp(&config.updated_at),
            ],
        )
        .map_err(DatabaseError::Query)?;
        if config.is_active {
            deactivate_others(&tx, &config.user_id, config.purpose, &config.id)?;
        }
        tx.commit().map_err(DatabaseError::Query)?;

        Ok(config)
    }

    pub(super) fn list_user_model_configs(
        &self,
        user_id: &str,
    ) -> ServiceResult<Vec<ModelConfiguration>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM model_configurations WHERE user_id = ?1 ORDER BY purpose, name",
                MODEL_CONFIG_COLUMNS
            ))
            .map_err(DatabaseError::Query)?;

        let configs = stmt
            .query_map(params![user_id], ModelConfiguration::from_row)
            .map_err(DatabaseError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;
        Ok(configs)
    }

    pub(super) fn find_model_config(&self, id: &str) -> ServiceResult<Option<ModelConfiguration>> {
        let conn = self.conn.lock().unwrap();
        query_model_config(&conn, id)
    }

    pub(super) fn apply_model_config_update(
        &self,
        id: &str,
        update: ModelConfigUpdate,
    ) -> ServiceResult<ModelConfiguration> {
        let parameters_json = match &update.parameters {
            Some(value) => serialize_parameters(value.as_ref())?,
            None => None,
        };

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(DatabaseError::Query)?;
        let changed = tx
            .execute(
                r#"
                UPDATE model_configurations SET
                    name = COALESCE(?2, name),
                    model = COALESCE(?3, model),
                    parameters = CASE WHEN ?5 THEN ?4 ELSE parameters END,
                    is_active = COALESCE(?6, is_active),
                    updated_at = ?7
                WHERE id = ?1
                "#,
                params![
                    id,
                    update.name,
                    update.model,
                    parameters_json,
                    update.parameters.is_some(),
                    update.is_active,
                    format_timestamp(&Utc::now()),
                ],
            )
            .map_err(DatabaseError::Query)?;

        if changed == 0 {
            return Err(ServiceError::ModelConfigNotFound {
                config_id: id.to_string(),
            });
        }

        let config = query_model_config(&tx, id)?.ok_or_else(|| {
            ServiceError::ModelConfigNotFound {
                config_id: id.to_string(),
            }
        })?;
        if config.is_active {
            deactivate_others(&tx, &config.user_id, config.purpose, &config.id)?;
        }
        tx.commit().map_err(DatabaseError::Query)?;

        Ok(config)
    }

    pub(super) fn remove_model_config(&self, id: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute("DELETE FROM model_configurations WHERE id = ?1", params![id])
            .map_err(DatabaseError::Query)?;
        Ok(deleted > 0)
    }

    pub(super) fn find_active_model_config(
        &self,
        user_id: &str,
        purpose: ModelPurpose,
    ) -> ServiceResult<Option<ModelConfiguration>> {
        let conn = self.conn.lock().unwrap();
        let config = conn
            .query_row(
                &format!(
                    "SELECT {} FROM model_configurations \
                     WHERE user_id = ?1 AND purpose = ?2 AND is_active = 1 \
                     ORDER BY updated_at DESC LIMIT 1",
                    MODEL_CONFIG_COLUMNS
                ),
                params![user_id, purpose.as_str()],
                ModelConfiguration::from_row,
            )
            .optional()
            .map_err(DatabaseError::Query)?;
        Ok(config)
    }
}
