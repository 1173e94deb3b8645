//! Categories and model configurations, validated and scoped to their owner.

use tracing::info;

use crate::db::models::{
    Category, CategoryUpdate, ModelConfigUpdate, ModelConfiguration, NewCategory, NewModelConfig,
};
use crate::error::{ServiceError, ServiceResult};
use crate::service::IntakeService;

const MAX_NAME_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 1000;

impl IntakeService {
    // ========== Categories ==========

    pub fn create_category(&self, mut new: NewCategory) -> ServiceResult<Category> {
        new.name = validate_name(&new.name)?;
        if let Some(description) = &new.description {
            validate_description(description)?;
        }
        if let Some(color) = &new.color {
            validate_color(color)?;
        }

        let category = self.store.create_category(new)?;
        info!(category_id = %category.id, user_id = %category.user_id, "Category created");
        Ok(category)
    }

    pub fn list_categories(&self, user_id: &str) -> ServiceResult<Vec<Category>> {
        self.store.list_categories(user_id)
    }

    pub fn get_owned_category(&self, user_id: &str, category_id: &str) -> ServiceResult<Category> {
        let category =
            self.store
                .get_category(category_id)?
                .ok_or_else(|| ServiceError::CategoryNotFound {
                    category_id: category_id.to_string(),
                })?;
        if category.user_id != user_id {
            return Err(ServiceError::Forbidden {
                resource: format!("category {}", category_id),
            });
        }
        Ok(category)
    }

    pub fn update_category(
        &self,
        user_id: &str,
        category_id: &str,
        mut update: CategoryUpdate,
    ) -> ServiceResult<Category> {
        self.get_owned_category(user_id, category_id)?;

        if let Some(name) = &update.name {
            update.name = Some(validate_name(name)?);
        }
        if let Some(Some(description)) = &update.description {
            validate_description(description)?;
        }
        if let Some(Some(color)) = &update.color {
            validate_color(color)?;
        }

        self.store.update_category(category_id, update)
    }

    /// Documents in the category keep existing without one
    pub fn delete_category(&self, user_id: &str, category_id: &str) -> ServiceResult<()> {
        self.get_owned_category(user_id, category_id)?;
        self.store.delete_category(category_id)?;
        info!(category_id = %category_id, user_id = %user_id, "Category deleted");
        Ok(())
    }

    // ========== Model configurations ==========

    pub fn create_model_config(&self, mut new: NewModelConfig) -> ServiceResult<ModelConfiguration> {
        new.name = validate_name(&new.name)?;
        new.model = validate_model(&new.model)?;
        if let Some(parameters) = &new.parameters {
            validate_parameters(parameters)?;
        }

        let config = self.store.create_model_config(new)?;
        info!(
            config_id = %config.id,
            user_id = %config.user_id,
            purpose = config.purpose.as_str(),
            model = %config.model,
            active = config.is_active,
            "Model configuration created"
        );
        Ok(config)
    }

    pub fn list_model_configs(&self, user_id: &str) -> ServiceResult<Vec<ModelConfiguration>> {
        self.store.list_model_configs(user_id)
    }

    pub fn get_owned_model_config(
        &self,
        user_id: &str,
        config_id: &str,
    ) -> ServiceResult<ModelConfiguration> {
        let config = self.store.get_model_config(config_id)?.ok_or_else(|| {
            ServiceError::ModelConfigNotFound {
                config_id: config_id.to_string(),
            }
        })?;
        if config.user_id != user_id {
            return Err(ServiceError::Forbidden {
                resource: format!("model configuration {}", config_id),
            });
        }
        Ok(config)
    }

    pub fn update_model_config(
        &self,
        user_id: &str,
        config_id: &str,
        mut update: ModelConfigUpdate,
    ) -> ServiceResult<ModelConfiguration> {
        self.get_owned_model_config(user_id, config_id)?;

        if let Some(name) = &update.name {
            update.name = Some(validate_name(name)?);
        }
        if let Some(model) = &update.model {
            update.model = Some(validate_model(model)?);
        }
        if let Some(Some(parameters)) = &update.parameters {
            validate_parameters(parameters)?;
        }

        self.store.update_model_config(config_id, update)
    }

    pub fn delete_model_config(&self, user_id: &str, config_id: &str) -> ServiceResult<()> {
        self.get_owned_model_config(user_id, config_id)?;
        self.store.delete_model_config(config_id)?;
        info!(config_id = %config_id, user_id = %user_id, "Model configuration deleted");
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ServiceError {
    ServiceError::InvalidRequest {
        message: message.into(),
    }
}

/// Trimmed name of 1 to 100 characters
fn validate_name(name: &str) -> ServiceResult<String> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_CHARS {
        return Err(invalid(format!(
            "name must be between 1 and {} characters",
            MAX_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

fn validate_description(description: &str) -> ServiceResult<()> {
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(invalid(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_CHARS
        )));
    }
    Ok(())
}

/// `#rrggbb`
fn validate_color(color: &str) -> ServiceResult<()> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(invalid("color must be a hex color like #1a2b3c"));
    }
    Ok(())
}

fn validate_model(model: &str) -> ServiceResult<String> {
    let model = model.trim();
    if model.is_empty() {
        return Err(invalid("model must not be empty"));
    }
    Ok(model.to_string())
}

fn validate_parameters(parameters: &serde_json::Value) -> ServiceResult<()> {
    if !parameters.is_object() {
        return Err(invalid("parameters must be a JSON object"));
    }
    Ok(())
}
