//! Message templates with `{{variable}}` placeholders

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Category, VariableType};

/// Declared template variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    #[serde(rename = "type", default = "default_variable_type")]
    pub var_type: VariableType,
    #[serde(default)]
    pub required: bool,
}

fn default_variable_type() -> VariableType {
    VariableType::Text
}

/// Persistent message template
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub category: Category,
    pub content: String,
    pub variables: Vec<TemplateVariable>,
    pub is_default: bool,
    pub is_active: bool,
    pub usage_count: i64,
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn new(input: TemplateInput) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            category: input.category,
            content: input.content,
            variables: input.variables,
            is_default: input.is_default,
            is_active: input.is_active.unwrap_or(true),
            usage_count: 0,
            last_used: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_patch(&mut self, patch: TemplatePatch) -> Result<(), String> {
        if let Some(variables) = patch.variables {
            validate_variables(&variables)?;
            self.variables = variables;
        }
        if let Some(content) = patch.content {
            if content.trim().is_empty() {
                return Err("content cannot be empty".to_string());
            }
            self.content = content;
        }
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(is_default) = patch.is_default {
            self.is_default = is_default;
        }
        if let Some(active) = patch.is_active {
            self.is_active = active;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// POST /api/templates body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInput {
    pub name: String,
    pub category: Category,
    pub content: String,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl TemplateInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        if self.content.trim().is_empty() {
            return Err("content is required".to_string());
        }
        validate_variables(&self.variables)
    }
}

/// PUT /api/templates/:id body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub category: Option<Category>,
    pub content: Option<String>,
    pub variables: Option<Vec<TemplateVariable>>,
    pub is_default: Option<bool>,
    pub is_active: Option<bool>,
}

fn validate_variables(variables: &[TemplateVariable]) -> Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    for variable in variables {
        let name = variable.name.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid variable name '{}'", variable.name));
        }
        if !seen.insert(name.to_string()) {
            return Err(format!("variable '{}' declared twice", name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(variables: Vec<TemplateVariable>) -> TemplateInput {
        TemplateInput {
            name: "Oferta".to_string(),
            category: Category::General,
            content: "{{title}} por {{price}}".to_string(),
            variables,
            is_default: false,
            is_active: None,
        }
    }

    #[test]
    fn test_variable_json_shape() {
        let v: TemplateVariable =
            serde_json::from_str(r#"{"name": "price", "type": "currency", "required": true}"#).unwrap();
        assert_eq!(v.var_type, VariableType::Currency);
        assert!(v.required);

        let v: TemplateVariable = serde_json::from_str(r#"{"name": "title"}"#).unwrap();
        assert_eq!(v.var_type, VariableType::Text);
        assert!(!v.required);
    }

    #[test]
    fn test_duplicate_variable_rejected() {
        let v = TemplateVariable { name: "title".into(), var_type: VariableType::Text, required: true };
        assert!(input(vec![v.clone()]).validate().is_ok());
        assert!(input(vec![v.clone(), v]).validate().is_err());
    }

    #[test]
    fn test_bad_variable_name_rejected() {
        let v = TemplateVariable { name: "price}}".into(), var_type: VariableType::Text, required: false };
        assert!(input(vec![v]).validate().is_err());
    }
}
