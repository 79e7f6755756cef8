//! Template rendering
//!
//! Placeholders are `{{name}}` with optional inner whitespace. Declared
//! variables are formatted by type; a missing required variable fails the
//! render before anything is substituted.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::models::{Category, Product, Template, VariableType};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

/// Values available to a template
pub type RenderContext = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("Missing required template variable '{0}'")]
    MissingVariable(String),

    #[error("No active template for category {0}")]
    NoTemplate(Category),
}

/// Format an amount as Brazilian reais: `R$ 1234,56`
pub fn format_currency(value: f64) -> String {
    format!("R$ {:.2}", value).replace('.', ",")
}

/// Up to two decimals, comma separator, trailing zeros dropped
pub fn format_number(value: f64) -> String {
    let fixed = format!("{:.2}", value);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    trimmed.replace('.', ",")
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

fn format_value(value: &Value, var_type: Option<VariableType>) -> String {
    match (value, var_type) {
        (Value::Null, _) => String::new(),
        (Value::Number(n), Some(VariableType::Currency)) => n.as_f64().map(format_currency).unwrap_or_default(),
        (Value::Number(n), _) => n.as_f64().map(format_number).unwrap_or_default(),
        (Value::String(s), Some(VariableType::Currency)) => match s.replace(',', ".").parse::<f64>() {
            Ok(v) => format_currency(v),
            Err(_) => s.clone(),
        },
        (Value::String(s), _) => s.clone(),
        (Value::Bool(b), _) => b.to_string(),
        (other, _) => other.to_string(),
    }
}

/// Render `template` against `context`
pub fn render(template: &Template, context: &RenderContext) -> Result<String, TemplateError> {
    for variable in &template.variables {
        if variable.required && is_missing(context.get(&variable.name)) {
            return Err(TemplateError::MissingVariable(variable.name.clone()));
        }
    }

    let declared: HashMap<&str, VariableType> = template
        .variables
        .iter()
        .map(|v| (v.name.as_str(), v.var_type))
        .collect();

    let rendered = PLACEHOLDER_RE.replace_all(&template.content, |caps: &Captures| {
        let name = &caps[1];
        match context.get(name) {
            Some(value) => format_value(value, declared.get(name).copied()),
            None => String::new(),
        }
    });

    Ok(rendered.into_owned())
}

/// Placeholder names used in `content`, in order of first appearance
pub fn placeholders(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(content) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn opt<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or(Value::Null)
}

/// Context variables exposed for a product
pub fn product_context(product: &Product) -> RenderContext {
    let discount = if product.discount > 0.0 {
        Value::from(product.discount)
    } else {
        Value::Null
    };
    let discount_percentage = if product.discount_percentage > 0 {
        Value::from(product.discount_percentage)
    } else {
        Value::Null
    };

    let mut context = RenderContext::new();
    context.insert("title".into(), Value::from(product.title.clone()));
    context.insert("description".into(), opt(product.description.clone()));
    context.insert("price".into(), Value::from(product.price));
    context.insert("originalPrice".into(), opt(product.original_price));
    context.insert("discount".into(), discount);
    context.insert("discountPercentage".into(), discount_percentage);
    context.insert("affiliateLink".into(), Value::from(product.affiliate_link.clone()));
    context.insert("productUrl".into(), Value::from(product.product_url.clone()));
    context.insert("imageUrl".into(), opt(product.image_url.clone()));
    context.insert("category".into(), Value::from(product.category.as_str()));
    context.insert("platform".into(), Value::from(product.platform.as_str()));
    context.insert("rating".into(), opt(product.rating));
    context.insert("commissionQuality".into(), Value::from(product.commission_quality.as_str()));
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::product::sample_draft;
    use crate::models::{TemplateInput, TemplateVariable};

    fn template(content: &str, variables: Vec<TemplateVariable>) -> Template {
        Template::new(TemplateInput {
            name: "t".into(),
            category: Category::General,
            content: content.into(),
            variables,
            is_default: false,
            is_active: None,
        })
    }

    fn var(name: &str, var_type: VariableType, required: bool) -> TemplateVariable {
        TemplateVariable {
            name: name.into(),
            var_type,
            required,
        }
    }

    #[test]
    fn test_currency_and_number_format() {
        assert_eq!(format_currency(1234.5), "R$ 1234,50");
        assert_eq!(format_currency(89.9), "R$ 89,90");
        assert_eq!(format_number(4.5), "4,5");
        assert_eq!(format_number(20.0), "20");
        assert_eq!(format_number(3.14159), "3,14");
    }

    #[test]
    fn test_render_product() {
        let mut draft = sample_draft("MLB9", 149.9, 0.12);
        draft.original_price = Some(199.9);
        let product = Product::from_draft(draft, None);

        let t = template(
            "🔥 {{ title }}\nDe {{originalPrice}} por {{price}} ({{discountPercentage}}% OFF)\n{{affiliateLink}}",
            vec![
                var("title", VariableType::Text, true),
                var("price", VariableType::Currency, true),
                var("originalPrice", VariableType::Currency, false),
                var("discountPercentage", VariableType::Number, false),
                var("affiliateLink", VariableType::Url, true),
            ],
        );

        let text = render(&t, &product_context(&product)).unwrap();
        assert_eq!(
            text,
            "🔥 Fone Bluetooth Modelo MLB9\nDe R$ 199,90 por R$ 149,90 (25% OFF)\nhttps://produto.mercadolivre.com.br/MLB9"
        );
    }

    #[test]
    fn test_missing_optional_is_empty() {
        let product = Product::from_draft(sample_draft("MLB9", 100.0, 0.1), None);
        let t = template(
            "{{title}}{{description}}|{{unknownThing}}|",
            vec![var("description", VariableType::Text, false)],
        );
        assert_eq!(render(&t, &product_context(&product)).unwrap(), "Fone Bluetooth Modelo MLB9||");
    }

    #[test]
    fn test_missing_required_fails() {
        let product = Product::from_draft(sample_draft("MLB9", 100.0, 0.1), None);
        let t = template("{{title}} {{coupon}}", vec![var("coupon", VariableType::Text, true)]);
        assert_eq!(
            render(&t, &product_context(&product)),
            Err(TemplateError::MissingVariable("coupon".into()))
        );
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders("{{a}} {{ b }} {{a}}"), vec!["a".to_string(), "b".to_string()]);
    }
}
