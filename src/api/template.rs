//! App content templates.
//!
//! Templates are exported app folders in JSON with `$$token` placeholders
//! that are replaced by caller-supplied values before import.

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use super::ApiError;
use crate::error::ResourceError;

/// Fetches raw app templates by key.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Return the raw template text stored under `key`.
    async fn fetch(&self, key: &str) -> Result<String, ApiError>;
}

fn whitespace() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static pattern"))
}

/// Storage key of the exported template for an app.
///
/// `"Amazon VPC Flow Logs"` → `"ApiExported-Amazon-VPC-Flow-Logs.json"`.
pub fn template_key(app_name: &str) -> String {
    format!("ApiExported-{}.json", whitespace().replace_all(app_name, "-"))
}

/// Substitute `$$token` placeholders and parse the result as JSON.
///
/// Longer tokens are replaced first so a token that prefixes another one
/// (`$$logsrc` vs `$$logsrcvpc`) cannot clobber it. Non-string values are
/// substituted using their JSON text.
pub fn render_template(raw: &str, tokens: &Map<String, Value>) -> Result<Value, ResourceError> {
    let mut ordered: Vec<(&String, &Value)> = tokens.iter().collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    let mut text = raw.to_string();
    for (token, value) in ordered {
        let replacement = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        text = text.replace(&format!("$${}", token), &replacement);
    }

    Ok(serde_json::from_str(&text)?)
}

/// Append `-<YYYY-mm-dd HH:MM:SS>` to the template's top-level name.
pub fn add_time_suffix(template: &mut Value, now: DateTime<Utc>) -> Result<(), ResourceError> {
    let name = template
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ResourceError::Decode("app template has no top-level name".to_string()))?;
    let suffixed = format!("{}-{}", name, now.format("%Y-%m-%d %H:%M:%S"));
    template["name"] = Value::String(suffixed);
    Ok(())
}
