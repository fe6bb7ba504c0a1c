//! `hrctl tool list` and `hrctl tool call`.
//!
//! `tool call` goes through the same [`ToolRegistry::call`] path as the
//! HTTP server, which makes it the quickest way to exercise a tool end to
//! end from a shell.

use anyhow::Result;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::tools::{ToolContext, ToolRegistry};

pub fn list_tools() -> Result<()> {
    let registry = ToolRegistry::with_builtins();

    println!("{:<24} {:<6} DESCRIPTION", "TOOL", "WRITES");
    for t in registry.tools() {
        let writes = if t.is_read_only() { "no" } else { "yes" };
        let summary = t.description().split(". ").next().unwrap_or_default();
        println!("{:<24} {:<6} {}", t.name(), writes, summary);
    }

    Ok(())
}

pub async fn call_tool(config: &Config, name: &str, params: Vec<(String, String)>) -> Result<()> {
    let registry = ToolRegistry::with_builtins();
    let ctx = ToolContext::open(Arc::new(config.clone())).await?;

    let result = registry.call(name, params_to_json(&params), &ctx).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Values that parse as JSON keep their type; anything else is a string.
pub fn params_to_json(params: &[(String, String)]) -> Value {
    let mut map = Map::new();
    for (k, v) in params {
        let value =
            serde_json::from_str::<Value>(v).unwrap_or_else(|_| Value::String(v.clone()));
        map.insert(k.clone(), value);
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_keep_json_types() {
        let params = vec![
            ("employee_id".to_string(), "E001".to_string()),
            ("limit".to_string(), "3".to_string()),
            ("start_date".to_string(), "2025-12-15".to_string()),
            ("explain".to_string(), "true".to_string()),
        ];
        let v = params_to_json(&params);
        assert_eq!(v["employee_id"], "E001");
        assert_eq!(v["limit"], 3);
        assert_eq!(v["start_date"], "2025-12-15");
        assert_eq!(v["explain"], true);
    }
}
