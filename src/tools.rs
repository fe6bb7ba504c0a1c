//! Tools exposed to the external agent loop.
//!
//! Every operation the assistant can perform is a [`Tool`]: a name, a
//! description for the model, a JSON Schema for its parameters, and an
//! async `execute`. The HTTP server, the MCP bridge, and `hrctl tool call`
//! all dispatch through [`ToolRegistry::call`], which validates parameters
//! against the schema before executing.
//!
//! | Tool | Backed by |
//! |------|-----------|
//! | `search_hr_policies` | [`PolicyRetriever::retrieve`] |
//! | `get_document` | [`PolicyRetriever::document`] |
//! | `vacation_balance` | [`RecordStore::vacation_balance`] |
//! | `request_vacation` | [`RecordStore::request_vacation`] |
//! | `list_vacation_requests` | [`RecordStore::list_vacation_requests`] |
//! | `report_sick_leave` | [`RecordStore::report_sick_leave`] |
//! | `update_sick_leave` | [`RecordStore::update_sick_leave`] |
//! | `list_sick_leaves` | [`RecordStore::list_sick_leaves`] |
//! | `get_payslip` | [`RecordStore::payslip`] |

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use hr_assistant_core::search::SearchMode;

use crate::config::Config;
use crate::records::{RecordFilter, RecordStore};
use crate::retriever::{render_context, PolicyRetriever, RetrieveOptions};

/// Dispatch failures that are the caller's fault.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("{0}")]
    InvalidParams(String),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// `false` for tools that write records.
    fn is_read_only(&self) -> bool {
        true
    }

    /// JSON Schema (`type: object`) of the accepted parameters.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// What tools can reach: configuration, the policy index, the records.
#[derive(Clone)]
pub struct ToolContext {
    config: Arc<Config>,
    retriever: PolicyRetriever,
    records: Arc<RecordStore>,
}

impl ToolContext {
    pub fn new(config: Arc<Config>, retriever: PolicyRetriever, records: Arc<RecordStore>) -> Self {
        Self {
            config,
            retriever,
            records,
        }
    }

    /// Open the retriever (refreshing the index) and the record store.
    pub async fn open(config: Arc<Config>) -> Result<Self> {
        let retriever = PolicyRetriever::open(&config).await?;
        let records = Arc::new(RecordStore::new(config.records.clone()));
        Ok(Self::new(config, retriever, records))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn retriever(&self) -> &PolicyRetriever {
        &self.retriever
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }
}

/// Tool metadata as listed by `GET /tools/list` and `hrctl tool list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub read_only: bool,
    pub parameters: Value,
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchPoliciesTool));
        registry.register(Box::new(GetDocumentTool));
        registry.register(Box::new(VacationBalanceTool));
        registry.register(Box::new(RequestVacationTool));
        registry.register(Box::new(ListVacationRequestsTool));
        registry.register(Box::new(ReportSickLeaveTool));
        registry.register(Box::new(UpdateSickLeaveTool));
        registry.register(Box::new(ListSickLeavesTool));
        registry.register(Box::new(GetPayslipTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn list(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                read_only: t.is_read_only(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Validate `params` against the tool's schema and run it.
    pub async fn call(&self, name: &str, params: Value, ctx: &ToolContext) -> Result<Value> {
        let tool = self
            .find(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let params = validate_params(&tool.parameters_schema(), &params)?;

        tracing::info!(tool = name, "tool call");
        let result = tool.execute(params, ctx).await;
        if let Err(e) = &result {
            tracing::warn!(tool = name, error = %e, "tool call failed");
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Check required keys, JSON types and enums; fill in schema defaults.
///
/// `null` counts as "no parameters".
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value, ToolError> {
    let params_obj = match params {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        other => {
            return Err(ToolError::InvalidParams(format!(
                "parameters must be an object, got {}",
                json_type_name(other)
            )))
        }
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();
    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();

    for field in required {
        if params_obj.get(field).is_none_or(Value::is_null) {
            return Err(ToolError::InvalidParams(format!(
                "missing required parameter: {field}"
            )));
        }
    }

    let mut result = params_obj.clone();
    for (name, prop) in &properties {
        match params_obj.get(name) {
            Some(Value::Null) | None => {
                result.remove(name);
                if let Some(default) = prop.get("default") {
                    result.insert(name.clone(), default.clone());
                }
            }
            Some(value) => {
                if let Some(expected) = prop.get("type").and_then(|t| t.as_str()) {
                    let type_ok = match expected {
                        "string" => value.is_string(),
                        "integer" => value.is_i64() || value.is_u64(),
                        "number" => value.is_number(),
                        "boolean" => value.is_boolean(),
                        "array" => value.is_array(),
                        "object" => value.is_object(),
                        _ => true,
                    };
                    if !type_ok {
                        return Err(ToolError::InvalidParams(format!(
                            "parameter '{name}' must be of type '{expected}', got {}",
                            json_type_name(value)
                        )));
                    }
                }
                if let Some(allowed) = prop.get("enum").and_then(|e| e.as_array()) {
                    if !allowed.contains(value) {
                        let allowed: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                        return Err(ToolError::InvalidParams(format!(
                            "parameter '{name}' must be one of [{}], got {value}",
                            allowed.join(", ")
                        )));
                    }
                }
                if let (Some(min), Some(n)) =
                    (prop.get("minimum").and_then(|m| m.as_i64()), value.as_i64())
                {
                    if n < min {
                        return Err(ToolError::InvalidParams(format!(
                            "parameter '{name}' must be >= {min}, got {n}"
                        )));
                    }
                }
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn opt_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    match opt_str(params, key).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ToolError::InvalidParams(format!("{key} must not be empty")).into()),
    }
}

fn employee_schema(extra: Value, required: &[&str]) -> Value {
    let mut properties = json!({
        "employee_id": { "type": "string", "description": "Employee id, e.g. E001" }
    });
    if let (Some(props), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
        props.extend(extra.clone());
    }
    let mut all_required = vec!["employee_id"];
    all_required.extend_from_slice(required);
    json!({ "type": "object", "properties": properties, "required": all_required })
}

fn filter_properties(statuses: &str) -> Value {
    json!({
        "status": { "type": "string", "description": format!("Status filter, case-insensitive: {statuses}") },
        "from": { "type": "string", "description": "Only records starting on or after this date (YYYY-MM-DD)" },
        "to": { "type": "string", "description": "Only records ending on or before this date (YYYY-MM-DD)" }
    })
}

fn parse_filter(params: &Value) -> Result<RecordFilter> {
    Ok(RecordFilter::parse(
        opt_str(params, "status"),
        opt_str(params, "from"),
        opt_str(params, "to"),
    )?)
}

pub struct SearchPoliciesTool;

#[async_trait]
impl Tool for SearchPoliciesTool {
    fn name(&self) -> &str {
        "search_hr_policies"
    }

    fn description(&self) -> &str {
        "Search the employee manual (company policies on vacation, remote work, sick leave, \
         benefits, payroll). Use it for general policy questions."
    }


    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Question or keywords, in any wording" },
                "mode": { "type": "string", "enum": ["keyword", "semantic", "hybrid"] },
                "limit": { "type": "integer", "minimum": 1, "description": "Max passages" },
                "explain": { "type": "boolean", "default": false }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = required_str(&params, "query")?;
        let mode = opt_str(&params, "mode")
            .map(str::parse::<SearchMode>)
            .transpose()?;
        let opts = RetrieveOptions {
            mode,
            limit: params.get("limit").and_then(Value::as_i64),
            explain: params["explain"].as_bool().unwrap_or(false),
        };

        let results = ctx.retriever().retrieve(query, &opts).await?;
        Ok(json!({
            "context": render_context(&results),
            "results": results,
        }))
    }
}

pub struct GetDocumentTool;

#[async_trait]
impl Tool for GetDocumentTool {
    fn name(&self) -> &str {
        "get_document"
    }

    fn description(&self) -> &str {
        "Retrieve a full manual document and its chunks by document id"
    }


    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Document id from a search result" }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let id = required_str(&params, "id")?;
        match ctx.retriever().document(id).await? {
            Some(doc) => Ok(serde_json::to_value(doc)?),
            None => anyhow::bail!("document not found: {id}"),
        }
    }
}

pub struct VacationBalanceTool;

#[async_trait]
impl Tool for VacationBalanceTool {
    fn name(&self) -> &str {
        "vacation_balance"
    }

    fn description(&self) -> &str {
        "Vacation days of an employee: total, used, pending approval and remaining"
    }


    fn parameters_schema(&self) -> Value {
        employee_schema(json!({}), &[])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let employee_id = required_str(&params, "employee_id")?;
        let balance = ctx.records().vacation_balance(employee_id).await?;
        Ok(serde_json::to_value(balance)?)
    }
}

pub struct RequestVacationTool;

#[async_trait]
impl Tool for RequestVacationTool {
    fn name(&self) -> &str {
        "request_vacation"
    }

    fn description(&self) -> &str {
        "File a vacation request (status pendiente). Rejected when the employee lacks days \
         or already has a request covering those dates."
    }


    fn is_read_only(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> Value {
        employee_schema(
            json!({
                "start_date": { "type": "string", "description": "First day off (YYYY-MM-DD)" },
                "end_date": { "type": "string", "description": "Last day off, inclusive (YYYY-MM-DD)" },
                "comments": { "type": "string" }
            }),
            &["start_date", "end_date"],
        )
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let outcome = ctx
            .records()
            .request_vacation(
                required_str(&params, "employee_id")?,
                required_str(&params, "start_date")?,
                required_str(&params, "end_date")?,
                opt_str(&params, "comments"),
            )
            .await?;
        Ok(serde_json::to_value(outcome)?)
    }
}

pub struct ListVacationRequestsTool;

#[async_trait]
impl Tool for ListVacationRequestsTool {
    fn name(&self) -> &str {
        "list_vacation_requests"
    }

    fn description(&self) -> &str {
        "Vacation request history of an employee, optionally filtered by status and dates"
    }


    fn parameters_schema(&self) -> Value {
        employee_schema(filter_properties("pendiente, aprobada, rechazada"), &[])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let employee_id = required_str(&params, "employee_id")?;
        let filter = parse_filter(&params)?;
        let requests = ctx
            .records()
            .list_vacation_requests(employee_id, &filter)
            .await?;
        Ok(json!({ "count": requests.len(), "requests": requests }))
    }
}

pub struct ReportSickLeaveTool;

#[async_trait]
impl Tool for ReportSickLeaveTool {
    fn name(&self) -> &str {
        "report_sick_leave"
    }

    fn description(&self) -> &str {
        "Report a medical leave. Without an estimated end date the leave stays open. \
         Fails if it overlaps an active leave of the same employee."
    }


    fn is_read_only(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> Value {
        employee_schema(
            json!({
                "start_date": { "type": "string", "description": "First day of leave (YYYY-MM-DD)" },
                "estimated_end_date": { "type": "string", "description": "Expected last day (YYYY-MM-DD)" },
                "reason": { "type": "string", "description": "e.g. Gripe, Lesión" },
                "notes": { "type": "string" }
            }),
            &["start_date"],
        )
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let report = ctx
            .records()
            .report_sick_leave(
                required_str(&params, "employee_id")?,
                required_str(&params, "start_date")?,
                opt_str(&params, "estimated_end_date"),
                opt_str(&params, "reason"),
                opt_str(&params, "notes"),
            )
            .await?;
        Ok(serde_json::to_value(report)?)
    }
}

pub struct UpdateSickLeaveTool;

#[async_trait]
impl Tool for UpdateSickLeaveTool {
    fn name(&self) -> &str {
        "update_sick_leave"
    }

    fn description(&self) -> &str {
        "Close or edit a medical leave, identified by employee and start date. \
         Setting an end date marks the leave as finalizada."
    }


    fn is_read_only(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> Value {
        employee_schema(
            json!({
                "start_date": { "type": "string", "description": "Start date of the leave to modify (YYYY-MM-DD)" },
                "end_date": { "type": "string", "description": "Final day of leave (YYYY-MM-DD)" },
                "reason": { "type": "string" },
                "notes": { "type": "string" }
            }),
            &["start_date"],
        )
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let update = ctx
            .records()
            .update_sick_leave(
                required_str(&params, "employee_id")?,
                required_str(&params, "start_date")?,
                opt_str(&params, "end_date"),
                opt_str(&params, "reason"),
                opt_str(&params, "notes"),
            )
            .await?;
        Ok(serde_json::to_value(update)?)
    }
}

pub struct ListSickLeavesTool;

#[async_trait]
impl Tool for ListSickLeavesTool {
    fn name(&self) -> &str {
        "list_sick_leaves"
    }

    fn description(&self) -> &str {
        "Medical leave history of an employee, optionally filtered by status and dates"
    }


    fn parameters_schema(&self) -> Value {
        employee_schema(filter_properties("activa, finalizada"), &[])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let employee_id = required_str(&params, "employee_id")?;
        let filter = parse_filter(&params)?;
        let leaves = ctx.records().list_sick_leaves(employee_id, &filter).await?;
        Ok(json!({ "count": leaves.len(), "leaves": leaves }))
    }
}

pub struct GetPayslipTool;

#[async_trait]
impl Tool for GetPayslipTool {
    fn name(&self) -> &str {
        "get_payslip"
    }

    fn description(&self) -> &str {
        "Payslip of an employee for a month (YYYY-MM), or the latest one when no month is given"
    }


    fn parameters_schema(&self) -> Value {
        employee_schema(
            json!({ "month": { "type": "string", "description": "YYYY-MM" } }),
            &[],
        )
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let payslip = ctx
            .records()
            .payslip(
                required_str(&params, "employee_id")?,
                opt_str(&params, "month"),
            )
            .await?;
        Ok(serde_json::to_value(payslip)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_all_builtins() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 9);
        for name in [
            "search_hr_policies",
            "get_document",
            "vacation_balance",
            "request_vacation",
            "list_vacation_requests",
            "report_sick_leave",
            "update_sick_leave",
            "list_sick_leaves",
            "get_payslip",
        ] {
            assert!(registry.find(name).is_some(), "missing tool {name}");
        }

        let mut writers: Vec<String> = registry
            .list()
            .into_iter()
            .filter(|t| !t.read_only)
            .map(|t| t.name)
            .collect();
        writers.sort();
        assert_eq!(
            writers,
            ["report_sick_leave", "request_vacation", "update_sick_leave"]
        );
    }

    #[test]
    fn test_validate_required_and_types() {
        let schema = RequestVacationTool.parameters_schema();

        let err = validate_params(&schema, &json!({ "employee_id": "E001" })).unwrap_err();
        assert!(err.to_string().contains("start_date"));

        let err = validate_params(
            &schema,
            &json!({ "employee_id": 1, "start_date": "2025-01-01", "end_date": "2025-01-02" }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("must be of type 'string'"));

        assert!(validate_params(&schema, &json!("E001")).is_err());
    }

    #[test]
    fn test_validate_enum_minimum_and_defaults() {
        let schema = SearchPoliciesTool.parameters_schema();

        let err = validate_params(&schema, &json!({ "query": "x", "mode": "fuzzy" })).unwrap_err();
        assert!(err.to_string().contains("must be one of"));

        let err = validate_params(&schema, &json!({ "query": "x", "limit": 0 })).unwrap_err();
        assert!(err.to_string().contains(">= 1"));

        let ok = validate_params(&schema, &json!({ "query": "x", "mode": null })).unwrap();
        assert_eq!(ok["explain"], json!(false));
        assert!(ok.get("mode").is_none());
    }

    #[test]
    fn test_employee_schema_merges_properties() {
        let schema = GetPayslipTool.parameters_schema();
        assert_eq!(schema["required"], json!(["employee_id"]));
        assert!(schema["properties"]["month"].is_object());
        assert!(schema["properties"]["employee_id"].is_object());
    }
}
