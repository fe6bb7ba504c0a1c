//! End-to-end tests through the library: manual indexing, policy retrieval,
//! the tool registry, and the HTTP server.

use hr_assistant::config::{parse_config, Config};
use hr_assistant::ingest::{index_manual, IndexOptions};
use hr_assistant::records::RecordError;
use hr_assistant::retriever::{PolicyRetriever, RetrieveOptions};
use hr_assistant::server::run_server;
use hr_assistant::tools::{ToolContext, ToolError, ToolRegistry};
use hr_assistant_core::search::SearchMode;
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const MANUAL: &str = "\
# Manual del Empleado

Políticas de recursos humanos.

## Vacaciones

Cada empleado dispone de 22 días laborables de vacaciones al año.

## Teletrabajo

Se permiten hasta dos días de teletrabajo por semana.

## Bajas médicas

El justificante médico debe presentarse en un plazo máximo de 3 días.
";

const EMPLOYEES: &str = r#"[
  {"id": "E001", "nombre": "Ana García", "cargo": "Desarrolladora", "vacaciones_totales": 22, "vacaciones_usadas": 5},
  {"id": "E002", "nombre": "Luis Martínez", "cargo": "Analista", "vacaciones_totales": 22, "vacaciones_usadas": 20}
]"#;

const PAYROLL: &str = r#"[
  {"id_nomina": "NOM001", "id_empleado": "E001", "nombre_empleado": "Ana García", "mes": "2025-10",
   "fecha_pago": "2025-10-31", "salario_bruto": 3600.0, "deducciones": 876.6, "salario_neto": 2723.4,
   "conceptos": {"base": 3200.0, "complementos": 400.0, "irpf": 648.0, "seguridad_social": 228.6}},
  {"id_nomina": "NOM002", "id_empleado": "E001", "nombre_empleado": "Ana García", "mes": "2025-11",
   "fecha_pago": "2025-11-28", "salario_bruto": 3600.0, "deducciones": 876.6, "salario_neto": 2723.4,
   "conceptos": {"base": 3200.0, "complementos": 400.0, "irpf": 648.0, "seguridad_social": 228.6}}
]"#;

// ─── Helpers ────────────────────────────────────────────────────────

fn setup(bind: &str) -> (TempDir, Config) {
    setup_with(bind, "")
}

/// Like [`setup`], with extra TOML sections appended to the config.
fn setup_with(bind: &str, extra: &str) -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    fs::create_dir_all(root.join("manual")).unwrap();
    fs::write(root.join("manual/manual_empleado.md"), MANUAL).unwrap();

    fs::create_dir_all(root.join("data")).unwrap();
    fs::write(root.join("data/empleados.json"), EMPLOYEES).unwrap();
    fs::write(root.join("data/nominas.json"), PAYROLL).unwrap();

    let config = parse_config(&format!(
        r#"
[db]
path = "{root}/index/hr.sqlite"

[manual]
root = "{root}/manual"

[records]
data_dir = "{root}/data"

[server]
bind = "{bind}"
{extra}
"#,
        root = root.display(),
    ))
    .unwrap();

    (tmp, config)
}

async fn open_context(config: &Config) -> ToolContext {
    ToolContext::open(Arc::new(config.clone())).await.unwrap()
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

// ─── Indexing and retrieval ─────────────────────────────────────────

#[tokio::test]
async fn test_index_is_incremental() {
    let (tmp, config) = setup("127.0.0.1:0");

    let first = index_manual(&config, IndexOptions::default()).await.unwrap();
    assert_eq!(first.scanned, 1);
    assert_eq!(first.indexed, 1);
    assert!(first.chunks >= 4, "one chunk per section at least");

    let second = index_manual(&config, IndexOptions::default()).await.unwrap();
    assert_eq!(second.indexed, 0);
    assert_eq!(second.unchanged, 1);
    assert!(!second.changed());

    let full = index_manual(
        &config,
        IndexOptions {
            full: true,
            dry_run: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(full.indexed, 1);

    fs::remove_file(tmp.path().join("manual/manual_empleado.md")).unwrap();
    let removed = index_manual(&config, IndexOptions::default()).await.unwrap();
    assert_eq!(removed.removed, 1);
}

#[tokio::test]
async fn test_retriever_picks_up_manual_edits_on_open() {
    let (tmp, config) = setup("127.0.0.1:0");

    let retriever = PolicyRetriever::open(&config).await.unwrap();
    let results = retriever
        .retrieve("teletrabajo", &RetrieveOptions::default())
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results[0].heading.as_deref().unwrap().contains("Teletrabajo"));
    assert!(results.len() <= 3, "default final_limit is 3");

    let edited = MANUAL.replace("dos días de teletrabajo", "tres días de teletrabajo");
    fs::write(tmp.path().join("manual/manual_empleado.md"), edited).unwrap();

    let retriever = PolicyRetriever::open(&config).await.unwrap();
    let results = retriever
        .retrieve(
            "teletrabajo",
            &RetrieveOptions {
                mode: Some(SearchMode::Keyword),
                limit: Some(1),
                explain: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].text.contains("tres días"));
    assert!(results[0].explain.is_some());
}

#[tokio::test]
async fn test_accent_insensitive_keyword_search() {
    let (_tmp, config) = setup("127.0.0.1:0");
    let retriever = PolicyRetriever::open(&config).await.unwrap();

    let results = retriever
        .retrieve("medica justificante", &RetrieveOptions::default())
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results[0].text.contains("justificante"));
}

#[tokio::test]
async fn test_missing_api_key_keeps_tools_online() {
    std::env::remove_var("OPENAI_API_KEY");
    let (_tmp, config) = setup_with(
        "127.0.0.1:0",
        r#"
[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 1536

[retrieval]
default_mode = "hybrid"
"#,
    );

    let ctx = open_context(&config).await;
    let registry = ToolRegistry::with_builtins();

    let balance = registry
        .call("vacation_balance", json!({ "employee_id": "E001" }), &ctx)
        .await
        .unwrap();
    assert_eq!(balance["remaining_days"], 17);

    let result = registry
        .call(
            "search_hr_policies",
            json!({ "query": "teletrabajo", "mode": "hybrid" }),
            &ctx,
        )
        .await
        .unwrap();
    assert!(result["context"].as_str().unwrap().contains("dos días"));

    let retriever = PolicyRetriever::open(&config).await.unwrap();
    let results = retriever
        .retrieve(
            "vacaciones",
            &RetrieveOptions {
                mode: Some(SearchMode::Hybrid),
                limit: None,
                explain: true,
            },
        )
        .await
        .unwrap();
    assert!(!results.is_empty());
    let explain = results[0].explain.as_ref().unwrap();
    assert_eq!(explain.vector_candidates, 0);

    let report = index_manual(&config, IndexOptions::default()).await.unwrap();
    assert_eq!(report.embeddings_written, 0);
    assert!(report.embeddings_pending >= 4, "every chunk stays pending");
}

// ─── Tools ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_search_tool_returns_context() {
    let (_tmp, config) = setup("127.0.0.1:0");
    let ctx = open_context(&config).await;
    let registry = ToolRegistry::with_builtins();

    let result = registry
        .call(
            "search_hr_policies",
            json!({ "query": "¿Cuántos días de vacaciones tengo?" }),
            &ctx,
        )
        .await
        .unwrap();
    assert!(result["context"].as_str().unwrap().contains("22 días"));

    let doc_id = result["results"][0]["document_id"].as_str().unwrap();
    let doc = registry
        .call("get_document", json!({ "id": doc_id }), &ctx)
        .await
        .unwrap();
    assert_eq!(doc["source_id"], "manual_empleado.md");
}

#[tokio::test]
async fn test_vacation_flow_through_tools() {
    let (tmp, config) = setup("127.0.0.1:0");
    let ctx = open_context(&config).await;
    let registry = ToolRegistry::with_builtins();

    let balance = registry
        .call("vacation_balance", json!({ "employee_id": "E001" }), &ctx)
        .await
        .unwrap();
    assert_eq!(balance["remaining_days"], 17);

    let outcome = registry
        .call(
            "request_vacation",
            json!({
                "employee_id": "E001",
                "start_date": "2025-12-15",
                "end_date": "2025-12-19",
                "comments": "Navidad"
            }),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(outcome["request"]["id_solicitud"], "SOL001");
    assert_eq!(outcome["request"]["estado"], "pendiente");
    assert_eq!(outcome["remaining_days"], 12);

    let on_disk = fs::read_to_string(tmp.path().join("data/solicitudes_vacaciones.json")).unwrap();
    assert!(on_disk.contains("\"dias_solicitados\": 5"));

    let listed = registry
        .call(
            "list_vacation_requests",
            json!({ "employee_id": "E001", "status": "PENDIENTE" }),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(listed["count"], 1);

    let err = registry
        .call(
            "request_vacation",
            json!({
                "employee_id": "E002",
                "start_date": "2025-12-01",
                "end_date": "2025-12-05"
            }),
            &ctx,
        )
        .await
        .unwrap_err();
    let record_err = err.downcast_ref::<RecordError>().unwrap();
    assert_eq!(record_err.code(), "insufficient_days");
}

#[tokio::test]
async fn test_sick_leave_flow_through_tools() {
    let (_tmp, config) = setup("127.0.0.1:0");
    let ctx = open_context(&config).await;
    let registry = ToolRegistry::with_builtins();

    let report = registry
        .call(
            "report_sick_leave",
            json!({ "employee_id": "E001", "start_date": "2025-11-03", "reason": "Gripe" }),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(report["leave"]["id_baja"], "BM001");
    assert!(report["leave"]["fecha_fin_estimada"].is_null());
    assert!(report["reminder"].as_str().unwrap().contains("3 días"));

    let err = registry
        .call(
            "report_sick_leave",
            json!({ "employee_id": "E001", "start_date": "2025-11-20" }),
            &ctx,
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<RecordError>().unwrap().code(),
        "open_sick_leave"
    );

    let closed = registry
        .call(
            "update_sick_leave",
            json!({ "employee_id": "E001", "start_date": "2025-11-03", "end_date": "2025-11-07" }),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(closed["leave"]["estado"], "finalizada");

    let listed = registry
        .call(
            "list_sick_leaves",
            json!({ "employee_id": "E001", "status": "finalizada" }),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(listed["count"], 1);
}

#[tokio::test]
async fn test_payslip_tool() {
    let (_tmp, config) = setup("127.0.0.1:0");
    let ctx = open_context(&config).await;
    let registry = ToolRegistry::with_builtins();

    let latest = registry
        .call("get_payslip", json!({ "employee_id": "E001" }), &ctx)
        .await
        .unwrap();
    assert_eq!(latest["mes"], "2025-11");

    let err = registry
        .call(
            "get_payslip",
            json!({ "employee_id": "E001", "month": "2025-01" }),
            &ctx,
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("2025-10, 2025-11"));
}

#[tokio::test]
async fn test_registry_rejects_bad_calls() {
    let (_tmp, config) = setup("127.0.0.1:0");
    let ctx = open_context(&config).await;
    let registry = ToolRegistry::with_builtins();

    let err = registry.call("nope", json!({}), &ctx).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ToolError>(),
        Some(ToolError::UnknownTool(_))
    ));

    let err = registry
        .call("vacation_balance", json!({}), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ToolError>(),
        Some(ToolError::InvalidParams(_))
    ));
}

// ─── HTTP server ────────────────────────────────────────────────────

#[tokio::test]
async fn test_http_tool_server() {
    let port = find_free_port();
    let (_tmp, config) = setup(&format!("127.0.0.1:{}", port));

    let server_config = config.clone();
    let server_handle = tokio::spawn(async move {
        run_server(&server_config).await.ok();
    });
    wait_for_server(port).await;

    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    let body: Value = client
        .get(format!("{base}/tools/list"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["tools"].as_array().unwrap().len(), 9);

    let resp = client
        .post(format!("{base}/tools/vacation_balance"))
        .json(&json!({ "employee_id": "E001" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["employee_name"], "Ana García");

    let resp = client
        .post(format!("{base}/tools/vacation_balance"))
        .json(&json!({ "employee_id": "E999" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "employee_not_found");

    let resp = client
        .post(format!("{base}/tools/request_vacation"))
        .json(&json!({ "employee_id": "E001", "start_date": "2025-12-15" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{base}/tools/request_vacation"))
        .json(&json!({
            "employee_id": "E002",
            "start_date": "2025-12-01",
            "end_date": "2025-12-10"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let resp = client
        .post(format!("{base}/tools/nonexistent"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    server_handle.abort();
}
