use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{self, Request, StatusCode};
use tower::ServiceExt;

use mender_core::{RecoveryStep, StepType};
use mender_handlers::{
    AlertStore, HandlerError, HandlerRegistry, LogEscalationSink, MemoryAlertStore,
    MemoryMetrics, StepHandler, StepOutput,
};
use mender_orchestrator::{OrchestratorBuilder, RecoveryConfig, RecoveryOrchestrator};
use mender_server::api::{self, AppState};

// -- Mock handler -----------------------------------------------------------

/// Clearing the cache brings memory down to 70%.
struct FreeingCache {
    metrics: Arc<MemoryMetrics>,
}

impl StepHandler for FreeingCache {
    fn step_type(&self) -> StepType {
        StepType::ClearCache
    }

    async fn execute(&self, step: &RecoveryStep) -> Result<StepOutput, HandlerError> {
        self.metrics.set("memory_usage", 70.0);
        Ok(StepOutput::text(format!("cleared {}", step.target)))
    }
}

// -- Helpers ----------------------------------------------------------------

struct TestApp {
    state: AppState,
    orchestrator: Arc<RecoveryOrchestrator>,
    alerts: Arc<MemoryAlertStore>,
    metrics: Arc<MemoryMetrics>,
    escalations: Arc<LogEscalationSink>,
}

fn build_test_app() -> TestApp {
    let metrics = Arc::new(MemoryMetrics::new());
    let alerts = Arc::new(MemoryAlertStore::new());
    let escalations = Arc::new(LogEscalationSink::new());

    let mut handlers = HandlerRegistry::logging();
    handlers.register(Arc::new(FreeingCache {
        metrics: Arc::clone(&metrics),
    }));

    let orchestrator = OrchestratorBuilder::new()
        .config(RecoveryConfig {
            global_cooldown: Duration::ZERO,
            settle_period: Duration::ZERO,
            ..RecoveryConfig::default()
        })
        .handlers(handlers)
        .metrics_source(metrics.clone())
        .metrics_sink(metrics.clone())
        .alert_store(alerts.clone())
        .escalation_sink(escalations.clone())
        .build()
        .expect("orchestrator should build");
    let orchestrator = Arc::new(orchestrator);

    TestApp {
        state: AppState {
            orchestrator: Arc::clone(&orchestrator),
            alerts: alerts.clone(),
        },
        orchestrator,
        alerts,
        metrics,
        escalations,
    }
}

async fn send(
    app: &TestApp,
    method: http::Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = api::router(app.state.clone())
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, http::Method::GET, uri, None).await
}

async fn post(
    app: &TestApp,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    send(app, http::Method::POST, uri, body).await
}

fn memory_alert(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "title": "Memory usage above 85%",
        "severity": "high",
        "alert_type": "performance",
        "status": "active",
        "source": "system-monitor",
        "metric_name": "memory_usage",
        "current_value": 92.0,
        "threshold_value": 85.0,
        "comparison_operator": ">"
    })
}

// -- Health -----------------------------------------------------------------

#[tokio::test]
async fn health_reports_orchestrator_status() {
    let app = build_test_app();
    let (status, body) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["recovery"]["status"], "healthy");
    assert_eq!(body["recovery"]["registered_actions"], 5);
}

#[tokio::test]
async fn metrics_start_at_zero() {
    let app = build_test_app();
    let (status, body) = get(&app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alerts_received"], 0);
    assert_eq!(body["open_circuits"], 0);
}

// -- Alerts -----------------------------------------------------------------

#[tokio::test]
async fn alert_with_wait_runs_playbook_and_resolves_alert() {
    let app = build_test_app();
    app.metrics.set("memory_usage", 92.0);

    let (status, body) = post(&app, "/v1/alerts?wait=true", Some(memory_alert("mem-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "executed");
    assert_eq!(body["attempt"]["action_id"], "high-memory-usage");
    assert_eq!(body["attempt"]["status"], "success");

    let (status, alert) = get(&app, "/v1/alerts/mem-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(alert["status"], "resolved");
    assert_eq!(alert["resolved_by"], mender_orchestrator::RESOLVED_BY);

    let (_, metrics) = get(&app, "/metrics").await;
    assert_eq!(metrics["recoveries_succeeded"], 1);
}

#[tokio::test]
async fn alert_without_applicable_action_is_escalated() {
    let app = build_test_app();
    app.metrics.set("memory_usage", 50.0);

    let (status, body) = post(&app, "/v1/alerts?wait=true", Some(memory_alert("mem-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "escalated");
    assert_eq!(body["reason"], "no_action_found");
    assert_eq!(app.escalations.escalations().len(), 1);
}

#[tokio::test]
async fn alert_is_accepted_and_recovered_in_background() {
    let app = build_test_app();
    app.metrics.set("memory_usage", 92.0);

    let (status, body) = post(&app, "/v1/alerts", Some(memory_alert("mem-1"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["outcome"], "accepted");
    assert_eq!(body["alert_id"], "mem-1");

    app.orchestrator.shutdown().await;
    let (_, history) = get(&app, "/admin/recovery/history").await;
    assert_eq!(history["count"], 1);
    assert_eq!(history["attempts"][0]["alert_id"], "mem-1");
}

#[tokio::test]
async fn resolved_alert_is_stored_but_not_recovered() {
    let app = build_test_app();
    let mut alert = memory_alert("mem-1");
    alert["status"] = "resolved".into();

    let (status, body) = post(&app, "/v1/alerts", Some(alert)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "ignored");
    assert_eq!(app.alerts.len(), 1);
    assert!(app.orchestrator.history(10).is_empty());
}

#[tokio::test]
async fn malformed_alert_is_rejected() {
    let app = build_test_app();
    let (status, body) = post(&app, "/v1/alerts", Some(serde_json::json!({"title": "x"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("invalid request body"));
}

#[tokio::test]
async fn unparseable_body_returns_json_error() {
    let app = build_test_app();
    let request = Request::builder()
        .method(http::Method::POST)
        .uri("/v1/alerts")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = api::router(app.state.clone())
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn unknown_alert_returns_404() {
    let app = build_test_app();
    let (status, body) = get(&app, "/v1/alerts/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

// -- Recovery administration ------------------------------------------------

#[tokio::test]
async fn disable_and_enable_recovery() {
    let app = build_test_app();
    app.metrics.set("memory_usage", 92.0);

    let (status, body) = post(&app, "/admin/recovery/disable", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, status_body) = get(&app, "/admin/recovery/status").await;
    assert_eq!(status_body["enabled"], false);
    assert_eq!(status_body["status"], "unhealthy");

    let (_, body) = post(&app, "/v1/alerts?wait=true", Some(memory_alert("mem-1"))).await;
    assert_eq!(body["outcome"], "disabled");

    post(&app, "/admin/recovery/enable", None).await;
    let (_, body) = post(&app, "/v1/alerts?wait=true", Some(memory_alert("mem-1"))).await;
    assert_eq!(body["outcome"], "executed");
}

#[tokio::test]
async fn stats_and_active_after_recovery() {
    let app = build_test_app();
    app.metrics.set("memory_usage", 92.0);
    post(&app, "/v1/alerts?wait=true", Some(memory_alert("mem-1"))).await;

    let (status, stats) = get(&app, "/admin/recovery/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_attempts"], 1);
    assert_eq!(stats["successful_recoveries"], 1);
    assert_eq!(stats["top_issues"][0]["action_id"], "high-memory-usage");

    let (_, active) = get(&app, "/admin/recovery/active").await;
    assert_eq!(active["count"], 0);

    let (_, queue) = get(&app, "/admin/recovery/queue").await;
    assert_eq!(queue, serde_json::json!([]));
}

#[tokio::test]
async fn history_respects_limit() {
    let app = build_test_app();
    for id in ["a", "b"] {
        app.metrics.set("memory_usage", 92.0);
        app.alerts
            .save(serde_json::from_value(memory_alert(id)).unwrap())
            .await
            .unwrap();
        let (status, _) = post(
            &app,
            &format!("/admin/recovery/actions/high-memory-usage/test/{id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, all) = get(&app, "/admin/recovery/history").await;
    assert_eq!(all["count"], 2);
    let (_, one) = get(&app, "/admin/recovery/history?limit=1").await;
    assert_eq!(one["count"], 1);
    assert_eq!(one["attempts"][0]["alert_id"], "b");
}

// -- Playbooks --------------------------------------------------------------

fn custom_action() -> serde_json::Value {
    serde_json::json!({
        "id": "restart-search",
        "name": "Restart search",
        "severity": "medium",
        "actions": {
            "immediate": [
                { "type": "restart_service", "target": "search", "timeout": 60 }
            ]
        }
    })
}

#[tokio::test]
async fn list_and_get_actions() {
    let app = build_test_app();
    let (status, body) = get(&app, "/admin/recovery/actions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 5);
    assert_eq!(body["actions"][0]["id"], "high-memory-usage");

    let (status, action) = get(&app, "/admin/recovery/actions/disk-space-full").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(action["severity"], "critical");

    let (status, _) = get(&app, "/admin/recovery/actions/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn add_update_and_remove_action() {
    let app = build_test_app();

    let (status, body) = post(&app, "/admin/recovery/actions", Some(custom_action())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["auto_execute"], true);

    let (status, _) = post(&app, "/admin/recovery/actions", Some(custom_action())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, updated) = send(
        &app,
        http::Method::PATCH,
        "/admin/recovery/actions/restart-search",
        Some(serde_json::json!({ "priority": 7, "cooldown_period": 20 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["priority"], 7);
    assert_eq!(updated["cooldown_period"], 20);
    assert_eq!(updated["name"], "Restart search");

    let (status, removed) = send(
        &app,
        http::Method::DELETE,
        "/admin/recovery/actions/restart-search",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["id"], "restart-search");

    let (status, _) = get(&app, "/admin/recovery/actions/restart-search").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_action_is_rejected() {
    let app = build_test_app();
    let mut action = custom_action();
    action["actions"] = serde_json::json!({});

    let (status, body) = post(&app, "/admin/recovery/actions", Some(action)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("immediate or fallback"));
}

#[tokio::test]
async fn unknown_success_condition_is_rejected() {
    let app = build_test_app();
    let mut action = custom_action();
    action["actions"]["immediate"][0]["success_condition"] = "disk_free:/var".into();

    let (status, body) = post(&app, "/admin/recovery/actions", Some(action)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("disk_free:/var"));
}

#[tokio::test]
async fn test_action_requires_known_action_and_alert() {
    let app = build_test_app();

    let (status, _) = post(&app, "/admin/recovery/actions/nope/test/mem-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) =
        post(&app, "/admin/recovery/actions/high-memory-usage/test/mem-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("alert not found"));
}

#[tokio::test]
async fn test_action_runs_against_stored_alert() {
    let app = build_test_app();
    app.metrics.set("memory_usage", 92.0);
    app.alerts
        .save(serde_json::from_value(memory_alert("mem-1")).unwrap())
        .await
        .unwrap();

    let (status, attempt) =
        post(&app, "/admin/recovery/actions/high-memory-usage/test/mem-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(attempt["status"], "success");
    assert_eq!(attempt["steps"].as_array().unwrap().len(), 2);
}

// -- Circuits ---------------------------------------------------------------

async fn touch_circuit(app: &TestApp, id: &str) {
    app.orchestrator
        .circuits()
        .execute(id, "payments", || async { Ok::<_, String>(()) })
        .await
        .unwrap();
}

#[tokio::test]
async fn list_and_get_circuits() {
    let app = build_test_app();
    let (_, body) = get(&app, "/admin/circuits").await;
    assert_eq!(body["count"], 0);

    touch_circuit(&app, "payments-api").await;
    let (status, body) = get(&app, "/admin/circuits").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["circuits"][0]["id"], "payments-api");
    assert_eq!(body["circuits"][0]["state"], "closed");

    let (status, circuit) = get(&app, "/admin/circuits/payments-api").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(circuit["total_requests"], 1);

    let (status, _) = get(&app, "/admin/circuits/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn force_open_and_reset_circuit() {
    let app = build_test_app();
    touch_circuit(&app, "payments-api").await;

    let (status, body) = post(&app, "/admin/circuits/payments-api/force-open", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let (_, circuit) = get(&app, "/admin/circuits/payments-api").await;
    assert_eq!(circuit["state"], "open");

    let (_, metrics) = get(&app, "/metrics").await;
    assert_eq!(metrics["open_circuits"], 1);

    let (status, _) = post(&app, "/admin/circuits/payments-api/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, circuit) = get(&app, "/admin/circuits/payments-api").await;
    assert_eq!(circuit["state"], "closed");
    assert_eq!(circuit["total_requests"], 0);
}

#[tokio::test]
async fn circuit_operations_on_unknown_id_return_404() {
    let app = build_test_app();
    let (status, _) = post(&app, "/admin/circuits/ghost/reset", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = post(&app, "/admin/circuits/ghost/force-open", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reset_all_circuits_reports_count() {
    let app = build_test_app();
    touch_circuit(&app, "a").await;
    touch_circuit(&app, "b").await;
    app.orchestrator.force_open_circuit("a");

    let (status, body) = post(&app, "/admin/circuits/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "2 circuits reset");
    assert!(
        app.orchestrator
            .circuit_stats()
            .iter()
            .all(|c| c.state == mender_circuit::CircuitState::Closed)
    );
}
