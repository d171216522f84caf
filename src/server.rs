//! HTTP server for notes, map lookups, AI drafting, and the static front-end.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/notes` | Full note snapshot `{cadastral_number: {description?, avito_link?}}` |
//! | `POST` | `/notes` | Upsert `{cadastral_number, description?, avito_link?}` → `{"status":"ok"}` |
//! | `GET`  | `/proxy-map?query=` | Relay the cadastral map search response |
//! | `POST` | `/ai/describe` | `{record, existing_note?, instruction?}` → `{"text"}` |
//! | `OPTIONS` | any | CORS preflight, `204` without body |
//! | `GET`  | anything else | Static file from the public directory |
//!
//! Any other method/path combination answers `404`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": "Missing cadastral_number", "code": "bad_request" }
//! ```
//!
//! AI failures add a `details` string:
//!
//! ```json
//! { "error": "YandexGPT request failed", "code": "upstream_error", "details": "failed to reach YandexGPT: ..." }
//! ```
//!
//! # CORS
//!
//! Every response carries `Access-Control-Allow-Origin: *` together with the
//! allowed methods (`GET, POST, OPTIONS`) and headers (`Content-Type`).

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::assets::AssetServer;
use crate::config::Config;
use crate::error::ServiceError;
use crate::llm::{create_model, LanguageModel};
use crate::map_proxy::MapProxy;
use crate::notes::{JsonFileStore, NoteMap, NoteStore, NoteUpdate};
use crate::prompt::build_prompt;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub notes: Arc<dyn NoteStore>,
    pub model: Arc<dyn LanguageModel>,
    pub map: Arc<MapProxy>,
    pub assets: Arc<AssetServer>,
}

impl AppState {
    /// Wires the production components from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            notes: Arc::new(JsonFileStore::new(config.storage.notes_path())),
            model: create_model(&config.llm)?,
            map: Arc::new(MapProxy::new(&config.map_proxy)?),
            assets: Arc::new(AssetServer::new(&config.assets.public_dir)),
        })
    }
}

/// Builds the router with CORS headers and request tracing applied.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/notes",
            get(handle_list_notes)
                .post(handle_upsert_note)
                .fallback(handle_fallback),
        )
        .route("/proxy-map", get(handle_proxy_map).fallback(handle_fallback))
        .route(
            "/ai/describe",
            post(handle_ai_describe).fallback(handle_fallback),
        )
        .fallback(handle_fallback)
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Creates the notes document if it does not exist yet, binds to
/// `[server].bind`, and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = JsonFileStore::new(config.storage.notes_path());
    store.ensure_data_file().await?;

    let state = AppState::from_config(config)?;
    let ai_enabled = state.model.is_configured();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    let local = listener.local_addr()?;

    tracing::info!("Backend server is running at http://{}", local);
    tracing::info!("  GET  /notes");
    tracing::info!("  POST /notes  (JSON: cadastral_number, description?, avito_link?)");
    tracing::info!("  GET  /proxy-map?query=<cadastral number>");
    if ai_enabled {
        tracing::info!("  POST /ai/describe  (YandexGPT)");
        if config.llm.credentials.system_prompt.is_some() {
            tracing::info!("    system prompt taken from YANDEX_GPT_SYSTEM_PROMPT");
        }
    } else {
        tracing::info!(
            missing = ?config.llm.missing_variables(),
            "  POST /ai/describe  (disabled)"
        );
    }

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    /// Human-readable error message.
    error: String,
    /// Machine-readable error code (e.g., `"bad_request"`, `"upstream_error"`).
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<String>,
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        if err.status().is_server_error() {
            tracing::warn!(error = %err, "request failed");
        }
        Self {
            status: err.status(),
            code: err.code(),
            message: err.to_string(),
            details: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            code: self.code,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Wraps a model failure in the `{error, details}` shape the front-end expects.
fn model_failure(err: ServiceError) -> AppError {
    match err {
        ServiceError::Upstream(_) | ServiceError::EmptyResponse(_) => {
            let mut app = AppError::from(err);
            app.details = Some(std::mem::take(&mut app.message));
            app.message = "YandexGPT request failed".to_string();
            app
        }
        other => other.into(),
    }
}

// ============ Body decoding ============

/// Decodes a non-empty JSON object body.
///
/// A missing or zero `Content-Length` is rejected before looking at the body.
fn read_json_object(headers: &HeaderMap, body: &Bytes) -> Result<Map<String, Value>, ServiceError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    if declared == 0 || body.is_empty() {
        return Err(ServiceError::invalid("Empty body"));
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ServiceError::invalid("Request body must be a JSON object")),
        Err(_) => Err(ServiceError::invalid("Invalid JSON")),
    }
}

/// Reads an optional string field; `null` counts as absent.
fn optional_string(payload: &Map<String, Value>, field: &str) -> Result<Option<String>, ServiceError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ServiceError::invalid(format!(
            "Field '{}' must be a string",
            field
        ))),
    }
}

fn cadastral_field(payload: &Map<String, Value>) -> String {
    match payload.get("cadastral_number") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

// ============ /notes ============

async fn handle_list_notes(State(state): State<AppState>) -> Result<Json<NoteMap>, AppError> {
    Ok(Json(state.notes.get_all().await?))
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

async fn handle_upsert_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StatusResponse>, AppError> {
    let payload = read_json_object(&headers, &body)?;
    let cadastral = cadastral_field(&payload);
    let update = NoteUpdate {
        description: optional_string(&payload, "description")?,
        avito_link: optional_string(&payload, "avito_link")?,
    };

    state.notes.upsert(&cadastral, update).await?;
    Ok(Json(StatusResponse { status: "ok" }))
}

// ============ /proxy-map ============

/// Repeated `query` parameters are allowed; the first non-empty one wins.
async fn handle_proxy_map(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let query = params
        .into_iter()
        .find_map(|(name, value)| (name == "query" && !value.is_empty()).then_some(value))
        .unwrap_or_default();
    let proxied = state.map.search(&query).await?;
    Ok(([(header::CONTENT_TYPE, proxied.content_type)], proxied.body).into_response())
}

// ============ /ai/describe ============

#[derive(Serialize)]
struct DescribeResponse {
    text: String,
}

async fn handle_ai_describe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DescribeResponse>, AppError> {
    state.model.ensure_configured()?;

    let payload = read_json_object(&headers, &body)?;
    let record = payload
        .get("record")
        .and_then(Value::as_object)
        .ok_or_else(|| ServiceError::invalid("Field 'record' must be an object"))?;

    let prompt = build_prompt(
        record,
        payload.get("existing_note"),
        payload.get("instruction"),
    );
    let text = state.model.complete(&prompt).await.map_err(model_failure)?;

    Ok(Json(DescribeResponse { text }))
}

// ============ Fallback ============

/// Handles preflight requests, static files, and unknown routes.
async fn handle_fallback(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    if method != Method::GET && method != Method::HEAD {
        return AppError::from(ServiceError::NotFound("Endpoint not found".to_string()))
            .into_response();
    }

    match state.assets.serve(uri.path()).await {
        Ok(asset) => ([(header::CONTENT_TYPE, asset.content_type)], asset.body).into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapProxyConfig;
    use crate::error::ServiceResult;
    use crate::llm::DisabledModel;
    use crate::notes::MemoryNoteStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tower::ServiceExt;

    enum Script {
        Reply(&'static str),
        Fail(&'static str),
    }

    struct ScriptedModel {
        script: Script,
        last_prompt: Mutex<Option<String>>,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn is_configured(&self) -> bool {
            true
        }

        async fn complete(&self, prompt: &str) -> ServiceResult<String> {
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            match self.script {
                Script::Reply(text) => Ok(text.to_string()),
                Script::Fail(message) => Err(ServiceError::upstream(message)),
            }
        }
    }

    struct Harness {
        _tmp: TempDir,
        state: AppState,
    }

    fn harness(model: Arc<dyn LanguageModel>) -> Harness {
        let tmp = TempDir::new().unwrap();
        let public = tmp.path().join("public");
        std::fs::create_dir_all(&public).unwrap();
        std::fs::write(public.join("index.html"), "<h1>map</h1>").unwrap();
        std::fs::write(tmp.path().join("secret.txt"), "nope").unwrap();

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let dead_port = listener.local_addr().unwrap().port();
        drop(listener);

        let map = MapProxy::new(&MapProxyConfig {
            endpoint: format!("http://127.0.0.1:{}/api/kad/search", dead_port),
            timeout_secs: 2,
            ..MapProxyConfig::default()
        })
        .unwrap();

        let state = AppState {
            notes: Arc::new(MemoryNoteStore::new()),
            model,
            map: Arc::new(map),
            assets: Arc::new(AssetServer::new(public)),
        };
        Harness { _tmp: tmp, state }
    }

    fn disabled() -> Arc<dyn LanguageModel> {
        Arc::new(DisabledModel::new(vec!["YANDEX_GPT_API_KEY", "YANDEX_GPT_MODEL_URI"]))
    }

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn bare(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, headers, body)
    }

    fn json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_post_then_get_notes() {
        let h = harness(disabled());
        let (status, _, body) = send(
            &h.state,
            json_post(
                "/notes",
                r#"{"cadastral_number":"77:01:0001:23","description":"near river"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body), serde_json::json!({"status": "ok"}));

        let (status, headers, body) = send(&h.state, bare(Method::GET, "/notes")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            json(&body),
            serde_json::json!({"77:01:0001:23": {"description": "near river"}})
        );
    }

    #[tokio::test]
    async fn test_numeric_cadastral_number_is_accepted() {
        let h = harness(disabled());
        let (status, _, _) = send(
            &h.state,
            json_post("/notes", r#"{"cadastral_number": 12345, "avito_link": "x"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let notes = h.state.notes.get_all().await.unwrap();
        assert_eq!(notes["12345"].avito_link.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_note_validation_errors() {
        let h = harness(disabled());
        let cases = [
            (r#"{"cadastral_number":""}"#, "Missing cadastral_number"),
            (r#"{"cadastral_number":"   "}"#, "Missing cadastral_number"),
            (r#"{"description":"orphan"}"#, "Missing cadastral_number"),
            (r#"{"cadastral_number":"1:1","description":5}"#, "Field 'description' must be a string"),
            ("{not json", "Invalid JSON"),
            ("[1,2]", "Request body must be a JSON object"),
        ];
        for (body, message) in cases {
            let (status, _, resp) = send(&h.state, json_post("/notes", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
            let resp = json(&resp);
            assert_eq!(resp["error"], message);
            assert_eq!(resp["code"], "bad_request");
        }
        assert!(h.state.notes.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_body_is_bad_request() {
        let h = harness(disabled());
        let (status, _, body) = send(&h.state, bare(Method::POST, "/notes")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["error"], "Empty body");
    }

    #[tokio::test]
    async fn test_ai_unconfigured_is_service_unavailable() {
        let h = harness(disabled());
        let (status, _, body) = send(
            &h.state,
            json_post("/ai/describe", r#"{"record":{"region":"Крым"}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let body = json(&body);
        assert_eq!(body["code"], "not_configured");
        assert!(body["error"].as_str().unwrap().contains("YANDEX_GPT_API_KEY"));
    }

    #[tokio::test]
    async fn test_ai_describe_returns_text() {
        let model = Arc::new(ScriptedModel {
            script: Script::Reply("Участок у реки"),
            last_prompt: Mutex::new(None),
        });
        let h = harness(model.clone());

        let (status, _, body) = send(
            &h.state,
            json_post(
                "/ai/describe",
                r#"{"record":{"region":"Крым","area_ha":1.5},"instruction":"коротко"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body), serde_json::json!({"text": "Участок у реки"}));

        let prompt = model.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("- Регион: Крым"));
        assert!(prompt.contains("- Площадь (га): 1.5"));
        assert!(prompt.contains("- Особые пожелания менеджера: коротко"));
    }

    #[tokio::test]
    async fn test_ai_describe_requires_record_object() {
        let model = Arc::new(ScriptedModel {
            script: Script::Reply("unused"),
            last_prompt: Mutex::new(None),
        });
        let h = harness(model.clone());

        for body in [r#"{"record":"text"}"#, r#"{"instruction":"x"}"#] {
            let (status, _, resp) = send(&h.state, json_post("/ai/describe", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json(&resp)["error"], "Field 'record' must be an object");
        }
        assert!(model.last_prompt.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ai_failure_is_bad_gateway_with_details() {
        let model = Arc::new(ScriptedModel {
            script: Script::Fail("failed to reach YandexGPT: operation timed out"),
            last_prompt: Mutex::new(None),
        });
        let h = harness(model);

        let (status, _, body) = send(&h.state, json_post("/ai/describe", r#"{"record":{}}"#)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let body = json(&body);
        assert_eq!(body["error"], "YandexGPT request failed");
        assert_eq!(body["details"], "failed to reach YandexGPT: operation timed out");
    }

    #[tokio::test]
    async fn test_proxy_map_validation_and_failure() {
        let h = harness(disabled());

        for uri in ["/proxy-map", "/proxy-map?query=", "/proxy-map?query=%20%20"] {
            let (status, _, body) = send(&h.state, bare(Method::GET, uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(json(&body)["error"], "Missing query param");
        }

        let (status, _, body) =
            send(&h.state, bare(Method::GET, "/proxy-map?query=77%3A01%3A0001%3A23")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json(&body)["code"], "upstream_error");
    }

    /// Serves `text/plain` echoes of every `query` value it receives.
    async fn echo_upstream() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/api/kad/search",
            get(|Query(params): Query<Vec<(String, String)>>| async move {
                let values: Vec<String> = params.into_iter().map(|(_, v)| v).collect();
                (
                    [(header::CONTENT_TYPE, "text/plain; charset=x")],
                    format!("got[{}]", values.join("|")),
                )
            }),
        );
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/api/kad/search")
    }

    fn with_map_endpoint(state: &AppState, endpoint: String) -> AppState {
        let mut state = state.clone();
        state.map = Arc::new(
            MapProxy::new(&MapProxyConfig {
                endpoint,
                timeout_secs: 2,
                ..MapProxyConfig::default()
            })
            .unwrap(),
        );
        state
    }

    #[tokio::test]
    async fn test_proxy_map_relays_upstream_response() {
        let h = harness(disabled());
        let state = with_map_endpoint(&h.state, echo_upstream().await);

        let (status, headers, body) =
            send(&state, bare(Method::GET, "/proxy-map?query=%20a%26b%20")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=x");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(body, b"got[a&b]");
    }

    #[tokio::test]
    async fn test_proxy_map_repeated_query_takes_first() {
        let h = harness(disabled());
        let state = with_map_endpoint(&h.state, echo_upstream().await);

        let (status, _, body) =
            send(&state, bare(Method::GET, "/proxy-map?query=first&query=second")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"got[first]");

        let (status, _, body) =
            send(&state, bare(Method::GET, "/proxy-map?query=&query=second")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"got[second]");

        let (status, headers, body) =
            send(&state, bare(Method::GET, "/proxy-map?query=&query=")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(json(&body)["error"], "Missing query param");
    }

    #[tokio::test]
    async fn test_options_is_no_content_everywhere() {
        let h = harness(disabled());
        for uri in ["/notes", "/ai/describe", "/anything/else"] {
            let (status, headers, body) = send(&h.state, bare(Method::OPTIONS, uri)).await;
            assert_eq!(status, StatusCode::NO_CONTENT, "{uri}");
            assert!(body.is_empty());
            assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
            assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
        }
    }

    #[tokio::test]
    async fn test_static_files_and_traversal() {
        let h = harness(disabled());

        let (status, headers, body) = send(&h.state, bare(Method::GET, "/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/html");
        assert_eq!(body, b"<h1>map</h1>");

        let (status, _, _) = send(&h.state, bare(Method::GET, "/..%2fsecret.txt")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = send(&h.state, bare(Method::GET, "/missing.js")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_methods_are_not_found() {
        let h = harness(disabled());
        for (method, uri) in [
            (Method::PUT, "/notes"),
            (Method::DELETE, "/anything"),
            (Method::POST, "/proxy-map"),
            (Method::POST, "/unknown"),
        ] {
            let (status, _, body) = send(&h.state, bare(method.clone(), uri)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
            assert_eq!(json(&body)["error"], "Endpoint not found");
        }
    }
}
