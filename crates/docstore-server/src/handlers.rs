//! HTTP handlers.
//!
//! Implements:
//! - POST /api/login - Trade the admin password for a session token
//! - GET /api/data - Current document (fallback snapshot if GitHub is down)
//! - POST /api/save - Overwrite the document
//! - POST /api/upload - Relay an image to the file host
//! - POST /api.php - Relay a payment proof and build a message link
//! - GET /health - Health check endpoint

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::Json;
use docstore_core::{Document, DocumentService, RetryPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::SharedAdminAuth;
use crate::error::{ApiError, Result};
use crate::relay::{
    SharedMessageLinkBuilder, SharedUploadRelay, TransactionNotice, UploadedFile,
};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<DocumentService>,
    pub auth: SharedAdminAuth,
    pub relay: SharedUploadRelay,
    pub links: SharedMessageLinkBuilder,
    pub save_retry: RetryPolicy,
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub fallback_enabled: bool,
    pub save_requires_auth: bool,
}

/// GET /health - Health check endpoint.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        fallback_enabled: state.documents.fallback().is_some(),
        save_requires_auth: state.auth.save_requires_auth(),
    })
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    status: &'static str,
    message: &'static str,
    token: String,
}

/// POST /api/login
pub async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let token = state.auth.login(&request.password).await?;
    info!("Admin login succeeded");
    Ok(Json(LoginResponse {
        status: "success",
        message: "Login successful",
        token,
    }))
}

/// GET /api/data
pub async fn data_handler(State(state): State<AppState>) -> Result<Json<Document>> {
    let document = state.documents.read().await.map_err(ApiError::ReadFailed)?;
    Ok(Json(document))
}

#[derive(Serialize)]
pub struct StatusResponse {
    status: &'static str,
    message: &'static str,
}

/// POST /api/save
///
/// Re-reads the integrity token and commits. A concurrent save that lands
/// first makes this one fail with a `SAVE_CONFLICT` 500 so the caller can
/// reload.
pub async fn save_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(document): Json<Document>,
) -> Result<Json<StatusResponse>> {
    state.auth.authorize_save(&headers).await?;

    state
        .documents
        .write_with_retry(&document, state.save_retry)
        .await
        .map_err(ApiError::from_save)?;

    info!("Document saved");
    Ok(Json(StatusResponse {
        status: "success",
        message: "Saved permanently to GitHub",
    }))
}

#[derive(Serialize)]
pub struct UploadResponse {
    status: &'static str,
    url: String,
}

/// POST /api/upload - multipart field `image`.
pub async fn upload_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut form = read_form(multipart, "image").await?;
    let file = form.file.take().ok_or(ApiError::NoFile)?;

    let url = state.relay.upload(file).await?;
    Ok(Json(UploadResponse {
        status: "success",
        url,
    }))
}

#[derive(Serialize)]
pub struct TransactionResponse {
    status: &'static str,
    whatsapp_url: String,
}

/// POST /api.php - multipart `payment_proof` plus item fields.
pub async fn transaction_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TransactionResponse>> {
    let mut form = read_form(multipart, "payment_proof").await?;
    let file = form.file.take().ok_or(ApiError::NoFile)?;

    let receipt_url = state.relay.upload(file).await?;
    let notice = TransactionNotice {
        item_name: form.text("item_name"),
        item_price: form.text("item_price"),
        receipt_url,
        website_url: form.text("website_url"),
    };

    let whatsapp_url = state.links.link(&notice, chrono::Utc::now());
    info!("Transaction for {} relayed", notice.item_name);
    Ok(Json(TransactionResponse {
        status: "success",
        whatsapp_url,
    }))
}

/// Parsed multipart form: one file field plus text fields.
struct Form {
    file: Option<UploadedFile>,
    fields: Vec<(String, String)>,
}

impl Form {
    fn text(&self, name: &str) -> String {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }
}

/// Read every field; `file_field` is kept as the file, the rest as text.
async fn read_form(mut multipart: Multipart, file_field: &str) -> Result<Form> {
    let mut form = Form {
        file: None,
        fields: Vec::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == file_field {
            let file_name = field
                .file_name()
                .filter(|n| !n.is_empty())
                .unwrap_or("upload")
                .to_string();
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;

            // Browsers send an empty part when no file was picked
            if data.is_empty() {
                continue;
            }

            debug!("Received file {} ({} bytes)", file_name, data.len());
            form.file = Some(UploadedFile {
                file_name,
                content_type,
                data: data.to_vec(),
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            form.fields.push((name, value));
        }
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AdminAuth;
    use crate::relay::{MessageLinkBuilder, UploadRelay};
    use docstore_core::FallbackCache;
    use docstore_github::{decode_document, encode_document, GithubConfig, GithubContentsStore};
    use reqwest::multipart::{Form as ClientForm, Part};
    use serde_json::{json, Value};
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    const CONTENTS_PATH: &str = "/repos/owner/shop/contents/public/data.json";

    /// Contents API double: serves the stored file and enforces the `sha` precondition.
    #[derive(Clone)]
    struct FakeGithub {
        state: Arc<Mutex<(Value, u64)>>,
    }

    impl FakeGithub {
        fn new(document: Value) -> Self {
            Self {
                state: Arc::new(Mutex::new((document, 1))),
            }
        }

        fn stored(&self) -> Value {
            self.state.lock().unwrap().0.clone()
        }

        /// Simulate another writer committing behind our back.
        fn bump(&self, document: Value) {
            let mut state = self.state.lock().unwrap();
            state.0 = document;
            state.1 += 1;
        }
    }

    impl Respond for FakeGithub {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let mut state = self.state.lock().unwrap();
            let sha = format!("sha{}", state.1);

            match request.method.as_str() {
                "GET" => ResponseTemplate::new(200).set_body_json(json!({
                    "encoding": "base64",
                    "sha": sha,
                    "content": encode_document(&state.0).unwrap(),
                })),
                "PUT" => {
                    let body: Value = serde_json::from_slice(&request.body).unwrap();
                    if body["sha"] != json!(sha) {
                        return ResponseTemplate::new(409)
                            .set_body_json(json!({"message": format!("data.json does not match {}", body["sha"])}));
                    }
                    let document = decode_document(body["content"].as_str().unwrap()).unwrap();
                    let version = state.1 + 1;
                    *state = (document, version);
                    ResponseTemplate::new(200)
                        .set_body_json(json!({"content": {"sha": format!("sha{}", version)}}))
                }
                _ => ResponseTemplate::new(405),
            }
        }
    }

    struct TestApp {
        base: String,
        client: reqwest::Client,
        github: FakeGithub,
        github_server: MockServer,
        _upload_server: MockServer,
        dir: TempDir,
    }

    async fn start(initial: Value, save_requires_auth: bool, with_fallback: bool) -> TestApp {
        let github_server = MockServer::start().await;
        let github = FakeGithub::new(initial);
        Mock::given(path(CONTENTS_PATH))
            .respond_with(github.clone())
            .mount(&github_server)
            .await;

        let upload_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/api.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("https://files.example/r1.png"))
            .mount(&upload_server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = GithubConfig::new("test-token", "owner/shop");
        config.api_url = github_server.uri();
        config.timeout = Duration::from_secs(2);
        let store = GithubContentsStore::new(config).unwrap();
        let fallback = with_fallback.then(|| FallbackCache::new(dir.path().join("data.json")));

        let state = AppState {
            documents: Arc::new(DocumentService::new(Arc::new(store), fallback)),
            auth: Arc::new(AdminAuth::new("admin123", 300, save_requires_auth)),
            relay: Arc::new(
                UploadRelay::new(
                    format!("{}/user/api.php", upload_server.uri()),
                    Duration::from_secs(2),
                )
                .unwrap(),
            ),
            links: Arc::new(MessageLinkBuilder::new("601173686870".to_string(), None)),
            save_retry: RetryPolicy::none(),
        };

        let static_dir = dir.path().join("public");
        write_static(&static_dir);

        let app = crate::build_router(state, &static_dir);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestApp {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            github,
            github_server,
            _upload_server: upload_server,
            dir,
        }
    }

    fn write_static(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("index.html"), "<h1>shop</h1>").unwrap();
        std::fs::write(dir.join("admin.html"), "<h1>admin</h1>").unwrap();
        std::fs::write(dir.join("style.css"), "body{}").unwrap();
    }

    impl TestApp {
        async fn login(&self, password: &str) -> reqwest::Response {
            self.client
                .post(format!("{}/api/login", self.base))
                .json(&json!({ "password": password }))
                .send()
                .await
                .unwrap()
        }

        async fn token(&self) -> String {
            let body: Value = self.login("admin123").await.json().await.unwrap();
            body["token"].as_str().unwrap().to_string()
        }

        async fn save(&self, document: &Value, token: Option<&str>) -> reqwest::Response {
            let mut request = self
                .client
                .post(format!("{}/api/save", self.base))
                .json(document);
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            request.send().await.unwrap()
        }

        async fn data(&self) -> reqwest::Response {
            self.client
                .get(format!("{}/api/data", self.base))
                .send()
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_get_data() {
        let app = start(json!({"title": "Toko", "items": [1, 2]}), true, true).await;

        let resp = app.data().await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"title": "Toko", "items": [1, 2]}));
    }

    #[tokio::test]
    async fn test_login() {
        let app = start(json!({}), true, true).await;

        let resp = app.login("wrong").await;
        assert_eq!(resp.status(), 401);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "error");

        let resp = app.login("admin123").await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "success");
        assert!(body["token"].as_str().unwrap().starts_with("dss_"));
    }

    #[tokio::test]
    async fn test_save_requires_session() {
        let app = start(json!({"a": 1}), true, true).await;

        let resp = app.save(&json!({"a": 2}), None).await;
        assert_eq!(resp.status(), 401);
        assert_eq!(app.github.stored(), json!({"a": 1}));

        let token = app.token().await;
        let resp = app.save(&json!({"a": 2}), Some(&token)).await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "success");

        assert_eq!(app.github.stored(), json!({"a": 2}));
        let body: Value = app.data().await.json().await.unwrap();
        assert_eq!(body, json!({"a": 2}));
    }

    #[tokio::test]
    async fn test_open_save_gate() {
        let app = start(json!({"a": 1}), false, true).await;

        let resp = app.save(&json!({"a": 3}), None).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(app.github.stored(), json!({"a": 3}));
    }

    #[tokio::test]
    async fn test_save_refreshes_fallback_snapshot() {
        let app = start(json!({"a": 1}), false, true).await;

        let doc = json!({"name": "Café ☕", "nested": {"list": [true, null, 1.5]}});
        assert_eq!(app.save(&doc, None).await.status(), 200);

        let snapshot = FallbackCache::new(app.dir.path().join("data.json"))
            .read()
            .await
            .unwrap();
        assert_eq!(snapshot, doc);
    }

    #[tokio::test]
    async fn test_data_served_from_fallback_when_github_fails() {
        let app = start(json!({"a": 1}), true, true).await;

        // Populate the snapshot, then take GitHub down
        assert_eq!(app.data().await.status(), 200);
        app.github_server.reset().await;
        Mock::given(path(CONTENTS_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&app.github_server)
            .await;

        let resp = app.data().await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_data_fails_without_fallback() {
        let app = start(json!({"a": 1}), true, false).await;
        app.github_server.reset().await;
        Mock::given(path(CONTENTS_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&app.github_server)
            .await;

        let resp = app.data().await;
        assert_eq!(resp.status(), 500);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "READ_FAILED");
    }

    #[tokio::test]
    async fn test_save_failure_is_reported() {
        let app = start(json!({"a": 1}), false, true).await;
        app.github_server.reset().await;
        Mock::given(method("GET"))
            .and(path(CONTENTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "encoding": "base64",
                "sha": "sha1",
                "content": encode_document(&json!({"a": 1})).unwrap(),
            })))
            .mount(&app.github_server)
            .await;
        Mock::given(method("PUT"))
            .and(path(CONTENTS_PATH))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "does not match"})))
            .mount(&app.github_server)
            .await;

        let resp = app.save(&json!({"a": 2}), None).await;
        assert_eq!(resp.status(), 500);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "SAVE_CONFLICT");
    }

    #[tokio::test]
    async fn test_save_after_external_commit_uses_fresh_token() {
        let app = start(json!({"a": 1}), false, true).await;
        app.github.bump(json!({"a": "other writer"}));

        // Every save re-reads the token, so a later save still succeeds
        assert_eq!(app.save(&json!({"a": 2}), None).await.status(), 200);
        assert_eq!(app.github.stored(), json!({"a": 2}));
    }

    #[tokio::test]
    async fn test_upload() {
        let app = start(json!({}), true, true).await;

        let form = ClientForm::new().part(
            "image",
            Part::bytes(vec![1, 2, 3]).file_name("product.png"),
        );
        let resp = app
            .client
            .post(format!("{}/api/upload", app.base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"status": "success", "url": "https://files.example/r1.png"}));
    }

    #[tokio::test]
    async fn test_upload_without_file() {
        let app = start(json!({}), true, true).await;

        let form = ClientForm::new().text("note", "no file here");
        let resp = app
            .client
            .post(format!("{}/api/upload", app.base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "NO_FILE");
    }

    #[tokio::test]
    async fn test_transaction_builds_message_link() {
        let app = start(json!({}), true, true).await;

        let form = ClientForm::new()
            .text("item_name", "Diamond 86")
            .text("item_price", "Rp 20.000")
            .text("website_url", "https://shop.example")
            .part("payment_proof", Part::bytes(vec![9, 9, 9]).file_name("proof.jpg"));
        let resp = app
            .client
            .post(format!("{}/api.php", app.base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "success");
        let url = body["whatsapp_url"].as_str().unwrap();
        assert!(url.starts_with("https://wa.me/601173686870?text="));
        assert!(url.contains("Diamond%2086"));
        assert!(url.contains(&*urlencoding::encode("https://files.example/r1.png")));
    }

    #[tokio::test]
    async fn test_transaction_without_proof() {
        let app = start(json!({}), true, true).await;

        let form = ClientForm::new().text("item_name", "Diamond 86");
        let resp = app
            .client
            .post(format!("{}/api.php", app.base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_static_pages_and_health() {
        let app = start(json!({}), true, true).await;

        for (route, expected) in [
            ("/", "<h1>shop</h1>"),
            ("/admin", "<h1>admin</h1>"),
            ("/style.css", "body{}"),
        ] {
            let resp = app
                .client
                .get(format!("{}{}", app.base, route))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200, "route {}", route);
            assert_eq!(resp.text().await.unwrap(), expected);
        }

        let resp = app
            .client
            .get(format!("{}/missing.html", app.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let health: Value = app
            .client
            .get(format!("{}/health", app.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["healthy"], true);
        assert_eq!(health["fallback_enabled"], true);
        assert_eq!(health["save_requires_auth"], true);
    }
}
