//!
//! petshop HTTP server
//! -------------------
//! This module defines the Axum-based HTTP API for the pet store.
//!
//! Responsibilities:
//! - Login/register endpoints issuing signed bearer credentials.
//! - Pet CRUD endpoints running the Verifier -> Gate -> Mutator chain.
//! - Image upload endpoint delegating to the upload collaborator.
//! - Admin surface (user and pet administration) restricted to admins.
//! - Health check and startup wiring (store, default admin, routes).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::identity::{self, Action, ResourceRef, Role};
use crate::pipeline;
use crate::security::{self, Claims, TokenSecret};
use crate::storage::{Pet, PetUpdate, SharedStore, User};
use crate::upload::{DiskUploader, HttpUploader, Uploader};

// Base64 image payloads can be large; mirror the classic 10mb JSON limit.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared server state injected into all handlers.
///
/// Holds the document store handle, the process-wide credential secret, the
/// upload collaborator and the credential lifetime used when minting tokens.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub secret: TokenSecret,
    pub uploader: Arc<dyn Uploader>,
    pub token_ttl_secs: i64,
}

/// Runtime configuration, resolved from the environment by `from_env`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    pub db_root: String,
    pub admin_password: String,
    pub token_ttl_secs: i64,
    pub upload_dir: String,
    pub upload_base_url: String,
    /// When set, uploads are forwarded to this endpoint instead of local disk.
    pub upload_endpoint: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let http_port = std::env::var("PETSHOP_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);
        let token_ttl_secs = std::env::var("PETSHOP_TOKEN_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600);
        Self {
            http_port,
            db_root: std::env::var("PETSHOP_DB_FOLDER").unwrap_or_else(|_| "data".to_string()),
            admin_password: std::env::var("PETSHOP_ADMIN_PASSWORD").unwrap_or_else(|_| "petshop".to_string()),
            token_ttl_secs,
            upload_dir: std::env::var("PETSHOP_UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
            upload_base_url: std::env::var("PETSHOP_UPLOAD_BASE_URL").unwrap_or_else(|_| "/uploads".to_string()),
            upload_endpoint: std::env::var("PETSHOP_UPLOAD_ENDPOINT").ok().filter(|s| !s.is_empty()),
        }
    }
}

fn log_startup(cfg: &ServerConfig) {
    let cwd = std::env::current_dir().ok();
    info!(
        target: "startup",
        "petshop starting. cwd={:?}, http_port={}, db_root='{}', upload_dir='{}', remote_uploads={}",
        cwd,
        cfg.http_port,
        cfg.db_root,
        cfg.upload_dir,
        cfg.upload_endpoint.is_some()
    );
}

/// Mount all routes onto a router over the given state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Pet Shop API is running" }))
        .route("/api/health", get(health))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/pets", get(list_pets).post(create_pet))
        .route("/api/pets/{id}", get(get_pet).put(update_pet).delete(delete_pet))
        .route("/api/uploads", post(upload_image))
        .route("/api/admin/users", get(admin_list_users))
        .route("/api/admin/users/{id}", delete(admin_delete_user))
        .route("/api/admin/pets", get(admin_list_pets))
        .route("/api/admin/pets/{id}", delete(admin_delete_pet))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Start the petshop HTTP server with the given configuration.
///
/// Ensures the database root exists, seeds the default admin user, selects
/// the upload collaborator and mounts all HTTP routes.
pub async fn run_with_config(cfg: ServerConfig) -> anyhow::Result<()> {
    use anyhow::Context;

    log_startup(&cfg);

    std::fs::create_dir_all(&cfg.db_root)
        .with_context(|| format!("Failed to create or access database root: {}", cfg.db_root))?;
    let store = SharedStore::new(&cfg.db_root)
        .with_context(|| format!("While creating SharedStore with root: {}", cfg.db_root))?;
    security::ensure_default_admin(&store, &cfg.admin_password)
        .context("While ensuring default admin")?;

    let secret = TokenSecret::from_env_or_random().context("While resolving credential secret")?;
    let uploader: Arc<dyn Uploader> = match &cfg.upload_endpoint {
        Some(endpoint) => Arc::new(HttpUploader::new(endpoint.clone())),
        None => Arc::new(DiskUploader::new(&cfg.upload_dir, &cfg.upload_base_url)),
    };

    let state = AppState { store, secret, uploader, token_ttl_secs: cfg.token_ttl_secs };
    let router = app(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Convenience entry point using configuration from the environment.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(ServerConfig::from_env()).await
}

// --- payloads ---

#[derive(Debug, Deserialize)]
struct CredentialsPayload {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct CreatePetPayload {
    name: String,
    species: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    private: bool,
}

#[derive(Debug, Deserialize)]
struct UploadPayload {
    #[serde(default = "default_upload_name")]
    filename: String,
    /// Base64-encoded image bytes.
    data: String,
}

fn default_upload_name() -> String {
    "upload.bin".to_string()
}

/// User representation safe to return to callers: no credential hash.
fn public_user(user: &User) -> serde_json::Value {
    json!({
        "id": user.id,
        "username": user.username,
        "role": user.role,
        "created_at": user.created_at,
    })
}

fn token_response(state: &AppState, user: &User) -> serde_json::Value {
    let claims = Claims::new(user.id.as_str(), user.role, Utc::now(), state.token_ttl_secs);
    let token = security::mint_token(&state.secret, &claims);
    json!({ "token": token, "user": public_user(user) })
}

// --- handlers ---

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "service": "pet-store-api",
    }))
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<impl IntoResponse, AppError> {
    let username = payload.username.trim();
    if username.is_empty() {
        return Err(AppError::user_input("username must not be empty"));
    }
    if payload.password.is_empty() {
        return Err(AppError::user_input("password must not be empty"));
    }
    let user = {
        let guard = state.store.0.lock();
        if guard.find_user_by_username(username)?.is_some() {
            return Err(AppError::conflict(format!("username {username} is taken")));
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: security::hash_password(&payload.password)?,
            role: Role::Owner,
            created_at: Utc::now(),
        };
        guard.insert_user(&user)?;
        user
    };
    info!(target: "petshop::auth", "registered user id='{}'", user.id);
    Ok((StatusCode::CREATED, Json(token_response(&state, &user))))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<impl IntoResponse, AppError> {
    let user = {
        let guard = state.store.0.lock();
        guard.find_user_by_username(payload.username.trim())?
    };
    // One failure message for unknown user and wrong password.
    let Some(user) = user else {
        return Err(AppError::unauthenticated("unknown username or wrong password"));
    };
    if !security::verify_password(&user.password_hash, &payload.password) {
        return Err(AppError::unauthenticated("unknown username or wrong password"));
    }
    info!(target: "petshop::auth", "login user id='{}'", user.id);
    Ok(Json(token_response(&state, &user)))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    let identity = identity::identity_from_headers(&state.secret, &headers)?;
    Ok(Json(json!({ "user_id": identity.user_id, "role": identity.role })))
}

async fn list_pets(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    let identity =
        pipeline::authorize_request(&state.store, &state.secret, &headers, &ResourceRef::pets(), Action::Read)?;
    let pets = {
        let guard = state.store.0.lock();
        guard.list_pets()?
    };
    let visible: Vec<Pet> = pets
        .into_iter()
        .filter(|p| !p.private || identity.is_admin() || p.owner_id == identity.user_id)
        .collect();
    Ok(Json(json!({ "pets": visible })))
}

async fn get_pet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    pipeline::authorize_request(&state.store, &state.secret, &headers, &ResourceRef::pet(id.as_str()), Action::Read)?;
    let pet = {
        let guard = state.store.0.lock();
        guard.get_pet(&id)?
    }
    .ok_or_else(|| AppError::not_found(format!("pet {id} does not exist")))?;
    Ok(Json(json!({ "pet": pet })))
}

async fn create_pet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePetPayload>,
) -> Result<impl IntoResponse, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::user_input("pet name must not be empty"));
    }
    if payload.species.trim().is_empty() {
        return Err(AppError::user_input("pet species must not be empty"));
    }
    let id = Uuid::new_v4().to_string();
    let (identity, pet) = pipeline::execute(
        &state.store,
        &state.secret,
        &headers,
        &ResourceRef::pet(id.as_str()),
        Action::Create,
        |store, identity| {
            let now = Utc::now();
            let pet = Pet {
                id: id.clone(),
                owner_id: identity.user_id.clone(),
                name: payload.name.trim().to_string(),
                species: payload.species.trim().to_string(),
                description: payload.description,
                image_url: payload.image_url,
                private: payload.private,
                created_at: now,
                updated_at: now,
            };
            store.insert_pet(&pet)?;
            Ok(pet)
        },
    )?;
    info!(target: "petshop::pets", "created pet id='{}' owner='{}'", pet.id, identity.user_id);
    Ok((StatusCode::CREATED, Json(json!({ "pet": pet }))))
}

async fn update_pet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(update): Json<PetUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let (_identity, pet) = pipeline::execute(
        &state.store,
        &state.secret,
        &headers,
        &ResourceRef::pet(id.as_str()),
        Action::Update,
        |store, _| {
            store
                .update_pet(&id, &update, Utc::now())?
                .ok_or_else(|| AppError::not_found(format!("pet {id} does not exist")))
        },
    )?;
    Ok(Json(json!({ "pet": pet })))
}

async fn delete_pet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    pipeline::execute(
        &state.store,
        &state.secret,
        &headers,
        &ResourceRef::pet(id.as_str()),
        Action::Delete,
        |store, _| {
            if store.delete_pet(&id)? {
                Ok(())
            } else {
                Err(AppError::not_found(format!("pet {id} does not exist")))
            }
        },
    )?;
    Ok(Json(json!({ "deleted": id })))
}

async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UploadPayload>,
) -> Result<impl IntoResponse, AppError> {
    let identity =
        pipeline::authorize_request(&state.store, &state.secret, &headers, &ResourceRef::upload(), Action::Create)?;
    let bytes = BASE64_STANDARD
        .decode(payload.data.trim())
        .map_err(|_| AppError::user_input("upload data is not valid base64"))?;
    if bytes.is_empty() {
        return Err(AppError::user_input("upload payload is empty"));
    }
    let url = state
        .uploader
        .store_image(&payload.filename, &bytes)
        .await
        .map_err(|e| AppError::upload(e.to_string()))?;
    info!(target: "petshop::uploads", "stored upload user='{}' url='{}'", identity.user_id, url);
    Ok((StatusCode::CREATED, Json(json!({ "url": url }))))
}

// --- admin surface ---

async fn admin_list_users(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    pipeline::authorize_request(&state.store, &state.secret, &headers, &ResourceRef::admin(), Action::Read)?;
    let users = {
        let guard = state.store.0.lock();
        guard.list_users()?
    };
    let users: Vec<serde_json::Value> = users.iter().map(public_user).collect();
    Ok(Json(json!({ "users": users })))
}

async fn admin_delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    pipeline::execute(
        &state.store,
        &state.secret,
        &headers,
        &ResourceRef::admin_target(id.as_str()),
        Action::Delete,
        |store, _| {
            if store.delete_user(&id)? {
                Ok(())
            } else {
                Err(AppError::not_found(format!("user {id} does not exist")))
            }
        },
    )?;
    Ok(Json(json!({ "deleted": id })))
}

async fn admin_list_pets(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    pipeline::authorize_request(&state.store, &state.secret, &headers, &ResourceRef::admin(), Action::Read)?;
    let pets = {
        let guard = state.store.0.lock();
        guard.list_pets()?
    };
    Ok(Json(json!({ "pets": pets })))
}

async fn admin_delete_pet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    pipeline::execute(
        &state.store,
        &state.secret,
        &headers,
        &ResourceRef::admin_target(id.as_str()),
        Action::Delete,
        |store, _| {
            if store.delete_pet(&id)? {
                Ok(())
            } else {
                Err(AppError::not_found(format!("pet {id} does not exist")))
            }
        },
    )?;
    Ok(Json(json!({ "deleted": id })))
}
