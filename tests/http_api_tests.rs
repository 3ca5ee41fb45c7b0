//! End-to-end HTTP tests: the server is bound to an ephemeral port and
//! driven with a real HTTP client, covering the route table, the fixed
//! error-status mapping and the ownership gate behind each mutating route.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;

use petshop::identity::Role;
use petshop::security::{self, mint_token, Claims, TokenSecret};
use petshop::server::{app, AppState};
use petshop::storage::SharedStore;
use petshop::upload::DiskUploader;

struct TestServer {
    base: String,
    secret: TokenSecret,
    _db: TempDir,
    _uploads: TempDir,
}

async fn spawn_server() -> TestServer {
    let db = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let store = SharedStore::new(db.path()).unwrap();
    security::ensure_default_admin(&store, "letmein").unwrap();
    let secret = TokenSecret::new(b"http-test-secret".to_vec());
    let state = AppState {
        store,
        secret: secret.clone(),
        uploader: Arc::new(DiskUploader::new(uploads.path(), "/uploads")),
        token_ttl_secs: 3600,
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    TestServer { base: format!("http://{addr}"), secret, _db: db, _uploads: uploads }
}

async fn register(client: &reqwest::Client, base: &str, username: &str) -> (String, String) {
    let resp = client
        .post(format!("{base}/api/auth/register"))
        .json(&json!({ "username": username, "password": "password1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let body: Value = resp.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    let user_id = body["user"]["id"].as_str().unwrap().to_string();
    (token, user_id)
}

async fn create_pet(client: &reqwest::Client, base: &str, token: &str, name: &str, private: bool) -> String {
    let resp = client
        .post(format!("{base}/api/pets"))
        .bearer_auth(token)
        .json(&json!({ "name": name, "species": "dog", "private": private }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let body: Value = resp.json().await.unwrap();
    body["pet"]["id"].as_str().unwrap().to_string()
}

async fn error_code(resp: reqwest::Response) -> (u16, String) {
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap();
    (status, body["error"].as_str().unwrap_or_default().to_string())
}

#[tokio::test]
async fn health_and_banner() {
    let srv = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/api/health", srv.base)).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "pet-store-api");

    let resp = client.get(format!("{}/", srv.base)).send().await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "Pet Shop API is running");
}

#[tokio::test]
async fn listing_requires_authentication() {
    let srv = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/api/pets", srv.base)).send().await.unwrap();
    let (status, code) = error_code(resp).await;
    assert_eq!(status, 401);
    assert_eq!(code, "unauthenticated");
}

#[tokio::test]
async fn register_login_and_pet_round_trip() {
    let srv = spawn_server().await;
    let client = reqwest::Client::new();
    let (token, user_id) = register(&client, &srv.base, "alice").await;
    let pet_id = create_pet(&client, &srv.base, &token, "Rover", false).await;

    // A fresh login works and sees the pet in the listing.
    let resp = client
        .post(format!("{}/api/auth/login", srv.base))
        .json(&json!({ "username": "alice", "password": "password1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    let token2 = body["token"].as_str().unwrap().to_string();

    let resp = client.get(format!("{}/api/pets", srv.base)).bearer_auth(&token2).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["pets"].as_array().unwrap().len(), 1);

    // Update changes the name and leaves the owner untouched.
    let resp = client
        .put(format!("{}/api/pets/{pet_id}", srv.base))
        .bearer_auth(&token2)
        .json(&json!({ "name": "Rex" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["pet"]["name"], "Rex");
    assert_eq!(body["pet"]["owner_id"], user_id.as_str());

    // Delete, then the pet is gone.
    let resp = client
        .delete(format!("{}/api/pets/{pet_id}", srv.base))
        .bearer_auth(&token2)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = client.get(format!("{}/api/pets/{pet_id}", srv.base)).bearer_auth(&token2).send().await.unwrap();
    let (status, code) = error_code(resp).await;
    assert_eq!(status, 404);
    assert_eq!(code, "resource_not_found");
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let srv = spawn_server().await;
    let client = reqwest::Client::new();
    register(&client, &srv.base, "alice").await;

    let resp = client
        .post(format!("{}/api/auth/register", srv.base))
        .json(&json!({ "username": "alice", "password": "other" }))
        .send()
        .await
        .unwrap();
    let (status, code) = error_code(resp).await;
    assert_eq!(status, 409);
    assert_eq!(code, "conflict");
}

#[tokio::test]
async fn foreign_owner_gets_403_and_pet_survives() {
    let srv = spawn_server().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register(&client, &srv.base, "alice").await;
    let (stranger_token, _) = register(&client, &srv.base, "mallory").await;
    let pet_id = create_pet(&client, &srv.base, &owner_token, "Rover", false).await;

    let resp = client
        .put(format!("{}/api/pets/{pet_id}", srv.base))
        .bearer_auth(&stranger_token)
        .json(&json!({ "name": "Stolen" }))
        .send()
        .await
        .unwrap();
    let (status, code) = error_code(resp).await;
    assert_eq!(status, 403);
    assert_eq!(code, "denied");

    let resp = client
        .delete(format!("{}/api/pets/{pet_id}", srv.base))
        .bearer_auth(&stranger_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    // Still present and unchanged for the owner.
    let resp = client.get(format!("{}/api/pets/{pet_id}", srv.base)).bearer_auth(&owner_token).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["pet"]["name"], "Rover");
}

#[tokio::test]
async fn missing_pet_is_404_not_403() {
    let srv = spawn_server().await;
    let client = reqwest::Client::new();
    let (token, _) = register(&client, &srv.base, "alice").await;

    let resp = client
        .get(format!("{}/api/pets/doesnotexist", srv.base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let (status, code) = error_code(resp).await;
    assert_eq!(status, 404);
    assert_eq!(code, "resource_not_found");

    let resp = client
        .delete(format!("{}/api/pets/doesnotexist", srv.base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let (status, code) = error_code(resp).await;
    assert_eq!(status, 404);
    assert_eq!(code, "resource_not_found");
}

#[tokio::test]
async fn expired_credential_is_rejected_before_any_mutation() {
    let srv = spawn_server().await;
    let client = reqwest::Client::new();
    let (token, user_id) = register(&client, &srv.base, "alice").await;
    let pet_id = create_pet(&client, &srv.base, &token, "Rover", false).await;

    // Credential minted with the server secret but already expired.
    let stale = Claims::new(user_id.as_str(), Role::Owner, Utc::now() - Duration::hours(2), 3600);
    let stale_token = mint_token(&srv.secret, &stale);

    let resp = client
        .delete(format!("{}/api/pets/{pet_id}", srv.base))
        .bearer_auth(&stale_token)
        .send()
        .await
        .unwrap();
    let (status, code) = error_code(resp).await;
    assert_eq!(status, 401);
    assert_eq!(code, "expired_credential");

    let resp = client.get(format!("{}/api/pets/{pet_id}", srv.base)).bearer_auth(&token).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200, "pet must survive the rejected mutation");
}

#[tokio::test]
async fn forged_and_malformed_credentials_are_401() {
    let srv = spawn_server().await;
    let client = reqwest::Client::new();
    register(&client, &srv.base, "alice").await;

    // Signed with a different secret.
    let foreign = TokenSecret::new(b"not-the-server-secret".to_vec());
    let forged = mint_token(&foreign, &Claims::new("alice", Role::Admin, Utc::now(), 3600));
    let resp = client.get(format!("{}/api/pets", srv.base)).bearer_auth(&forged).send().await.unwrap();
    let (status, code) = error_code(resp).await;
    assert_eq!(status, 401);
    assert_eq!(code, "invalid_signature");

    let resp = client.get(format!("{}/api/pets", srv.base)).bearer_auth("garbage").send().await.unwrap();
    let (status, code) = error_code(resp).await;
    assert_eq!(status, 401);
    assert_eq!(code, "malformed_credential");
}

#[tokio::test]
async fn private_pets_are_visible_only_to_owner_and_admin() {
    let srv = spawn_server().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register(&client, &srv.base, "alice").await;
    let (stranger_token, _) = register(&client, &srv.base, "bob").await;
    let pet_id = create_pet(&client, &srv.base, &owner_token, "Hidden", true).await;

    // Not in the stranger's listing, 403 on direct read.
    let resp = client.get(format!("{}/api/pets", srv.base)).bearer_auth(&stranger_token).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["pets"].as_array().unwrap().is_empty());

    let resp = client
        .get(format!("{}/api/pets/{pet_id}", srv.base))
        .bearer_auth(&stranger_token)
        .send()
        .await
        .unwrap();
    let (status, code) = error_code(resp).await;
    assert_eq!(status, 403);
    assert_eq!(code, "denied");

    // Owner and admin both see it.
    let resp = client.get(format!("{}/api/pets/{pet_id}", srv.base)).bearer_auth(&owner_token).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = client
        .post(format!("{}/api/auth/login", srv.base))
        .json(&json!({ "username": "admin", "password": "letmein" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let admin_token = body["token"].as_str().unwrap().to_string();
    let resp = client.get(format!("{}/api/pets/{pet_id}", srv.base)).bearer_auth(&admin_token).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn admin_surface_requires_the_admin_role() {
    let srv = spawn_server().await;
    let client = reqwest::Client::new();
    let (user_token, user_id) = register(&client, &srv.base, "alice").await;
    let pet_id = create_pet(&client, &srv.base, &user_token, "Rover", false).await;

    let resp = client.get(format!("{}/api/admin/users", srv.base)).bearer_auth(&user_token).send().await.unwrap();
    let (status, code) = error_code(resp).await;
    assert_eq!(status, 403);
    assert_eq!(code, "denied");

    let resp = client
        .post(format!("{}/api/auth/login", srv.base))
        .json(&json!({ "username": "admin", "password": "letmein" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    let admin_token = body["token"].as_str().unwrap().to_string();

    // Admin can list users (no password hashes in the body) and delete any pet.
    let resp = client.get(format!("{}/api/admin/users", srv.base)).bearer_auth(&admin_token).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    let users = body["users"].as_array().unwrap();
    assert!(users.iter().any(|u| u["id"] == user_id.as_str()));
    assert!(users.iter().all(|u| u.get("password_hash").is_none()));

    let resp = client
        .delete(format!("{}/api/admin/pets/{pet_id}", srv.base))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = client.get(format!("{}/api/admin/pets", srv.base)).bearer_auth(&admin_token).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["pets"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn upload_round_trip() {
    let srv = spawn_server().await;
    let client = reqwest::Client::new();
    let (token, _) = register(&client, &srv.base, "alice").await;

    // No credential: rejected before the collaborator is reached.
    let resp = client
        .post(format!("{}/api/uploads", srv.base))
        .json(&json!({ "filename": "cat.png", "data": "aGVsbG8=" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let resp = client
        .post(format!("{}/api/uploads", srv.base))
        .bearer_auth(&token)
        .json(&json!({ "filename": "cat.png", "data": "aGVsbG8=" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let body: Value = resp.json().await.unwrap();
    let url = body["url"].as_str().unwrap();
    assert!(url.starts_with("/uploads/"));
    assert!(url.ends_with("cat.png"));

    // Garbage payloads are a client error, not an upload failure.
    let resp = client
        .post(format!("{}/api/uploads", srv.base))
        .bearer_auth(&token)
        .json(&json!({ "filename": "cat.png", "data": "%%% not base64 %%%" }))
        .send()
        .await
        .unwrap();
    let (status, code) = error_code(resp).await;
    assert_eq!(status, 400);
    assert_eq!(code, "invalid_input");
}
