//! Credential primitives: argon2 password hashing and HMAC-SHA256 signed
//! bearer credentials verified against a process-wide secret.
//!
//! A credential is `base64url(claims JSON) "." base64url(HMAC tag)`. The tag
//! is computed over the encoded claims, so any payload tampering shows up as
//! a signature mismatch before the claims are ever decoded.

use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::identity::Role;
use crate::storage::{SharedStore, User};

type HmacSha256 = Hmac<Sha256>;

/// Process-wide signing secret for bearer credentials.
#[derive(Clone)]
pub struct TokenSecret(Vec<u8>);

impl TokenSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Read the secret from `PETSHOP_TOKEN_SECRET`, falling back to a random
    /// per-process secret. Tokens minted against a random secret do not
    /// survive a restart.
    pub fn from_env_or_random() -> Result<Self> {
        match std::env::var("PETSHOP_TOKEN_SECRET") {
            Ok(s) if !s.is_empty() => Ok(Self(s.into_bytes())),
            _ => {
                let mut buf = [0u8; 32];
                getrandom::getrandom(&mut buf).map_err(|e| anyhow!(e.to_string()))?;
                tracing::warn!("PETSHOP_TOKEN_SECRET not set; minted credentials will not survive restart");
                Ok(Self(buf.to_vec()))
            }
        }
    }
}

/// Claims carried inside a signed bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject: the user document id.
    pub sub: String,
    pub role: Role,
    /// Issued-at, epoch seconds.
    pub iat: i64,
    /// Expiry, epoch seconds.
    pub exp: i64,
}

impl Claims {
    pub fn new(sub: impl Into<String>, role: Role, now: DateTime<Utc>, ttl_secs: i64) -> Self {
        let iat = now.timestamp();
        Self { sub: sub.into(), role, iat, exp: iat + ttl_secs }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("credential is not well formed")]
    Malformed,
    #[error("credential has expired")]
    Expired,
    #[error("credential signature mismatch")]
    BadSignature,
}

fn mac_for(secret: &TokenSecret) -> HmacSha256 {
    // HMAC-SHA256 accepts keys of any length.
    HmacSha256::new_from_slice(&secret.0).expect("hmac key")
}

/// Mint a signed bearer credential for the given claims.
pub fn mint_token(secret: &TokenSecret, claims: &Claims) -> String {
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("claims serialize"));
    let mut mac = mac_for(secret);
    mac.update(payload.as_bytes());
    let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{payload}.{tag}")
}

/// Verify a bearer credential against the process secret and the given time.
/// Pure function of (credential, now, secret).
pub fn verify_token(secret: &TokenSecret, token: &str, now: DateTime<Utc>) -> Result<Claims, CredentialError> {
    if token.is_empty() || !token.is_ascii() {
        return Err(CredentialError::Malformed);
    }
    let (payload, tag) = token.split_once('.').ok_or(CredentialError::Malformed)?;
    let tag_bytes = URL_SAFE_NO_PAD.decode(tag).map_err(|_| CredentialError::Malformed)?;
    let mut mac = mac_for(secret);
    mac.update(payload.as_bytes());
    mac.verify_slice(&tag_bytes).map_err(|_| CredentialError::BadSignature)?;
    let claims_bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|_| CredentialError::Malformed)?;
    let claims: Claims = serde_json::from_slice(&claims_bytes).map_err(|_| CredentialError::Malformed)?;
    if claims.exp <= now.timestamp() {
        return Err(CredentialError::Expired);
    }
    Ok(claims)
}

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!(e.to_string()))?
        .to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

/// Seed an `admin` user with the given password when no user of that name
/// exists yet. Runs once at startup.
pub fn ensure_default_admin(store: &SharedStore, password: &str) -> Result<()> {
    let guard = store.0.lock();
    if guard.find_user_by_username("admin")?.is_some() {
        return Ok(());
    }
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: "admin".to_string(),
        password_hash: hash_password(password)?,
        role: Role::Admin,
        created_at: Utc::now(),
    };
    guard.insert_user(&user)?;
    tracing::info!("seeded default admin user id='{}'", user.id);
    Ok(())
}
