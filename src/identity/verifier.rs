//! Identity verifier: resolves a bearer credential to an `Identity`.
//! Pure function of (credential, current time, process secret); never touches
//! the store.

use axum::http::HeaderMap;
use chrono::Utc;

use crate::error::AppError;
use crate::security::{self, CredentialError, TokenSecret};

use super::principal::Identity;

/// Extract the bearer credential from the Authorization header.
/// A missing header is an authentication failure; a present but unusable
/// header is a malformed credential.
pub fn credential_from_headers(headers: &HeaderMap) -> Result<&str, AppError> {
    let Some(value) = headers.get("authorization") else {
        return Err(AppError::unauthenticated("missing bearer credential"));
    };
    let s = value
        .to_str()
        .map_err(|_| AppError::malformed("authorization header is not valid ascii"))?;
    let token = s
        .strip_prefix("Bearer ")
        .or_else(|| s.strip_prefix("bearer "))
        .ok_or_else(|| AppError::malformed("authorization header is not a bearer credential"))?
        .trim();
    if token.is_empty() {
        return Err(AppError::malformed("empty bearer credential"));
    }
    Ok(token)
}

/// Resolve a bearer credential to an identity.
pub fn verify(secret: &TokenSecret, credential: &str) -> Result<Identity, AppError> {
    let claims = security::verify_token(secret, credential, Utc::now()).map_err(|e| match e {
        CredentialError::Malformed => AppError::malformed("credential is not well formed"),
        CredentialError::Expired => AppError::expired("credential has expired"),
        CredentialError::BadSignature => AppError::invalid_signature("credential signature mismatch"),
    })?;
    Ok(Identity { user_id: claims.sub, role: claims.role })
}

/// Header extraction and verification in one step, for handlers.
pub fn identity_from_headers(secret: &TokenSecret, headers: &HeaderMap) -> Result<Identity, AppError> {
    let credential = credential_from_headers(headers)?;
    verify(secret, credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;
    use crate::security::{mint_token, Claims};
    use axum::http::HeaderValue;

    fn secret() -> TokenSecret {
        TokenSecret::new(b"verifier-test-secret".to_vec())
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        let err = credential_from_headers(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated { .. }));
    }

    #[test]
    fn non_bearer_header_is_malformed() {
        let err = credential_from_headers(&headers_with("Basic dXNlcjpwdw==")).unwrap_err();
        assert!(matches!(err, AppError::MalformedCredential { .. }));
        let err = credential_from_headers(&headers_with("Bearer   ")).unwrap_err();
        assert!(matches!(err, AppError::MalformedCredential { .. }));
    }

    #[test]
    fn valid_credential_resolves_identity() {
        let claims = Claims::new("u1", Role::Owner, Utc::now(), 3600);
        let token = mint_token(&secret(), &claims);
        let headers = headers_with(&format!("Bearer {token}"));
        let credential = credential_from_headers(&headers).unwrap();
        let identity = verify(&secret(), credential).unwrap();
        assert_eq!(identity, Identity::new("u1", Role::Owner));
    }

    #[test]
    fn expired_credential_maps_to_expired_error() {
        let claims = Claims::new("u1", Role::Owner, Utc::now() - chrono::Duration::hours(2), 3600);
        let token = mint_token(&secret(), &claims);
        let err = verify(&secret(), &token).unwrap_err();
        assert!(matches!(err, AppError::ExpiredCredential { .. }));
    }

    #[test]
    fn foreign_signature_maps_to_invalid_signature() {
        let other = TokenSecret::new(b"other".to_vec());
        let token = mint_token(&other, &Claims::new("u1", Role::Owner, Utc::now(), 3600));
        let err = verify(&secret(), &token).unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature { .. }));
    }
}
