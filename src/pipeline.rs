//! The Verifier -> Gate -> Mutator chain, composed as plain functions so it
//! can be exercised without the HTTP framework. Stages run in strict
//! sequence and short-circuit on the first failure.

use axum::http::HeaderMap;

use crate::error::AppError;
use crate::identity::{self, Action, Identity, ResourceRef};
use crate::security::TokenSecret;
use crate::storage::{SharedStore, Store};

/// Verifier and gate only, for read paths that perform their own fetch.
/// Returns the resolved identity on permit; the first failing stage wins.
pub fn authorize_request(
    store: &SharedStore,
    secret: &TokenSecret,
    headers: &HeaderMap,
    resource: &ResourceRef,
    action: Action,
) -> Result<Identity, AppError> {
    let identity = identity::identity_from_headers(secret, headers)?;
    let decision = identity::authorize(store, &identity, resource, action)?;
    if !decision.permit {
        return Err(AppError::denied(decision.reason));
    }
    Ok(identity)
}

/// Run the full chain for a mutating request. The mutator closure executes
/// only after a permit decision for this exact (identity, resource, action)
/// tuple; a deny or verification failure means it never runs. The store lock
/// is taken only around the mutation itself, so the owner check and the
/// write rely on the store's atomic single-document operations.
pub fn execute<T, F>(
    store: &SharedStore,
    secret: &TokenSecret,
    headers: &HeaderMap,
    resource: &ResourceRef,
    action: Action,
    mutate: F,
) -> Result<(Identity, T), AppError>
where
    F: FnOnce(&Store, &Identity) -> Result<T, AppError>,
{
    let identity = authorize_request(store, secret, headers, resource, action)?;
    let guard = store.0.lock();
    let out = mutate(&guard, &identity)?;
    Ok((identity, out))
}
