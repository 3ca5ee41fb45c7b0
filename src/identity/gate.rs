//! Ownership gate: decides whether a resolved identity may perform an action
//! on a target resource.
//!
//! Policy: admins may do anything; create is open to any authenticated
//! identity; reads are public unless the pet is marked private; update and
//! delete require the stored owner id to equal the identity's id. The gate
//! consults the store exactly once per decision, and a lookup miss is
//! reported as `ResourceNotFound`, never as a denial, so callers surface 404
//! rather than 403 for resources that do not exist.

use crate::error::AppError;
use crate::storage::{Pet, SharedStore};

use super::principal::Identity;

/// Action requested against a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

/// Kind tag for a target resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Pet,
    Upload,
    AdminTarget,
}

/// Reference to the resource a request is acting on. The id is absent for
/// collection-level operations (create, list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: Option<String>,
}

impl ResourceRef {
    pub fn pet(id: impl Into<String>) -> Self {
        Self { kind: ResourceKind::Pet, id: Some(id.into()) }
    }

    pub fn pets() -> Self {
        Self { kind: ResourceKind::Pet, id: None }
    }

    pub fn upload() -> Self {
        Self { kind: ResourceKind::Upload, id: None }
    }

    pub fn admin() -> Self {
        Self { kind: ResourceKind::AdminTarget, id: None }
    }

    pub fn admin_target(id: impl Into<String>) -> Self {
        Self { kind: ResourceKind::AdminTarget, id: Some(id.into()) }
    }
}

/// Outcome of the ownership gate for one request. Produced fresh per request,
/// never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub permit: bool,
    pub reason: &'static str,
}

impl Decision {
    fn permit(reason: &'static str) -> Self {
        Self { permit: true, reason }
    }

    fn deny(reason: &'static str) -> Self {
        Self { permit: false, reason }
    }
}

/// Decide whether `identity` may perform `action` on `resource`.
/// Fails with `ResourceNotFound` when the target cannot be found, and with
/// `PersistenceError` when the store itself fails; every other outcome is a
/// Decision.
pub fn authorize(
    store: &SharedStore,
    identity: &Identity,
    resource: &ResourceRef,
    action: Action,
) -> Result<Decision, AppError> {
    match resource.kind {
        ResourceKind::AdminTarget => {
            if identity.is_admin() {
                Ok(Decision::permit("admin_override"))
            } else {
                Ok(Decision::deny("admin_required"))
            }
        }
        ResourceKind::Upload => {
            if identity.is_admin() {
                Ok(Decision::permit("admin_override"))
            } else if action == Action::Create {
                Ok(Decision::permit("authenticated_create"))
            } else {
                Ok(Decision::deny("admin_required"))
            }
        }
        ResourceKind::Pet => authorize_pet(store, identity, resource, action),
    }
}

fn authorize_pet(
    store: &SharedStore,
    identity: &Identity,
    resource: &ResourceRef,
    action: Action,
) -> Result<Decision, AppError> {
    match action {
        Action::Create => Ok(Decision::permit("authenticated_create")),
        Action::Read => {
            // Collection-level listing; per-pet visibility is filtered by the caller.
            let Some(id) = resource.id.as_deref() else {
                return Ok(Decision::permit("public_read"));
            };
            let pet = fetch_pet(store, id)?;
            if identity.is_admin() {
                Ok(Decision::permit("admin_override"))
            } else if !pet.private {
                Ok(Decision::permit("public_read"))
            } else if pet.owner_id == identity.user_id {
                Ok(Decision::permit("owner_match"))
            } else {
                Ok(Decision::deny("private_resource"))
            }
        }
        Action::Update | Action::Delete => {
            let Some(id) = resource.id.as_deref() else {
                return Err(AppError::not_found("pet reference carries no id"));
            };
            // Existence is checked before any role shortcut so a missing
            // target reports 404 for every caller.
            let pet = fetch_pet(store, id)?;
            if identity.is_admin() {
                Ok(Decision::permit("admin_override"))
            } else if pet.owner_id == identity.user_id {
                Ok(Decision::permit("owner_match"))
            } else {
                Ok(Decision::deny("owner_mismatch"))
            }
        }
    }
}

// Single store consultation per decision.
fn fetch_pet(store: &SharedStore, id: &str) -> Result<Pet, AppError> {
    let pet = {
        let guard = store.0.lock();
        guard.get_pet(id)?
    };
    pet.ok_or_else(|| AppError::not_found(format!("pet {id} does not exist")))
}
