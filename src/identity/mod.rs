//! Identity resolution and the resource-ownership gate.
//! Keep the public surface thin and split implementation across sub-modules.

mod gate;
mod principal;
mod verifier;

pub use gate::{authorize, Action, Decision, ResourceKind, ResourceRef};
pub use principal::{Identity, Role};
pub use verifier::{credential_from_headers, identity_from_headers, verify};
