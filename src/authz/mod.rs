//! Authorization: the authentication gate (`Principal` extractor), per-endpoint role
//! allow-lists and the field-level write policy table.

mod evaluator;
mod principal;

pub use evaluator::{authorize_patch, Resource};
pub use principal::{resolve_profile, Principal, VerifiedIdentity};

/// Static allow-lists referenced by handlers.
pub mod roles {
    use crate::models::user::Role;

    pub const ANY: &[Role] = Role::ALL;
    pub const PRIVILEGED: &[Role] = &[Role::Admin, Role::Manager];
    pub const ADMIN: &[Role] = &[Role::Admin];
    pub const CREW: &[Role] = Role::CREW;
}
