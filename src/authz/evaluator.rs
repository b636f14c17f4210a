use crate::db::Document;
use crate::errors::{AppError, AppResult};
use crate::models::assignment::AssignmentState;
use crate::models::user::Role;

/// Resources with field-level write rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Assignment,
}

impl Resource {
    fn as_str(&self) -> &'static str {
        match self {
            Resource::Assignment => "assignment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldScope {
    Any,
    Only(&'static [&'static str]),
}

impl FieldScope {
    fn allows(&self, field: &str) -> bool {
        match self {
            FieldScope::Any => true,
            FieldScope::Only(fields) => fields.contains(&field),
        }
    }
}

/// What one role may write on one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPolicy {
    pub fields: FieldScope,
    /// Allowed values for `state`; `None` means any valid state.
    pub states: Option<&'static [AssignmentState]>,
    /// Caller must be on the resource's crew list.
    pub assigned_only: bool,
}

const FULL_WRITE: FieldPolicy = FieldPolicy {
    fields: FieldScope::Any,
    states: None,
    assigned_only: false,
};

const CREW_ASSIGNMENT_WRITE: FieldPolicy = FieldPolicy {
    fields: FieldScope::Only(&["state", "comments"]),
    states: Some(&[AssignmentState::DonePending, AssignmentState::ExtendRequested]),
    assigned_only: true,
};

/// The (resource, role) → policy table. `None` means no write access at all.
pub fn policy_for(resource: Resource, role: Role) -> Option<&'static FieldPolicy> {
    match (resource, role) {
        (Resource::Assignment, Role::Admin | Role::Manager) => Some(&FULL_WRITE),
        (Resource::Assignment, Role::Worker | Role::Installer | Role::Brigadier) => Some(&CREW_ASSIGNMENT_WRITE),
    }
}

/// Checks a whole patch against the policy; any violation rejects it in full.
pub fn authorize_patch(resource: Resource, role: Role, patch: &Document, assigned: bool) -> AppResult<()> {
    let policy = policy_for(resource, role).ok_or_else(|| {
        AppError::forbidden(format!("role '{role}' may not modify {}", resource.as_str()))
    })?;

    if policy.assigned_only && !assigned {
        return Err(AppError::forbidden(format!("not assigned to this {}", resource.as_str())));
    }

    if let Some(field) = patch.keys().find(|field| !policy.fields.allows(field)) {
        return Err(AppError::forbidden(format!("role '{role}' may not change field '{field}'")));
    }

    if let (Some(allowed), Some(requested)) = (policy.states, patch.get("state")) {
        let permitted = requested
            .as_str()
            .and_then(AssignmentState::parse)
            .is_some_and(|state| allowed.contains(&state));

        if !permitted {
            return Err(AppError::forbidden(format!("role '{role}' may not set state to {requested}")));
        }
    }

    tracing::debug!(resource = resource.as_str(), role = %role, fields = patch.len(), "patch authorized");
    Ok(())
}
