//! Session boundary.
//!
//! Authentication lives outside this crate. A consumer asks its
//! [`Authenticator`] for a verified identity and checks it against an
//! [`AccessPolicy`] before mounting a handle for a protected view; the
//! synchronization core itself never gates access.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Photographer,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Student => "student",
            Role::Photographer => "photographer",
            Role::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// A verified user, as vouched for by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

/// The external authentication check.
pub trait Authenticator {
    /// The current verified identity, or `None` when there is no session.
    fn verify(&self) -> Option<Identity>;
}

/// Roles permitted to open a view.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    allowed: Vec<Role>,
}

impl AccessPolicy {
    pub fn allow(roles: impl IntoIterator<Item = Role>) -> Self {
        AccessPolicy {
            allowed: roles.into_iter().collect(),
        }
    }

    pub fn permits(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }

    pub fn authorize(&self, authenticator: &dyn Authenticator) -> Result<Identity, SyncError> {
        let identity = authenticator
            .verify()
            .ok_or_else(|| SyncError::AccessDenied("no verified session".to_string()))?;

        if !self.permits(identity.role) {
            debug!(user = %identity.user_id, role = %identity.role, "role not permitted");
            return Err(SyncError::AccessDenied(format!(
                "role {} may not open this view",
                identity.role
            )));
        }
        Ok(identity)
    }
}
