//! Who may do what to which user record.
//!
//! Pure decision logic: no I/O, no store lookups. The actor comes from a
//! verified token, so its role is whatever the token carried.

use std::fmt;

use crate::store::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Read,
    Update,
    UpdateRole,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotAdmin,
    NotSelfOrAdmin,
    CannotSelfDelete,
}

impl DenyReason {
    /// Message shown to the client.
    pub fn message(self) -> &'static str {
        match self {
            DenyReason::NotAdmin => "only administrators can perform this action",
            DenyReason::NotSelfOrAdmin => "you can only access your own profile",
            DenyReason::CannotSelfDelete => {
                "you cannot delete your own account, contact an administrator"
            }
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            DenyReason::NotAdmin => "not_admin",
            DenyReason::NotSelfOrAdmin => "not_self_or_admin",
            DenyReason::CannotSelfDelete => "cannot_self_delete",
        };
        f.write_str(code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

/// `resource_owner_id` is `None` for collection-level resources.
pub fn evaluate(actor: &Actor, resource_owner_id: Option<i64>, action: Action) -> Decision {
    let is_self = resource_owner_id == Some(actor.id);
    match action {
        Action::List | Action::UpdateRole => {
            if actor.is_admin() {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotAdmin)
            }
        }
        Action::Read | Action::Update => {
            if is_self || actor.is_admin() {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotSelfOrAdmin)
            }
        }
        Action::Delete => {
            if is_self {
                Decision::Deny(DenyReason::CannotSelfDelete)
            } else if actor.is_admin() {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotAdmin)
            }
        }
    }
}
