//! Policy engine contract and the per-call authorization session.

use super::store::StoreResult;
use super::{GroupId, ObjectId, PayloadId};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::sync::Arc;

/// Actions a policy can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Read,
    Write,
    Add,
    Remove,
    Delete,
    Admin,
}

/// What a policy is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyTarget {
    Object(ObjectId),
    Group(GroupId),
    Payload(PayloadId),
    /// Payloads not yet attached to any group.
    Unattached,
}

impl std::fmt::Display for PolicyTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Object(id) => write!(f, "object:{}", id),
            Self::Group(id) => write!(f, "group:{}", id),
            Self::Payload(id) => write!(f, "payload:{}", id),
            Self::Unattached => write!(f, "unattached"),
        }
    }
}

/// Grant of one action to one principal (or principal group) name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub action: Action,
    pub principal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<chrono::NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<chrono::NaiveDate>,
}

impl AccessPolicy {
    pub fn new(action: Action, principal: impl Into<String>) -> Self {
        Self {
            action,
            principal: principal.into(),
            start_date: None,
            end_date: None,
        }
    }
}

/// Principal on whose behalf a package operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    /// Member names (groups) the principal belongs to.
    pub groups: Vec<String>,
    pub admin: bool,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
            admin: false,
        }
    }

    pub fn admin(name: impl Into<String>) -> Self {
        Self {
            admin: true,
            ..Self::new(name)
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS)
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// True if a policy naming `principal` applies to this principal.
    pub fn is_named(&self, principal: &str) -> bool {
        principal == ANONYMOUS || self.name == principal || self.groups.iter().any(|g| g == principal)
    }
}

/// Principal name every session matches.
pub const ANONYMOUS: &str = "Anonymous";

pub trait PolicyEngine: Send + Sync {
    fn is_authorized(&self, principal: &Principal, target: PolicyTarget, action: Action) -> bool;

    /// Copy every policy of `from` onto `to`.
    fn inherit_policies(&self, from: PolicyTarget, to: PolicyTarget) -> StoreResult<()>;

    fn policies(&self, target: PolicyTarget) -> Vec<AccessPolicy>;

    fn replace_policies(&self, target: PolicyTarget, policies: Vec<AccessPolicy>) -> StoreResult<()>;
}

/// Principal plus policy engine plus the current elevation mode.
///
/// Elevation is a bracketed operation: [`AuthSession::elevate`] returns a guard
/// that restores the previous mode when dropped, on success and error paths alike.
pub struct AuthSession {
    principal: Principal,
    policy: Arc<dyn PolicyEngine>,
    elevated: Cell<bool>,
}

impl AuthSession {
    pub fn new(principal: Principal, policy: Arc<dyn PolicyEngine>) -> Self {
        Self {
            principal,
            policy,
            elevated: Cell::new(false),
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn policy(&self) -> &Arc<dyn PolicyEngine> {
        &self.policy
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated.get()
    }

    /// True if the action is allowed (always true while elevated).
    pub fn is_authorized(&self, target: PolicyTarget, action: Action) -> bool {
        self.elevated.get() || self.policy.is_authorized(&self.principal, target, action)
    }

    /// Suspend authorization checks until the returned guard is dropped.
    #[must_use = "elevation ends when the guard is dropped"]
    pub fn elevate(&self) -> AuthElevation<'_> {
        let previous = self.elevated.replace(true);
        tracing::debug!(principal = %self.principal.name, "authorization elevated");
        AuthElevation {
            session: self,
            previous,
        }
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("principal", &self.principal)
            .field("elevated", &self.elevated.get())
            .finish()
    }
}

/// Restores the previous authorization mode on drop.
pub struct AuthElevation<'a> {
    session: &'a AuthSession,
    previous: bool,
}

impl Drop for AuthElevation<'_> {
    fn drop(&mut self) {
        self.session.elevated.set(self.previous);
        tracing::debug!(
            principal = %self.session.principal.name,
            elevated = self.previous,
            "authorization mode restored"
        );
    }
}
