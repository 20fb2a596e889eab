use super::identifier::IdentifierResolver;
use super::policy::{Action, AuthSession, PolicyEngine, PolicyTarget, Principal};
use super::store::EntityStore;
use crate::error::{PackageError, PackageResult};
use std::sync::Arc;

/// Collaborators plus the caller's session for one package operation.
pub struct PackageContext {
    pub store: Arc<dyn EntityStore>,
    pub identifiers: Arc<dyn IdentifierResolver>,
    pub session: AuthSession,
}

impl PackageContext {
    pub fn new(
        store: Arc<dyn EntityStore>,
        identifiers: Arc<dyn IdentifierResolver>,
        policy: Arc<dyn PolicyEngine>,
        principal: Principal,
    ) -> Self {
        Self {
            store,
            identifiers,
            session: AuthSession::new(principal, policy),
        }
    }

    pub fn policy(&self) -> &Arc<dyn PolicyEngine> {
        self.session.policy()
    }

    /// Fail with an authorization error unless the action is allowed.
    pub fn authorize(&self, target: PolicyTarget, action: Action) -> PackageResult<()> {
        if self.session.is_authorized(target, action) {
            Ok(())
        } else {
            Err(PackageError::unauthorized(format!(
                "{} may not {:?} {}",
                self.session.principal().name,
                action,
                target
            )))
        }
    }
}

impl std::fmt::Debug for PackageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageContext")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
