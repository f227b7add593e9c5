use tourbook_auth::{AuthzError, Role, ensure_owner_or, restrict_to};
use tourbook_core::UserId;

/// Principal context for a request (authenticated identity + role).
///
/// Inserted by the `protect` middleware; handlers behind it extract it with
/// `Extension<PrincipalContext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    id: UserId,
    role: Role,
    email: String,
}

impl PrincipalContext {
    pub fn new(id: UserId, role: Role, email: impl Into<String>) -> Self {
        Self {
            id,
            role,
            email: email.into(),
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn restrict_to(&self, allowed: &[Role]) -> Result<(), AuthzError> {
        restrict_to(self.role, allowed)
    }

    /// Owner of the record, or a role in `bypass`.
    pub fn ensure_owner_or(&self, owner: UserId, bypass: &[Role]) -> Result<(), AuthzError> {
        ensure_owner_or(self.id, self.role, owner, bypass)
    }
}
