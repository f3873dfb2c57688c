//! The authenticated caller of a service operation.

use crate::domain::UserRole;

/// Who is performing an operation, as established by the auth middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: i64, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_freelancer(&self) -> bool {
        self.role == UserRole::Freelancer
    }

    /// True for the given user or any admin.
    pub fn is_self_or_admin(&self, user_id: i64) -> bool {
        self.user_id == user_id || self.is_admin()
    }
}
