//! Tenant scoping
//!
//! [`TenantId`] is the resolved practice id for the current request. It is
//! derived server-side from the session by the authorization gate and passed
//! explicitly into every tenant-scoped query, so a missing scope shows up in
//! the function signature rather than as a silent cross-tenant leak. Client
//! input is never a source for this value.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The practice that owns the current request's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct TenantId(pub Uuid);

impl TenantId {
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for TenantId {
    fn from(id: Uuid) -> Self {
        TenantId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_inner_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(TenantId(id).to_string(), id.to_string());
    }
}
