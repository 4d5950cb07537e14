//! Admin panel: the user directory and role changes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{Role, UserRoleRecord};
use crate::store::Store;
use crate::StandupError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: usize,
    pub admins: usize,
    pub managers: usize,
}

impl AdminStats {
    pub fn compute(users: &[UserRoleRecord]) -> Self {
        Self {
            total_users: users.len(),
            admins: users.iter().filter(|u| u.role == Role::Admin).count(),
            managers: users.iter().filter(|u| u.role == Role::Manager).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDirectory {
    pub users: Vec<UserRoleRecord>,
    pub stats: AdminStats,
}

pub struct AdminService {
    store: Arc<dyn Store>,
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn directory(&self) -> Result<UserDirectory, StandupError> {
        let users = self.store.list_user_roles().await?;
        let stats = AdminStats::compute(&users);
        Ok(UserDirectory { users, stats })
    }

    /// Granting or revoking admin also updates the admins set used by role
    /// resolution.
    #[instrument(skip(self))]
    pub async fn set_role(&self, id: Uuid, role: Role) -> Result<UserRoleRecord, StandupError> {
        let record = self.store.set_user_role(id, role).await?;
        info!(email = %record.user_email, %role, "role updated");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::resolve_role;

    #[tokio::test]
    async fn promoting_to_admin_changes_role_resolution() {
        let store = Arc::new(crate::store::MemoryStore::new());
        let record = store.ensure_user_role("sam@example.com", Role::User).await.unwrap();
        let admin = AdminService::new(store.clone());

        admin.set_role(record.id, Role::Admin).await.unwrap();
        assert_eq!(resolve_role(store.as_ref(), "sam@example.com").await.unwrap(), Role::Admin);

        admin.set_role(record.id, Role::User).await.unwrap();
        assert_eq!(resolve_role(store.as_ref(), "sam@example.com").await.unwrap(), Role::User);
    }

    #[tokio::test]
    async fn directory_counts_roles() {
        let store = Arc::new(crate::store::MemoryStore::new());
        store.ensure_user_role("a@example.com", Role::Admin).await.unwrap();
        store.ensure_user_role("m@example.com", Role::Manager).await.unwrap();
        store.ensure_user_role("u@example.com", Role::User).await.unwrap();

        let directory = AdminService::new(store).directory().await.unwrap();

        assert_eq!(directory.stats, AdminStats { total_users: 3, admins: 1, managers: 1 });
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = Arc::new(crate::store::MemoryStore::new());
        let err = AdminService::new(store).set_role(Uuid::new_v4(), Role::Manager).await.unwrap_err();
        assert!(matches!(err, StandupError::NotFound(_)));
    }
}
