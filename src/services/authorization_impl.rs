//! `SeaORM` implementation of the `AuthorizationBackend` trait.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::context::RequestContext;
use crate::db::Store;
use crate::services::authentication::AuthError;
use crate::services::authorization::{Access, AuthorizationBackend};

pub const NO_PERMISSION_NOTICE: &str = "You do not have permission to access that page";

const SITE_ROOT: &str = "/";

/// Catalogue cache with an explicit loaded flag: a legitimately empty
/// permission table is a valid loaded state, not a miss to retry.
#[derive(Default)]
struct PermissionCache {
    loaded: bool,
    by_name: HashMap<String, i32>,
}

#[derive(Default)]
struct RoleNameCache {
    loaded: bool,
    by_id: HashMap<i32, String>,
}

pub struct SeaOrmAuthorization {
    store: Store,
    ctx: RequestContext,
    permissions: RwLock<PermissionCache>,
    // Per-role grant sets; key presence means loaded.
    role_permissions: RwLock<HashMap<i32, HashSet<i32>>>,
    role_names: RwLock<RoleNameCache>,
}

impl SeaOrmAuthorization {
    #[must_use]
    pub fn new(store: Store, ctx: RequestContext) -> Self {
        Self {
            store,
            ctx,
            permissions: RwLock::new(PermissionCache::default()),
            role_permissions: RwLock::new(HashMap::new()),
            role_names: RwLock::new(RoleNameCache::default()),
        }
    }

    /// Fetches the permission catalogue at most once per instance.
    pub async fn load_permissions(&self) -> Result<(), AuthError> {
        let mut cache = self.permissions.write().await;
        if cache.loaded {
            return Ok(());
        }

        let catalogue = self.store.find_all_permissions().await?;
        cache.by_name = catalogue
            .into_iter()
            .map(|p| (p.name.to_lowercase(), p.permission_id))
            .collect();
        cache.loaded = true;

        Ok(())
    }

    /// Fetches the grant set for a role at most once per instance,
    /// resolving an omitted role to the session's. Returns the role id
    /// it resolved to.
    pub async fn load_role_permissions(&self, role_id: Option<i32>) -> Result<i32, AuthError> {
        let role_id = match role_id {
            Some(id) => id,
            None => self.role_id().await?,
        };

        let mut cache = self.role_permissions.write().await;
        if !cache.contains_key(&role_id) {
            let grants = self.store.find_role_permissions(role_id).await?;
            cache.insert(
                role_id,
                grants.into_iter().map(|g| g.permission_id).collect(),
            );
        }

        Ok(role_id)
    }
}

#[async_trait]
impl AuthorizationBackend for SeaOrmAuthorization {
    async fn has_permission(
        &self,
        permission: &str,
        role_id: Option<i32>,
        override_missing: bool,
    ) -> Result<bool, AuthError> {
        let permission = permission.to_lowercase();

        let role_id = self.load_role_permissions(role_id).await?;
        self.load_permissions().await?;

        let permissions = self.permissions.read().await;
        match permissions.by_name.get(&permission) {
            Some(permission_id) => {
                let grants = self.role_permissions.read().await;
                Ok(grants
                    .get(&role_id)
                    .is_some_and(|set| set.contains(permission_id)))
            }
            // Not in the catalogue at all: the caller decides.
            None => Ok(override_missing),
        }
    }

    async fn permission_exists(&self, permission: &str) -> Result<bool, AuthError> {
        self.load_permissions().await?;

        let permissions = self.permissions.read().await;
        Ok(permissions
            .by_name
            .contains_key(&permission.to_lowercase()))
    }

    async fn restrict(
        &self,
        permission: Option<&str>,
        uri: Option<&str>,
    ) -> Result<Access, AuthError> {
        let Some(permission) = permission.filter(|p| !p.is_empty()) else {
            return Ok(Access::Granted);
        };

        if self.has_permission(permission, None, false).await? {
            return Ok(Access::Granted);
        }

        let redirect_to = match uri.filter(|u| !u.is_empty()) {
            Some(uri) => uri.to_string(),
            None => {
                let previous = self.ctx.session.previous_page().await?.unwrap_or_default();

                // Sending the caller back to the page that was just denied
                // would loop; fall back to the site root.
                if previous.is_empty() || previous == self.ctx.current_url {
                    SITE_ROOT.to_string()
                } else {
                    previous
                }
            }
        };

        Ok(Access::Denied {
            redirect_to,
            notice: NO_PERMISSION_NOTICE.to_string(),
        })
    }

    async fn role_id(&self) -> Result<i32, AuthError> {
        Ok(self.ctx.session.role_id().await?.unwrap_or(0))
    }

    async fn role_name_by_id(&self, role_id: i32) -> Result<String, AuthError> {
        let mut cache = self.role_names.write().await;
        if !cache.loaded {
            let roles = self.store.find_all_roles().await?;
            cache.by_id = roles
                .into_iter()
                .map(|r| (r.role_id, r.role_name))
                .collect();
            cache.loaded = true;
        }

        Ok(cache.by_id.get(&role_id).cloned().unwrap_or_default())
    }
}
