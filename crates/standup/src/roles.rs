//! Role and profile resolution for an authenticated email.

use tracing::{debug, instrument};

use crate::auth::AuthIdentity;
use crate::models::{CachedUser, Role};
use crate::store::Store;
use crate::StandupError;

/// Admins table first, then team managers; everyone else is a user.
pub async fn resolve_role(store: &dyn Store, email: &str) -> Result<Role, StandupError> {
    if store.is_admin(email).await? {
        return Ok(Role::Admin);
    }
    if !store.teams_managed_by(email).await?.is_empty() {
        return Ok(Role::Manager);
    }
    Ok(Role::User)
}

/// Display name used when the user has no team membership.
pub fn fallback_name(email: &str) -> String {
    match email.split_once('@') {
        Some((local, _)) if !local.is_empty() => local.to_owned(),
        _ => "User".to_owned(),
    }
}

/// Build the cached profile for a freshly authenticated identity.
///
/// Also records the email in the user directory on first sight so the admin
/// panel can list it.
#[instrument(skip(store, identity), fields(email = %identity.email))]
pub async fn resolve_profile(
    store: &dyn Store,
    identity: &AuthIdentity,
) -> Result<CachedUser, StandupError> {
    store.ensure_user_role(&identity.email, Role::User).await?;

    let role = resolve_role(store, &identity.email).await?;
    let membership = store.memberships_for(&identity.email).await?.into_iter().next();

    let name = membership
        .as_ref()
        .map(|m| m.display_name.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| fallback_name(&identity.email));

    debug!(%role, "resolved profile");
    Ok(CachedUser {
        id: identity.user_id.clone(),
        email: identity.email.clone(),
        name,
        role,
        team_id: membership.as_ref().map(|m| m.team_id),
        team_name: membership.map(|m| m.team_name),
        last_checked: None,
    })
}
