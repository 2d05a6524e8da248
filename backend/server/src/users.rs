//! # Users
//!
//! Users are owned by the identity provider, we only keep a copy that the webhook refreshes.
//!
//! - First sight of a user also creates their profile
//! - Later events only refresh email, username and `updated_at`, the profile is left alone
//! - Users edit their own profile through [`update_profile`]. The profile slug always follows the username
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    error::AppError,
    models::{Profile, ProfileView, User},
    search::UserDocument,
    state::State,
};

pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";

#[derive(Deserialize, Debug)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Deserialize, Debug)]
pub struct EmailAddress {
    pub email_address: String,
}

/// The subset of the identity provider's user object we care about.
#[derive(Deserialize, Debug)]
pub struct IdentityUser {
    pub id: String,
    pub username: Option<String>,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    pub image_url: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl IdentityUser {
    pub fn username(&self) -> String {
        self.username
            .as_deref()
            .filter(|username| !username.is_empty())
            .unwrap_or(&self.id)
            .to_string()
    }

    pub fn full_name(&self) -> Option<String> {
        let first = self.first_name.as_deref().filter(|first| !first.is_empty())?;
        let last = self.last_name.as_deref().unwrap_or_default();

        Some(format!("{first} {last}").trim().to_string())
    }
}

/// Body of `POST /api/profile/update`. Absent fields are left as they are.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub bio: Option<String>,
    /// An empty string removes the avatar.
    pub avatar_url: Option<String>,
}

/// Returns whether the event was one we act on.
pub async fn handle_event(state: &State, event: WebhookEvent) -> Result<bool, AppError> {
    match event.kind.as_str() {
        USER_CREATED | USER_UPDATED => {
            let identity: IdentityUser = serde_json::from_value(event.data)
                .map_err(|e| AppError::MalformedPayload(e.to_string()))?;
            sync_user(state, identity).await?;

            Ok(true)
        }
        other => {
            info!("Ignoring webhook event {other}");

            Ok(false)
        }
    }
}

pub async fn sync_user(state: &State, identity: IdentityUser) -> Result<User, AppError> {
    let now = Utc::now();
    let username = identity.username();
    let email = identity
        .email_addresses
        .first()
        .map(|address| address.email_address.clone());

    let user = match state.store.get_user(&identity.id).await? {
        Some(existing) => User {
            email,
            username: username.clone(),
            updated_at: now,
            ..existing
        },
        None => User {
            id: identity.id.clone(),
            email,
            username: username.clone(),
            created_at: now,
            updated_at: now,
        },
    };
    state.store.save_user(&user).await?;

    let profile = Profile {
        user_id: user.id.clone(),
        slug: username.clone(),
        avatar_url: identity.image_url.clone(),
        bio: identity
            .full_name()
            .unwrap_or_else(|| format!("Hello, I'm {username}")),
    };
    if state.store.create_profile(&profile).await? {
        info!("Created profile {} for {}", profile.slug, user.id);
    }

    info!("User synced: {}", user.id);

    let profile = state.store.get_profile(&user.id).await?;
    if let Err(e) = state
        .search
        .index_user(&UserDocument::new(&user, profile.as_ref()))
        .await
    {
        warn!("Failed to index user {}: {e}", user.id);
    }

    Ok(user)
}

pub async fn get_profile(state: &State, user_id: &str) -> Result<Option<Profile>, AppError> {
    Ok(state.store.get_profile(user_id).await?)
}

pub async fn update_profile(
    state: &State,
    viewer: Option<&str>,
    update: ProfileUpdate,
) -> Result<ProfileView, AppError> {
    let viewer = viewer.ok_or(AppError::Unauthorized)?;
    if update.user_id.as_deref() != Some(viewer) {
        warn!("{viewer} tried to edit the profile of {:?}", update.user_id);
        return Err(AppError::Forbidden);
    }

    let username = update
        .username
        .map(|username| username.trim().to_string())
        .filter(|username| !username.is_empty());

    if let Some(username) = &username {
        let user_owner = state.store.username_owner(username).await?;
        let slug_owner = state.store.profile_slug_owner(username).await?;

        let taken = |owner: Option<String>| owner.is_some_and(|owner| owner != viewer);
        if taken(user_owner) || taken(slug_owner) {
            return Err(AppError::UsernameTaken);
        }
    }

    let (Some(user), Some(profile)) = (
        state.store.get_user(viewer).await?,
        state.store.get_profile(viewer).await?,
    ) else {
        return Err(AppError::NotFound(format!("Profile for {viewer}")));
    };

    let user = User {
        username: username.clone().unwrap_or(user.username),
        updated_at: Utc::now(),
        ..user
    };
    let profile = Profile {
        slug: username.unwrap_or(profile.slug),
        bio: update.bio.unwrap_or(profile.bio),
        avatar_url: match update.avatar_url {
            Some(avatar_url) if avatar_url.trim().is_empty() => None,
            Some(avatar_url) => Some(avatar_url),
            None => profile.avatar_url,
        },
        ..profile
    };

    state.store.update_profile(&user, &profile).await?;
    info!("Profile updated: {}", user.id);

    if let Err(e) = state
        .search
        .index_user(&UserDocument::new(&user, Some(&profile)))
        .await
    {
        warn!("Failed to index user {}: {e}", user.id);
    }

    Ok(ProfileView { profile, user })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::IdentityUser;

    fn identity(value: serde_json::Value) -> IdentityUser {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_username_falls_back_to_id() {
        assert_eq!(identity(json!({ "id": "user_1" })).username(), "user_1");
        assert_eq!(
            identity(json!({ "id": "user_1", "username": "" })).username(),
            "user_1"
        );
        assert_eq!(
            identity(json!({ "id": "user_1", "username": "sam" })).username(),
            "sam"
        );
    }

    #[test]
    fn test_full_name() {
        assert_eq!(
            identity(json!({ "id": "u", "first_name": "Sam", "last_name": "Lee" })).full_name(),
            Some("Sam Lee".to_string())
        );
        assert_eq!(
            identity(json!({ "id": "u", "first_name": "Sam" })).full_name(),
            Some("Sam".to_string())
        );
        assert_eq!(
            identity(json!({ "id": "u", "last_name": "Lee" })).full_name(),
            None
        );
    }
}
