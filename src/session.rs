//! Signed-in user state.
//!
//! Account credentials live with the identity provider; this module only
//! keeps the `users/{uid}` mirror in step and caches it in a
//! [`SessionContext`] that can be persisted between runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    error::{AuthError, StoreError},
    models::{user::profile_from_record, UserProfile},
    store::{Collection, RecordStore},
};

/// Points granted when an account is created
pub const SIGNUP_POINTS: i64 = 100;

/// Identity as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub email_verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInMethod {
    /// Email and password; requires a verified address
    Email,
    /// Federated sign-in; new accounts are created on first use
    Google,
}

/// Cached authentication state. Replaced wholesale on every auth change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub is_authenticated: bool,
    pub user: Option<UserProfile>,
    pub redirect_after_login: Option<String>,
}

impl SessionContext {
    fn signed_in(user: UserProfile, redirect_after_login: Option<String>) -> Self {
        Self {
            is_authenticated: true,
            user: Some(user),
            redirect_after_login,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().map(|u| u.is_admin).unwrap_or(false)
    }

    /// Reads a persisted context; a missing file is a signed-out session
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse session file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read session file {}", path.display())),
        }
    }

    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write session file {}", path.display()))?;
        debug!("Session saved to {}", path.display());
        Ok(())
    }
}

/// Keeps a [`SessionContext`] in step with the store
pub struct Session {
    store: Arc<dyn RecordStore>,
    context: SessionContext,
    path: Option<PathBuf>,
}

impl Session {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            context: SessionContext::default(),
            path: None,
        }
    }

    /// Session persisted at `path`, restored from it when present
    pub async fn open(store: Arc<dyn RecordStore>, path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut session = Self::new(store);
        session.context = SessionContext::load(&path).await?;
        session.path = Some(path);
        Ok(session)
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.context.user.as_ref()
    }

    /// Remembers where to go once signed in
    pub fn set_redirect(&mut self, target: impl Into<String>) {
        self.context.redirect_after_login = Some(target.into());
    }

    /// Consumes the pending redirect so it is followed once
    pub async fn take_redirect(&mut self) -> Option<String> {
        let target = self.context.redirect_after_login.take();
        if target.is_some() {
            if let Err(e) = self.persist().await {
                warn!("Could not persist session: {e:#}");
            }
        }
        target
    }

    /// Creates the mirror for a new account and signs in
    pub async fn register(
        &mut self,
        auth_user: &AuthUser,
        name: &str,
    ) -> Result<UserProfile, AuthError> {
        let profile = new_profile(auth_user, name, SIGNUP_POINTS);
        self.write_profile(&profile).await?;
        info!("Registered {}", profile.uid);
        self.replace(profile).await
    }

    pub async fn sign_in(
        &mut self,
        auth_user: &AuthUser,
        method: SignInMethod,
    ) -> Result<UserProfile, AuthError> {
        if method == SignInMethod::Email && !auth_user.email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        let user_path = Collection::Users.child(&auth_user.uid);
        let profile = match self.store.get(&user_path).await? {
            Some(record) => {
                let mut profile = profile_from_record(&auth_user.uid, &record);
                if method == SignInMethod::Email {
                    let mut changes = Map::new();
                    changes.insert(
                        "emailVerified".to_string(),
                        Value::Bool(auth_user.email_verified),
                    );
                    self.store.update(&user_path, changes).await?;
                    profile.email_verified = auth_user.email_verified;
                }
                profile
            }
            None => {
                let profile = match method {
                    SignInMethod::Google => new_profile(auth_user, "Google User", SIGNUP_POINTS),
                    // Account exists upstream but has no mirror yet
                    SignInMethod::Email => new_profile(auth_user, "User", 0),
                };
                self.write_profile(&profile).await?;
                profile
            }
        };

        info!("Signed in {}", profile.uid);
        self.replace(profile).await
    }

    pub async fn sign_out(&mut self) -> anyhow::Result<()> {
        self.context = SessionContext::default();
        self.persist().await
    }

    /// Re-reads the mirror. The store is authoritative for points and admin flag.
    pub async fn refresh(&mut self) -> Result<UserProfile, AuthError> {
        let uid = self.signed_in_uid()?;
        let record = self.store.get(&Collection::Users.child(&uid)).await?;
        match record {
            Some(record) => self.replace(profile_from_record(&uid, &record)).await,
            None => Err(AuthError::NotSignedIn),
        }
    }

    /// Deletes the signed-in user's mirror, saved listings included, and signs out.
    ///
    /// Listings stay; they are never deleted from here.
    pub async fn delete_account(&mut self) -> Result<String, AuthError> {
        let uid = self.signed_in_uid()?;
        self.store.remove(&Collection::Users.child(&uid)).await?;
        info!("Deleted account {uid}");

        self.context = SessionContext::default();
        if let Err(e) = self.persist().await {
            warn!("Could not persist session: {e:#}");
        }
        Ok(uid)
    }

    fn signed_in_uid(&self) -> Result<String, AuthError> {
        self.context
            .user
            .as_ref()
            .map(|u| u.uid.clone())
            .ok_or(AuthError::NotSignedIn)
    }

    async fn replace(&mut self, profile: UserProfile) -> Result<UserProfile, AuthError> {
        let redirect = self.context.redirect_after_login.take();
        self.context = SessionContext::signed_in(profile.clone(), redirect);
        // A session that cannot be cached is still signed in for this run
        if let Err(e) = self.persist().await {
            warn!("Could not persist session: {e:#}");
        }
        Ok(profile)
    }

    async fn persist(&self) -> anyhow::Result<()> {
        match &self.path {
            Some(path) => self.context.save(path).await,
            None => Ok(()),
        }
    }

    async fn write_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let path = Collection::Users.child(&profile.uid);
        let value = serde_json::to_value(profile)
            .map_err(|source| StoreError::Decode { path: path.clone(), source })?;
        self.store.set(&path, value).await
    }
}

fn new_profile(auth_user: &AuthUser, fallback_name: &str, points: i64) -> UserProfile {
    UserProfile {
        name: auth_user
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| fallback_name.to_string()),
        email: auth_user.email.clone().unwrap_or_default(),
        uid: auth_user.uid.clone(),
        points,
        created_at: Utc::now().to_rfc3339(),
        is_admin: false,
        email_verified: auth_user.email_verified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        saved::{SavedItems, DEFAULT_TTL_HOURS},
        store::MemoryStore,
    };
    use serde_json::json;

    fn auth_user(uid: &str, verified: bool) -> AuthUser {
        AuthUser {
            uid: uid.to_string(),
            email: Some(format!("{uid}@houselook.test")),
            display_name: None,
            email_verified: verified,
        }
    }

    #[tokio::test]
    async fn registration_grants_signup_points() {
        let store = Arc::new(MemoryStore::new());
        let mut session = Session::new(store.clone());

        let profile = session.register(&auth_user("u1", false), "Ann").await.unwrap();
        assert_eq!(profile.name, "Ann");
        assert_eq!(profile.points, SIGNUP_POINTS);
        assert!(!profile.is_admin);
        assert!(session.context().is_authenticated);

        let record = store.get("users/u1").await.unwrap().unwrap();
        assert_eq!(record["points"], json!(100));
        assert_eq!(record["isAdmin"], json!(false));
    }

    #[tokio::test]
    async fn email_sign_in_requires_verification() {
        let mut session = Session::new(Arc::new(MemoryStore::new()));
        let result = session.sign_in(&auth_user("u1", false), SignInMethod::Email).await;
        assert!(matches!(result, Err(AuthError::EmailNotVerified)));
        assert!(!session.context().is_authenticated);
    }

    #[tokio::test]
    async fn fallback_mirror_on_first_login() {
        let store = Arc::new(MemoryStore::new());
        let mut session = Session::new(store.clone());

        let email = session.sign_in(&auth_user("u1", true), SignInMethod::Email).await.unwrap();
        assert_eq!(email.name, "User");
        assert_eq!(email.points, 0);

        let google = session.sign_in(&auth_user("u2", true), SignInMethod::Google).await.unwrap();
        assert_eq!(google.name, "Google User");
        assert_eq!(google.points, SIGNUP_POINTS);
    }

    #[tokio::test]
    async fn existing_mirror_keeps_other_fields() {
        let store = Arc::new(MemoryStore::with_data(json!({
            "users": {"u1": {"name": "Ann", "points": 450, "isAdmin": true,
                             "emailVerified": false, "saved": {"p1": true}}}
        })));
        let mut session = Session::new(store.clone());

        let profile = session.sign_in(&auth_user("u1", true), SignInMethod::Email).await.unwrap();
        assert_eq!(profile.points, 450);
        assert!(profile.is_admin);
        assert!(session.context().is_admin());
        assert_eq!(store.get("users/u1/emailVerified").await.unwrap(), Some(json!(true)));
        assert_eq!(store.get("users/u1/saved/p1").await.unwrap(), Some(json!(true)));
    }

    #[tokio::test]
    async fn refresh_reads_store() {
        let store = Arc::new(MemoryStore::new());
        let mut session = Session::new(store.clone());
        assert!(matches!(session.refresh().await, Err(AuthError::NotSignedIn)));

        session.register(&auth_user("u1", true), "Ann").await.unwrap();
        store.set("users/u1/points", json!(900)).await.unwrap();
        store.set("users/u1/isAdmin", json!(true)).await.unwrap();

        let profile = session.refresh().await.unwrap();
        assert_eq!(profile.points, 900);
        assert!(session.context().is_admin());
    }

    #[tokio::test]
    async fn redirect_survives_sign_in() {
        let mut session = Session::new(Arc::new(MemoryStore::new()));
        session.set_redirect("/saved");
        session.sign_in(&auth_user("u1", true), SignInMethod::Google).await.unwrap();
        assert_eq!(session.take_redirect().await.as_deref(), Some("/saved"));
        assert_eq!(session.take_redirect().await, None);
    }

    #[tokio::test]
    async fn deleting_account_removes_mirror_only() {
        let store = Arc::new(MemoryStore::with_data(json!({
            "users": {"u2": {"name": "Bob"}},
            "property": {
                "p1": {"name": "Flat", "UserID": "u1"},
                "p2": {"name": "Villa", "UserID": "u2", "createdBy": "u1"}
            }
        })));
        let mut session = Session::new(store.clone());
        assert!(matches!(session.delete_account().await, Err(AuthError::NotSignedIn)));

        session.register(&auth_user("u1", true), "Ann").await.unwrap();
        SavedItems::new(store.clone(), chrono::Duration::hours(DEFAULT_TTL_HOURS))
            .save("u1", "p2")
            .await
            .unwrap();

        assert_eq!(session.delete_account().await.unwrap(), "u1");
        assert!(!session.context().is_authenticated);
        assert_eq!(store.get("users/u1").await.unwrap(), None);
        assert!(store.get("property/p1").await.unwrap().is_some());
        assert!(store.get("property/p2").await.unwrap().is_some());
        assert!(store.get("users/u2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn context_round_trips_through_file() {
        let dir = std::env::temp_dir().join(format!("houselook-session-{}", std::process::id()));
        let path = dir.join("session.json");
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());

        let mut session = Session::open(store.clone(), &path).await.unwrap();
        assert!(!session.context().is_authenticated);
        session.register(&auth_user("u1", true), "Ann").await.unwrap();

        let restored = Session::open(store.clone(), &path).await.unwrap();
        assert_eq!(restored.user().map(|u| u.name.as_str()), Some("Ann"));

        session.sign_out().await.unwrap();
        let restored = Session::open(store, &path).await.unwrap();
        assert!(restored.user().is_none());

        let _ = std::fs::remove_dir_all(dir);
    }
}
