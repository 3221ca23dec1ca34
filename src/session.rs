//! Server-side session store for the admin area.
//!
//! The browser holds only an opaque uuid in an HttpOnly cookie; the record
//! lives here, TTL-bounded. Login always mints a fresh id (a pre-login
//! cookie value is never promoted to an authenticated session), and logout
//! drops the record together with its anti-forgery token.

use std::sync::Arc;

use moka::sync::Cache;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::entities::user;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    /// Anti-forgery token embedded in state-changing forms
    pub csrf_token: String,
}

pub struct SessionStore {
    sessions: Cache<String, Arc<AdminSession>>,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        assert!(config.max_sessions >= 1, "Session capacity must be positive");
        let sessions = Cache::builder()
            .max_capacity(config.max_sessions)
            .time_to_live(config.ttl())
            .build();
        Self { sessions }
    }

    /// Establish a session for an authenticated user under a fresh id.
    pub fn create(&self, account: &user::Model) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = AdminSession {
            user_id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
            is_admin: account.is_admin,
            csrf_token: Uuid::new_v4().to_string(),
        };
        self.sessions.insert(session_id.clone(), Arc::new(session));
        session_id
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<AdminSession>> {
        self.sessions.get(session_id)
    }

    /// Drop any prior session and issue a fresh id for the user. Login
    /// goes through here so the id presented before authentication can
    /// never identify the authenticated session (fixation).
    pub fn regenerate(&self, previous_id: Option<&str>, account: &user::Model) -> String {
        if let Some(previous) = previous_id {
            self.sessions.invalidate(previous);
        }
        self.create(account)
    }

    pub fn destroy(&self, session_id: &str) {
        self.sessions.invalidate(session_id);
    }

    pub fn active_sessions(&self) -> u64 {
        self.sessions.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(&SessionConfig {
            ttl_minutes: 120,
            max_sessions: 100,
        })
    }

    fn admin() -> user::Model {
        user::Model {
            id: 7,
            name: "Admin".to_string(),
            email: "admin@x.com".to_string(),
            password: "$argon2id$irrelevant".to_string(),
            is_admin: true,
            created_at: Utc::now().fixed_offset(),
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = store();
        let session_id = store.create(&admin());

        let session = store.get(&session_id).expect("session exists");
        assert_eq!(session.user_id, 7);
        assert!(session.is_admin);
        assert!(!session.csrf_token.is_empty());
    }

    #[test]
    fn test_regenerate_invalidates_previous_id() {
        let store = store();
        let old_id = store.create(&admin());
        let new_id = store.regenerate(Some(&old_id), &admin());

        assert_ne!(old_id, new_id);
        assert!(store.get(&old_id).is_none());
        assert!(store.get(&new_id).is_some());
    }

    #[test]
    fn test_regenerate_rotates_csrf_token() {
        let store = store();
        let old_id = store.create(&admin());
        let old_token = store.get(&old_id).expect("session").csrf_token.clone();

        let new_id = store.regenerate(Some(&old_id), &admin());
        let new_token = store.get(&new_id).expect("session").csrf_token.clone();
        assert_ne!(old_token, new_token);
    }

    #[test]
    fn test_destroy_removes_session() {
        let store = store();
        let session_id = store.create(&admin());
        store.destroy(&session_id);
        assert!(store.get(&session_id).is_none());
    }

    #[test]
    fn test_unknown_id_yields_none() {
        assert!(store().get("no-such-session").is_none());
    }
}
