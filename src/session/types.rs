use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Server-side role attached to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// Identity returned by `GET /api/auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Anonymous,
    Loading,
    Authenticated,
    Guest,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Anonymous => "anonymous",
            SessionStatus::Loading => "loading",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::Guest => "guest",
        };
        f.write_str(label)
    }
}

/// Current session snapshot.
///
/// Fields are private so the pairing invariant holds by construction:
/// `Authenticated` always carries a user, every other status never does.
#[derive(Debug, Clone)]
pub struct Session {
    status: SessionStatus,
    user: Option<UserRef>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            status: SessionStatus::Anonymous,
            user: None,
        }
    }

    pub fn loading() -> Self {
        Self {
            status: SessionStatus::Loading,
            user: None,
        }
    }

    pub fn guest() -> Self {
        Self {
            status: SessionStatus::Guest,
            user: None,
        }
    }

    pub fn authenticated(user: UserRef) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            user: Some(user),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn user(&self) -> Option<&UserRef> {
        self.user.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.status == SessionStatus::Authenticated
            && self.user.as_ref().is_some_and(|u| u.role == Role::Admin)
    }
}

/// Explicitly owned session state container.
///
/// The host constructs one and hands clones to consumers. Consumers read
/// through `snapshot`; transitions happen only inside this crate (session
/// manager operations and gateway recovery), never by direct mutation.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<Session>>,
}

impl SessionStore {
    pub fn new(initial: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn snapshot(&self) -> Session {
        self.inner.read().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.read().status()
    }

    pub fn is_admin(&self) -> bool {
        self.inner.read().is_admin()
    }

    pub(crate) fn transition(&self, next: Session) {
        let mut session = self.inner.write();
        tracing::debug!("session: {} -> {}", session.status(), next.status());
        *session = next;
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn alice(role: Role) -> UserRef {
        UserRef {
            id: 1,
            username: "alice".into(),
            role,
        }
    }

    #[test]
    fn non_authenticated_states_carry_no_user() {
        assert!(Session::anonymous().user().is_none());
        assert!(Session::loading().user().is_none());
        assert!(Session::guest().user().is_none());
    }

    #[test]
    fn authenticated_always_carries_user() {
        let session = Session::authenticated(alice(Role::User));
        assert_eq!(session.status(), SessionStatus::Authenticated);
        assert_eq!(session.user().unwrap().username, "alice");
    }

    #[test]
    fn is_admin_requires_authenticated_admin() {
        assert!(Session::authenticated(alice(Role::Admin)).is_admin());
        assert!(!Session::authenticated(alice(Role::User)).is_admin());
        assert!(!Session::anonymous().is_admin());
    }

    #[test]
    fn store_snapshot_tracks_transitions() {
        let store = SessionStore::new(Session::loading());
        assert_eq!(store.status(), SessionStatus::Loading);

        store.transition(Session::authenticated(alice(Role::Admin)));
        assert_eq!(store.status(), SessionStatus::Authenticated);
        assert!(store.is_admin());

        store.transition(Session::anonymous());
        assert_eq!(store.status(), SessionStatus::Anonymous);
        assert!(store.snapshot().user().is_none());
    }

    #[test]
    fn role_parses_from_wire_shape() {
        let user: UserRef =
            serde_json::from_str(r#"{"id":1,"username":"alice","role":"user"}"#).unwrap();
        assert_eq!(user.role, Role::User);

        let admin: UserRef =
            serde_json::from_str(r#"{"id":2,"username":"root","role":"admin"}"#).unwrap();
        assert_eq!(admin.role, Role::Admin);
    }
}
