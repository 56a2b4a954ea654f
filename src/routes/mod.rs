//! Declarative navigation gating.
//!
//! The guard is a pure function of a session snapshot and a declared
//! requirement; hosts act on the returned decision. Forced navigation
//! (session expiry mid-flight) travels through the [`Navigator`] channel
//! instead of mutating anything ambient.

use crate::session::Session;
use tokio::sync::mpsc;

/// Access level a surface declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteRequirement {
    None,
    Authenticated,
    AdminOnly,
}

/// What the host should do with a guarded surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Show the protected content.
    Render,
    /// Identity is still being resolved; show nothing yet.
    Pending,
    /// Not signed in; send the user to the login surface.
    RedirectLogin,
    /// Signed in but not an admin; silently land on the non-admin home.
    RedirectHome,
}

/// Gate a surface on the current session.
///
/// While the session is `Loading` no redirect is issued for any
/// requirement level; redirecting before identity resolution would bounce
/// users with a valid persisted token through the login screen.
pub fn evaluate(session: &Session, requirement: RouteRequirement) -> RouteDecision {
    use crate::session::SessionStatus;

    if session.status() == SessionStatus::Loading {
        return RouteDecision::Pending;
    }

    match requirement {
        RouteRequirement::None => RouteDecision::Render,
        RouteRequirement::Authenticated => {
            if session.status() == SessionStatus::Authenticated {
                RouteDecision::Render
            } else {
                RouteDecision::RedirectLogin
            }
        }
        RouteRequirement::AdminOnly => {
            if session.status() != SessionStatus::Authenticated {
                RouteDecision::RedirectLogin
            } else if session.is_admin() {
                RouteDecision::Render
            } else {
                RouteDecision::RedirectHome
            }
        }
    }
}

// ── Forced navigation ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavTarget {
    Login,
    Home,
}

/// Clonable handle for requesting navigation from anywhere in the client.
/// The host shell owns the receiving end and decides how to realize it.
#[derive(Clone)]
pub struct Navigator {
    tx: mpsc::UnboundedSender<NavTarget>,
}

impl Navigator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NavTarget>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Request navigation. A closed receiver means the host shell is gone;
    /// nothing is left to navigate, so the request is dropped.
    pub fn request(&self, target: NavTarget) {
        if self.tx.send(target).is_err() {
            tracing::debug!("navigation request dropped, host shell closed");
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Role, UserRef};

    fn user(role: Role) -> UserRef {
        UserRef {
            id: 7,
            username: "casey".into(),
            role,
        }
    }

    #[test]
    fn loading_never_redirects() {
        let session = Session::loading();
        for requirement in [
            RouteRequirement::None,
            RouteRequirement::Authenticated,
            RouteRequirement::AdminOnly,
        ] {
            assert_eq!(evaluate(&session, requirement), RouteDecision::Pending);
        }
    }

    #[test]
    fn unguarded_surface_always_renders() {
        assert_eq!(
            evaluate(&Session::anonymous(), RouteRequirement::None),
            RouteDecision::Render
        );
    }

    #[test]
    fn authenticated_requirement_redirects_anonymous_to_login() {
        assert_eq!(
            evaluate(&Session::anonymous(), RouteRequirement::Authenticated),
            RouteDecision::RedirectLogin
        );
        assert_eq!(
            evaluate(&Session::guest(), RouteRequirement::Authenticated),
            RouteDecision::RedirectLogin
        );
    }

    #[test]
    fn authenticated_requirement_renders_for_any_role() {
        assert_eq!(
            evaluate(
                &Session::authenticated(user(Role::User)),
                RouteRequirement::Authenticated
            ),
            RouteDecision::Render
        );
    }

    #[test]
    fn admin_only_downgrades_plain_users_to_home_not_login() {
        assert_eq!(
            evaluate(
                &Session::authenticated(user(Role::User)),
                RouteRequirement::AdminOnly
            ),
            RouteDecision::RedirectHome
        );
    }

    #[test]
    fn admin_only_renders_for_admins() {
        assert_eq!(
            evaluate(
                &Session::authenticated(user(Role::Admin)),
                RouteRequirement::AdminOnly
            ),
            RouteDecision::Render
        );
    }

    #[test]
    fn admin_only_sends_signed_out_users_to_login() {
        assert_eq!(
            evaluate(&Session::anonymous(), RouteRequirement::AdminOnly),
            RouteDecision::RedirectLogin
        );
    }

    #[tokio::test]
    async fn navigator_delivers_requests_in_order() {
        let (navigator, mut rx) = Navigator::new();
        navigator.request(NavTarget::Login);
        navigator.request(NavTarget::Home);
        assert_eq!(rx.recv().await, Some(NavTarget::Login));
        assert_eq!(rx.recv().await, Some(NavTarget::Home));
    }

    #[test]
    fn navigator_survives_closed_receiver() {
        let (navigator, rx) = Navigator::new();
        drop(rx);
        navigator.request(NavTarget::Login);
    }
}
