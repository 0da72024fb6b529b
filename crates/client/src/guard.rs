//! Route guards.
//!
//! A guard gates a protected subtree on session and role resolution. The
//! decision is a small state machine:
//!
//! - `Pending` - session or role still resolving. Render a loading
//!   indicator: never the protected content, and never a redirect, which
//!   would bounce a legitimately authenticated user during the loading
//!   window.
//! - `Denied` - resolution completed and the conditions fail. Redirect,
//!   carrying the originally attempted location where a post-sign-in return
//!   makes sense.
//! - `Granted` - render the protected subtree unmodified.
//!
//! Within one evaluation lifecycle there is no transition out of `Denied`
//! or `Granted` back to `Pending`; a fresh resolution happens on remount or
//! on an explicit session change, which remounts the guarded subtree.

use life_shield_core::{Role, RoutePath};

use crate::role::RoleLookup;
use crate::session::SessionState;

/// Outcome of a guard evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    /// Session or role resolution has not completed.
    Pending,
    /// Render the protected subtree.
    Granted,
    /// Redirect instead of rendering.
    Denied(Redirect),
}

/// A client-side redirect decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Where to send the user.
    pub to: RoutePath,
    /// The originally attempted location, for returning the user after a
    /// successful sign-in.
    pub from: Option<RoutePath>,
}

/// Redirect targets shared by every guard site.
#[derive(Debug, Clone)]
pub struct GuardPolicy {
    /// Fallback for unauthenticated users.
    pub sign_in_route: RoutePath,
    /// Fallback for authenticated but under-privileged users.
    pub dashboard_route: RoutePath,
}

impl GuardPolicy {
    /// Role-agnostic guard: any authenticated principal may pass.
    #[must_use]
    pub fn require_session(&self, session: &SessionState, attempted: &RoutePath) -> GuardState {
        if session.resolving {
            return GuardState::Pending;
        }
        if session.principal.is_some() {
            GuardState::Granted
        } else {
            GuardState::Denied(Redirect {
                to: self.sign_in_route.clone(),
                from: Some(attempted.clone()),
            })
        }
    }

    /// Role-specific guard.
    ///
    /// Distinguishes "not logged in" (redirect to sign-in, carrying the
    /// attempted location) from "logged in but forbidden" (redirect to the
    /// dashboard landing page). An unresolved or unknown role keeps the
    /// guard pending rather than granting or denying by guesswork.
    #[must_use]
    pub fn require_role(
        &self,
        session: &SessionState,
        lookup: &RoleLookup,
        required: Role,
        attempted: &RoutePath,
    ) -> GuardState {
        if session.resolving {
            return GuardState::Pending;
        }
        if session.principal.is_none() {
            return GuardState::Denied(Redirect {
                to: self.sign_in_route.clone(),
                from: Some(attempted.clone()),
            });
        }
        match lookup {
            RoleLookup::Pending | RoleLookup::Unknown => GuardState::Pending,
            RoleLookup::Known(role) if *role == required => GuardState::Granted,
            RoleLookup::Known(_) => GuardState::Denied(Redirect {
                to: self.dashboard_route.clone(),
                from: None,
            }),
        }
    }
}
