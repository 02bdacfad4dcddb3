// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Identity model and screen gating
//!
//! The current user is always exactly one of signed-out, guest, or
//! authenticated. All mutation goes through [`crate::session::SessionManager`];
//! everything else reads.

use serde::{Deserialize, Serialize};

/// A user record as delivered by the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: String,
    pub email: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// The authentication classification of the app user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Identity {
    #[default]
    SignedOut,
    Guest,
    Authenticated(UserRecord),
}

impl Identity {
    /// Guests and authenticated users both count as logged in for gating.
    pub fn is_logged_in(&self) -> bool {
        !matches!(self, Identity::SignedOut)
    }

    /// The remote user id, when one exists.
    pub fn uid(&self) -> Option<&str> {
        match self {
            Identity::Authenticated(user) => Some(&user.uid),
            Identity::SignedOut | Identity::Guest => None,
        }
    }
}

/// Session resolution state. `Initializing` lasts only until both the
/// provider callback and the persisted guest flag have been consulted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Initializing,
    Resolved(Identity),
}

impl SessionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Initializing => None,
            SessionState::Resolved(identity) => Some(identity),
        }
    }
}

/// Screen areas the navigation layer gates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenArea {
    /// Sign-in / sign-up screens
    Auth,
    /// Screens that require a logged-in (guest or authenticated) user
    Protected,
    /// Landing and informational screens
    Public,
}

/// Gating verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    ToSignIn,
}

/// Decide whether navigation into `area` must be redirected.
///
/// No verdict is issued while the session is still resolving. Guests and
/// authenticated users may reach the auth screens freely; only signed-out
/// users are pushed off protected screens.
pub fn redirect_for(state: &SessionState, area: ScreenArea) -> Option<Redirect> {
    let identity = state.identity()?;

    match area {
        ScreenArea::Auth | ScreenArea::Public => None,
        ScreenArea::Protected => {
            if identity.is_logged_in() {
                None
            } else {
                Some(Redirect::ToSignIn)
            }
        }
    }
}
