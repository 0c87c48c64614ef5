//! Authenticated-user session state.
//!
//! The session is a handful of independent keys in the [`LocalStore`], read by
//! the REST client (auth headers), the glass client (ownership checks) and
//! the route guards below.

use crate::api::types::LoginResponse;
use crate::storage::LocalStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const TOKEN_KEY: &str = "auth_token";
const USER_ID_KEY: &str = "user_id";
const ROLE_KEY: &str = "user_role";
const NAME_KEY: &str = "user_name";

/// The currently signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub role: String,
    pub name: Option<String>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Where a guarded view should send the user instead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    Redirect(&'static str),
}

/// Process-wide session store. Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<LocalStore>,
}

impl SessionStore {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Persist the session returned by a successful login
    pub fn set_session(&self, login: &LoginResponse) -> Result<()> {
        self.store
            .set(TOKEN_KEY, login.token.clone().unwrap_or_default())?;
        self.store.set(USER_ID_KEY, login.user_id.clone())?;
        self.store.set(
            ROLE_KEY,
            login.role.clone().unwrap_or_else(|| "user".to_string()),
        )?;
        match &login.name {
            Some(name) => self.store.set(NAME_KEY, name.clone())?,
            None => self.store.remove(NAME_KEY)?,
        }
        info!(target: "session", user_id = %login.user_id, "Session established");
        Ok(())
    }

    /// Drop every session key
    pub fn clear(&self) -> Result<()> {
        debug!(target: "session", "Clearing session");
        self.store
            .remove_many(&[TOKEN_KEY, USER_ID_KEY, ROLE_KEY, NAME_KEY])
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn user_id(&self) -> Option<String> {
        self.store.get(USER_ID_KEY).filter(|id| !id.is_empty())
    }

    /// Full session, present only when both token and user id are stored
    pub fn current(&self) -> Option<Session> {
        Some(Session {
            token: self.access_token()?,
            user_id: self.user_id()?,
            role: self
                .store
                .get(ROLE_KEY)
                .unwrap_or_else(|| "user".to_string()),
            name: self.store.get(NAME_KEY),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some() && self.user_id().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.current().map(|s| s.is_admin()).unwrap_or(false)
    }

    /// Views only for signed-out users (login, register)
    pub fn guard_public(&self) -> RouteDecision {
        if self.is_authenticated() {
            RouteDecision::Redirect("/dashboard")
        } else {
            RouteDecision::Allow
        }
    }

    pub fn guard_protected(&self) -> RouteDecision {
        if self.is_authenticated() {
            RouteDecision::Allow
        } else {
            RouteDecision::Redirect("/login")
        }
    }

    pub fn guard_admin(&self) -> RouteDecision {
        if self.is_admin() {
            RouteDecision::Allow
        } else {
            RouteDecision::Redirect("/dashboard")
        }
    }

    /// Landing page for the application root
    pub fn landing_route(&self) -> &'static str {
        if self.is_authenticated() {
            "/dashboard"
        } else {
            "/login"
        }
    }
}
