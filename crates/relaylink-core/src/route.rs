//! Login-gated navigation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A view reachable by path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Login,
    Signup,
    Home,
    Profile,
    History,
    Relay,
    Setting,
}

impl Route {
    pub const ALL: [Self; 7] = [
        Self::Login,
        Self::Signup,
        Self::Home,
        Self::Profile,
        Self::History,
        Self::Relay,
        Self::Setting,
    ];

    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Login => "/",
            Self::Signup => "/signup",
            Self::Home => "/home",
            Self::Profile => "/profile",
            Self::History => "/history",
            Self::Relay => "/relay",
            Self::Setting => "/setting",
        }
    }

    /// Look a route up by path. A trailing slash is ignored.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let trimmed = path.trim();
        let normalized = match trimmed.trim_end_matches('/') {
            "" if trimmed.starts_with('/') => "/",
            other => other,
        };
        Self::ALL.into_iter().find(|route| route.path() == normalized)
    }

    /// Whether the route belongs to the authenticated layout.
    #[must_use]
    pub const fn requires_login(self) -> bool {
        !matches!(self, Self::Login | Self::Signup)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// What the router should do with a requested path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "route", rename_all = "snake_case")]
pub enum Navigation {
    Render(Route),
    Redirect(Route),
    NotFound,
}

/// Decides navigation from the login predicate alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteGuard;

impl RouteGuard {
    /// Resolve `path` for the given login state.
    ///
    /// Authenticated routes redirect to `/` when logged out; `/` redirects
    /// to `/home` when logged in. `/signup` always renders.
    #[must_use]
    pub fn resolve(path: &str, is_logged_in: bool) -> Navigation {
        let Some(route) = Route::from_path(path) else {
            return Navigation::NotFound;
        };

        match route {
            Route::Login if is_logged_in => Navigation::Redirect(Route::Home),
            route if route.requires_login() && !is_logged_in => Navigation::Redirect(Route::Login),
            route => Navigation::Render(route),
        }
    }
}
