//! Page access rules.

use serde::Serialize;

use crate::models::Role;
use crate::session::SIGN_IN_PATH;

/// Who may open a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Public,
    SignedIn,
    Roles(&'static [Role]),
}

const MANAGERS: &[Role] = &[Role::Manager, Role::Admin];
const ADMINS: &[Role] = &[Role::Admin];

/// Audience of a page path; query strings and trailing slashes are ignored.
/// Unknown pages require sign-in.
pub fn audience(path: &str) -> Audience {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    match path {
        "/" | "/access-denied" => Audience::Public,
        p if p == "/auth" || p.starts_with("/auth/") => Audience::Public,
        "/user-dashboard" | "/daily-update-form" => Audience::SignedIn,
        "/dashboard" | "/team-management" => Audience::Roles(MANAGERS),
        "/admin" => Audience::Roles(ADMINS),
        _ => Audience::SignedIn,
    }
}

/// Landing page for a role.
pub fn home_for(role: Role) -> &'static str {
    match role {
        Role::Admin | Role::Manager => "/dashboard",
        Role::User => "/user-dashboard",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum Access {
    Granted,
    Redirect { to: String },
}

pub fn sign_in_redirect(path: &str) -> String {
    format!("{SIGN_IN_PATH}?callbackUrl={}", encode_component(path))
}

/// Decide whether `role` (None = signed out) may open `path`.
pub fn authorize(path: &str, role: Option<Role>) -> Access {
    match (audience(path), role) {
        (Audience::Public, _) => Access::Granted,
        (_, None) => Access::Redirect { to: sign_in_redirect(path) },
        (Audience::SignedIn, Some(_)) => Access::Granted,
        (Audience::Roles(allowed), Some(role)) if allowed.contains(&role) => Access::Granted,
        (Audience::Roles(_), Some(role)) => Access::Redirect { to: home_for(role).to_owned() },
    }
}

fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
