pub const LOGIN_PATH: &str = "/auth/login";
pub const LANDING_PATH: &str = "/dashboard";
pub const CALLBACK_PATH: &str = "/auth/callback";
pub const AUTH_CODE_ERROR_PATH: &str = "/auth/auth-code-error";
pub const RESET_PASSWORD_PATH: &str = "/auth/reset-password";

pub const PROTECTED_ROUTES: [&str; 6] = [
    "/dashboard",
    "/profile",
    "/favorites",
    "/watchlist",
    "/reviews/create",
    "/movies/rate",
];

pub const AUTH_ONLY_ROUTES: [&str; 4] = [
    LOGIN_PATH,
    "/auth/register",
    "/auth/forgot-password",
    RESET_PASSWORD_PATH,
];

pub const CALLBACK_ROUTES: [&str; 2] = [CALLBACK_PATH, AUTH_CODE_ERROR_PATH];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Requires a session.
    Protected,
    /// Only for visitors without a session.
    AuthOnly,
    /// Completes an external redirect; never redirected.
    Callback,
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    PassThrough,
    Redirect(String),
}

/// `route` matches itself and anything below it, never a sibling sharing
/// its prefix (`/profile` covers `/profile/edit`, not `/profiles`).
fn matches_route(path: &str, route: &str) -> bool {
    path.strip_prefix(route)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

pub fn classify(path: &str) -> RouteClass {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    let is_in = |routes: &[&str]| routes.iter().any(|route| matches_route(path, route));

    if is_in(&CALLBACK_ROUTES) {
        RouteClass::Callback
    } else if is_in(&PROTECTED_ROUTES) {
        RouteClass::Protected
    } else if is_in(&AUTH_ONLY_ROUTES) {
        RouteClass::AuthOnly
    } else {
        RouteClass::Public
    }
}

pub fn login_redirect(original_path: &str) -> String {
    format!(
        "{LOGIN_PATH}?redirectTo={}",
        urlencoding::encode(original_path)
    )
}

pub fn decide(class: RouteClass, session_present: bool, path: &str) -> RouteDecision {
    match (class, session_present) {
        (RouteClass::Protected, false) => RouteDecision::Redirect(login_redirect(path)),
        (RouteClass::AuthOnly, true) => RouteDecision::Redirect(LANDING_PATH.to_string()),
        (RouteClass::Callback | RouteClass::Public, _)
        | (RouteClass::Protected, true)
        | (RouteClass::AuthOnly, false) => RouteDecision::PassThrough,
    }
}

/// Post-login destinations must stay on this site: a single leading slash,
/// no scheme or authority.
pub fn safe_next(next: &str) -> Option<&str> {
    let ok = next.starts_with('/') && !next.starts_with("//") && !next.contains('\\');
    ok.then_some(next)
}
