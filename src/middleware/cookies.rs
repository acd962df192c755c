use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::provider::{Session, TokenPair};

pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";
pub const REFRESH_TOKEN_COOKIE: &str = "sb-refresh-token";
pub const PKCE_COOKIE: &str = "sb-pkce-verifier";

/// Reset links and the OAuth callback both live under this path.
const PKCE_COOKIE_PATH: &str = "/auth";
const SESSION_COOKIE_DAYS: i64 = 7;

fn session_cookie(name: &'static str, value: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::days(SESSION_COOKIE_DAYS))
        .build()
}

fn removal_cookie(name: &'static str, path: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path(path)
        .max_age(Duration::ZERO)
        .build()
}

/// Both session cookies outlive the access token so the refresh token is
/// still around when the access token needs replacing.
pub fn set_session(jar: CookieJar, session: &Session, secure: bool) -> CookieJar {
    jar.add(session_cookie(ACCESS_TOKEN_COOKIE, &session.access_token, secure))
        .add(session_cookie(REFRESH_TOKEN_COOKIE, &session.refresh_token, secure))
}

pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.add(removal_cookie(ACCESS_TOKEN_COOKIE, "/"))
        .add(removal_cookie(REFRESH_TOKEN_COOKIE, "/"))
}

/// `None` only when neither cookie is present.
pub fn token_pair(jar: &CookieJar) -> Option<TokenPair> {
    let access_token = jar.get(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string());
    let refresh_token = jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string());
    if access_token.is_none() && refresh_token.is_none() {
        return None;
    }
    Some(TokenPair {
        access_token: access_token.unwrap_or_default(),
        refresh_token: refresh_token.unwrap_or_default(),
    })
}

pub fn set_pkce_verifier(jar: CookieJar, verifier: &str, secure: bool) -> CookieJar {
    jar.add(
        Cookie::build((PKCE_COOKIE, verifier.to_string()))
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .path(PKCE_COOKIE_PATH)
            .max_age(Duration::minutes(10))
            .build(),
    )
}

pub fn pkce_verifier(jar: &CookieJar) -> Option<String> {
    jar.get(PKCE_COOKIE).map(|c| c.value().to_string())
}

pub fn clear_pkce_verifier(jar: CookieJar) -> CookieJar {
    jar.add(removal_cookie(PKCE_COOKIE, PKCE_COOKIE_PATH))
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, header};
    use axum::response::IntoResponse;

    use super::*;

    fn jar_with(cookies: &str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, cookies.parse().unwrap());
        CookieJar::from_headers(&headers)
    }

    fn set_cookie_headers(jar: CookieJar) -> Vec<String> {
        let response = (jar, ()).into_response();
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn token_pair_reads_both_cookies() {
        let jar = jar_with("sb-access-token=a; sb-refresh-token=r");
        assert_eq!(
            token_pair(&jar),
            Some(TokenPair {
                access_token: "a".into(),
                refresh_token: "r".into(),
            })
        );
    }

    #[test]
    fn refresh_cookie_alone_still_counts() {
        let pair = token_pair(&jar_with("sb-refresh-token=r")).unwrap();
        assert!(pair.access_token.is_empty());
        assert_eq!(pair.refresh_token, "r");
        assert_eq!(token_pair(&jar_with("other=1")), None);
    }

    #[test]
    fn cleared_session_expires_both_cookies() {
        let headers = set_cookie_headers(clear_session(CookieJar::new()));
        assert_eq!(headers.len(), 2);
        assert!(headers.iter().all(|h| h.contains("Max-Age=0")));
        assert!(headers.iter().any(|h| h.starts_with("sb-access-token=")));
        assert!(headers.iter().any(|h| h.starts_with("sb-refresh-token=")));
    }

    #[test]
    fn pkce_cookie_is_scoped_and_http_only() {
        let headers = set_cookie_headers(set_pkce_verifier(CookieJar::new(), "v3rifier", true));
        let cookie = &headers[0];
        assert!(cookie.starts_with("sb-pkce-verifier=v3rifier"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("Path=/auth"));
    }
}
