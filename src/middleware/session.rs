use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;

use crate::app::AppState;
use crate::auth::extractors::CurrentSession;
use crate::auth::services::LoadedSession;
use crate::middleware::cookies;
use crate::provider::Session;
use crate::routes::{RouteClass, RouteDecision, classify, decide};

/// Loads the session from the cookies, applies the route decision table and
/// writes refreshed tokens back. Loading failures count as "no session":
/// protected pages then redirect to login while auth-only pages stay open.
pub async fn session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    let class = classify(&path);
    if class == RouteClass::Callback {
        return next.run(request).await;
    }

    let (session, outgoing) = load(&state, &jar).await;
    let decision = decide(class, session.is_some(), &path);
    tracing::debug!(
        path = %path,
        ?class,
        authenticated = session.is_some(),
        ?decision,
        "route decision"
    );

    match decision {
        RouteDecision::Redirect(target) => (outgoing, Redirect::temporary(&target)).into_response(),
        RouteDecision::PassThrough => {
            if let Some(session) = session {
                request.extensions_mut().insert(CurrentSession(session));
            }
            let response = next.run(request).await;
            merge_cookies(outgoing, response)
        }
    }
}

/// Appends the middleware's cookies to a handler response. A cookie the
/// handler already set wins, so a fresh login is not undone by the removal
/// of the stale pair it replaced.
fn merge_cookies(outgoing: CookieJar, response: Response) -> Response {
    let written: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| Cookie::parse(value).ok())
        .map(|cookie| cookie.name().to_string())
        .collect();

    let jar = outgoing
        .iter()
        .filter(|cookie| !written.iter().any(|name| name == cookie.name()))
        .fold(CookieJar::new(), |jar, cookie| jar.add(cookie.clone()));

    (jar, response).into_response()
}

async fn load(state: &AppState, jar: &CookieJar) -> (Option<Session>, CookieJar) {
    let outgoing = CookieJar::new();
    let Some(pair) = cookies::token_pair(jar) else {
        return (None, outgoing);
    };

    match state.auth.load_session(pair).await {
        Ok(LoadedSession {
            session,
            refreshed,
        }) => {
            let outgoing = if refreshed {
                cookies::set_session(outgoing, &session, state.secure_cookies)
            } else {
                outgoing
            };
            (Some(session), outgoing)
        }
        Err(e) if e.is_transient() => {
            tracing::warn!(error = %e, "session could not be loaded, keeping cookies");
            (None, outgoing)
        }
        Err(e) => {
            tracing::debug!(error = %e, "session rejected, clearing cookies");
            (None, cookies::clear_session(outgoing))
        }
    }
}
