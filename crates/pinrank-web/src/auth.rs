//! Shared-secret admin gate. The key arrives either as the `admin_session`
//! cookie set by `/api/auth/login` or as an `x-admin-key` header.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::{AppError, AppState};

pub const SESSION_COOKIE: &str = "admin_session";
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub key: String,
}

fn is_authenticated(expected: Option<&str>, jar: &CookieJar, headers: &HeaderMap) -> bool {
    // No configured key means nothing can match.
    let Some(expected) = expected else {
        return false;
    };
    let cookie_ok = jar
        .get(SESSION_COOKIE)
        .is_some_and(|cookie| cookie.value() == expected);
    let header_ok = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected);
    cookie_ok || header_ok
}

pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    if is_authenticated(state.admin_key.as_deref(), &jar, request.headers()) {
        return next.run(request).await;
    }

    debug!(path = %request.uri().path(), "rejected unauthenticated request");
    if request.uri().path().starts_with("/api") {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response()
    } else {
        Redirect::to("/login").into_response()
    }
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    WithRejection(Json(body), _): WithRejection<Json<LoginRequest>, AppError>,
) -> Response {
    match state.admin_key.as_deref() {
        Some(expected) if body.key == expected => {
            info!("admin session started");
            let cookie = Cookie::build((SESSION_COOKIE, body.key))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Strict)
                .max_age(time::Duration::days(7));
            (jar.add(cookie), Json(json!({ "success": true }))).into_response()
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid Access Key" })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn header_or_cookie_must_match_configured_key() {
        let mut headers = HeaderMap::new();
        let empty = CookieJar::new();
        assert!(!is_authenticated(Some("secret"), &empty, &headers));

        headers.insert(ADMIN_KEY_HEADER, HeaderValue::from_static("secret"));
        assert!(is_authenticated(Some("secret"), &empty, &headers));
        assert!(!is_authenticated(Some("other"), &empty, &headers));
        assert!(!is_authenticated(None, &empty, &headers));

        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "secret"));
        assert!(is_authenticated(Some("secret"), &jar, &HeaderMap::new()));
    }
}
