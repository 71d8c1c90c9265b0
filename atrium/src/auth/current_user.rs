use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, instrument, trace};

use crate::{
    api::models::users::CurrentUser,
    auth::session,
    errors::{Error, Result},
    AppState,
};

/// Extract user from a bearer token in the Authorization header.
/// Returns:
/// - None: No Authorization header or not a Bearer token
/// - Some(Ok(user)): Valid session token
/// - Some(Err(error)): Bearer token present but invalid
#[instrument(skip(parts, config))]
fn try_bearer_auth(parts: &Parts, config: &crate::config::Config) -> Option<Result<CurrentUser>> {
    let auth_header = parts.headers.get(axum::http::header::AUTHORIZATION)?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }))
        }
    };

    let token = auth_str.strip_prefix("Bearer ")?;
    Some(session::verify_session_token(token, config).map_err(|_| Error::Unauthenticated { message: None }))
}

/// Extract user from the session cookie if present and valid.
/// Returns:
/// - None: No session cookie present
/// - Some(Ok(user)): Valid session found and verified
#[instrument(skip(parts, config))]
fn try_session_cookie_auth(parts: &Parts, config: &crate::config::Config) -> Option<Result<CurrentUser>> {
    let cookie_header = parts.headers.get(axum::http::header::COOKIE)?;

    let cookie_str = match cookie_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid cookie header: {e}"),
            }))
        }
    };
    let cookie_name = &config.auth.native.session.cookie_name;

    for cookie in cookie_str.split(';') {
        let cookie = cookie.trim();
        if let Some((name, value)) = cookie.split_once('=') {
            if name == cookie_name {
                match session::verify_session_token(value, config) {
                    Ok(user) => return Some(Ok(user)),
                    Err(_) => {
                        // Expired/invalid token; keep scanning other cookies
                        continue;
                    }
                }
            }
        }
    }
    None
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Try bearer first (most specific), then the session cookie.
        // Each method returns Option<Result<CurrentUser>>: None means the
        // credential wasn't present, Some(Err) means it was present but bad.
        match try_bearer_auth(parts, &state.config) {
            Some(Ok(user)) => {
                debug!("Found bearer-authenticated user: {}", user.id);
                return Ok(user);
            }
            Some(Err(e)) => {
                trace!("Bearer authentication failed: {:?}", e);
                return Err(Error::Unauthenticated { message: None });
            }
            None => {
                trace!("No bearer authentication attempted");
            }
        }

        match try_session_cookie_auth(parts, &state.config) {
            Some(Ok(user)) => {
                debug!("Found session-cookie authenticated user: {}", user.id);
                Ok(user)
            }
            Some(Err(_)) | None => Err(Error::Unauthenticated { message: None }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::create_session_token;
    use uuid::Uuid;

    fn test_user() -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "cookie@example.com".to_string(),
            first_name: "Cookie".to_string(),
            last_name: "Monster".to_string(),
            is_admin: false,
        }
    }

    fn parts_with_header(name: &str, value: &str) -> Parts {
        let request = axum::http::Request::builder()
            .uri("http://localhost/test")
            .header(name, value)
            .body(())
            .unwrap();
        request.into_parts().0
    }

    #[test]
    fn test_bearer_extraction() {
        let config = crate::test_utils::create_test_config();
        let user = test_user();
        let token = create_session_token(&user, &config).unwrap();

        let parts = parts_with_header("authorization", &format!("Bearer {token}"));
        let extracted = try_bearer_auth(&parts, &config).unwrap().unwrap();
        assert_eq!(extracted.id, user.id);

        let parts = parts_with_header("authorization", "Bearer garbage");
        assert!(try_bearer_auth(&parts, &config).unwrap().is_err());

        let parts = parts_with_header("authorization", "Basic dXNlcjpwYXNz");
        assert!(try_bearer_auth(&parts, &config).is_none());
    }

    #[test]
    fn test_session_cookie_extraction() {
        let config = crate::test_utils::create_test_config();
        let user = test_user();
        let token = create_session_token(&user, &config).unwrap();
        let cookie_name = &config.auth.native.session.cookie_name;

        let parts = parts_with_header("cookie", &format!("other=1; {cookie_name}={token}"));
        let extracted = try_session_cookie_auth(&parts, &config).unwrap().unwrap();
        assert_eq!(extracted.email, user.email);

        let parts = parts_with_header("cookie", "other=1");
        assert!(try_session_cookie_auth(&parts, &config).is_none());
    }
}
