//! Token cookies and bearer header parsing.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, COOKIE, InvalidHeaderValue},
};

use crate::auth::AuthConfig;

pub const ACCESS_COOKIE_NAME: &str = "access_token";
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";
pub const REFRESH_COOKIE_PATH: &str = "/auth/refresh";

fn build(
    name: &str,
    value: &str,
    path: &str,
    max_age: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{name}={value}; Path={path}; HttpOnly; SameSite=Strict; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn access_cookie(config: &AuthConfig, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    build(
        ACCESS_COOKIE_NAME,
        token,
        "/",
        config.access_ttl_seconds(),
        config.cookie_secure(),
    )
}

pub fn refresh_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build(
        REFRESH_COOKIE_NAME,
        token,
        REFRESH_COOKIE_PATH,
        config.refresh_ttl_seconds(),
        config.cookie_secure(),
    )
}

pub fn clear_access_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    build(ACCESS_COOKIE_NAME, "", "/", 0, config.cookie_secure())
}

pub fn clear_refresh_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    build(
        REFRESH_COOKIE_NAME,
        "",
        REFRESH_COOKIE_PATH,
        0,
        config.cookie_secure(),
    )
}

pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let val = val.trim();
            if key.trim() == name && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config(secure: bool) -> AuthConfig {
        AuthConfig::new(SecretString::from("k".to_string())).with_cookie_secure(secure)
    }

    #[test]
    fn access_cookie_attributes() {
        let cookie = access_cookie(&config(false), "abc").ok();
        assert_eq!(
            cookie.as_ref().and_then(|v| v.to_str().ok()),
            Some("access_token=abc; Path=/; HttpOnly; SameSite=Strict; Max-Age=900")
        );
    }

    #[test]
    fn refresh_cookie_is_scoped_and_secure_when_configured() {
        let cookie = refresh_cookie(&config(true), "xyz").ok();
        assert_eq!(
            cookie.as_ref().and_then(|v| v.to_str().ok()),
            Some(
                "refresh_token=xyz; Path=/auth/refresh; HttpOnly; SameSite=Strict; Max-Age=604800; Secure"
            )
        );
    }

    #[test]
    fn cleared_cookies_expire_immediately() {
        let access = clear_access_cookie(&config(false)).ok();
        let refresh = clear_refresh_cookie(&config(false)).ok();
        assert!(
            access
                .as_ref()
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("access_token=;") && v.contains("Max-Age=0"))
        );
        assert!(
            refresh
                .as_ref()
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.contains("Path=/auth/refresh") && v.contains("Max-Age=0"))
        );
    }

    #[test]
    fn extracts_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; access_token=a.b.c; refresh_token=d.e.f"),
        );
        assert_eq!(
            extract_cookie(&headers, ACCESS_COOKIE_NAME).as_deref(),
            Some("a.b.c")
        );
        assert_eq!(
            extract_cookie(&headers, REFRESH_COOKIE_NAME).as_deref(),
            Some("d.e.f")
        );
        assert!(extract_cookie(&headers, "missing").is_none());
    }

    #[test]
    fn bearer_parsing() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer  tok "));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("tok"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(extract_bearer_token(&headers).is_none());
    }
}
