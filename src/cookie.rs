//! Cookie helpers for the auth (`jwt`) and session (`sid`) cookies.

use axum::http::{HeaderMap, HeaderValue, header};
use chrono::{DateTime, Duration, Utc};

use crate::{
    config::{AppConfig, Env},
    error::{AppError, AppResult},
};

pub const AUTH_COOKIE: &str = "jwt";
pub const SESSION_COOKIE: &str = "sid";
/// Value written over the auth cookie on logout.
pub const LOGGED_OUT: &str = "loggedout";

const LOGOUT_GRACE_SECS: i64 = 10;

/// Cookie configuration
#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: &'static str,
    pub secure: bool,
    pub max_age: Duration,
}

impl CookieConfig {
    /// Cookie with the configured `JWT_COOKIE_EXPIRES_IN` lifetime; `Secure` only in production.
    pub fn from_config(name: &'static str, config: &AppConfig) -> Self {
        Self {
            name,
            secure: config.env == Env::Production,
            max_age: Duration::days(config.jwt_cookie_expires_in_days),
        }
    }

    /// Build Set-Cookie header value
    pub fn build_set_cookie(&self, value: &str, now: DateTime<Utc>) -> String {
        let expires = now + self.max_age;
        let mut cookie = format!(
            "{}={}; HttpOnly; SameSite=Lax; Path=/; Expires={}; Max-Age={}",
            self.name,
            value,
            expires.format("%a, %d %b %Y %H:%M:%S GMT"),
            self.max_age.num_seconds().max(0),
        );

        if self.secure {
            cookie.push_str("; Secure");
        }

        cookie
    }

    pub fn header_value(&self, value: &str, now: DateTime<Utc>) -> AppResult<HeaderValue> {
        HeaderValue::from_str(&self.build_set_cookie(value, now))
            .map_err(|e| AppError::Internal(format!("invalid cookie value: {e}")))
    }
}

/// The `jwt=loggedout` overwrite with a ten second lifetime.
pub fn logged_out_cookie(config: &AppConfig, now: DateTime<Utc>) -> AppResult<HeaderValue> {
    CookieConfig {
        max_age: Duration::seconds(LOGOUT_GRACE_SECS),
        ..CookieConfig::from_config(AUTH_COOKIE, config)
    }
    .header_value(LOGGED_OUT, now)
}

/// Expires the session cookie immediately.
pub fn cleared_session_cookie(config: &AppConfig, now: DateTime<Utc>) -> AppResult<HeaderValue> {
    CookieConfig {
        max_age: Duration::zero(),
        ..CookieConfig::from_config(SESSION_COOKIE, config)
    }
    .header_value("", now)
}

/// Extract a cookie value from headers
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|cookie| {
            let (key, value) = cookie.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
}
