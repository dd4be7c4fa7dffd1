//! Input checks for registering and editing monitors.

use thiserror::Error;
use url::Url;

pub const NAME_MAX_CHARS: usize = 100;
pub const INTERVAL_MINUTES: std::ops::RangeInclusive<u32> = 1..=60;
pub const PASSWORD_MIN_CHARS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must be between 1 and {NAME_MAX_CHARS} characters")]
    Name,
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("interval must be between 1 and 60 minutes, got {0}")]
    Interval(u32),
    #[error("password must be at least {PASSWORD_MIN_CHARS} characters")]
    Password,
}

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let len = name.trim().chars().count();
    if len == 0 || len > NAME_MAX_CHARS {
        return Err(ValidationError::Name);
    }
    Ok(())
}

/// Only absolute http(s) URLs with a host are monitorable.
pub fn validate_url(raw: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(raw).map_err(|e| ValidationError::Url(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ValidationError::Url(format!("unsupported scheme `{other}`"))),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ValidationError::Url("missing host".into()));
    }

    Ok(url)
}

pub fn validate_interval(minutes: u32) -> Result<(), ValidationError> {
    if !INTERVAL_MINUTES.contains(&minutes) {
        return Err(ValidationError::Interval(minutes));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(ValidationError::Password);
    }
    Ok(())
}
