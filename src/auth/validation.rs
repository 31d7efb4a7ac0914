use lazy_static::lazy_static;
use regex::Regex;

use crate::error::AppError;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.]{3,32}$").unwrap();
}

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Usernames double as lookup keys next to numeric ids, so all-digit names are refused.
pub fn validate_username(username: &str) -> Result<(), AppError> {
    if !USERNAME_RE.is_match(username) {
        return Err(AppError::validation(
            "Username must be 3-32 characters of letters, digits, '_' or '.'",
        ));
    }
    if username.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::validation("Username cannot be only digits"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation("Password too short"));
    }
    Ok(())
}
