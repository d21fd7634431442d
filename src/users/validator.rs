//! Field predicates applied at the HTTP boundary, before any usecase call.

use base64ct::{Base64, Encoding};
use lazy_static::lazy_static;
use regex::Regex;

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;

/// Password policy: 8 to 128 characters with at least one ASCII uppercase
/// letter, lowercase letter, digit and punctuation symbol.
pub fn is_valid_password(password: &str) -> bool {
    let len = password.chars().count();
    (PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len)
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(is_symbol)
}

// ! through /, : through @, [ through `, { through ~
fn is_symbol(c: char) -> bool {
    matches!(c, '!'..='/' | ':'..='@' | '['..='`' | '{'..='~')
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= 255 && EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    (4..=32).contains(&username.len()) && username.chars().all(|c| c.is_ascii_alphanumeric())
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    name.chars().count() <= 50
}

pub(crate) fn is_base64(payload: &str) -> bool {
    Base64::decode_vec(payload).is_ok()
}
