use lazy_static::lazy_static;
use regex::Regex;

use crate::{error::AppError, store::Role};

pub const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trim and lowercase, then check shape. Stored emails are always normalized.
pub(crate) fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::validation("email is required"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::validation("invalid email"));
    }
    Ok(email)
}

pub(crate) fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub(crate) fn normalize_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::validation("name is required"));
    }
    Ok(name.to_string())
}

pub(crate) fn parse_role(raw: &str) -> Result<Role, AppError> {
    raw.parse::<Role>()
        .map_err(|_| AppError::validation("invalid role, use \"admin\" or \"user\""))
}

/// Pull a required string field out of an optional request field.
pub(crate) fn required<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str, AppError> {
    field
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(
            normalize_email("  Ana@Example.COM ").unwrap(),
            "ana@example.com"
        );
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for bad in ["", "plain", "a@b", "a b@c.io", "@c.io"] {
            assert!(
                matches!(normalize_email(bad), Err(AppError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn five_char_password_is_too_short() {
        assert!(matches!(
            validate_password("12345"),
            Err(AppError::Validation(_))
        ));
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn blank_name_is_rejected() {
        assert!(normalize_name("   ").is_err());
        assert_eq!(normalize_name(" Ana ").unwrap(), "Ana");
    }

    #[test]
    fn required_fields_must_be_present_and_non_blank() {
        assert!(required(&None, "email").is_err());
        assert!(required(&Some("  ".into()), "email").is_err());
        assert_eq!(required(&Some("x".into()), "email").unwrap(), "x");
    }

    #[test]
    fn roles_parse_or_fail_validation() {
        assert_eq!(parse_role("admin").unwrap(), Role::Admin);
        assert!(matches!(parse_role("root"), Err(AppError::Validation(_))));
    }
}
