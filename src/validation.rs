use regex::Regex;

use crate::actions::{Action, RecordType};
use crate::permissions::NewPermission;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("token name is empty")]
    EmptyName,
    #[error("token name too long (max 64 characters)")]
    NameTooLong,
    #[error("token name contains invalid characters (only A-Z, a-z, 0-9, ' ', '_', '.' and '-' allowed)")]
    InvalidNameCharacters,
    #[error("secret is empty")]
    EmptySecret,
    #[error("zone id must not be negative, got {0}")]
    NegativeZoneId(i64),
    #[error("unknown record type '{0}'")]
    UnknownRecordType(String),
    #[error("unknown action '{0}'")]
    UnknownAction(String),
}

lazy_static::lazy_static! {
    /// Letters, digits, space, '_', '.' and '-'
    static ref TOKEN_NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9 _.\-]+$").unwrap();
}

pub fn validate_token_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > 64 {
        return Err(ValidationError::NameTooLong);
    }
    if !TOKEN_NAME_RE.is_match(name) {
        return Err(ValidationError::InvalidNameCharacters);
    }
    Ok(())
}

pub fn validate_secret(secret: &str) -> Result<(), ValidationError> {
    if secret.trim().is_empty() {
        return Err(ValidationError::EmptySecret);
    }
    Ok(())
}

pub fn validate_permission(perm: &NewPermission) -> Result<(), ValidationError> {
    if perm.zone_id < 0 {
        return Err(ValidationError::NegativeZoneId(perm.zone_id));
    }
    for t in &perm.record_types {
        if RecordType::from_name(t).is_none() {
            return Err(ValidationError::UnknownRecordType(t.clone()));
        }
    }
    for a in &perm.allowed_actions {
        if a.parse::<Action>().is_err() {
            return Err(ValidationError::UnknownAction(a.clone()));
        }
    }
    Ok(())
}
