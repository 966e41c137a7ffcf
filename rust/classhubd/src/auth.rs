use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Granted,
    Denied,
}

pub fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// Checks a 6-digit access code against the configured SHA-256 digest.
/// Without a configured digest any well-formed code is accepted.
pub fn verify_access_code(entered: &str, expected_sha256: Option<&str>) -> Result<Access, SyncError> {
    let code = entered.trim();
    if code.is_empty() {
        return Err(SyncError::validation("Please enter the 6-digit code"));
    }
    if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SyncError::validation("Code must be exactly 6 digits"));
    }
    let Some(expected) = expected_sha256 else {
        return Ok(Access::Granted);
    };
    if sha256_hex(code).eq_ignore_ascii_case(expected.trim()) {
        Ok(Access::Granted)
    } else {
        Ok(Access::Denied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_lowercase_hex() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn malformed_codes_are_validation_errors() {
        for bad in ["", "   ", "12345", "1234567", "12a456"] {
            let err = verify_access_code(bad, None).unwrap_err();
            assert_eq!(err.code(), "validation_failed", "input {:?}", bad);
        }
    }

    #[test]
    fn compares_against_configured_digest() {
        let expected = sha256_hex("927624");
        assert_eq!(verify_access_code(" 927624 ", Some(&expected)).unwrap(), Access::Granted);
        assert_eq!(verify_access_code("123456", Some(&expected)).unwrap(), Access::Denied);
        assert_eq!(verify_access_code("123456", None).unwrap(), Access::Granted);
    }
}
