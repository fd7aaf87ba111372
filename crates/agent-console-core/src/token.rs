//! Bearer token handling.
//!
//! Tokens are compact JWTs. Only the payload is inspected: the signature is
//! the backend's concern, the console just needs to know whether the token
//! carries a session.

use std::fmt;

use base64::{
    Engine as _,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use serde_json::Value;

use crate::error::ValidationError;

/// Claim holding the backend session id.
const SESSION_ID_CLAIM: &str = "sid";

/// base64url that accepts both padded and unpadded input.
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Opaque bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Wrap a raw token string. No validation is performed.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `sid` claim, if the token decodes and carries a non-empty one.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        session_id(&self.0)
    }

    /// Whether this token decodes and carries a session id.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        is_valid_token(&self.0)
    }

    /// Consume the wrapper.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

// Keep credentials out of logs.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token")
            .field(&self.session_id().unwrap_or_default())
            .finish()
    }
}

/// A token is valid iff it decodes and its `sid` claim is a non-empty string.
///
/// Never panics: garbage input simply yields `false`.
#[must_use]
pub fn is_valid_token(token: &str) -> bool {
    validate_token(token).is_ok()
}

/// Validate `token`, returning its session id.
///
/// # Errors
/// Returns `ValidationError` naming the first check the token fails.
pub fn validate_token(token: &str) -> Result<String, ValidationError> {
    let claims = decode_claims(token)?;
    match claims.get(SESSION_ID_CLAIM) {
        Some(Value::String(sid)) if !sid.is_empty() => Ok(sid.clone()),
        _ => Err(ValidationError::MissingSessionId),
    }
}

fn session_id(token: &str) -> Option<String> {
    validate_token(token).ok()
}

/// Decode the payload segment of a compact JWS into its claims object.
fn decode_claims(token: &str) -> Result<serde_json::Map<String, Value>, ValidationError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(ValidationError::Malformed);
    };

    let bytes = BASE64_URL
        .decode(payload)
        .map_err(|_| ValidationError::Payload)?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(claims)) => Ok(claims),
        _ => Err(ValidationError::Payload),
    }
}

#[cfg(test)]
pub(crate) fn encode_test_token(claims: &Value) -> String {
    let header = BASE64_URL.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = BASE64_URL.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}
