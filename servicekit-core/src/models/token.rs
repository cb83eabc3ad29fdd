//! Authentication token types.
//!
//! - [`Token`] - an accepted credential
//! - [`TokenField`] - well-known response fields
//! - [`TokenSchema`] - which fields a backend must return for a token to be accepted

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::JsonObject;
use crate::error::CoreError;

// ============================================================================
// Token Field
// ============================================================================

/// A well-known field of a token response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenField {
    /// `access_token`
    AccessToken,
    /// `token_type`
    TokenType,
    /// `refresh_token`
    RefreshToken,
    /// `expires_in`
    ExpiresIn,
    /// `scope`
    Scope,
}

impl TokenField {
    /// Returns the JSON key for this field.
    pub fn key(&self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::TokenType => "token_type",
            Self::RefreshToken => "refresh_token",
            Self::ExpiresIn => "expires_in",
            Self::Scope => "scope",
        }
    }

    /// Reads this field from a response as a string.
    ///
    /// Numbers are accepted and rendered in decimal; `expires_in` is commonly
    /// returned as an integer.
    fn read(self, fields: &JsonObject) -> Option<String> {
        match fields.get(self.key())? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for TokenField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// Token Schema
// ============================================================================

/// The fields a token response must carry to be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSchema {
    /// Fields that must be present and non-empty.
    pub required: Vec<TokenField>,
    /// Whether an owner identity must accompany the response.
    pub requires_identity: bool,
}

impl TokenSchema {
    /// A bare bearer token: `token_type` and `access_token`.
    pub fn bearer() -> Self {
        Self {
            required: vec![TokenField::TokenType, TokenField::AccessToken],
            requires_identity: false,
        }
    }

    /// A full OAuth token tied to an account identity.
    pub fn oauth() -> Self {
        Self {
            required: vec![
                TokenField::RefreshToken,
                TokenField::TokenType,
                TokenField::AccessToken,
                TokenField::ExpiresIn,
                TokenField::Scope,
            ],
            requires_identity: true,
        }
    }
}

impl Default for TokenSchema {
    fn default() -> Self {
        Self::bearer()
    }
}

// ============================================================================
// Token
// ============================================================================

/// An accepted credential.
///
/// Tokens are never mutated in place; a new login replaces the whole value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The bearer credential.
    pub access_token: String,
    /// Token type reported by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Refresh credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds as reported by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<String>,
    /// Granted scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Account the token belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

impl Token {
    /// Creates a token with only an access credential.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: None,
            refresh_token: None,
            expires_in: None,
            scope: None,
            identity: None,
        }
    }

    /// Sets the owner identity.
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Builds a token from raw response fields.
    ///
    /// Fails if any field the schema requires is missing or empty, or if the
    /// schema requires an identity and none was given. Nothing is produced
    /// from a partial response.
    pub fn from_fields(
        fields: &JsonObject,
        schema: &TokenSchema,
        identity: Option<&str>,
    ) -> Result<Self, CoreError> {
        for field in &schema.required {
            if field.read(fields).is_none() {
                return Err(CoreError::MissingTokenField(field.key()));
            }
        }

        let identity = identity.filter(|id| !id.is_empty());
        if schema.requires_identity && identity.is_none() {
            return Err(CoreError::MissingTokenField("identity"));
        }

        let access_token = TokenField::AccessToken
            .read(fields)
            .ok_or(CoreError::MissingTokenField("access_token"))?;

        Ok(Self {
            access_token,
            token_type: TokenField::TokenType.read(fields),
            refresh_token: TokenField::RefreshToken.read(fields),
            expires_in: TokenField::ExpiresIn.read(fields),
            scope: TokenField::Scope.read(fields),
            identity: identity.map(str::to_string),
        })
    }

    /// Returns the `Authorization` header value.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("identity", &self.identity)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
