//! Serde tests for core types.
//!
//! These pin the on-disk and on-wire shapes of the types that get persisted
//! (tokens in the key-value store, cache policies in cache metadata).

use std::time::Duration;

use serde_json::json;

use crate::{CacheMode, CachePolicy, HttpMethod, RequestBody, Token, TokenField, TokenSchema};

// ============================================================================
// HttpMethod Serde Tests
// ============================================================================

#[test]
fn test_http_method_serializes_uppercase() {
    assert_eq!(serde_json::to_string(&HttpMethod::Patch).unwrap(), r#""PATCH""#);
    let method: HttpMethod = serde_json::from_str(r#""DELETE""#).unwrap();
    assert_eq!(method, HttpMethod::Delete);
}

#[test]
fn test_http_method_invalid_deserialize() {
    let result: Result<HttpMethod, _> = serde_json::from_str(r#""get""#);
    assert!(result.is_err());
}

// ============================================================================
// Token Serde Tests
// ============================================================================

#[test]
fn test_token_omits_absent_fields() {
    let token = Token::new("abc");
    let value = serde_json::to_value(&token).unwrap();
    assert_eq!(value, json!({"access_token": "abc"}));
}

#[test]
fn test_token_deserialize_with_identity() {
    let token: Token = serde_json::from_value(json!({
        "access_token": "a",
        "refresh_token": "r",
        "identity": "ana@example.com"
    }))
    .unwrap();
    assert_eq!(token.refresh_token.as_deref(), Some("r"));
    assert_eq!(token.identity.as_deref(), Some("ana@example.com"));
    assert!(token.scope.is_none());
}

#[test]
fn test_token_schema_field_names() {
    let value = serde_json::to_value(TokenSchema::bearer()).unwrap();
    assert_eq!(
        value,
        json!({"required": ["token_type", "access_token"], "requires_identity": false})
    );
    assert_eq!(TokenField::ExpiresIn.to_string(), "expires_in");
}

// ============================================================================
// Cache Policy Serde Tests
// ============================================================================

#[test]
fn test_cache_policy_max_age_in_seconds() {
    let policy = CachePolicy::cache_else_network(Duration::from_secs(90));
    let value = serde_json::to_value(policy).unwrap();
    assert_eq!(value, json!({"mode": "cache_else_network", "max_age": 90}));

    let back: CachePolicy = serde_json::from_value(value).unwrap();
    assert_eq!(back.mode, CacheMode::CacheElseNetwork);
    assert_eq!(back.max_age, Duration::from_secs(90));
}

// ============================================================================
// Request Body Serde Tests
// ============================================================================

#[test]
fn test_request_body_tagged() {
    let body = RequestBody::Text("grant_type=client_credentials".into());
    let value = serde_json::to_value(&body).unwrap();
    assert_eq!(
        value,
        json!({"kind": "text", "value": "grant_type=client_credentials"})
    );
}
