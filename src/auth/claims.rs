//! Token claim sets and the structural guard that turns an untyped decoded
//! payload into typed claims.
//!
//! Signature verification alone is not enough: a token signed with a reused
//! secret by another service, or by an older release, can verify and still
//! lack the fields this service relies on. Every decoded payload therefore goes
//! through [`AccessClaims::from_payload`] or [`RefreshClaims::from_payload`]
//! before any field is read.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::models::{Identity, Role};

/// Reason a decoded payload was rejected by the structural guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedPayload(pub &'static str);

impl fmt::Display for MalformedPayload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    pub exp: i64,
}

impl AccessClaims {
    pub fn for_identity(identity: &Identity, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: identity.id,
            email: identity.email.clone(),
            role: identity.role,
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            iat: Some(issued_at.timestamp()),
            exp: (issued_at + ttl).timestamp(),
        }
    }

    /// Structural guard for access payloads: `id` (a UUID string), `email`
    /// and `role` (exactly `"ADMIN"` or `"USER"`) are required. Names default
    /// to empty when absent but must be strings when present.
    pub fn from_payload(payload: Value) -> Result<Self, MalformedPayload> {
        let fields = as_object(&payload)?;

        let id = required_id(fields)?;
        let email = fields
            .get("email")
            .and_then(Value::as_str)
            .ok_or(MalformedPayload("email is missing or not a string"))?
            .to_string();
        let role = fields
            .get("role")
            .and_then(Value::as_str)
            .and_then(Role::parse)
            .ok_or(MalformedPayload("role is missing or not ADMIN/USER"))?;

        Ok(Self {
            id,
            email,
            role,
            first_name: optional_string(fields, "firstName")?,
            last_name: optional_string(fields, "lastName")?,
            iat: fields.get("iat").and_then(Value::as_i64),
            exp: required_exp(fields)?,
        })
    }
}

/// Claims carried by a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub id: Uuid,
    /// Random per-token nonce; keeps two tokens minted in the same second distinct.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    pub exp: i64,
}

impl RefreshClaims {
    pub fn for_identity(identity: &Identity, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: identity.id,
            jti: Some(Uuid::new_v4().to_string()),
            iat: Some(issued_at.timestamp()),
            exp: (issued_at + ttl).timestamp(),
        }
    }

    /// Structural guard for refresh payloads: only `id` is required.
    pub fn from_payload(payload: Value) -> Result<Self, MalformedPayload> {
        let fields = as_object(&payload)?;

        Ok(Self {
            id: required_id(fields)?,
            jti: fields.get("jti").and_then(Value::as_str).map(String::from),
            iat: fields.get("iat").and_then(Value::as_i64),
            exp: required_exp(fields)?,
        })
    }
}

fn as_object(payload: &Value) -> Result<&Map<String, Value>, MalformedPayload> {
    payload
        .as_object()
        .ok_or(MalformedPayload("payload is not an object"))
}

fn required_id(fields: &Map<String, Value>) -> Result<Uuid, MalformedPayload> {
    let raw = fields
        .get("id")
        .and_then(Value::as_str)
        .ok_or(MalformedPayload("id is missing or not a string"))?;
    Uuid::parse_str(raw).map_err(|_| MalformedPayload("id is not a valid identifier"))
}

fn required_exp(fields: &Map<String, Value>) -> Result<i64, MalformedPayload> {
    fields
        .get("exp")
        .and_then(Value::as_i64)
        .ok_or(MalformedPayload("exp is missing or not a number"))
}

fn optional_string(fields: &Map<String, Value>, key: &str) -> Result<String, MalformedPayload> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(MalformedPayload("name fields must be strings")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "id": "5b0c1c9e-4f1c-4c8e-9a53-0f1b4a2d7e11",
            "email": "a@x.com",
            "role": "USER",
            "firstName": "Ada",
            "lastName": "Lovelace",
            "iat": 1_700_000_000,
            "exp": 1_700_000_900
        })
    }

    fn without(key: &str) -> Value {
        let mut value = payload();
        value.as_object_mut().unwrap().remove(key);
        value
    }

    fn with(key: &str, replacement: Value) -> Value {
        let mut value = payload();
        value[key] = replacement;
        value
    }

    #[test]
    fn test_valid_payload() {
        let claims = AccessClaims::from_payload(payload()).unwrap();

        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.first_name, "Ada");
        assert_eq!(claims.iat, Some(1_700_000_000));
        assert_eq!(claims.exp, 1_700_000_900);
    }

    #[test]
    fn test_guard_serializes_back_to_same_shape() {
        let claims = AccessClaims::from_payload(payload()).unwrap();
        assert_eq!(serde_json::to_value(&claims).unwrap(), payload());
    }

    #[test]
    fn test_missing_required_fields() {
        for key in ["id", "email", "role", "exp"] {
            assert!(
                AccessClaims::from_payload(without(key)).is_err(),
                "payload without {} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_role_outside_enum() {
        for role in [json!("admin"), json!("SUPERUSER"), json!(""), json!(1), Value::Null] {
            assert_eq!(
                AccessClaims::from_payload(with("role", role)),
                Err(MalformedPayload("role is missing or not ADMIN/USER"))
            );
        }
    }

    #[test]
    fn test_id_must_be_a_string() {
        assert!(AccessClaims::from_payload(with("id", json!(42))).is_err());
        assert!(AccessClaims::from_payload(with("id", json!("not-a-uuid"))).is_err());
    }

    #[test]
    fn test_names_are_optional_but_typed() {
        let claims = AccessClaims::from_payload(without("firstName")).unwrap();
        assert_eq!(claims.first_name, "");

        assert!(AccessClaims::from_payload(with("lastName", json!(["x"]))).is_err());
    }

    #[test]
    fn test_non_object_payload() {
        assert_eq!(
            AccessClaims::from_payload(json!("token")),
            Err(MalformedPayload("payload is not an object"))
        );
    }

    #[test]
    fn test_refresh_guard_requires_only_id() {
        let claims = RefreshClaims::from_payload(json!({
            "id": "5b0c1c9e-4f1c-4c8e-9a53-0f1b4a2d7e11",
            "exp": 1_700_000_900
        }))
        .unwrap();
        assert!(claims.jti.is_none());

        assert!(RefreshClaims::from_payload(json!({ "exp": 1_700_000_900 })).is_err());
    }
}
