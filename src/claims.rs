//! Access token claims decoding.
//!
//! The client never holds the signing secret; the backend is the trust
//! boundary. Claims are therefore read with signature validation disabled,
//! and expiry policy is handled separately by [`crate::clock`]. Everything
//! downstream depends on the decoded [`Principal`], never on the raw token,
//! so malformed tokens surface exactly once, here, as a [`DecodeError`].

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

use crate::permissions::{PermissionFlags, Principal, Role, TableGrant};

/// Claims carried by the access token.
///
/// Unknown additional claims are ignored for forward compatibility; missing
/// required claims fail the decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Subject identifier
    #[serde(default)]
    pub id: Option<String>,
    pub email: String,
    pub name: String,
    /// School scoping, present for school-bound accounts
    #[serde(default)]
    pub school: Option<String>,
    pub permissions: PermissionFlags,
    pub table_access: Vec<TableGrant>,
}

/// Errors that can occur while decoding a token.
#[derive(Debug)]
pub enum DecodeError {
    /// Malformed token or missing required claims
    Malformed(jsonwebtoken::errors::Error),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Malformed(e) => write!(f, "Failed to decode token: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Read a claims payload without verifying the signature.
///
/// Shared with [`crate::clock`], which peeks at `exp` alone.
pub(crate) fn read_claims<T: DeserializeOwned>(token: &str) -> Result<T, DecodeError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let data = jsonwebtoken::decode::<T>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(DecodeError::Malformed)?;
    Ok(data.claims)
}

/// Decode an access token into the acting principal.
///
/// Pure: no network, no clock reads. Failure means the identity cannot be
/// established and callers must take the logout path.
pub fn decode(access_token: &str) -> Result<Principal, DecodeError> {
    let claims: AccessClaims = read_claims(access_token)?;

    let mut table_access: Vec<TableGrant> = Vec::with_capacity(claims.table_access.len());
    for grant in claims.table_access {
        if table_access.iter().any(|g| g.table_name == grant.table_name) {
            warn!(table = %grant.table_name, "Duplicate table grant in claims, keeping first");
            continue;
        }
        table_access.push(grant);
    }

    Ok(Principal {
        id: claims.id.unwrap_or_default(),
        email: claims.email,
        name: claims.name,
        role: Role::from_flags(&claims.permissions),
        permissions: claims.permissions,
        table_access,
        school_id: claims.school,
        token_expiry: claims.exp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};

    fn encode(claims: &impl serde::Serialize) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap()
    }

    fn sample_claims() -> AccessClaims {
        AccessClaims {
            exp: 2_000_000_000,
            iat: 1_999_999_000,
            id: Some("42".into()),
            email: "kovacs@example.com".into(),
            name: "Kovács Anna".into(),
            school: Some("OM-123456".into()),
            permissions: PermissionFlags {
                is_admin: true,
                ..PermissionFlags::default()
            },
            table_access: vec![TableGrant::read_only("tanulo_letszam")],
        }
    }

    #[test]
    fn decodes_principal_from_claims() {
        let token = encode(&sample_claims());
        let principal = decode(&token).unwrap();

        assert_eq!(principal.id, "42");
        assert_eq!(principal.email, "kovacs@example.com");
        assert_eq!(principal.name, "Kovács Anna");
        assert_eq!(principal.role, Role::Admin);
        assert_eq!(principal.school_id.as_deref(), Some("OM-123456"));
        assert_eq!(principal.token_expiry, 2_000_000_000);
        assert!(principal.has_grant("tanulo_letszam"));
    }

    #[test]
    fn missing_required_claim_fails_decode() {
        // No email claim.
        let token = encode(&serde_json::json!({
            "exp": 2_000_000_000u64,
            "iat": 1_999_999_000u64,
            "name": "Hiányos",
            "permissions": {},
            "tableAccess": [],
        }));
        assert!(decode(&token).is_err());
    }

    #[test]
    fn unknown_claims_are_ignored() {
        let token = encode(&serde_json::json!({
            "exp": 2_000_000_000u64,
            "iat": 1_999_999_000u64,
            "email": "x@example.com",
            "name": "X",
            "permissions": {"isStandard": true},
            "tableAccess": [],
            "jti": "abc",
            "featureFlags": {"newCharts": true},
        }));
        let principal = decode(&token).unwrap();
        assert_eq!(principal.role, Role::Standard);
    }

    #[test]
    fn expired_token_still_decodes() {
        // Expiry classification is the clock's job, not the codec's.
        let mut claims = sample_claims();
        claims.exp = 1;
        let principal = decode(&encode(&claims)).unwrap();
        assert_eq!(principal.token_expiry, 1);
    }

    #[test]
    fn duplicate_grants_keep_first() {
        let mut claims = sample_claims();
        claims.table_access = vec![
            TableGrant::read_only("intezmeny"),
            TableGrant {
                access: false,
                ..TableGrant::read_only("intezmeny")
            },
        ];
        let principal = decode(&encode(&claims)).unwrap();
        assert_eq!(principal.table_access.len(), 1);
        assert!(principal.has_grant("intezmeny"));
    }

    #[test]
    fn garbage_token_is_a_decode_error() {
        assert!(decode("not-a-token").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn no_role_flag_falls_back_to_user() {
        let mut claims = sample_claims();
        claims.permissions = PermissionFlags::default();
        let principal = decode(&encode(&claims)).unwrap();
        assert_eq!(principal.role, Role::User);
    }
}
