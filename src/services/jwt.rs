use jsonwebtoken::{encode, decode, Header, Validation, EncodingKey, DecodingKey};
use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::models::UserRole;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
    /// Handed out at signup; only accepted by verify / resend code.
    Verify,
    Reset,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // User ID
    pub email: String,
    pub role: UserRole,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn user_id(&self) -> Option<ObjectId> {
        ObjectId::parse_str(&self.sub).ok()
    }
}

pub struct JwtService;

impl JwtService {
    fn secret(kind: TokenKind) -> String {
        match kind {
            TokenKind::Access | TokenKind::Verify => Config::jwt_secret(),
            TokenKind::Refresh => Config::jwt_refresh_secret(),
            TokenKind::Reset => Config::jwt_forgot_secret(),
        }
    }

    fn lifetime(kind: TokenKind) -> i64 {
        match kind {
            TokenKind::Access => Config::jwt_expiry(),
            TokenKind::Refresh => Config::jwt_refresh_expiry(),
            TokenKind::Verify | TokenKind::Reset => Config::jwt_verify_expiry(),
        }
    }

    pub fn issue_with(
        secret: &str,
        kind: TokenKind,
        lifetime: i64,
        user_id: &ObjectId,
        email: &str,
        role: UserRole,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();

        let claims = Claims {
            sub: user_id.to_hex(),
            email: email.to_string(),
            role,
            kind,
            exp: now + lifetime,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Decodes `token` and checks it was issued for `kind`.
    pub fn decode_with(secret: &str, kind: TokenKind, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;

        if token_data.claims.kind != kind {
            return Err(jsonwebtoken::errors::ErrorKind::InvalidToken.into());
        }

        Ok(token_data.claims)
    }

    pub fn issue(
        kind: TokenKind,
        user_id: &ObjectId,
        email: &str,
        role: UserRole,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        Self::issue_with(&Self::secret(kind), kind, Self::lifetime(kind), user_id, email, role)
    }

    pub fn verify(kind: TokenKind, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        Self::decode_with(&Self::secret(kind), kind, token)
    }

    pub fn generate_access_token(user_id: &ObjectId, email: &str, role: UserRole) -> Result<String, jsonwebtoken::errors::Error> {
        Self::issue(TokenKind::Access, user_id, email, role)
    }

    pub fn generate_refresh_token(user_id: &ObjectId, email: &str, role: UserRole) -> Result<String, jsonwebtoken::errors::Error> {
        Self::issue(TokenKind::Refresh, user_id, email, role)
    }

    /// Hex SHA-256 of a refresh token, as kept in `rt_hash`.
    pub fn fingerprint(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    /// Constant-time comparison of `token` against a stored fingerprint.
    pub fn fingerprint_matches(stored: &str, token: &str) -> bool {
        let Ok(stored) = hex::decode(stored) else {
            return false;
        };
        let presented = Sha256::digest(token.as_bytes());
        if stored.len() != presented.len() {
            return false;
        }
        stored
            .iter()
            .zip(presented.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_claims() {
        let id = ObjectId::new();
        let token = JwtService::issue_with("s3cret", TokenKind::Access, 60, &id, "a@b.in", UserRole::Admin).unwrap();
        let claims = JwtService::decode_with("s3cret", TokenKind::Access, &token).unwrap();
        assert_eq!(claims.user_id(), Some(id));
        assert_eq!(claims.email, "a@b.in");
        assert_eq!(claims.role, UserRole::Admin);
    }

    #[test]
    fn token_of_another_kind_is_rejected() {
        let id = ObjectId::new();
        let token = JwtService::issue_with("s3cret", TokenKind::Verify, 60, &id, "a@b.in", UserRole::User).unwrap();
        assert!(JwtService::decode_with("s3cret", TokenKind::Access, &token).is_err());
    }

    #[test]
    fn refresh_fingerprint_matches_only_its_token() {
        let stored = JwtService::fingerprint("header.payload.sig");
        assert_eq!(stored.len(), 64);
        assert!(JwtService::fingerprint_matches(&stored, "header.payload.sig"));
        assert!(!JwtService::fingerprint_matches(&stored, "header.payload.sih"));
        assert!(!JwtService::fingerprint_matches("", "header.payload.sig"));
    }

    #[test]
    fn wrong_secret_or_expired_token_is_rejected() {
        let id = ObjectId::new();
        let token = JwtService::issue_with("one", TokenKind::Refresh, 60, &id, "a@b.in", UserRole::User).unwrap();
        assert!(JwtService::decode_with("two", TokenKind::Refresh, &token).is_err());

        // past the default 60s leeway
        let stale = JwtService::issue_with("one", TokenKind::Refresh, -120, &id, "a@b.in", UserRole::User).unwrap();
        assert!(JwtService::decode_with("one", TokenKind::Refresh, &stale).is_err());
    }
}
