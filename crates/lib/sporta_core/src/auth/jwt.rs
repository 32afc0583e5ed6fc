//! JWT issuance and verification (HS256).
//!
//! Access and refresh tokens share one claim shape and are told apart by the
//! `sub` claim. Each kind has its own secret and lifetime.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use super::AuthError;
use crate::config::AuthConfig;
use crate::models::auth::{IssuedToken, TokenClaims, TokenSubject};

/// Signs and verifies access and refresh tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    access_secret: Vec<u8>,
    access_ttl: Duration,
    refresh_secret: Vec<u8>,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_secret: config.access_token_secret.as_bytes().to_vec(),
            access_ttl: to_chrono(config.access_token_ttl),
            refresh_secret: config.refresh_token_secret.as_bytes().to_vec(),
            refresh_ttl: to_chrono(config.refresh_token_ttl),
        }
    }

    /// Sign an access token carrying the user's email and permissions.
    pub fn issue_access_token(
        &self,
        user_id: i64,
        email: &str,
        permissions: &[String],
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        self.sign(
            user_id,
            email,
            permissions,
            TokenSubject::Access,
            now,
            self.access_ttl,
            &self.access_secret,
        )
    }

    /// Sign a refresh token. Refresh claims carry no email or permissions.
    pub fn issue_refresh_token(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        self.sign(
            user_id,
            "",
            &[],
            TokenSubject::Refresh,
            now,
            self.refresh_ttl,
            &self.refresh_secret,
        )
    }

    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, AuthError> {
        parse_and_verify(token, TokenSubject::Access, &self.access_secret)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims, AuthError> {
        parse_and_verify(token, TokenSubject::Refresh, &self.refresh_secret)
    }

    #[allow(clippy::too_many_arguments)]
    fn sign(
        &self,
        user_id: i64,
        email: &str,
        permissions: &[String],
        subject: TokenSubject,
        now: DateTime<Utc>,
        ttl: Duration,
        secret: &[u8],
    ) -> Result<IssuedToken, AuthError> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::TokenCreation("token lifetime out of range".into()))?;
        let jti = Uuid::new_v4().to_string();
        let claims = TokenClaims {
            user_id,
            email: email.to_string(),
            permissions: permissions.to_vec(),
            sub: subject.as_str().to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: jti.clone(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .map_err(|e| AuthError::TokenCreation(format!("jwt encode: {e}")))?;
        Ok(IssuedToken {
            token,
            jti,
            expires_at,
        })
    }
}

/// Verify signature, algorithm, time window and subject of `token`.
///
/// Only HS256 is accepted. No clock leeway is applied. Cache liveness is not
/// checked here.
pub fn parse_and_verify(
    token: &str,
    expected: TokenSubject,
    secret: &[u8],
) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.set_required_spec_claims(&["exp", "nbf", "sub"]);

    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

    if data.claims.sub != expected.as_str() {
        return Err(AuthError::InvalidToken(format!(
            "unexpected subject {:?}",
            data.claims.sub
        )));
    }
    Ok(data.claims)
}

fn to_chrono(ttl: std::time::Duration) -> Duration {
    Duration::from_std(ttl).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&AuthConfig::new("access-secret", "refresh-secret"))
    }

    #[test]
    fn access_token_round_trip() {
        let issuer = issuer();
        let perms = vec!["match.create".to_string(), "profile.view.own".to_string()];
        let issued = issuer
            .issue_access_token(42, "ivan@example.com", &perms, Utc::now())
            .unwrap();

        let claims = issuer.verify_access(&issued.token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.email, "ivan@example.com");
        assert_eq!(claims.permissions, perms);
        assert_eq!(claims.sub, "access");
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.exp, issued.expires_at.timestamp());
        assert_eq!(claims.exp - claims.iat, 10 * 60);
    }

    #[test]
    fn refresh_token_has_no_email_or_permissions() {
        let issuer = issuer();
        let issued = issuer.issue_refresh_token(7, Utc::now()).unwrap();
        let claims = issuer.verify_refresh(&issued.token).unwrap();
        assert_eq!(claims.user_id, 7);
        assert!(claims.email.is_empty());
        assert!(claims.permissions.is_empty());
        assert_eq!(claims.exp - claims.iat, 30 * 24 * 60 * 60);
    }

    #[test]
    fn each_token_gets_a_fresh_jti() {
        let issuer = issuer();
        let now = Utc::now();
        let a = issuer.issue_refresh_token(1, now).unwrap();
        let b = issuer.issue_refresh_token(1, now).unwrap();
        assert_ne!(a.jti, b.jti);
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let issuer = issuer();
        let refresh = issuer.issue_refresh_token(1, Utc::now()).unwrap();
        // Wrong secret and wrong subject both reject.
        assert!(issuer.verify_access(&refresh.token).is_err());
        let err = parse_and_verify(&refresh.token, TokenSubject::Access, b"refresh-secret")
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(msg) if msg.contains("subject")));
    }

    #[test]
    fn wrong_secret_rejects() {
        let issued = issuer()
            .issue_access_token(1, "a@b.c", &[], Utc::now())
            .unwrap();
        let other = TokenIssuer::new(&AuthConfig::new("other", "other-refresh"));
        assert!(matches!(
            other.verify_access(&issued.token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn other_algorithms_reject() {
        let claims = TokenClaims {
            user_id: 1,
            email: "a@b.c".into(),
            permissions: vec![],
            sub: "access".into(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iat: Utc::now().timestamp(),
            nbf: Utc::now().timestamp(),
            jti: "x".into(),
        };
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(b"access-secret"),
        )
        .unwrap();
        assert!(matches!(
            issuer().verify_access(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn expired_token_rejects() {
        let issued = issuer()
            .issue_access_token(1, "a@b.c", &[], Utc::now() - Duration::hours(1))
            .unwrap();
        assert!(matches!(
            issuer().verify_access(&issued.token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn future_token_is_not_yet_valid() {
        let issued = issuer()
            .issue_access_token(1, "a@b.c", &[], Utc::now() + Duration::hours(1))
            .unwrap();
        assert!(issuer().verify_access(&issued.token).is_err());
    }

    #[test]
    fn garbage_rejects() {
        assert!(issuer().verify_access("not.a.jwt").is_err());
        assert!(issuer().verify_refresh("").is_err());
    }
}
