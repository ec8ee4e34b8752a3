// Signed room grants handed to collaboration clients.
//
// The grant carries the caller's presence info and the room-key patterns they
// may open. It uses its own audience so it can never stand in for an access
// token on this server.

use anyhow::{bail, Context};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use roomsync_common::grant::{presence_color, GrantScope};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::{current_unix_timestamp, MIN_SECRET_LEN};

pub const ROOM_GRANT_TTL_SECONDS: i64 = 60 * 60;
pub const ROOM_GRANT_AUDIENCE: &str = "roomsync-rooms";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomGrantClaims {
    pub sub: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub color: String,
    pub perms: GrantScope,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Presence details shown to other collaborators in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantSubject {
    pub user_id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedGrant {
    pub token: String,
    pub expires_at: i64,
    pub patterns: GrantScope,
}

#[derive(Clone)]
pub struct RoomGrantIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl RoomGrantIssuer {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            bail!("room grant secret must be at least {MIN_SECRET_LEN} characters long");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "aud"]);
        validation.set_audience(&[ROOM_GRANT_AUDIENCE]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn issue(&self, subject: &GrantSubject, scope: GrantScope) -> anyhow::Result<IssuedGrant> {
        self.issue_at(subject, scope, current_unix_timestamp()?)
    }

    pub(crate) fn issue_at(
        &self,
        subject: &GrantSubject,
        scope: GrantScope,
        issued_at: i64,
    ) -> anyhow::Result<IssuedGrant> {
        let user_id = subject.user_id.to_string();
        let claims = RoomGrantClaims {
            color: presence_color(&user_id).to_owned(),
            sub: user_id,
            name: subject.name.clone(),
            avatar: subject.avatar.clone(),
            perms: scope,
            aud: ROOM_GRANT_AUDIENCE.to_owned(),
            iat: issued_at,
            exp: issued_at + ROOM_GRANT_TTL_SECONDS,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode room grant")?;

        Ok(IssuedGrant { token, expires_at: claims.exp, patterns: claims.perms })
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<RoomGrantClaims> {
        Ok(decode::<RoomGrantClaims>(token, &self.decoding_key, &self.validation)
            .context("failed to decode room grant")?
            .claims)
    }
}
