//! Persistence of authorization codes.
//!
//! Codes are consumed inside the caller's transaction. The delete is
//! conditional on the code being unexpired and must remove exactly one row, so
//! a concurrent redemption that already deleted the row fails instead of
//! minting a second set of tokens.

use crate::entity::authorization_code;
use crate::error::OAuthError;
use crate::oauth2::CODE_LIFETIME;
use crate::oauth2::secret::{CODE_BYTES, generate_token};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use time::OffsetDateTime;

/// Generate and persist a fresh code bound to `client_id`, `user_id` and the
/// PKCE `code_challenge`.
pub async fn issue<C: ConnectionTrait>(
    db: &C,
    client_id: &str,
    user_id: &str,
    code_challenge: &str,
) -> Result<authorization_code::Model, OAuthError> {
    let now = OffsetDateTime::now_utc();
    let code = authorization_code::ActiveModel {
        code: Set(generate_token(CODE_BYTES)?),
        client_id: Set(client_id.to_string()),
        user_id: Set(user_id.to_string()),
        code_challenge: Set(code_challenge.to_string()),
        expires_at: Set(now + CODE_LIFETIME),
        created_at: Set(now),
    };

    Ok(code.insert(db).await?)
}

/// Look up and delete `code`, returning the grant it carried.
///
/// The delete only matches an unexpired row and must remove exactly one, so
/// expiry and a concurrent redemption that got there first both surface here.
/// Unknown, expired and already-consumed codes are indistinguishable to the
/// caller.
pub async fn consume<C: ConnectionTrait>(
    db: &C,
    code: &str,
) -> Result<authorization_code::Model, OAuthError> {
    let row = authorization_code::Entity::find_by_id(code)
        .one(db)
        .await?
        .ok_or(OAuthError::InvalidOrExpiredCode)?;

    let deleted = authorization_code::Entity::delete_many()
        .filter(authorization_code::Column::Code.eq(code))
        .filter(authorization_code::Column::ExpiresAt.gt(OffsetDateTime::now_utc()))
        .exec(db)
        .await?;
    if deleted.rows_affected != 1 {
        tracing::debug!(client_id = %row.client_id, "authorization code expired or already consumed");
        return Err(OAuthError::InvalidOrExpiredCode);
    }

    Ok(row)
}
