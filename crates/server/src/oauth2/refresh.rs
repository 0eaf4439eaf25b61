//! Refresh token families.
//!
//! Each rotation links the new token to its predecessor through `parent_id`.
//! Presenting a token that was already rotated or revoked revokes the whole
//! family: every ancestor up to the root and every descendant of that root.

use crate::entity::refresh_token;
use crate::error::OAuthError;
use crate::oauth2::REFRESH_TOKEN_LIFETIME;
use crate::oauth2::secret::{REFRESH_TOKEN_BYTES, generate_token, hash_refresh_token};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    QueryFilter,
};
use std::collections::HashSet;
use time::OffsetDateTime;

/// A newly stored refresh token. `raw` is handed to the client exactly once.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub id: String,
    pub raw: String,
}

/// Persist a new refresh token for `user_id`/`client_id`, rotated from `parent_id`.
pub async fn issue<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    client_id: &str,
    parent_id: Option<String>,
) -> Result<IssuedRefreshToken, OAuthError> {
    let raw = generate_token(REFRESH_TOKEN_BYTES)?;
    let id = uuid::Uuid::new_v4().to_string();
    let now = OffsetDateTime::now_utc();

    refresh_token::ActiveModel {
        id: Set(id.clone()),
        user_id: Set(user_id.to_string()),
        client_id: Set(client_id.to_string()),
        token_hash: Set(hash_refresh_token(&raw)),
        expires_at: Set(now + REFRESH_TOKEN_LIFETIME),
        revoked: Set(false),
        parent_id: Set(parent_id),
        created_at: Set(now),
    }
    .insert(db)
    .await?;

    Ok(IssuedRefreshToken { id, raw })
}

/// Find the stored token matching a presented raw value for `client_id`.
pub async fn find_presented<C: ConnectionTrait>(
    db: &C,
    raw: &str,
    client_id: &str,
) -> Result<Option<refresh_token::Model>, DbErr> {
    refresh_token::Entity::find()
        .filter(refresh_token::Column::TokenHash.eq(hash_refresh_token(raw)))
        .filter(refresh_token::Column::ClientId.eq(client_id))
        .one(db)
        .await
}

/// Mark `id` as rotated if it is still live.
///
/// Returns `false` when the token was already revoked or has expired,
/// including when a concurrent rotation revoked it after it was read.
pub async fn mark_rotated<C: ConnectionTrait>(db: &C, id: &str) -> Result<bool, DbErr> {
    let result = refresh_token::Entity::update_many()
        .col_expr(refresh_token::Column::Revoked, Expr::value(true))
        .filter(refresh_token::Column::Id.eq(id))
        .filter(refresh_token::Column::Revoked.eq(false))
        .filter(refresh_token::Column::ExpiresAt.gt(OffsetDateTime::now_utc()))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Revoke every token in the family of `id`. Returns the number of tokens
/// that were still live.
pub async fn revoke_family<C: ConnectionTrait>(db: &C, id: &str) -> Result<u64, DbErr> {
    let mut ancestors: HashSet<String> = HashSet::from([id.to_string()]);
    let mut root = id.to_string();
    while let Some(parent) = refresh_token::Entity::find_by_id(root.as_str())
        .one(db)
        .await?
        .and_then(|row| row.parent_id)
    {
        if !ancestors.insert(parent.clone()) {
            break;
        }
        root = parent;
    }

    let mut family: HashSet<String> = HashSet::from([root.clone()]);
    let mut frontier = vec![root];
    while !frontier.is_empty() {
        let children = refresh_token::Entity::find()
            .filter(refresh_token::Column::ParentId.is_in(frontier))
            .all(db)
            .await?;
        frontier = children
            .into_iter()
            .map(|row| row.id)
            .filter(|child| family.insert(child.clone()))
            .collect();
    }
    // A broken parent chain can leave ancestors unreachable from the root
    family.extend(ancestors);

    let result = refresh_token::Entity::update_many()
        .col_expr(refresh_token::Column::Revoked, Expr::value(true))
        .filter(refresh_token::Column::Id.is_in(family))
        .filter(refresh_token::Column::Revoked.eq(false))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}
