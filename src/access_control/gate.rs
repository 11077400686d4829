use std::sync::Arc;

use log::warn;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::{Filter, Rejection};

use crate::error_handling::types::{OperationError, StorageError};
use crate::storage::db_entities::{user_permissions, users};
use crate::storage::store_trait::Store;

/// A user resolved from an API token, with their granted features.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub features: Vec<String>,
}

impl AuthedUser {
    /// Admins hold every feature implicitly.
    pub fn has_feature(&self, feature: &str) -> bool {
        self.role == "admin" || self.features.iter().any(|f| f == feature)
    }
}

/// Resolve a token to its user and permission set. Unknown tokens are not
/// an error, just `None`.
pub async fn lookup_user<C: ConnectionTrait>(
    conn: &C,
    token: &str,
) -> Result<Option<AuthedUser>, OperationError> {
    let user = match users::Entity::find()
        .filter(users::Column::Token.eq(token))
        .one(conn)
        .await?
    {
        Some(user) => user,
        None => return Ok(None),
    };
    let features = user_permissions::Entity::find()
        .filter(user_permissions::Column::UserId.eq(user.id.clone()))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| p.feature)
        .collect();
    Ok(Some(AuthedUser {
        id: Uuid::parse_str(&user.id)
            .map_err(|_| OperationError::Storage(StorageError::ReadFailed))?,
        name: user.name,
        role: user.role,
        features,
    }))
}

/// Rejection raised by the gate; recovered into a JSON error response at
/// the web boundary.
#[derive(Debug)]
pub struct AccessDenied {
    pub status: StatusCode,
    pub message: String,
}

impl warp::reject::Reject for AccessDenied {}

fn denied(status: StatusCode, message: &str) -> Rejection {
    warp::reject::custom(AccessDenied {
        status,
        message: message.to_string(),
    })
}

/// Filter that admits only requests carrying a valid `X-Api-Token` for a
/// user holding `feature`. Missing or unknown tokens yield 401, a known
/// user without the feature 403.
pub fn with_permission(
    store: Arc<dyn Store>,
    feature: &'static str,
) -> impl Filter<Extract = (AuthedUser,), Error = Rejection> + Clone {
    warp::header::optional::<String>("x-api-token")
        .and(warp::any().map(move || store.clone()))
        .and_then(move |token: Option<String>, store: Arc<dyn Store>| async move {
            let token = match token {
                Some(token) if !token.trim().is_empty() => token,
                _ => return Err(denied(StatusCode::UNAUTHORIZED, "missing API token")),
            };
            let user = match store.user_by_token(&token).await {
                Ok(user) => user,
                Err(err) => {
                    warn!("token lookup failed: {}", err);
                    return Err(denied(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "authorization unavailable",
                    ));
                }
            };
            match user {
                Some(user) if user.has_feature(feature) => Ok(user),
                Some(_) => Err(denied(StatusCode::FORBIDDEN, "permission denied")),
                None => Err(denied(StatusCode::UNAUTHORIZED, "invalid API token")),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::ActiveValue::Set;
    use sea_orm::ActiveModelTrait;

    use crate::storage::DatabaseStore;

    async fn seed_user(store: &DatabaseStore, token: &str, role: &str, features: &[&str]) -> Uuid {
        let id = Uuid::new_v4();
        users::ActiveModel {
            id: Set(id.to_string()),
            name: Set("gatekeeper".to_string()),
            token: Set(token.to_string()),
            role: Set(role.to_string()),
        }
        .insert(store.connection())
        .await
        .unwrap();
        for feature in features {
            user_permissions::ActiveModel {
                user_id: Set(id.to_string()),
                feature: Set(feature.to_string()),
                ..Default::default()
            }
            .insert(store.connection())
            .await
            .unwrap();
        }
        id
    }

    #[tokio::test]
    async fn test_lookup_user_resolves_token_and_features() {
        let store = DatabaseStore::in_memory().await.unwrap();
        let id = seed_user(&store, "tok-1", "operator", &["accreditations.write"]).await;

        let user = lookup_user(store.connection(), "tok-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, id);
        assert!(user.has_feature("accreditations.write"));
        assert!(!user.has_feature("accreditations.admin"));

        assert!(lookup_user(store.connection(), "nope")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_admin_bypasses_feature_check() {
        let store = DatabaseStore::in_memory().await.unwrap();
        seed_user(&store, "tok-admin", "admin", &[]).await;
        let user = lookup_user(store.connection(), "tok-admin")
            .await
            .unwrap()
            .unwrap();
        assert!(user.has_feature("anything.at.all"));
    }
}
