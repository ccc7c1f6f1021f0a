use crate::{
    error::{ApiError, ApiResult},
    schema::{Id, User},
    store::RecipeStore,
};

const NOT_PROVIDED: &str = "Authentication credentials were not provided.";
const INVALID_TOKEN: &str = "Invalid token.";
const INACTIVE: &str = "User inactive or deleted.";

/// The authenticated caller, resolved once per request.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionData {
    pub user_id: Id,
}

impl From<&User> for SessionData {
    fn from(user: &User) -> Self {
        Self { user_id: user.id }
    }
}

/// Accepts `Token <key>` and `Bearer <key>`, scheme case-insensitive.
pub fn parse_authorization(header: &str) -> Option<&str> {
    let (scheme, key) = header.trim().split_once(' ')?;
    let key = key.trim();
    if key.is_empty() || key.contains(' ') {
        return None;
    }

    match scheme.to_ascii_lowercase().as_str() {
        "token" | "bearer" => Some(key),
        _ => None,
    }
}

pub async fn authenticate(store: &dyn RecipeStore, header: Option<&str>) -> ApiResult<SessionData> {
    let header = header.ok_or_else(|| ApiError::unauthorized(NOT_PROVIDED))?;
    let key = parse_authorization(header).ok_or_else(|| ApiError::unauthorized(INVALID_TOKEN))?;

    let token = store
        .find_token(key)
        .await?
        .ok_or_else(|| ApiError::unauthorized(INVALID_TOKEN))?;

    match store.get_user(token.user_id).await? {
        Some(user) if user.is_active => Ok(SessionData::from(&user)),
        _ => Err(ApiError::unauthorized(INACTIVE)),
    }
}
