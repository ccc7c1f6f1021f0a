use crate::{
    authentication::{
        cryptography::{generate_access_token, hash_password, verify_password},
        session::SessionData,
    },
    error::{ApiError, ApiResult, StoreError, ValidationError},
    schema::{Credentials, NewUser, TokenRecord, User, UserChanges, UserRecord},
    store::RecipeStore,
};

const EMAIL_TAKEN: &str = "user with this email already exists.";
const INVALID_CREDENTIALS: &str = "Unable to authenticate with provided credentials.";

fn email_conflict(e: StoreError) -> ApiError {
    match e {
        StoreError::Conflict(_) => ValidationError::field("email", EMAIL_TAKEN).into(),
        e => e.into(),
    }
}

/// Creates a user from a plain-text password, which is hashed before it is stored.
pub async fn register_user(store: &dyn RecipeStore, user: NewUser) -> ApiResult<UserRecord> {
    let password = hash_password(&user.password)?;
    let created = store
        .create_user(NewUser { password, ..user })
        .await
        .map_err(email_conflict)?;

    log::info!("Registered user {}", created.id);
    Ok(created.into())
}

/// Exchanges credentials for the user's token, creating it on first login.
pub async fn login_user(store: &dyn RecipeStore, credentials: Credentials) -> ApiResult<TokenRecord> {
    let user = store.find_user_by_email(&credentials.email).await?;
    let Some(user) = user.filter(|u| u.is_active) else {
        return Err(ValidationError::non_field(INVALID_CREDENTIALS).into());
    };

    if !verify_password(&credentials.password, &user.password)? {
        return Err(ValidationError::non_field(INVALID_CREDENTIALS).into());
    }

    let token = store
        .get_or_create_token(user.id, &generate_access_token())
        .await?;

    log::info!("Issued token for user {}", user.id);
    Ok(TokenRecord { token: token.key })
}

async fn session_user(store: &dyn RecipeStore, session: &SessionData) -> ApiResult<User> {
    store
        .get_user(session.user_id)
        .await?
        .ok_or(ApiError::NotFound)
}

pub async fn get_profile(store: &dyn RecipeStore, session: &SessionData) -> ApiResult<UserRecord> {
    Ok(session_user(store, session).await?.into())
}

pub async fn update_profile(
    store: &dyn RecipeStore,
    session: &SessionData,
    changes: UserChanges,
) -> ApiResult<UserRecord> {
    let mut user = session_user(store, session).await?;

    if let Some(email) = changes.email {
        user.email = email;
    }
    if let Some(name) = changes.name {
        user.name = name;
    }
    if let Some(password) = changes.password {
        user.password = hash_password(&password)?;
    }

    let updated = store.update_user(&user).await.map_err(email_conflict)?;
    Ok(updated.into())
}
