use serde_json::Value;
use warp::{filters::BoxedFilter, http::StatusCode, reject::Rejection, reply::Response, Filter};

use super::{json_body, reply, with_context, Context};
use crate::{
    actions::{get_profile, login_user, register_user, update_profile},
    authentication::{middleware::with_session, session::SessionData},
    error::ApiError,
    form::{parse_credentials, parse_new_user, parse_user_changes},
};

async fn signup(body: Value, ctx: Context) -> Result<Response, Rejection> {
    let result = match parse_new_user(body) {
        Ok(user) => register_user(ctx.store.as_ref(), user).await,
        Err(e) => Err(ApiError::from(e)),
    };
    reply(result, StatusCode::CREATED)
}

async fn obtain_token(body: Value, ctx: Context) -> Result<Response, Rejection> {
    let result = match parse_credentials(body) {
        Ok(credentials) => login_user(ctx.store.as_ref(), credentials).await,
        Err(e) => Err(ApiError::from(e)),
    };
    reply(result, StatusCode::OK)
}

async fn show_me(session: SessionData, ctx: Context) -> Result<Response, Rejection> {
    reply(get_profile(ctx.store.as_ref(), &session).await, StatusCode::OK)
}

async fn edit_me(session: SessionData, body: Value, ctx: Context) -> Result<Response, Rejection> {
    let result = match parse_user_changes(body) {
        Ok(changes) => update_profile(ctx.store.as_ref(), &session, changes).await,
        Err(e) => Err(ApiError::from(e)),
    };
    reply(result, StatusCode::OK)
}

/// `/user/create`, `/user/token` and `/user/me`.
pub fn routes(ctx: Context) -> BoxedFilter<(Response,)> {
    let create = warp::path!("user" / "create")
        .and(warp::post())
        .and(json_body(&ctx))
        .and(with_context(ctx.clone()))
        .and_then(signup);

    let token = warp::path!("user" / "token")
        .and(warp::post())
        .and(json_body(&ctx))
        .and(with_context(ctx.clone()))
        .and_then(obtain_token);

    let me_path = warp::path!("user" / "me");

    let me = me_path
        .clone()
        .and(warp::get())
        .and(with_session(ctx.store.clone()))
        .and(with_context(ctx.clone()))
        .and_then(show_me);

    let update_me = me_path
        .and(warp::put().or(warp::patch()).unify())
        .and(with_session(ctx.store.clone()))
        .and(json_body(&ctx))
        .and(with_context(ctx))
        .and_then(edit_me);

    create
        .or(token)
        .unify()
        .or(me)
        .unify()
        .or(update_me)
        .unify()
        .boxed()
}
